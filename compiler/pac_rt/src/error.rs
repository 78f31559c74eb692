//! Run-time and link-time errors.

use std::fmt;

use pac_codegen::ir::FailKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// No alternative or switch case matches the input.
    UnmatchedAlternative,
    /// The input differs from an expected constant.
    ConstantMismatch,
    /// The input ended (and was frozen) in the middle of a value.
    UnexpectedEndOfInput,
    /// A hook started a parse on the stream it was being called from.
    ReentrantHookParse,
    /// Arguments do not fit the parser's parameters.
    InvalidArguments,
    /// The program itself is malformed or an operation had no valid result.
    InvalidProgram,
}

impl From<FailKind> for ParseErrorKind {
    fn from(kind: FailKind) -> Self {
        match kind {
            FailKind::UnmatchedAlternative => ParseErrorKind::UnmatchedAlternative,
            FailKind::ConstantMismatch => ParseErrorKind::ConstantMismatch,
            FailKind::UnexpectedEndOfInput => ParseErrorKind::UnexpectedEndOfInput,
        }
    }
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParseErrorKind::UnmatchedAlternative => "unmatched alternative",
            ParseErrorKind::ConstantMismatch => "constant mismatch",
            ParseErrorKind::UnexpectedEndOfInput => "unexpected end of input",
            ParseErrorKind::ReentrantHookParse => "reentrant parse from hook",
            ParseErrorKind::InvalidArguments => "invalid arguments",
            ParseErrorKind::InvalidProgram => "invalid program",
        })
    }
}

/// A failed parse. Unwinds the whole invocation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{path} at offset {offset}: {kind}: {message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// `Unit::field` where the error was raised.
    pub path: String,
    /// Byte offset into the input.
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        path: impl Into<String>,
        offset: usize,
        message: impl Into<String>,
    ) -> Self {
        ParseError {
            kind,
            path: path.into(),
            offset,
            message: message.into(),
        }
    }
}

/// Linking generated modules with hook bodies failed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("hook `{symbol}` at `{site}` has no body")]
    MissingHookBody { symbol: String, site: String },

    #[error("no parser named `{name}`")]
    UnknownParser { name: String },
}
