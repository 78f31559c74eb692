//! Generation-time errors.

use pac_ir::GrammarError;
use pac_lookahead::{GrammarAmbiguity, InvalidPattern, LookaheadError};

/// A problem found while building parsers for a module.
///
/// Collected per unit; a failing unit does not stop the others.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CodegenError {
    #[error(transparent)]
    GrammarAmbiguity(#[from] GrammarAmbiguity),

    #[error("{production}: {source}")]
    InvalidPattern {
        production: String,
        source: InvalidPattern,
    },

    #[error(transparent)]
    Grammar(#[from] GrammarError),

    #[error("{production}: decision point has no resolved matcher")]
    UnresolvedDecision { production: String },

    #[error("no parse in progress")]
    NoActiveParse,

    #[error("unknown unit `{unit}`")]
    UnknownUnit { unit: String },

    #[error("unit `{unit}` has no field `{field}`")]
    UnknownField { unit: String, field: String },

    #[error("unit `{unit}` has no parameter `{param}`")]
    UnknownParam { unit: String, param: String },

    #[error("unit `{unit}` uses `$$` outside a `&convert` filter")]
    ParsedValueOutsideConvert { unit: String },

    #[error("invalid hook path `{path}`")]
    InvalidHookPath { path: String },

    #[error("unit `{unit}` is used as a sink but is neither exported nor sinkable")]
    NotSinkable { unit: String },

    #[error("unit `{unit}` depends on `{dependency}`, which failed to compile")]
    FailedDependency { unit: String, dependency: String },

    #[error("unit `{unit}` takes {expected} arguments, {found} given")]
    TooManyArguments {
        unit: String,
        expected: usize,
        found: usize,
    },
}

impl From<LookaheadError> for CodegenError {
    fn from(err: LookaheadError) -> Self {
        match err {
            LookaheadError::Ambiguity(a) => CodegenError::GrammarAmbiguity(a),
            LookaheadError::InvalidPattern { production, source } => {
                CodegenError::InvalidPattern { production, source }
            }
        }
    }
}
