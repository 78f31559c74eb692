use std::sync::Arc;

use pac_codegen::ParserDefinition;

use crate::error::{ParseError, ParseErrorKind};
use crate::exec::{Executor, Outcome};
use crate::program::{FunctionRef, Program};
use crate::stream::Stream;
use crate::value::{Record, Value};

use super::invocation::{into_record, Invocation, Sink};

/// An exported parser: the host and sink entry points of one unit.
#[derive(Clone, Debug)]
pub struct Parser {
    program: Arc<Program>,
    module: usize,
    definition: ParserDefinition,
}

impl Parser {
    pub(super) fn new(program: Arc<Program>, module: usize, definition: ParserDefinition) -> Self {
        Parser {
            program,
            module,
            definition,
        }
    }

    /// `Module::Unit`.
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &ParserDefinition {
        &self.definition
    }

    /// Parse a complete input.
    pub fn parse(&self, data: &[u8]) -> Result<Record, ParseError> {
        self.parse_with(data, Vec::new())
    }

    /// Parse a complete input, passing unit parameters. Missing trailing
    /// arguments take their defaults.
    pub fn parse_with(&self, data: &[u8], args: Vec<Value>) -> Result<Record, ParseError> {
        let mut invocation = self.invoke_with(args)?;
        invocation.feed(data)?;
        invocation.finish()
    }

    /// Parse whatever `stream` holds, in one go. Suspending for input is an
    /// error here; use [`Parser::invoke`] for incremental parsing.
    pub fn parse_stream(&self, stream: &Stream) -> Result<Record, ParseError> {
        let _guard = stream.enter(self.name())?;
        let executor = Executor::new(self.program.clone());
        match executor.start(self.host(), self.arguments(Vec::new())?, stream)? {
            Outcome::Done { value, .. } => into_record(value, self.name()),
            Outcome::NeedMoreInput(resumption) => Err(ParseError::new(
                ParseErrorKind::UnexpectedEndOfInput,
                self.name(),
                resumption.offset(),
                "input is incomplete",
            )),
        }
    }

    /// Start an incremental parse on a fresh stream.
    pub fn invoke(&self) -> Result<Invocation, ParseError> {
        self.invoke_with(Vec::new())
    }

    pub fn invoke_with(&self, args: Vec<Value>) -> Result<Invocation, ParseError> {
        let args = self.arguments(args)?;
        Ok(Invocation::new(
            Executor::new(self.program.clone()),
            self.name(),
            self.host(),
            args,
        ))
    }

    /// Start a sink-fed parse: parameters take their defaults.
    pub fn sink(&self) -> Sink {
        let entry = FunctionRef {
            module: self.module,
            func: self.definition.sink,
        };
        Sink::new(Invocation::new(
            Executor::new(self.program.clone()),
            self.name(),
            entry,
            Vec::new(),
        ))
    }

    /// The host entry point, for use with [`Executor::start`].
    pub fn entry(&self) -> FunctionRef {
        self.host()
    }

    fn host(&self) -> FunctionRef {
        FunctionRef {
            module: self.module,
            func: self.definition.host,
        }
    }

    fn arguments(&self, mut args: Vec<Value>) -> Result<Vec<Value>, ParseError> {
        let params = &self.definition.params;
        if args.len() > params.len() {
            return Err(ParseError::new(
                ParseErrorKind::InvalidArguments,
                self.name(),
                0,
                format!(
                    "{} takes {} arguments, {} given",
                    self.name(),
                    params.len(),
                    args.len()
                ),
            ));
        }
        args.extend(params[args.len()..].iter().map(|p| Value::from(&p.default)));
        Ok(args)
    }
}
