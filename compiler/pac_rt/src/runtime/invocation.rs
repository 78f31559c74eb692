use crate::error::{ParseError, ParseErrorKind};
use crate::exec::{Executor, Outcome, Resumption};
use crate::program::FunctionRef;
use crate::stream::Stream;
use crate::value::{Record, Value};

/// Progress of an incremental parse.
#[derive(Clone, Debug, PartialEq)]
pub enum ParseStatus {
    Done(Record),
    /// The parser suspended; feed more input or finish.
    NeedMoreInput,
}

enum State {
    Pending(Vec<Value>),
    Suspended(Resumption),
    Done(Record),
    Failed(ParseError),
}

/// An incremental parse over its own stream.
///
/// Input arrives in chunks through [`Invocation::feed`]; the parser runs as
/// far as the input allows and suspends. Feeding input after the parse
/// finished or failed only repeats the result.
pub struct Invocation {
    executor: Executor,
    /// Parser name, the path of errors not tied to a field.
    name: String,
    entry: FunctionRef,
    stream: Stream,
    state: State,
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

impl Invocation {
    pub(super) fn new(
        executor: Executor,
        name: &str,
        entry: FunctionRef,
        args: Vec<Value>,
    ) -> Self {
        Invocation {
            executor,
            name: name.to_owned(),
            entry,
            stream: Stream::new(),
            state: State::Pending(args),
        }
    }

    /// The invocation's input.
    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Result<ParseStatus, ParseError> {
        self.stream.append(chunk);
        self.run()
    }

    /// Signal end of input and wait for the result.
    pub fn finish(mut self) -> Result<Record, ParseError> {
        self.stream.freeze();
        match self.run()? {
            ParseStatus::Done(record) => Ok(record),
            ParseStatus::NeedMoreInput => Err(ParseError::new(
                ParseErrorKind::UnexpectedEndOfInput,
                self.name.as_str(),
                self.stream.len(),
                "parser still needs input after end of data",
            )),
        }
    }

    fn run(&mut self) -> Result<ParseStatus, ParseError> {
        let _guard = self.stream.enter(&self.name)?;
        let outcome = match std::mem::replace(&mut self.state, State::Pending(Vec::new())) {
            State::Pending(args) => self.executor.start(self.entry, args, &self.stream),
            State::Suspended(resumption) => self.executor.resume(resumption, &self.stream),
            State::Done(record) => {
                self.state = State::Done(record.clone());
                return Ok(ParseStatus::Done(record));
            }
            State::Failed(err) => {
                self.state = State::Failed(err.clone());
                return Err(err);
            }
        };
        let result = outcome.and_then(|outcome| match outcome {
            Outcome::Done { value, offset } => {
                tracing::debug!(offset, "parse complete");
                into_record(value, &self.name).map(ParseStatus::Done)
            }
            Outcome::NeedMoreInput(resumption) => {
                self.state = State::Suspended(resumption);
                Ok(ParseStatus::NeedMoreInput)
            }
        });
        match &result {
            Ok(ParseStatus::Done(record)) => self.state = State::Done(record.clone()),
            Ok(ParseStatus::NeedMoreInput) => {}
            Err(err) => self.state = State::Failed(err.clone()),
        }
        result
    }
}

/// A parse fed through writes, as when one unit's data is forwarded into
/// another parser.
#[derive(Debug)]
pub struct Sink {
    invocation: Invocation,
}

impl Sink {
    pub(super) fn new(invocation: Invocation) -> Self {
        Sink { invocation }
    }

    pub fn write(&mut self, data: &[u8]) -> Result<(), ParseError> {
        self.invocation.feed(data).map(drop)
    }

    /// Close the sink and return the parsed record.
    pub fn close(self) -> Result<Record, ParseError> {
        self.invocation.finish()
    }
}

pub(super) fn into_record(value: Value, path: &str) -> Result<Record, ParseError> {
    match value {
        Value::Record(record) => Ok(*record),
        other => Err(ParseError::new(
            ParseErrorKind::InvalidProgram,
            path,
            0,
            format!("parser returned {} instead of a record", other.type_name()),
        )),
    }
}
