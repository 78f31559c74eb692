//! Reference runtime for generated parsers.
//!
//! Links the modules produced by `pac_codegen` with host-supplied hook
//! bodies and runs their parse functions over incrementally arriving input.
//!
//! ```text
//! let runtime = Runtime::builder()
//!     .module(module)
//!     .hook("count_payload", |ctx| { ...; HookFlow::Continue })
//!     .build()?;
//! let mut parse = runtime.parser("Proto::Header")?.invoke()?;
//! parse.feed(&first_chunk)?;   // NeedMoreInput
//! parse.feed(&second_chunk)?;  // Done(record)
//! ```

mod error;
mod exec;
mod hooks;
mod program;
mod runtime;
mod stream;
mod value;

pub use error::{LinkError, ParseError, ParseErrorKind};
pub use exec::{Executor, Outcome, Resumption};
pub use hooks::{HookBody, HookContext, HookFlow};
pub use program::FunctionRef;
pub use runtime::{Invocation, ParseStatus, Parser, Runtime, RuntimeBuilder, Sink};
pub use stream::Stream;
pub use value::{Record, Value};
