//! Driver for the pac parser generator.
//!
//! Runs the whole pipeline for a module of unit declarations:
//! units → grammars → lookahead decisions → parse functions, and links the
//! result with hook bodies into a [`pac_rt::Runtime`].

mod output;
mod pipeline;

use std::sync::Once;

pub use output::{CompileError, CompileOutput};
pub use pipeline::{compile, compile_with_grammars, CompileConfig};

pub use pac_codegen::{CodegenError, CodegenOptions, ParserModule};
pub use pac_rt::{
    HookContext, HookFlow, Invocation, LinkError, ParseError, ParseErrorKind, ParseStatus, Parser,
    Record, Runtime, RuntimeBuilder, Sink, Stream, Value,
};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call more than once. Only installs a subscriber when `RUST_LOG`
/// is set, e.g. `RUST_LOG=pac_rt=debug` for the parser debug log or
/// `RUST_LOG=pac_codegen=trace` for generation details.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
