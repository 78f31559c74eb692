//! Assembling a runtime from generated modules and hook bodies.

mod invocation;
mod parser;

use std::sync::Arc;

use rustc_hash::FxHashMap;

use pac_codegen::{ParserDefinition, ParserModule};

use crate::error::LinkError;
use crate::exec::Executor;
use crate::hooks::{HookBody, HookContext, HookFlow};
use crate::program::Program;

pub use invocation::{Invocation, ParseStatus, Sink};
pub use parser::Parser;

/// Collects modules and hook bodies; [`RuntimeBuilder::build`] links them.
#[derive(Default)]
pub struct RuntimeBuilder {
    modules: Vec<ParserModule>,
    hooks: FxHashMap<String, HookBody>,
}

impl RuntimeBuilder {
    #[must_use]
    pub fn module(mut self, module: ParserModule) -> Self {
        self.modules.push(module);
        self
    }

    /// Provide the body for hook `symbol`. A later body replaces an earlier.
    #[must_use]
    pub fn hook<F>(mut self, symbol: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut HookContext<'_>) -> HookFlow + Send + Sync + 'static,
    {
        self.hooks.insert(symbol.into(), Arc::new(body));
        self
    }

    pub fn build(self) -> Result<Runtime, LinkError> {
        let program = Program::link(self.modules, &self.hooks)?;
        tracing::debug!(
            modules = program.modules.len(),
            parsers = program.parsers().count(),
            "runtime linked"
        );
        Ok(Runtime {
            program: Arc::new(program),
        })
    }
}

/// Linked generated code. Cheap to clone and shareable across threads.
#[derive(Clone, Debug)]
pub struct Runtime {
    program: Arc<Program>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// Look up an exported parser by `Module::Unit` name.
    pub fn parser(&self, name: &str) -> Result<Parser, LinkError> {
        let (module, definition) =
            self.program
                .find_parser(name)
                .ok_or_else(|| LinkError::UnknownParser {
                    name: name.to_owned(),
                })?;
        Ok(Parser::new(self.program.clone(), module, definition.clone()))
    }

    /// Low-level access: drive parse functions directly.
    pub fn executor(&self) -> Executor {
        Executor::new(self.program.clone())
    }

    /// Every exported parser.
    pub fn parsers(&self) -> impl Iterator<Item = &ParserDefinition> {
        self.program.parsers()
    }
}
