//! Results of compiling a module.

use pac_codegen::{CodegenError, ParserModule};
use pac_rt::{LinkError, Runtime, RuntimeBuilder};

/// Everything generation produced for one module: the code of the units
/// that compiled, and a problem per unit that did not.
#[derive(Debug)]
pub struct CompileOutput {
    pub module: ParserModule,
    pub problems: Vec<CodegenError>,
    pub(crate) allow_partial: bool,
}

impl CompileOutput {
    pub fn success(&self) -> bool {
        self.problems.is_empty()
    }

    /// The generated module, unless generation reported problems. With
    /// [`CompileConfig::allow_partial`](crate::CompileConfig) the units that
    /// did compile are returned regardless.
    pub fn into_module(self) -> Result<ParserModule, CompileError> {
        if self.problems.is_empty() || self.allow_partial {
            Ok(self.module)
        } else {
            Err(CompileError::Codegen {
                module: self.module.name,
                problems: self.problems,
            })
        }
    }

    /// Link the generated module into `builder`, which supplies hook
    /// bodies and any other modules.
    pub fn link(self, builder: RuntimeBuilder) -> Result<Runtime, CompileError> {
        Ok(builder.module(self.into_module()?).build()?)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("module `{module}` failed to compile: {}", render(problems))]
    Codegen {
        module: String,
        problems: Vec<CodegenError>,
    },

    #[error(transparent)]
    Link(#[from] LinkError),
}

fn render(problems: &[CodegenError]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
