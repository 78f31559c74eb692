//! Compilation pipeline: units → grammars → decisions → parse functions.

use pac_codegen::{compile_grammars, CodegenOptions};
use pac_ir::{GrammarSet, Module, StringInterner};

use crate::output::CompileOutput;

/// Configuration for a compilation run.
#[derive(Clone, Debug, Default)]
pub struct CompileConfig {
    pub options: CodegenOptions,
    /// Keep the units that compiled when others failed.
    pub allow_partial: bool,
}

/// Compile every unit of `module`.
pub fn compile(module: &Module, interner: &StringInterner, config: &CompileConfig) -> CompileOutput {
    compile_with_grammars(module, GrammarSet::new(), interner, config)
}

/// Compile `module`, using the supplied grammars for the units they cover
/// and lowering the rest from their declarations.
pub fn compile_with_grammars(
    module: &Module,
    grammars: GrammarSet,
    interner: &StringInterner,
    config: &CompileConfig,
) -> CompileOutput {
    let name = interner.lookup(module.name);
    let _span = tracing::debug_span!("compile", module = name).entered();
    let (out, problems) = compile_grammars(module, grammars, interner, config.options);
    tracing::debug!(
        functions = out.functions.len(),
        parsers = out.parsers.len(),
        problems = problems.len(),
        "module compiled"
    );
    for problem in &problems {
        tracing::warn!(%problem, "unit not compiled");
    }
    CompileOutput {
        module: out,
        problems,
        allow_partial: config.allow_partial,
    }
}
