//! Parser builder for pac.
//!
//! Turns grammars into suspendable parse functions:
//!
//! - [`ir`]: the basic-block target the generated parsers are written in
//! - [`IrBuilder`]: block-by-block function construction
//! - [`ParserStateStack`]: per-unit generation state
//! - [`HookRegistry`]: hooks keyed by unit and item, local or external
//! - [`compile_module`]: the parser builder itself, producing a
//!   [`ParserModule`]

mod builder;
mod error;
mod hooks;
pub mod ir;
mod module;
mod options;
mod parser_builder;
mod state;

pub use builder::IrBuilder;
pub use error::CodegenError;
pub use hooks::{item_text, HookRegistry, HookScope};
pub use module::{
    ExternalHook, HookRef, HookSite, ParamInfo, ParserDefinition, ParserModule, RecordLayout,
};
pub use options::CodegenOptions;
pub use parser_builder::{compile_grammars, compile_module};
pub use state::{DecisionRef, ParserState, ParserStateStack};
