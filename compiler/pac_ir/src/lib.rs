//! Grammar-side data model for the pac parser generator.
//!
//! This crate holds everything the generator consumes and nothing it emits:
//!
//! - [`Name`] / [`StringInterner`]: interned identifiers
//! - [`UnitType`], [`Field`], [`Item`]: the validated unit descriptions the
//!   front end hands over
//! - [`Expr`]: the small expression language of conditions, counts and lengths
//! - [`Hook`], [`HookKey`]: hook declarations
//! - [`grammar`]: the production model and the unit → grammar lowering

pub mod expr;
pub mod grammar;
pub mod hook;
mod interner;
pub mod module;
mod name;
pub mod stack;
pub mod types;
pub mod unit;

pub use expr::{BinaryOp, Constant, Expr, UnaryOp};
pub use grammar::{
    Grammar, GrammarBuilder, GrammarError, GrammarSet, LiteralId, LiteralValue, LoopExit,
    Pattern, Production, ProductionId, ProductionKind, SwitchArm,
};
pub use hook::{GlobalHook, Hook, HookItem, HookKey};
pub use interner::StringInterner;
pub use module::{Module, ModuleHook};
pub use name::Name;
pub use types::{AtomicType, ByteOrder, BytesLength, ParseType};
pub use unit::{
    Ctor, Field, FieldKind, Item, Property, Repeat, SinkItem, SwitchCase, SwitchField,
    UnitLayout, UnitParam, UnitType, Variable,
};
