//! Hook declarations.
//!
//! A hook is a named body of user logic. The compiler never sees the body
//! itself, only its symbol; bodies are linked by symbol when a runtime is
//! assembled.

use crate::Name;

/// What a hook is attached to within a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookItem {
    /// A field's value became available (or, for `foreach` hooks, one element
    /// of a container field was parsed).
    Field(Name),
    /// `%init`: after the record is allocated and variables initialised.
    Init,
    /// `%done`: after the last item, before the record is handed back.
    Done,
    /// `%error`: the parse of this unit is being unwound by an error.
    Error,
}

impl HookItem {
    /// Parse the item part of a hook path (`%init`, `%done`, `%error` or a
    /// field name).
    pub fn parse(text: &str, intern: impl FnOnce(&str) -> Name) -> Option<HookItem> {
        match text {
            "%init" => Some(HookItem::Init),
            "%done" => Some(HookItem::Done),
            "%error" => Some(HookItem::Error),
            "" => None,
            t if t.starts_with('%') => None,
            t => Some(HookItem::Field(intern(t))),
        }
    }
}

/// Two-level hook key: the unit and the item within it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HookKey {
    pub unit: Name,
    pub item: HookItem,
}

impl HookKey {
    pub fn new(unit: Name, item: HookItem) -> Self {
        HookKey { unit, item }
    }

    pub fn field(unit: Name, field: Name) -> Self {
        HookKey::new(unit, HookItem::Field(field))
    }
}

/// A hook declaration: body symbol, priority and `&foreach` flag.
///
/// Higher priorities run first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hook {
    pub symbol: Name,
    pub priority: i32,
    pub foreach: bool,
}

impl Hook {
    pub fn new(symbol: Name) -> Self {
        Hook {
            symbol,
            priority: 0,
            foreach: false,
        }
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn foreach(mut self) -> Self {
        self.foreach = true;
        self
    }
}

/// A unit-level hook item (`on %init`, `on %done`, `on <field>` ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GlobalHook {
    pub item: HookItem,
    pub hook: Hook,
}
