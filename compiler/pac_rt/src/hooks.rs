//! Hook bodies and what they see when they run.

use std::fmt;
use std::sync::Arc;

use crate::stream::Stream;
use crate::value::{Record, Value};

/// What a `foreach` hook asks of the loop it runs in. Ignored elsewhere.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HookFlow {
    #[default]
    Continue,
    Stop,
}

/// The environment of one hook call.
pub struct HookContext<'a> {
    pub(crate) value: Option<&'a Value>,
    pub(crate) record: Option<&'a mut Record>,
    pub(crate) stream: &'a Stream,
    pub(crate) offset: usize,
}

impl HookContext<'_> {
    /// The value just parsed (`$$`): the field value, or the element for
    /// `foreach` hooks. `None` for unit-level hooks.
    pub fn value(&self) -> Option<&Value> {
        self.value
    }

    /// The record under construction (`self`).
    pub fn record(&self) -> Option<&Record> {
        self.record.as_deref()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.record.as_deref().and_then(|r| r.get(field))
    }

    /// Set a field of the record; `false` if there is no such field.
    pub fn set(&mut self, field: &str, value: Value) -> bool {
        self.record.as_deref_mut().is_some_and(|r| r.set(field, value))
    }

    /// The input being parsed.
    pub fn stream(&self) -> &Stream {
        self.stream
    }

    /// Cursor offset at the time of the call.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl fmt::Debug for HookContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("value", &self.value)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

/// A hook body, linked to generated code by symbol.
pub type HookBody = Arc<dyn Fn(&mut HookContext<'_>) -> HookFlow + Send + Sync>;
