//! Parser state stack.
//!
//! One [`ParserState`] per unit whose parse function is being generated.
//! Generating a unit can require generating another (a child unit or a sink
//! target that has not been emitted yet), so states nest. The stack is an
//! explicit value passed through the builder.

use pac_ir::{Name, ProductionId, UnitLayout};
use rustc_hash::FxHashMap;

use crate::builder::IrBuilder;
use crate::error::CodegenError;
use crate::ir::{FuncId, MatcherId, VarId};

/// A resolved decision point: its matcher in the module plus the alternative
/// taken when nothing matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecisionRef {
    pub matcher: MatcherId,
    pub fallback: Option<usize>,
}

/// Generation state for one unit.
pub struct ParserState {
    pub unit: Name,
    /// The unit's name as written, for paths and function names.
    pub unit_name: &'static str,
    pub function: FuncId,
    pub layout: UnitLayout,
    /// Parameter name → the function parameter holding it.
    pub params: Vec<(Name, VarId)>,
    /// Sink items in declaration order; the index is the frame's sink number.
    pub sinks: Vec<Name>,
    pub decisions: FxHashMap<ProductionId, DecisionRef>,
    pub ir: IrBuilder,
    storing_disabled: u32,
}

impl ParserState {
    pub fn new(unit: Name, unit_name: &'static str, function: FuncId, layout: UnitLayout) -> Self {
        ParserState {
            unit,
            unit_name,
            function,
            layout,
            params: Vec::new(),
            sinks: Vec::new(),
            decisions: FxHashMap::default(),
            ir: IrBuilder::new(),
            storing_disabled: 0,
        }
    }

    /// Stop committing parsed values to the record. Nests.
    pub fn disable_storing_values(&mut self) {
        self.storing_disabled += 1;
    }

    pub fn enable_storing_values(&mut self) {
        debug_assert!(self.storing_disabled > 0, "unbalanced enable_storing_values");
        self.storing_disabled = self.storing_disabled.saturating_sub(1);
    }

    pub fn storing_values(&self) -> bool {
        self.storing_disabled == 0
    }

    pub fn param(&self, name: Name) -> Option<VarId> {
        self.params
            .iter()
            .find_map(|&(n, var)| (n == name).then_some(var))
    }

    pub fn sink_index(&self, name: Name) -> Option<u32> {
        self.sinks
            .iter()
            .position(|&s| s == name)
            .and_then(|i| u32::try_from(i).ok())
    }
}

#[derive(Default)]
pub struct ParserStateStack {
    states: Vec<ParserState>,
}

impl ParserStateStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, state: ParserState) {
        tracing::trace!(unit = state.unit_name, depth = self.states.len(), "push parser state");
        self.states.push(state);
    }

    pub fn pop(&mut self) -> Result<ParserState, CodegenError> {
        self.states.pop().ok_or(CodegenError::NoActiveParse)
    }

    pub fn current(&self) -> Result<&ParserState, CodegenError> {
        self.states.last().ok_or(CodegenError::NoActiveParse)
    }

    pub fn current_mut(&mut self) -> Result<&mut ParserState, CodegenError> {
        self.states.last_mut().ok_or(CodegenError::NoActiveParse)
    }

    /// IR builder of the current state.
    pub fn ir(&mut self) -> Result<&mut IrBuilder, CodegenError> {
        Ok(&mut self.current_mut()?.ir)
    }

    pub fn depth(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
