//! Stack growth for recursive walks over production trees.
//!
//! Grammar lowering, FIRST-set computation and parser emission all recurse
//! once per nesting level of the grammar. Deeply nested switch/sequence
//! chains from machine-generated grammars can exceed the default thread
//! stack, so every recursive step goes through [`ensure_sufficient_stack`].

/// Grow the stack when less than this much remains.
const RED_ZONE: usize = 64 * 1024;

/// Size of each new stack segment.
const SEGMENT: usize = 1024 * 1024;

/// Run `f`, first growing the stack if it is close to exhaustion.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, SEGMENT, f)
}

/// WASM manages its own stack.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
