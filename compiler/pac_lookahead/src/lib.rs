//! Lookahead and token resolution for pac grammars.
//!
//! Static analysis over the production model: FIRST sets and nullability
//! ([`first`]), one [`Decision`] per multi-alternative production
//! ([`resolve`]) and the combined [`TokenMatcher`] that the generated parser
//! runs at each decision point.

pub mod first;
mod matcher;
mod resolver;

pub use first::{FirstSet, FirstSets};
pub use matcher::{InvalidPattern, MatchResult, TokenMatcher};
pub use resolver::{
    resolve, AmbiguityReason, Decision, DecisionTable, GrammarAmbiguity, LookaheadError,
};
