//! Decision tables.
//!
//! Every multi-alternative decision in a grammar (a `LookAhead`, a `Switch`
//! without discriminant, a `Loop` that exits on lookahead) gets one
//! [`Decision`]: a combined [`TokenMatcher`] over the leading patterns of all
//! alternatives, plus the alternative to take when nothing matches.

use pac_ir::{Grammar, GrammarSet, LoopExit, ProductionId, ProductionKind};
use rustc_hash::FxHashMap;

use crate::first::{FirstSet, FirstSets};
use crate::matcher::{InvalidPattern, TokenMatcher};

/// Why a decision's alternatives cannot be told apart.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AmbiguityReason {
    #[error("alternatives {first} and {second} both start with {pattern}")]
    IdenticalLiterals {
        first: usize,
        second: usize,
        pattern: String,
    },
    #[error("alternatives {first} and {second} can both be taken without a leading literal")]
    MultipleDefaults { first: usize, second: usize },
    #[error("alternative {index} does not start with a literal")]
    Unpredictable { index: usize },
    #[error("the repeated element can match empty input")]
    EmptyElement,
}

/// Alternatives indistinguishable even given unbounded input.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{production}: ambiguous grammar: {reason}")]
pub struct GrammarAmbiguity {
    /// Symbol of the decision production.
    pub production: String,
    pub reason: AmbiguityReason,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LookaheadError {
    #[error(transparent)]
    Ambiguity(#[from] GrammarAmbiguity),

    #[error("{production}: {source}")]
    InvalidPattern {
        production: String,
        source: InvalidPattern,
    },
}

/// One resolved decision point.
#[derive(Clone, Debug)]
pub struct Decision {
    pub production: ProductionId,
    pub matcher: TokenMatcher,
    /// Alternative taken when no candidate matches. `None` means the decision
    /// fails (for a loop: the loop exits).
    pub fallback: Option<usize>,
}

/// Decisions of one grammar, keyed by production.
#[derive(Clone, Debug, Default)]
pub struct DecisionTable {
    decisions: FxHashMap<ProductionId, Decision>,
}

impl DecisionTable {
    pub fn get(&self, production: ProductionId) -> Option<&Decision> {
        self.decisions.get(&production)
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    /// Decisions in production order.
    pub fn iter(&self) -> impl Iterator<Item = &Decision> {
        let mut all: Vec<_> = self.decisions.values().collect();
        all.sort_by_key(|d| d.production);
        all.into_iter()
    }
}

/// Resolve every decision point of `grammar`.
///
/// `grammars` supplies the child grammars FIRST sets look through.
pub fn resolve(grammars: &GrammarSet, grammar: &Grammar) -> Result<DecisionTable, LookaheadError> {
    let mut firsts = FirstSets::new(grammars);
    let mut table = DecisionTable::default();

    for (id, production) in grammar.productions() {
        let decision = match &production.kind {
            ProductionKind::LookAhead { alternatives } => {
                let sets: Vec<_> = alternatives
                    .iter()
                    .map(|&alt| firsts.first(grammar, alt))
                    .collect();
                decide(id, &production.symbol, &sets, None)?
            }
            ProductionKind::Switch {
                discriminant: None,
                cases,
                default,
            } => {
                let sets: Vec<_> = cases
                    .iter()
                    .map(|arm| firsts.first(grammar, arm.body))
                    .collect();
                let default = default.map(|_| sets.len());
                decide(id, &production.symbol, &sets, default)?
            }
            ProductionKind::Loop {
                body,
                exit: LoopExit::Lookahead,
            } => {
                let element = firsts.first(grammar, *body);
                if element.nullable {
                    return Err(ambiguity(&production.symbol, AmbiguityReason::EmptyElement));
                }
                decide(id, &production.symbol, &[element], None)?
            }
            _ => continue,
        };
        tracing::trace!(
            production = %production.symbol,
            candidates = decision.matcher.len(),
            fallback = ?decision.fallback,
            "resolved decision"
        );
        table.decisions.insert(id, decision);
    }
    Ok(table)
}

fn ambiguity(symbol: &str, reason: AmbiguityReason) -> LookaheadError {
    LookaheadError::Ambiguity(GrammarAmbiguity {
        production: symbol.to_owned(),
        reason,
    })
}

/// Check the alternatives and build the matcher.
///
/// `explicit_default` is the index of a default alternative that takes no
/// part in matching (a switch's default case).
fn decide(
    production: ProductionId,
    symbol: &str,
    sets: &[FirstSet],
    explicit_default: Option<usize>,
) -> Result<Decision, LookaheadError> {
    let mut fallback = explicit_default;
    let mut candidates = Vec::new();
    let mut owner = FxHashMap::default();

    for (index, set) in sets.iter().enumerate() {
        if set.opaque {
            return Err(ambiguity(symbol, AmbiguityReason::Unpredictable { index }));
        }
        if set.nullable {
            if let Some(first) = fallback {
                return Err(ambiguity(
                    symbol,
                    AmbiguityReason::MultipleDefaults {
                        first: first.min(index),
                        second: first.max(index),
                    },
                ));
            }
            fallback = Some(index);
        } else if set.patterns.is_empty() {
            return Err(ambiguity(symbol, AmbiguityReason::Unpredictable { index }));
        }
        for pattern in &set.patterns {
            if let Some(&first) = owner.get(pattern) {
                return Err(ambiguity(
                    symbol,
                    AmbiguityReason::IdenticalLiterals {
                        first,
                        second: index,
                        pattern: pattern.to_string(),
                    },
                ));
            }
            owner.insert(pattern.clone(), index);
            candidates.push((index, pattern.clone()));
        }
    }

    let matcher =
        TokenMatcher::new(candidates).map_err(|source| LookaheadError::InvalidPattern {
            production: symbol.to_owned(),
            source,
        })?;
    Ok(Decision {
        production,
        matcher,
        fallback,
    })
}
