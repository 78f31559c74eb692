//! FIRST sets over the production model.

use pac_ir::stack::ensure_sufficient_stack;
use pac_ir::{Grammar, GrammarSet, LiteralValue, Name, Pattern, ProductionId, ProductionKind};
use rustc_hash::{FxHashMap, FxHashSet};

/// The patterns input can start with when a production is entered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FirstSet {
    /// Leading literal patterns, in declaration order, without duplicates.
    pub patterns: Vec<Pattern>,
    /// The production can match zero bytes.
    pub nullable: bool,
    /// Some path starts with a value that no literal predicts (a variable, or
    /// a unit reached again while its own FIRST set is being computed).
    pub opaque: bool,
}

impl FirstSet {
    fn epsilon() -> Self {
        FirstSet {
            nullable: true,
            ..FirstSet::default()
        }
    }

    fn opaque() -> Self {
        FirstSet {
            opaque: true,
            ..FirstSet::default()
        }
    }

    fn literal(pattern: Pattern) -> Self {
        FirstSet {
            patterns: vec![pattern],
            ..FirstSet::default()
        }
    }

    /// Union of patterns and opacity; nullability is the caller's business.
    fn absorb(&mut self, other: FirstSet) {
        for p in other.patterns {
            if !self.patterns.contains(&p) {
                self.patterns.push(p);
            }
        }
        self.opaque |= other.opaque;
    }

    /// Union of alternatives: nullable if any alternative is.
    fn union(sets: impl IntoIterator<Item = FirstSet>) -> Self {
        let mut out = FirstSet::default();
        for set in sets {
            out.nullable |= set.nullable;
            out.absorb(set);
        }
        out
    }
}

/// FIRST-set computation across the grammars of a [`GrammarSet`].
///
/// Results for whole units are cached; child grammars are looked through.
pub struct FirstSets<'a> {
    grammars: &'a GrammarSet,
    units: FxHashMap<Name, FirstSet>,
    visiting: FxHashSet<Name>,
}

impl<'a> FirstSets<'a> {
    pub fn new(grammars: &'a GrammarSet) -> Self {
        FirstSets {
            grammars,
            units: FxHashMap::default(),
            visiting: FxHashSet::default(),
        }
    }

    pub fn first(&mut self, grammar: &Grammar, id: ProductionId) -> FirstSet {
        ensure_sufficient_stack(|| self.first_inner(grammar, id))
    }

    fn first_inner(&mut self, grammar: &Grammar, id: ProductionId) -> FirstSet {
        match &grammar.production(id).kind {
            ProductionKind::Literal { value, .. } => match value {
                LiteralValue::Bytes(b) if b.is_empty() => FirstSet::epsilon(),
                value => FirstSet::literal(value.pattern()),
            },
            ProductionKind::Variable { .. } => FirstSet::opaque(),
            ProductionKind::Sequence(items) => {
                let mut out = FirstSet::default();
                for &item in items {
                    let first = self.first(grammar, item);
                    let nullable = first.nullable;
                    out.absorb(first);
                    if !nullable {
                        return out;
                    }
                }
                out.nullable = true;
                out
            }
            ProductionKind::Switch { cases, default, .. } => {
                let bodies: Vec<_> = cases
                    .iter()
                    .map(|arm| arm.body)
                    .chain(default.iter().copied())
                    .collect();
                let sets: Vec<_> = bodies.into_iter().map(|b| self.first(grammar, b)).collect();
                FirstSet::union(sets)
            }
            ProductionKind::LookAhead { alternatives } => {
                let sets: Vec<_> = alternatives
                    .iter()
                    .map(|&alt| self.first(grammar, alt))
                    .collect();
                FirstSet::union(sets)
            }
            ProductionKind::While { body, .. }
            | ProductionKind::Loop { body, .. }
            | ProductionKind::Counter { body, .. } => {
                let mut out = self.first(grammar, *body);
                out.nullable = true;
                out
            }
            ProductionKind::Boolean {
                then, otherwise, ..
            } => {
                let then = self.first(grammar, *then);
                match otherwise {
                    Some(other) => {
                        let other = self.first(grammar, *other);
                        FirstSet::union([then, other])
                    }
                    None => FirstSet::union([then, FirstSet::epsilon()]),
                }
            }
            ProductionKind::Epsilon => FirstSet::epsilon(),
            ProductionKind::ChildGrammar { unit, .. } => self.unit_first(*unit),
        }
    }

    /// FIRST set of a whole unit.
    pub fn unit_first(&mut self, unit: Name) -> FirstSet {
        if let Some(cached) = self.units.get(&unit) {
            return cached.clone();
        }
        let grammars = self.grammars;
        let Some(grammar) = grammars.get(unit) else {
            return FirstSet::opaque();
        };
        if !self.visiting.insert(unit) {
            return FirstSet::opaque();
        }
        let first = self.first(grammar, grammar.root());
        self.visiting.remove(&unit);
        self.units.insert(unit, first.clone());
        first
    }
}
