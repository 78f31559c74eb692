//! The production model.
//!
//! A [`Grammar`] is the per-unit arena of [`Production`]s the parser builder
//! walks. It is built once (by [`GrammarBuilder`], usually through
//! [`Grammar::from_unit`]) and read-only afterwards. The tree is acyclic;
//! references between units go through [`ProductionKind::ChildGrammar`] and
//! are resolved against a [`GrammarSet`].

mod lower;

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::expr::{Constant, Expr};
use crate::stack::ensure_sufficient_stack;
use crate::types::{AtomicType, ByteOrder, ParseType};
use crate::Name;

pub use lower::GrammarError;

/// Index of a production within its grammar.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductionId(u32);

impl ProductionId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of a literal pattern within a grammar. Equal patterns share one
/// id.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LiteralId(u32);

impl LiteralId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A pattern a token matcher can look for at the cursor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Pattern {
    Bytes(Vec<u8>),
    /// Anchored regular expression.
    RegExp(String),
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Bytes(bytes) => {
                f.write_str("b\"")?;
                for &b in bytes {
                    if b.is_ascii_graphic() && b != b'"' && b != b'\\' {
                        write!(f, "{}", char::from(b))?;
                    } else {
                        write!(f, "\\x{b:02x}")?;
                    }
                }
                f.write_str("\"")
            }
            Pattern::RegExp(re) => write!(f, "/{re}/"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LiteralValue {
    Bytes(Vec<u8>),
    RegExp(String),
    /// An integer constant. `encoded` is its wire form in `order` and is the
    /// literal's pattern.
    Integer {
        value: Constant,
        ty: AtomicType,
        order: ByteOrder,
        encoded: Vec<u8>,
    },
}

impl LiteralValue {
    pub fn pattern(&self) -> Pattern {
        match self {
            LiteralValue::Bytes(b) => Pattern::Bytes(b.clone()),
            LiteralValue::RegExp(re) => Pattern::RegExp(re.clone()),
            LiteralValue::Integer { encoded, .. } => Pattern::Bytes(encoded.clone()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopExit {
    /// Stop once the input is exhausted and no more will arrive.
    EndOfData,
    /// Stop when the next token does not start an element.
    Lookahead,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchArm {
    pub values: SmallVec<[Constant; 2]>,
    pub body: ProductionId,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProductionKind {
    Literal {
        id: LiteralId,
        value: LiteralValue,
    },
    Variable {
        ty: ParseType,
        byte_order: ByteOrder,
        /// Sink the parsed bytes are forwarded to.
        sink: Option<Name>,
    },
    Sequence(Vec<ProductionId>),
    /// Without a discriminant the arm is chosen by lookahead.
    Switch {
        discriminant: Option<Expr>,
        cases: Vec<SwitchArm>,
        default: Option<ProductionId>,
    },
    LookAhead {
        alternatives: Vec<ProductionId>,
    },
    While {
        cond: Expr,
        body: ProductionId,
    },
    Loop {
        body: ProductionId,
        exit: LoopExit,
    },
    Counter {
        count: Expr,
        body: ProductionId,
    },
    Boolean {
        cond: Expr,
        then: ProductionId,
        otherwise: Option<ProductionId>,
    },
    Epsilon,
    ChildGrammar {
        unit: Name,
        args: Vec<Expr>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Production {
    pub kind: ProductionKind,
    /// Human-readable name, used in generated symbols and diagnostics.
    pub symbol: String,
    /// Record slot this production's value is committed to.
    pub field: Option<Name>,
    /// `&convert` on a terminal: the committed value is this expression
    /// with `$$` bound to the parsed one.
    pub filter: Option<Expr>,
}

impl Production {
    /// Terminals read directly from the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            ProductionKind::Literal { .. } | ProductionKind::Variable { .. }
        )
    }

    /// Repetitions: the production's field holds a list of element values.
    pub fn is_container(&self) -> bool {
        matches!(
            self.kind,
            ProductionKind::While { .. }
                | ProductionKind::Loop { .. }
                | ProductionKind::Counter { .. }
        )
    }
}

/// One unit's productions.
#[derive(Clone, Debug, PartialEq)]
pub struct Grammar {
    unit: Name,
    name: String,
    root: ProductionId,
    productions: Vec<Production>,
    literals: Vec<Pattern>,
}

impl Grammar {
    pub fn unit(&self) -> Name {
        self.unit
    }

    /// Display name of the unit.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> ProductionId {
        self.root
    }

    pub fn production(&self, id: ProductionId) -> &Production {
        &self.productions[id.index()]
    }

    pub fn productions(&self) -> impl Iterator<Item = (ProductionId, &Production)> {
        self.productions
            .iter()
            .enumerate()
            .map(|(i, p)| (ProductionId(index_u32(i)), p))
    }

    pub fn literal(&self, id: LiteralId) -> &Pattern {
        &self.literals[id.index()]
    }

    pub fn literals(&self) -> &[Pattern] {
        &self.literals
    }

    /// Direct children of a production, in declaration order.
    pub fn children(&self, id: ProductionId) -> SmallVec<[ProductionId; 4]> {
        match &self.production(id).kind {
            ProductionKind::Sequence(items) => items.iter().copied().collect(),
            ProductionKind::Switch { cases, default, .. } => cases
                .iter()
                .map(|arm| arm.body)
                .chain(default.iter().copied())
                .collect(),
            ProductionKind::LookAhead { alternatives } => alternatives.iter().copied().collect(),
            ProductionKind::While { body, .. }
            | ProductionKind::Loop { body, .. }
            | ProductionKind::Counter { body, .. } => SmallVec::from_elem(*body, 1),
            ProductionKind::Boolean {
                then, otherwise, ..
            } => std::iter::once(*then).chain(otherwise.iter().copied()).collect(),
            ProductionKind::Literal { .. }
            | ProductionKind::Variable { .. }
            | ProductionKind::Epsilon
            | ProductionKind::ChildGrammar { .. } => SmallVec::new(),
        }
    }

    /// Every literal reachable from `id` within this grammar.
    ///
    /// Does not descend into child grammars.
    pub fn literals_reachable(&self, id: ProductionId) -> Vec<LiteralId> {
        let mut out = Vec::new();
        self.collect_literals(id, &mut out);
        out
    }

    fn collect_literals(&self, id: ProductionId, out: &mut Vec<LiteralId>) {
        ensure_sufficient_stack(|| {
            if let ProductionKind::Literal { id: lit, .. } = self.production(id).kind {
                if !out.contains(&lit) {
                    out.push(lit);
                }
            }
            for child in self.children(id) {
                self.collect_literals(child, out);
            }
        });
    }

    /// Whether `id` can match zero bytes.
    ///
    /// Child grammars are assumed to consume input; use
    /// [`GrammarSet::is_nullable`] to look through them.
    pub fn is_nullable(&self, id: ProductionId) -> bool {
        self.nullable_with(id, &mut |_, _| false)
    }

    fn nullable_with(
        &self,
        id: ProductionId,
        child: &mut dyn FnMut(Name, &[Expr]) -> bool,
    ) -> bool {
        ensure_sufficient_stack(|| match &self.production(id).kind {
            ProductionKind::Literal { value, .. } => match value {
                LiteralValue::Bytes(b) => b.is_empty(),
                LiteralValue::RegExp(_) | LiteralValue::Integer { .. } => false,
            },
            ProductionKind::Variable { .. } => false,
            ProductionKind::Sequence(items) => items.iter().all(|&p| self.nullable_with(p, child)),
            ProductionKind::Switch { cases, default, .. } => cases
                .iter()
                .map(|arm| arm.body)
                .chain(default.iter().copied())
                .any(|p| self.nullable_with(p, child)),
            ProductionKind::LookAhead { alternatives } => {
                alternatives.iter().any(|&p| self.nullable_with(p, child))
            }
            ProductionKind::While { .. }
            | ProductionKind::Loop { .. }
            | ProductionKind::Counter { .. }
            | ProductionKind::Epsilon => true,
            ProductionKind::Boolean {
                then, otherwise, ..
            } => match otherwise {
                None => true,
                Some(other) => self.nullable_with(*then, child) || self.nullable_with(*other, child),
            },
            ProductionKind::ChildGrammar { unit, args } => child(*unit, args),
        })
    }
}

fn index_u32(i: usize) -> u32 {
    u32::try_from(i).unwrap_or_else(|_| panic!("grammar exceeded u32::MAX productions"))
}

/// Incremental construction of a [`Grammar`].
pub struct GrammarBuilder {
    unit: Name,
    name: String,
    productions: Vec<Production>,
    literals: Vec<Pattern>,
    literal_ids: FxHashMap<Pattern, LiteralId>,
}

impl GrammarBuilder {
    pub fn new(unit: Name, name: impl Into<String>) -> Self {
        GrammarBuilder {
            unit,
            name: name.into(),
            productions: Vec::new(),
            literals: Vec::new(),
            literal_ids: FxHashMap::default(),
        }
    }

    pub fn add(
        &mut self,
        kind: ProductionKind,
        symbol: impl Into<String>,
        field: Option<Name>,
    ) -> ProductionId {
        let id = ProductionId(index_u32(self.productions.len()));
        self.productions.push(Production {
            kind,
            symbol: symbol.into(),
            field,
            filter: None,
        });
        id
    }

    pub fn is_terminal(&self, id: ProductionId) -> bool {
        self.productions[id.index()].is_terminal()
    }

    /// Attach a `&convert` filter to a terminal.
    pub fn set_filter(&mut self, id: ProductionId, filter: Expr) {
        self.productions[id.index()].filter = Some(filter);
    }

    /// Add a literal production, interning its pattern.
    pub fn literal(
        &mut self,
        value: LiteralValue,
        symbol: impl Into<String>,
        field: Option<Name>,
    ) -> ProductionId {
        let id = self.literal_id(value.pattern());
        self.add(ProductionKind::Literal { id, value }, symbol, field)
    }

    fn literal_id(&mut self, pattern: Pattern) -> LiteralId {
        if let Some(&id) = self.literal_ids.get(&pattern) {
            return id;
        }
        let id = LiteralId(index_u32(self.literals.len()));
        self.literals.push(pattern.clone());
        self.literal_ids.insert(pattern, id);
        id
    }

    pub fn finish(self, root: ProductionId) -> Grammar {
        Grammar {
            unit: self.unit,
            name: self.name,
            root,
            productions: self.productions,
            literals: self.literals,
        }
    }
}

/// The grammars of every unit visible to one compilation.
#[derive(Clone, Debug, Default)]
pub struct GrammarSet {
    grammars: FxHashMap<Name, Grammar>,
}

impl GrammarSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, grammar: Grammar) {
        self.grammars.insert(grammar.unit(), grammar);
    }

    pub fn get(&self, unit: Name) -> Option<&Grammar> {
        self.grammars.get(&unit)
    }

    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }

    /// Nullability looking through child grammars.
    ///
    /// A unit reached again while its own nullability is being decided is
    /// taken to consume input; unknown units likewise.
    pub fn is_nullable(&self, unit: Name, id: ProductionId) -> bool {
        let mut visiting = FxHashSet::default();
        self.nullable_in(unit, id, &mut visiting)
    }

    fn nullable_in(&self, unit: Name, id: ProductionId, visiting: &mut FxHashSet<Name>) -> bool {
        let Some(grammar) = self.get(unit) else {
            return false;
        };
        if !visiting.insert(unit) {
            return false;
        }
        let result = grammar.nullable_with(id, &mut |child, _| {
            self.get(child)
                .is_some_and(|g| self.nullable_in(child, g.root(), visiting))
        });
        visiting.remove(&unit);
        result
    }
}
