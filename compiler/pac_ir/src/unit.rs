//! Unit types: the record types grammars parse into.

use crate::expr::{Constant, Expr};
use crate::hook::{GlobalHook, Hook, HookItem};
use crate::types::{AtomicType, ByteOrder, BytesLength};
use crate::Name;

/// A unit parameter, bound by the parent (`Unit(args)`) or by the host.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitParam {
    pub name: Name,
    /// Value used by the sink wrapper and by hosts that do not pass one.
    pub default: Option<Constant>,
}

/// Unit metadata and defaults.
#[derive(Clone, Debug, PartialEq)]
pub enum Property {
    /// `%byteorder`: default for every multi-byte field of the unit.
    ByteOrder(ByteOrder),
    /// `%description`: catalog description.
    Description(String),
    /// `%mimetype`: catalog MIME type, may be repeated.
    MimeType(String),
}

/// A unit-level variable: a record slot not parsed from input.
#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    pub name: Name,
    pub default: Option<Expr>,
}

/// A named sink feeding a sub-parser of `unit`.
#[derive(Clone, Debug, PartialEq)]
pub struct SinkItem {
    pub name: Name,
    pub unit: Name,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    Field(Field),
    Variable(Variable),
    Property(Property),
    GlobalHook(GlobalHook),
    Sink(SinkItem),
}

/// How a container field repeats its element.
#[derive(Clone, Debug, PartialEq)]
pub enum Repeat {
    /// `&count=<expr>`: exactly this many elements.
    Count(Expr),
    /// `&while=<expr>`: keep parsing while the condition holds.
    While(Expr),
    /// Parse elements until the end of input.
    UntilEod,
    /// Parse elements while the next token starts one.
    Lookahead,
}

/// Constructor-valued fields.
#[derive(Clone, Debug, PartialEq)]
pub enum Ctor {
    /// Fixed byte string; the field fails unless the input matches.
    Bytes(Vec<u8>),
    /// Anchored regular expression; the field's value is the matched bytes.
    RegExp(String),
    /// Byte blob with a length policy.
    Blob(BytesLength),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchCase {
    pub values: Vec<Constant>,
    pub fields: Vec<Field>,
}

/// A variant field. Without a discriminant the case is chosen by lookahead
/// on the leading literals of each case.
#[derive(Clone, Debug, PartialEq)]
pub struct SwitchField {
    pub discriminant: Option<Expr>,
    pub cases: Vec<SwitchCase>,
    pub default: Option<Vec<Field>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldKind {
    /// Expected value; validated, never computed. Integer constants need a
    /// type to fix their width.
    Constant {
        value: Constant,
        ty: Option<AtomicType>,
    },
    Ctor(Ctor),
    AtomicType(AtomicType),
    /// Nested sub-unit instance.
    Unit { unit: Name, args: Vec<Expr> },
    Switch(SwitchField),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    /// Anonymous fields are parsed but have no record slot.
    pub name: Option<Name>,
    pub kind: FieldKind,
    pub byte_order: Option<ByteOrder>,
    pub condition: Option<Expr>,
    pub repeat: Option<Repeat>,
    pub sink: Option<Name>,
    /// `&convert`: replaces the parsed value before it is committed. `$$`
    /// in the expression is the parsed value.
    pub convert: Option<Expr>,
    pub hooks: Vec<Hook>,
}

impl Field {
    pub fn new(name: Option<Name>, kind: FieldKind) -> Self {
        Field {
            name,
            kind,
            byte_order: None,
            condition: None,
            repeat: None,
            sink: None,
            convert: None,
            hooks: Vec::new(),
        }
    }

    pub fn named(name: Name, kind: FieldKind) -> Self {
        Field::new(Some(name), kind)
    }

    pub fn anonymous(kind: FieldKind) -> Self {
        Field::new(None, kind)
    }

    #[must_use]
    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = Some(order);
        self
    }

    #[must_use]
    pub fn condition(mut self, cond: Expr) -> Self {
        self.condition = Some(cond);
        self
    }

    #[must_use]
    pub fn repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = Some(repeat);
        self
    }

    #[must_use]
    pub fn sink(mut self, sink: Name) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn convert(mut self, filter: Expr) -> Self {
        self.convert = Some(filter);
        self
    }

    #[must_use]
    pub fn hook(mut self, hook: Hook) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Names of this field and, for switches, of every case field.
    fn collect_names(&self, out: &mut Vec<Name>) {
        if let Some(name) = self.name {
            push_unique(out, name);
        }
        if let FieldKind::Switch(switch) = &self.kind {
            let case_fields = switch.cases.iter().flat_map(|c| c.fields.iter());
            for f in case_fields.chain(switch.default.iter().flatten()) {
                f.collect_names(out);
            }
        }
    }

    /// This field and every field nested in its switch cases, depth first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Field)) {
        visit(self);
        if let FieldKind::Switch(switch) = &self.kind {
            let case_fields = switch.cases.iter().flat_map(|c| c.fields.iter());
            for f in case_fields.chain(switch.default.iter().flatten()) {
                f.walk(visit);
            }
        }
    }
}

fn push_unique(out: &mut Vec<Name>, name: Name) {
    if !out.contains(&name) {
        out.push(name);
    }
}

/// Record slots of a unit, in declaration order.
///
/// Named fields (including fields declared inside switch cases, which share
/// a slot when names repeat across cases), variables and sinks each get one
/// slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitLayout {
    pub unit: Name,
    pub slots: Vec<Name>,
}

impl UnitLayout {
    pub fn slot(&self, name: Name) -> Option<u32> {
        self.slots
            .iter()
            .position(|&n| n == name)
            .and_then(|i| u32::try_from(i).ok())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnitType {
    pub name: Name,
    pub params: Vec<UnitParam>,
    pub items: Vec<Item>,
    /// Exported units get host and sink wrappers and a catalog entry.
    pub exported: bool,
    /// Sinkable units may be connected to sinks.
    pub sinkable: bool,
}

impl UnitType {
    pub fn new(name: Name) -> Self {
        UnitType {
            name,
            params: Vec::new(),
            items: Vec::new(),
            exported: false,
            sinkable: false,
        }
    }

    #[must_use]
    pub fn param(mut self, name: Name, default: Option<Constant>) -> Self {
        self.params.push(UnitParam { name, default });
        self
    }

    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.items.push(Item::Field(field));
        self
    }

    #[must_use]
    pub fn variable(mut self, name: Name, default: Option<Expr>) -> Self {
        self.items.push(Item::Variable(Variable { name, default }));
        self
    }

    #[must_use]
    pub fn property(mut self, property: Property) -> Self {
        self.items.push(Item::Property(property));
        self
    }

    #[must_use]
    pub fn hook(mut self, item: HookItem, hook: Hook) -> Self {
        self.items.push(Item::GlobalHook(GlobalHook { item, hook }));
        self
    }

    #[must_use]
    pub fn sink(mut self, name: Name, unit: Name) -> Self {
        self.items.push(Item::Sink(SinkItem { name, unit }));
        self
    }

    #[must_use]
    pub fn exported(mut self) -> Self {
        self.exported = true;
        self
    }

    #[must_use]
    pub fn sinkable(mut self) -> Self {
        self.sinkable = true;
        self
    }

    /// Top-level fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.items.iter().filter_map(|item| match item {
            Item::Field(f) => Some(f),
            _ => None,
        })
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.items.iter().filter_map(|item| match item {
            Item::Variable(v) => Some(v),
            _ => None,
        })
    }

    pub fn sinks(&self) -> impl Iterator<Item = &SinkItem> {
        self.items.iter().filter_map(|item| match item {
            Item::Sink(s) => Some(s),
            _ => None,
        })
    }

    pub fn global_hooks(&self) -> impl Iterator<Item = &GlobalHook> {
        self.items.iter().filter_map(|item| match item {
            Item::GlobalHook(h) => Some(h),
            _ => None,
        })
    }

    /// Unit default byte order from `%byteorder`; the last one wins.
    pub fn byte_order(&self) -> Option<ByteOrder> {
        self.items.iter().rev().find_map(|item| match item {
            Item::Property(Property::ByteOrder(order)) => Some(*order),
            _ => None,
        })
    }

    pub fn description(&self) -> Option<&str> {
        self.items.iter().rev().find_map(|item| match item {
            Item::Property(Property::Description(d)) => Some(d.as_str()),
            _ => None,
        })
    }

    pub fn mime_types(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|item| match item {
            Item::Property(Property::MimeType(m)) => Some(m.as_str()),
            _ => None,
        })
    }

    pub fn param_index(&self, name: Name) -> Option<u32> {
        self.params
            .iter()
            .position(|p| p.name == name)
            .and_then(|i| u32::try_from(i).ok())
    }

    pub fn layout(&self) -> UnitLayout {
        let mut slots = Vec::new();
        for item in &self.items {
            match item {
                Item::Field(f) => f.collect_names(&mut slots),
                Item::Variable(v) => push_unique(&mut slots, v.name),
                Item::Sink(s) => push_unique(&mut slots, s.name),
                Item::Property(_) | Item::GlobalHook(_) => {}
            }
        }
        UnitLayout {
            unit: self.name,
            slots,
        }
    }

    /// Find a field by name, searching switch cases too.
    pub fn find_field(&self, name: Name) -> Option<&Field> {
        let mut found = None;
        for f in self.fields() {
            f.walk(&mut |f| {
                if found.is_none() && f.name == Some(name) {
                    found = Some(f);
                }
            });
        }
        found
    }

    /// Whether `name` is a field, variable or sink of this unit.
    pub fn has_item(&self, name: Name) -> bool {
        self.layout().slot(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(raw: u32) -> Name {
        Name::from_raw(raw)
    }

    #[test]
    fn layout_follows_declaration_order() {
        let unit = UnitType::new(n(1))
            .field(Field::named(n(2), FieldKind::AtomicType(AtomicType::UInt8)))
            .variable(n(3), None)
            .field(Field::anonymous(FieldKind::AtomicType(AtomicType::UInt8)))
            .sink(n(4), n(9));
        assert_eq!(unit.layout().slots, vec![n(2), n(3), n(4)]);
        assert_eq!(unit.layout().slot(n(4)), Some(2));
    }

    #[test]
    fn switch_case_fields_share_slots() {
        let case = |v: u64| SwitchCase {
            values: vec![Constant::UInt(v)],
            fields: vec![Field::named(n(5), FieldKind::AtomicType(AtomicType::UInt8))],
        };
        let switch = SwitchField {
            discriminant: Some(Expr::field(n(2))),
            cases: vec![case(1), case(2)],
            default: Some(vec![Field::named(
                n(6),
                FieldKind::AtomicType(AtomicType::UInt16),
            )]),
        };
        let unit = UnitType::new(n(1))
            .field(Field::named(n(2), FieldKind::AtomicType(AtomicType::UInt8)))
            .field(Field::anonymous(FieldKind::Switch(switch)));
        assert_eq!(unit.layout().slots, vec![n(2), n(5), n(6)]);
        assert!(unit.find_field(n(6)).is_some());
        assert!(unit.has_item(n(5)));
    }

    #[test]
    fn properties() {
        let unit = UnitType::new(n(1))
            .property(Property::ByteOrder(ByteOrder::Big))
            .property(Property::MimeType("application/x-a".into()))
            .property(Property::ByteOrder(ByteOrder::Little))
            .property(Property::MimeType("application/x-b".into()));
        assert_eq!(unit.byte_order(), Some(ByteOrder::Little));
        assert_eq!(
            unit.mime_types().collect::<Vec<_>>(),
            vec!["application/x-a", "application/x-b"]
        );
        assert_eq!(unit.description(), None);
    }
}
