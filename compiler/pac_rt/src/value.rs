//! Run-time values and records.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use pac_codegen::ir::Lit;
use pac_codegen::RecordLayout;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Unset field or variable.
    Null,
    Bool(bool),
    UInt(u64),
    SInt(i64),
    Double(f64),
    Bytes(Vec<u8>),
    Address(IpAddr),
    /// Seconds since the epoch.
    Time(u64),
    List(Vec<Value>),
    Record(Box<Record>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::UInt(_) => "uint",
            Value::SInt(_) => "int",
            Value::Double(_) => "double",
            Value::Bytes(_) => "bytes",
            Value::Address(_) => "addr",
            Value::Time(_) => "time",
            Value::List(_) => "list",
            Value::Record(_) => "record",
        }
    }

    /// Truthiness for branches: `Null` and zero are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::UInt(n) | Value::Time(n) => *n != 0,
            Value::SInt(n) => *n != 0,
            Value::Double(d) => *d != 0.0,
            Value::Bytes(b) => !b.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Address(_) | Value::Record(_) => true,
        }
    }

    /// Integer view, widened so signed and unsigned values compare.
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::UInt(n) | Value::Time(n) => Some(i128::from(*n)),
            Value::SInt(n) => Some(i128::from(*n)),
            _ => None,
        }
    }

    /// Narrowest integer value holding `n`: unsigned when non-negative.
    pub fn from_int(n: i128) -> Option<Value> {
        if let Ok(u) = u64::try_from(n) {
            Some(Value::UInt(u))
        } else {
            i64::try_from(n).ok().map(Value::SInt)
        }
    }

    /// Equality with integers compared by value across signedness.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self.as_int(), other.as_int()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }
}

impl From<&Lit> for Value {
    fn from(lit: &Lit) -> Self {
        match lit {
            Lit::Null => Value::Null,
            Lit::UInt(n) => Value::UInt(*n),
            Lit::SInt(n) => Value::SInt(*n),
            Lit::Bool(b) => Value::Bool(*b),
            Lit::Bytes(b) => Value::Bytes(b.clone()),
        }
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::UInt(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::SInt(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(Box::new(r))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("(not set)"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::UInt(n) | Value::Time(n) => write!(f, "{n}"),
            Value::SInt(n) => write!(f, "{n}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Bytes(b) => write!(f, "b\"{}\"", b.escape_ascii()),
            Value::Address(a) => write!(f, "{a}"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Record(r) => write!(f, "{r}"),
        }
    }
}

/// A parsed unit instance.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    layout: Arc<RecordLayout>,
    values: Vec<Value>,
}

impl Record {
    /// A record with every field unset.
    pub fn new(layout: Arc<RecordLayout>) -> Self {
        let values = vec![Value::Null; layout.fields.len()];
        Record { layout, values }
    }

    pub fn unit(&self) -> &str {
        &self.layout.unit
    }

    pub fn layout(&self) -> &Arc<RecordLayout> {
        &self.layout
    }

    /// Field value by name; `None` if the unit has no such field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.layout.slot(field).map(|i| &self.values[i])
    }

    /// Set a field; returns `false` if the unit has no such field.
    pub fn set(&mut self, field: &str, value: Value) -> bool {
        match self.layout.slot(field) {
            Some(i) => {
                self.values[i] = value;
                true
            }
            None => false,
        }
    }

    pub fn slot(&self, slot: usize) -> Option<&Value> {
        self.values.get(slot)
    }

    pub fn slot_mut(&mut self, slot: usize) -> Option<&mut Value> {
        self.values.get_mut(slot)
    }

    /// `(field, value)` pairs in slot order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.layout
            .fields
            .iter()
            .map(String::as_str)
            .zip(&self.values)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.layout.unit)?;
        for (i, (name, value)) in self.fields().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{name}: {value}")?;
        }
        f.write_str(" }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn layout() -> Arc<RecordLayout> {
        Arc::new(RecordLayout {
            unit: "Header".into(),
            fields: vec!["length".into(), "payload".into()],
        })
    }

    #[test]
    fn records_start_unset() {
        let r = Record::new(layout());
        assert_eq!(r.get("length"), Some(&Value::Null));
        assert_eq!(r.get("nope"), None);
    }

    #[test]
    fn set_and_display() {
        let mut r = Record::new(layout());
        assert!(r.set("length", Value::UInt(3)));
        assert!(r.set(
            "payload",
            Value::List(vec![Value::UInt(1), Value::UInt(2)])
        ));
        assert!(!r.set("missing", Value::Null));
        assert_eq!(r.to_string(), "Header { length: 3, payload: [1, 2] }");
    }

    #[test]
    fn integers_compare_across_signedness() {
        assert!(Value::UInt(3).loose_eq(&Value::SInt(3)));
        assert!(!Value::UInt(3).loose_eq(&Value::SInt(-3)));
        assert!(Value::Bytes(b"a".to_vec()).loose_eq(&Value::Bytes(b"a".to_vec())));
        assert_eq!(Value::from_int(-1), Some(Value::SInt(-1)));
        assert_eq!(Value::from_int(i128::from(u64::MAX)), Some(Value::UInt(u64::MAX)));
        assert_eq!(Value::from_int(i128::from(u64::MAX) + 1), None);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::UInt(0).is_truthy());
        assert!(Value::UInt(2).is_truthy());
        assert!(Value::Bool(true).is_truthy());
    }
}
