//! Expressions attached to grammars.
//!
//! Conditions, repetition counts, blob lengths, switch discriminants, variable
//! defaults, sub-unit arguments and `&convert` filters are all small
//! expressions over constants, fields of the unit being parsed and the unit's
//! parameters.

use crate::Name;

/// A constant value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Constant {
    UInt(u64),
    SInt(i64),
    Bool(bool),
    Bytes(Vec<u8>),
}

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    /// `|x|`: length of a bytes value or list.
    Len,
    /// `x.to_uint()`: a bytes value holding ASCII decimal digits.
    ToUInt,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Const(Constant),
    /// `self.<name>`: a field, variable or sink slot of the current unit.
    Field(Name),
    /// A parameter of the current unit.
    Param(Name),
    /// `$$`: the value just parsed. Only valid inside `&convert`.
    Parsed,
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn uint(value: u64) -> Self {
        Expr::Const(Constant::UInt(value))
    }

    pub fn bool(value: bool) -> Self {
        Expr::Const(Constant::Bool(value))
    }

    pub fn field(name: Name) -> Self {
        Expr::Field(name)
    }

    pub fn param(name: Name) -> Self {
        Expr::Param(name)
    }

    pub fn parsed() -> Self {
        Expr::Parsed
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Every `self.<name>` referenced by this expression, in visit order.
    pub fn field_refs(&self) -> Vec<Name> {
        let mut out = Vec::new();
        self.collect_field_refs(&mut out);
        out
    }

    fn collect_field_refs(&self, out: &mut Vec<Name>) {
        match self {
            Expr::Field(name) => out.push(*name),
            Expr::Const(_) | Expr::Param(_) | Expr::Parsed => {}
            Expr::Unary { operand, .. } => operand.collect_field_refs(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_field_refs(out);
                rhs.collect_field_refs(out);
            }
        }
    }
}
