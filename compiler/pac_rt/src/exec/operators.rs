//! Primitive operators over run-time values.
//!
//! Direct enum dispatch; integers of either signedness are widened to
//! `i128` so mixed comparisons and arithmetic are exact.

use pac_ir::{BinaryOp, UnaryOp};

use crate::value::Value;

/// Why an operator had no result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum OpError {
    Overflow(&'static str),
    TypeMismatch {
        op: BinaryOp,
        left: &'static str,
        right: &'static str,
    },
    InvalidOperand {
        op: UnaryOp,
        ty: &'static str,
    },
    NotDecimal(String),
}

impl std::fmt::Display for OpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpError::Overflow(op) => write!(f, "integer overflow in {op}"),
            OpError::TypeMismatch { op, left, right } => {
                write!(f, "{op:?} is not defined for {left} and {right}")
            }
            OpError::InvalidOperand { op, ty } => write!(f, "{op:?} is not defined for {ty}"),
            OpError::NotDecimal(text) => write!(f, "`{text}` is not a decimal number"),
        }
    }
}

type OpResult = Result<Value, OpError>;

#[inline]
fn checked_arith(result: Option<i128>, op_name: &'static str) -> OpResult {
    result
        .and_then(Value::from_int)
        .ok_or(OpError::Overflow(op_name))
}

pub(crate) fn evaluate_binary(left: &Value, right: &Value, op: BinaryOp) -> OpResult {
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let (a, b) = (left.is_truthy(), right.is_truthy());
        return Ok(Value::Bool(if op == BinaryOp::And { a && b } else { a || b }));
    }
    match (left, right) {
        (Value::Bytes(a), Value::Bytes(b)) => eval_ordered(a, b, op),
        (Value::Bool(a), Value::Bool(b)) => eval_ordered(a, b, op),
        (Value::Double(a), Value::Double(b)) => eval_double_binary(*a, *b, op),
        _ => match (left.as_int(), right.as_int()) {
            (Some(a), Some(b)) => eval_int_binary(a, b, op),
            _ if op == BinaryOp::Eq => Ok(Value::Bool(left == right)),
            _ if op == BinaryOp::Ne => Ok(Value::Bool(left != right)),
            _ => Err(mismatch(left, right, op)),
        },
    }
    .map_err(|e| match e {
        OpError::TypeMismatch { .. } => mismatch(left, right, op),
        other => other,
    })
}

fn mismatch(left: &Value, right: &Value, op: BinaryOp) -> OpError {
    OpError::TypeMismatch {
        op,
        left: left.type_name(),
        right: right.type_name(),
    }
}

fn eval_int_binary(a: i128, b: i128, op: BinaryOp) -> OpResult {
    match op {
        BinaryOp::Add => checked_arith(a.checked_add(b), "addition"),
        BinaryOp::Sub => checked_arith(a.checked_sub(b), "subtraction"),
        BinaryOp::Mul => checked_arith(a.checked_mul(b), "multiplication"),
        _ => eval_ordered(&a, &b, op),
    }
}

fn eval_double_binary(a: f64, b: f64, op: BinaryOp) -> OpResult {
    match op {
        BinaryOp::Add => Ok(Value::Double(a + b)),
        BinaryOp::Sub => Ok(Value::Double(a - b)),
        BinaryOp::Mul => Ok(Value::Double(a * b)),
        BinaryOp::Eq => Ok(Value::Bool(a.total_cmp(&b).is_eq())),
        BinaryOp::Ne => Ok(Value::Bool(a.total_cmp(&b).is_ne())),
        BinaryOp::Lt => Ok(Value::Bool(a < b)),
        BinaryOp::Le => Ok(Value::Bool(a <= b)),
        BinaryOp::Gt => Ok(Value::Bool(a > b)),
        BinaryOp::Ge => Ok(Value::Bool(a >= b)),
        BinaryOp::And | BinaryOp::Or => Err(OpError::TypeMismatch {
            op,
            left: "",
            right: "",
        }),
    }
}

/// Comparisons for any totally ordered operand type.
fn eval_ordered<T: Ord + ?Sized>(a: &T, b: &T, op: BinaryOp) -> OpResult {
    let result = match op {
        BinaryOp::Eq => a == b,
        BinaryOp::Ne => a != b,
        BinaryOp::Lt => a < b,
        BinaryOp::Le => a <= b,
        BinaryOp::Gt => a > b,
        BinaryOp::Ge => a >= b,
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::And | BinaryOp::Or => {
            return Err(OpError::TypeMismatch {
                op,
                left: "",
                right: "",
            })
        }
    };
    Ok(Value::Bool(result))
}

pub(crate) fn evaluate_unary(operand: &Value, op: UnaryOp) -> OpResult {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
        UnaryOp::Len => {
            let len = match operand {
                Value::Bytes(b) => b.len(),
                Value::List(l) => l.len(),
                other => {
                    return Err(OpError::InvalidOperand {
                        op,
                        ty: other.type_name(),
                    })
                }
            };
            Ok(Value::UInt(len as u64))
        }
        UnaryOp::ToUInt => match operand {
            Value::Bytes(b) => decimal(b),
            Value::UInt(_) => Ok(operand.clone()),
            other => Err(OpError::InvalidOperand {
                op,
                ty: other.type_name(),
            }),
        },
    }
}

fn decimal(digits: &[u8]) -> OpResult {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(OpError::NotDecimal(digits.escape_ascii().to_string()));
    }
    digits
        .iter()
        .try_fold(0u64, |n, &d| n.checked_mul(10)?.checked_add(u64::from(d - b'0')))
        .map(Value::UInt)
        .ok_or(OpError::Overflow("to_uint"))
}
