//! Compile-time constant values.
//!
//! Integers are kept at 128 bits so that every `u64` and `i64` value is
//! representable while folding. Floats are wrapped in [`Total`] so a value
//! can be hashed and compared for duplicate `match` cases.

use decorum::Total;
use std::{cmp::Ordering, convert::TryFrom, fmt};

use crate::ops::{BinaryOp, UnaryOp};

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ExactValue {
    Invalid,
    Bool(bool),
    String(String),
    Integer(i128),
    Float(Total<f64>),
    Pointer(i64),
}

impl Default for ExactValue {
    fn default() -> Self {
        Self::Invalid
    }
}

impl ExactValue {
    pub fn float(value: f64) -> Self {
        Self::Float(Total::from(value))
    }

    pub const fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i128> {
        match self.to_integer() {
            Self::Integer(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(f.into_inner()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Converts to an integer if that loses nothing.
    pub fn to_integer(&self) -> ExactValue {
        match self {
            Self::Integer(_) => self.clone(),
            Self::Float(f) => {
                let f = f.into_inner();
                if f.fract() == 0.0 && f.abs() < 1.7e38 {
                    Self::Integer(f as i128)
                } else {
                    Self::Invalid
                }
            },
            Self::Pointer(p) => Self::Integer(*p as i128),
            _ => Self::Invalid,
        }
    }

    pub fn to_float(&self) -> ExactValue {
        match self {
            Self::Integer(i) => Self::float(*i as f64),
            Self::Float(_) => self.clone(),
            _ => Self::Invalid,
        }
    }

    /// Rank used to bring two operands to a common representation.
    fn rank(&self) -> u8 {
        match self {
            Self::Invalid => 0,
            Self::Bool(_) | Self::String(_) => 1,
            Self::Integer(_) => 2,
            Self::Float(_) => 3,
            Self::Pointer(_) => 4,
        }
    }
}

/// Brings both values to the same representation, promoting integers to
/// floats when one side is a float.
pub fn match_values(x: &ExactValue, y: &ExactValue) -> (ExactValue, ExactValue) {
    match x.rank().cmp(&y.rank()) {
        Ordering::Equal => (x.clone(), y.clone()),
        Ordering::Less => {
            let (y, x) = match_values(y, x);
            (x, y)
        },
        Ordering::Greater => match (x, y) {
            (ExactValue::Float(_), ExactValue::Integer(_)) => (x.clone(), y.to_float()),
            (ExactValue::Pointer(_), ExactValue::Integer(i)) => (x.to_integer(), ExactValue::Integer(*i)),
            _ => (ExactValue::Invalid, ExactValue::Invalid),
        },
    }
}

/// Folds a unary operator. `unsigned_bits` is the width of the operand's
/// type when it is a typed unsigned integer, so that `~` stays in range.
pub fn unary_op(op: UnaryOp, value: &ExactValue, unsigned_bits: Option<u32>) -> ExactValue {
    match (op, value) {
        (UnaryOp::Plus, ExactValue::Integer(_)) | (UnaryOp::Plus, ExactValue::Float(_)) => value.clone(),

        (UnaryOp::Minus, ExactValue::Integer(i)) => ExactValue::Integer(i.wrapping_neg()),
        (UnaryOp::Minus, ExactValue::Float(f)) => ExactValue::float(-f.into_inner()),

        (UnaryOp::Xor, ExactValue::Integer(i)) => match unsigned_bits {
            Some(bits) if bits < 128 => ExactValue::Integer(i ^ ((1i128 << bits) - 1)),
            _ => ExactValue::Integer(!i),
        },

        (UnaryOp::Not, ExactValue::Bool(b)) => ExactValue::Bool(!b),

        _ => ExactValue::Invalid,
    }
}

/// Folds an arithmetic or bitwise operator. Comparisons go through
/// [`compare`]. Division by zero yields [`ExactValue::Invalid`].
pub fn binary_op(op: BinaryOp, x: &ExactValue, y: &ExactValue) -> ExactValue {
    let (x, y) = match_values(x, y);

    match (x, y) {
        (ExactValue::Bool(a), ExactValue::Bool(b)) => match op {
            BinaryOp::CmpAnd => ExactValue::Bool(a && b),
            BinaryOp::CmpOr => ExactValue::Bool(a || b),
            _ => ExactValue::Invalid,
        },

        (ExactValue::Integer(a), ExactValue::Integer(b)) => {
            let res = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Quo => a.checked_div(b),
                BinaryOp::Mod => a.checked_rem(b),
                BinaryOp::And => Some(a & b),
                BinaryOp::Or => Some(a | b),
                BinaryOp::Xor => Some(a ^ b),
                BinaryOp::AndNot => Some(a & !b),
                BinaryOp::Shl => u32::try_from(b).ok().and_then(|b| a.checked_shl(b)),
                BinaryOp::Shr => u32::try_from(b).ok().map(|b| if b >= 128 { a >> 127 } else { a >> b }),
                _ => None,
            };

            res.map_or(ExactValue::Invalid, ExactValue::Integer)
        },

        (ExactValue::Float(a), ExactValue::Float(b)) => {
            let (a, b) = (a.into_inner(), b.into_inner());
            match op {
                BinaryOp::Add => ExactValue::float(a + b),
                BinaryOp::Sub => ExactValue::float(a - b),
                BinaryOp::Mul => ExactValue::float(a * b),
                BinaryOp::Quo if b != 0.0 => ExactValue::float(a / b),
                _ => ExactValue::Invalid,
            }
        },

        (ExactValue::String(a), ExactValue::String(b)) if op == BinaryOp::Add => {
            ExactValue::String(a + &b)
        },

        _ => ExactValue::Invalid,
    }
}

/// Evaluates a comparison between two constants.
pub fn compare(op: BinaryOp, x: &ExactValue, y: &ExactValue) -> Option<bool> {
    let (x, y) = match_values(x, y);

    let ordering = match (&x, &y) {
        (ExactValue::Bool(a), ExactValue::Bool(b)) => {
            return match op {
                BinaryOp::CmpEq => Some(a == b),
                BinaryOp::NotEq => Some(a != b),
                _ => None,
            };
        },
        (ExactValue::Integer(a), ExactValue::Integer(b)) => a.cmp(b),
        (ExactValue::Float(a), ExactValue::Float(b)) => a.cmp(b),
        (ExactValue::String(a), ExactValue::String(b)) => a.cmp(b),
        (ExactValue::Pointer(a), ExactValue::Pointer(b)) => a.cmp(b),
        _ => return None,
    };

    let res = match op {
        BinaryOp::CmpEq => ordering == Ordering::Equal,
        BinaryOp::NotEq => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::LtEq => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::GtEq => ordering != Ordering::Less,
        _ => return None,
    };

    Some(res)
}

impl fmt::Display for ExactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => write!(f, "invalid"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::String(s) => write!(f, "{:?}", s),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{:?}", x.into_inner()),
            Self::Pointer(p) => write!(f, "{:#x}", p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_folding() {
        let five = ExactValue::Integer(5);
        let two = ExactValue::Integer(2);
        assert_eq!(binary_op(BinaryOp::Add, &five, &two), ExactValue::Integer(7));
        assert_eq!(binary_op(BinaryOp::Quo, &five, &two), ExactValue::Integer(2));
        assert_eq!(binary_op(BinaryOp::Mod, &five, &two), ExactValue::Integer(1));
        assert_eq!(binary_op(BinaryOp::AndNot, &five, &ExactValue::Integer(4)), ExactValue::Integer(1));
        assert_eq!(binary_op(BinaryOp::Shl, &five, &two), ExactValue::Integer(20));
    }

    #[test]
    fn division_by_zero_is_invalid() {
        let zero = ExactValue::Integer(0);
        assert!(binary_op(BinaryOp::Quo, &ExactValue::Integer(1), &zero).is_invalid());
        assert!(binary_op(BinaryOp::Quo, &ExactValue::float(1.0), &zero).is_invalid());
    }

    #[test]
    fn mixed_promotes_to_float() {
        let res = binary_op(BinaryOp::Mul, &ExactValue::Integer(3), &ExactValue::float(0.5));
        assert_eq!(res, ExactValue::float(1.5));
    }

    #[test]
    fn unsigned_complement_stays_in_range() {
        let res = unary_op(UnaryOp::Xor, &ExactValue::Integer(0), Some(8));
        assert_eq!(res, ExactValue::Integer(255));
        let res = unary_op(UnaryOp::Xor, &ExactValue::Integer(0), None);
        assert_eq!(res, ExactValue::Integer(-1));
    }

    #[test]
    fn comparisons() {
        let a = ExactValue::String("abc".into());
        let b = ExactValue::String("abd".into());
        assert_eq!(compare(BinaryOp::Lt, &a, &b), Some(true));
        assert_eq!(compare(BinaryOp::CmpEq, &ExactValue::Integer(2), &ExactValue::float(2.0)), Some(true));
        assert_eq!(compare(BinaryOp::Lt, &ExactValue::Bool(true), &ExactValue::Bool(false)), None);
    }

    #[test]
    fn float_to_integer() {
        assert_eq!(ExactValue::float(4.0).to_integer(), ExactValue::Integer(4));
        assert!(ExactValue::float(4.5).to_integer().is_invalid());
    }
}
