use num_derive::{FromPrimitive, ToPrimitive};
use std::fmt;

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Hash, PartialEq, ToPrimitive)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Quo,
    Mod,
    And,
    Or,
    Xor,
    /// `x &~ y`, lowered as `x & (y ~ -1)`.
    AndNot,
    Shl,
    Shr,
    CmpEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    /// Short-circuiting `&&`.
    CmpAnd,
    /// Short-circuiting `||`.
    CmpOr,
}

impl BinaryOp {
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::CmpEq | Self::NotEq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq
        )
    }

    pub const fn is_shift(self) -> bool {
        matches!(self, Self::Shl | Self::Shr)
    }

    pub const fn is_logical(self) -> bool {
        matches!(self, Self::CmpAnd | Self::CmpOr)
    }

    /// Operators that only make sense on integers.
    pub const fn is_integer_only(self) -> bool {
        matches!(
            self,
            Self::Mod | Self::And | Self::Or | Self::Xor | Self::AndNot | Self::Shl | Self::Shr
        )
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Quo => "/",
            Self::Mod => "%",
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "~",
            Self::AndNot => "&~",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::CmpEq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::CmpAnd => "&&",
            Self::CmpOr => "||",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Hash, PartialEq, ToPrimitive)]
pub enum UnaryOp {
    Plus,
    Minus,
    /// Bitwise complement, spelled `~x`.
    Xor,
    Not,
}

impl UnaryOp {
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Xor => "~",
            Self::Not => "!",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
