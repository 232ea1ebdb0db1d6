use std::fmt;

use odin_types::{ExactValue, NodeId, TypeId};

use super::entity::BuiltinId;

/// What an expression evaluates to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AddressingMode {
    Invalid,
    /// A call to a procedure without results.
    NoValue,
    Value,
    /// Addressable.
    Variable,
    Constant,
    Type,
    Builtin,
}

impl fmt::Display for AddressingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let res = match self {
            AddressingMode::Invalid => "invalid expression",
            AddressingMode::NoValue => "no value",
            AddressingMode::Value => "value",
            AddressingMode::Variable => "variable",
            AddressingMode::Constant => "constant",
            AddressingMode::Type => "type",
            AddressingMode::Builtin => "builtin procedure",
        };

        f.write_str(res)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Operand {
    pub mode: AddressingMode,
    pub ty: TypeId,
    pub value: ExactValue,
    pub expr: Option<NodeId>,
    pub builtin: Option<BuiltinId>,
}

impl Operand {
    pub fn invalid() -> Self {
        Self {
            mode: AddressingMode::Invalid,
            ty: TypeId::INVALID,
            value: ExactValue::Invalid,
            expr: None,
            builtin: None,
        }
    }

    pub fn new(mode: AddressingMode, ty: TypeId) -> Self {
        Self {
            mode,
            ty,
            ..Self::invalid()
        }
    }

    pub fn constant(ty: TypeId, value: ExactValue) -> Self {
        Self {
            value,
            ..Self::new(AddressingMode::Constant, ty)
        }
    }

    pub fn with_expr(mut self, expr: NodeId) -> Self {
        self.expr = Some(expr);
        self
    }

    pub fn is_invalid(&self) -> bool {
        self.mode == AddressingMode::Invalid
    }

    pub fn is_constant(&self) -> bool {
        self.mode == AddressingMode::Constant
    }

    pub fn is_type(&self) -> bool {
        self.mode == AddressingMode::Type
    }

    pub fn invalidate(&mut self) {
        self.mode = AddressingMode::Invalid;
    }
}

/// The checker's verdict on one expression node.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeAndValue {
    pub mode: AddressingMode,
    pub ty: TypeId,
    pub value: ExactValue,
}

impl TypeAndValue {
    pub fn is_constant(&self) -> bool {
        self.mode == AddressingMode::Constant && !self.value.is_invalid()
    }
}

/// An untyped expression waiting for its final type.
#[derive(Clone, Debug, PartialEq)]
pub struct UntypedInfo {
    pub is_lhs: bool,
    pub mode: AddressingMode,
    pub ty: TypeId,
    pub value: ExactValue,
}
