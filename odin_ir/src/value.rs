use bitflags::bitflags;
use std::fmt;

use odin_types::{EntityId, ExactValue, TypeId};

use crate::{BlockId, Instr, ProcId};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ValueId(u32);

impl ValueId {
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

bitflags! {
    pub struct GlobalFlags: u8 {
        const CONSTANT = 0b0000_0001;
        const PRIVATE = 0b0000_0010;
        const THREAD_LOCAL = 0b0000_0100;
        const FOREIGN = 0b0000_1000;
        const UNNAMED_ADDR = 0b0001_0000;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Global {
    pub name: String,
    pub entity: Option<EntityId>,
    /// A global's value is its address, so this is a pointer type.
    pub ty: TypeId,
    /// Constant initializer, if any.
    pub value: Option<ValueId>,
    /// Instructions that use this global.
    pub referrers: Vec<ValueId>,
    pub flags: GlobalFlags,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Constant {
        ty: TypeId,
        value: ExactValue,
    },
    /// A slice over a constant backing array global.
    ConstantSlice {
        ty: TypeId,
        backing: ValueId,
        count: i64,
    },
    Nil(TypeId),
    TypeName {
        ty: TypeId,
        name: String,
    },
    Global(Global),
    Param {
        parent: ProcId,
        entity: Option<EntityId>,
        name: String,
        ty: TypeId,
    },
    Proc(ProcId),
    Block(BlockId),
    Instr(Instr),
}

impl Value {
    pub fn as_instr(&self) -> Option<&Instr> {
        match self {
            Self::Instr(instr) => Some(instr),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&ExactValue> {
        match self {
            Self::Constant { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Constant { .. } | Self::ConstantSlice { .. } | Self::Nil(_))
    }
}
