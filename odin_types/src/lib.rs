#![allow(clippy::comparison_chain)]
#![warn(unused_imports)]
#![warn(unused_must_use)]

pub mod basic;
pub mod build_context;
pub mod exact_value;
pub mod layout;
pub mod ops;
pub mod selection;
pub mod ty;
mod types;

#[cfg(test)]
mod tests;

use std::fmt;

pub use basic::{BasicFlags, BasicKind};
pub use build_context::{BuildContext, BuildContextError};
pub use exact_value::ExactValue;
pub use layout::LayoutError;
pub use ops::{BinaryOp, UnaryOp};
pub use selection::{Selection, SelectionKind};
pub use ty::{CallingConvention, Field, NamedType, ProcType, Record, RecordKind, Type};
pub use types::{Types, WellKnown};

/// Index of a type in a [`Types`] arena.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TypeId(u32);

impl TypeId {
    pub const INVALID: Self = Self::basic(BasicKind::Invalid);
    pub const BOOL: Self = Self::basic(BasicKind::Bool);
    pub const I32: Self = Self::basic(BasicKind::I32);
    pub const I64: Self = Self::basic(BasicKind::I64);
    pub const U8: Self = Self::basic(BasicKind::U8);
    pub const F64: Self = Self::basic(BasicKind::F64);
    pub const INT: Self = Self::basic(BasicKind::Int);
    pub const UINT: Self = Self::basic(BasicKind::Uint);
    pub const RAWPTR: Self = Self::basic(BasicKind::Rawptr);
    pub const STRING: Self = Self::basic(BasicKind::String);
    pub const ANY: Self = Self::basic(BasicKind::Any);
    pub const UNTYPED_BOOL: Self = Self::basic(BasicKind::UntypedBool);
    pub const UNTYPED_INTEGER: Self = Self::basic(BasicKind::UntypedInteger);
    pub const UNTYPED_FLOAT: Self = Self::basic(BasicKind::UntypedFloat);
    pub const UNTYPED_STRING: Self = Self::basic(BasicKind::UntypedString);
    pub const UNTYPED_RUNE: Self = Self::basic(BasicKind::UntypedRune);
    pub const UNTYPED_NIL: Self = Self::basic(BasicKind::UntypedNil);

    /// Basic types occupy the first slots of every arena, in
    /// [`BasicKind`] order.
    pub const fn basic(kind: BasicKind) -> Self {
        Self(kind as u32)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Index of an entity in the checker's entity arena. It lives here
/// because named types and record fields point back at the entities that
/// declare them.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EntityId(u32);

impl EntityId {
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Index of an AST node. Checker tables and deferred statements in the IR
/// refer to nodes through it.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}
