use num_derive::{FromPrimitive, ToPrimitive};
use std::fmt;

use odin_types::{BinaryOp, EntityId, TypeId, UnaryOp};

use crate::{BlockId, ValueId};

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Hash, PartialEq, ToPrimitive)]
pub enum ConvKind {
    Trunc,
    Zext,
    Sext,
    Fptrunc,
    Fpext,
    Fptoui,
    Fptosi,
    Uitofp,
    Sitofp,
    Ptrtoint,
    Inttoptr,
    Bitcast,
}

impl ConvKind {
    pub const COUNT: u8 = Self::Bitcast as u8 + 1;

    pub fn name(self) -> &'static str {
        match self {
            Self::Trunc => "trunc",
            Self::Zext => "zext",
            Self::Sext => "sext",
            Self::Fptrunc => "fptrunc",
            Self::Fpext => "fpext",
            Self::Fptoui => "fptoui",
            Self::Fptosi => "fptosi",
            Self::Uitofp => "uitofp",
            Self::Sitofp => "sitofp",
            Self::Ptrtoint => "ptrtoint",
            Self::Inttoptr => "inttoptr",
            Self::Bitcast => "bitcast",
        }
    }
}

impl fmt::Display for ConvKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a runtime check came from, for the panic message.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SourcePos {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InstrKind {
    Comment(String),
    /// A stack slot. Always lives in the procedure's `decls` block.
    Local {
        entity: Option<EntityId>,
        ty: TypeId,
        zero_initialized: bool,
    },
    ZeroInit {
        address: ValueId,
    },
    Store {
        address: ValueId,
        value: ValueId,
    },
    Load {
        address: ValueId,
    },
    PtrOffset {
        address: ValueId,
        offset: ValueId,
    },
    ArrayElementPtr {
        address: ValueId,
        index: ValueId,
    },
    StructElementPtr {
        address: ValueId,
        index: usize,
    },
    StructExtractValue {
        value: ValueId,
        index: usize,
    },
    UnionTagPtr {
        address: ValueId,
    },
    UnionTagValue {
        value: ValueId,
    },
    Conv {
        kind: ConvKind,
        value: ValueId,
        from: TypeId,
        to: TypeId,
    },
    Jump {
        block: BlockId,
    },
    If {
        cond: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    },
    Return {
        value: Option<ValueId>,
    },
    Select {
        cond: ValueId,
        then_value: ValueId,
        else_value: ValueId,
    },
    /// One edge per predecessor of the block, in predecessor order.
    Phi {
        edges: Vec<ValueId>,
    },
    Unreachable,
    UnaryOp {
        op: UnaryOp,
        expr: ValueId,
    },
    BinaryOp {
        op: BinaryOp,
        left: ValueId,
        right: ValueId,
    },
    Call {
        callee: ValueId,
        args: Vec<ValueId>,
    },
    VectorExtractElement {
        vector: ValueId,
        index: ValueId,
    },
    VectorInsertElement {
        vector: ValueId,
        elem: ValueId,
        index: ValueId,
    },
    VectorShuffle {
        vector: ValueId,
        indices: Vec<i32>,
    },
    StartupRuntime,
    BoundsCheck {
        pos: SourcePos,
        index: ValueId,
        len: ValueId,
    },
    /// `low <= high <= max`. Without `max` only `0 <= high` is checked
    /// against `low`.
    SliceBoundsCheck {
        pos: SourcePos,
        low: ValueId,
        high: ValueId,
        max: Option<ValueId>,
        is_substring: bool,
    },
}

impl InstrKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Comment(_) => "comment",
            Self::Local { .. } => "local",
            Self::ZeroInit { .. } => "zero_init",
            Self::Store { .. } => "store",
            Self::Load { .. } => "load",
            Self::PtrOffset { .. } => "ptr_offset",
            Self::ArrayElementPtr { .. } => "array_element_ptr",
            Self::StructElementPtr { .. } => "struct_element_ptr",
            Self::StructExtractValue { .. } => "struct_extract_value",
            Self::UnionTagPtr { .. } => "union_tag_ptr",
            Self::UnionTagValue { .. } => "union_tag_value",
            Self::Conv { .. } => "conv",
            Self::Jump { .. } => "jump",
            Self::If { .. } => "if",
            Self::Return { .. } => "return",
            Self::Select { .. } => "select",
            Self::Phi { .. } => "phi",
            Self::Unreachable => "unreachable",
            Self::UnaryOp { .. } => "unary_op",
            Self::BinaryOp { .. } => "binary_op",
            Self::Call { .. } => "call",
            Self::VectorExtractElement { .. } => "vector_extract_element",
            Self::VectorInsertElement { .. } => "vector_insert_element",
            Self::VectorShuffle { .. } => "vector_shuffle",
            Self::StartupRuntime => "startup_runtime",
            Self::BoundsCheck { .. } => "bounds_check",
            Self::SliceBoundsCheck { .. } => "slice_bounds_check",
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Jump { .. } | Self::If { .. } | Self::Return { .. } | Self::Unreachable
        )
    }

    /// Instructions that never produce a value.
    pub fn is_void(&self) -> bool {
        matches!(
            self,
            Self::Comment(_)
                | Self::ZeroInit { .. }
                | Self::Store { .. }
                | Self::Jump { .. }
                | Self::If { .. }
                | Self::Return { .. }
                | Self::Unreachable
                | Self::StartupRuntime
                | Self::BoundsCheck { .. }
                | Self::SliceBoundsCheck { .. }
        )
    }

    /// Values this instruction reads.
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            Self::Comment(_) | Self::Local { .. } | Self::Jump { .. } | Self::Unreachable | Self::StartupRuntime => {
                Vec::new()
            },
            Self::ZeroInit { address }
            | Self::Load { address }
            | Self::StructElementPtr { address, .. }
            | Self::UnionTagPtr { address } => vec![*address],
            Self::StructExtractValue { value, .. } | Self::UnionTagValue { value } | Self::Conv { value, .. } => {
                vec![*value]
            },
            Self::Store { address, value } => vec![*address, *value],
            Self::PtrOffset { address, offset } => vec![*address, *offset],
            Self::ArrayElementPtr { address, index } => vec![*address, *index],
            Self::If { cond, .. } => vec![*cond],
            Self::Return { value } => value.iter().copied().collect(),
            Self::Select {
                cond,
                then_value,
                else_value,
            } => vec![*cond, *then_value, *else_value],
            Self::Phi { edges } => edges.clone(),
            Self::UnaryOp { expr, .. } => vec![*expr],
            Self::BinaryOp { left, right, .. } => vec![*left, *right],
            Self::Call { callee, args } => std::iter::once(*callee).chain(args.iter().copied()).collect(),
            Self::VectorExtractElement { vector, index } => vec![*vector, *index],
            Self::VectorInsertElement { vector, elem, index } => vec![*vector, *elem, *index],
            Self::VectorShuffle { vector, .. } => vec![*vector],
            Self::BoundsCheck { index, len, .. } => vec![*index, *len],
            Self::SliceBoundsCheck { low, high, max, .. } => {
                let mut res = vec![*low, *high];
                res.extend(max.iter().copied());
                res
            },
        }
    }

    /// Blocks control may continue to after this instruction.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Self::Jump { block } => vec![*block],
            Self::If {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            _ => Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Instr {
    pub kind: InstrKind,
    /// Result type. Void instructions carry the empty tuple.
    pub ty: TypeId,
    pub parent: Option<BlockId>,
}

impl Instr {
    pub fn new(kind: InstrKind, ty: TypeId) -> Self {
        Self { kind, ty, parent: None }
    }

    pub fn is_terminator(&self) -> bool {
        self.kind.is_terminator()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;
    use std::collections::HashSet;

    #[test]
    fn conv_names_are_unique() {
        let names: HashSet<_> = (0..ConvKind::COUNT)
            .filter_map(ConvKind::from_u8)
            .map(ConvKind::name)
            .collect();
        assert_eq!(names.len(), ConvKind::COUNT as usize);
    }

    #[test]
    fn terminators() {
        let b = BlockId::new(0);
        assert!(InstrKind::Jump { block: b }.is_terminator());
        assert!(InstrKind::Unreachable.is_terminator());
        assert!(InstrKind::Return { value: None }.is_terminator());
        assert!(!InstrKind::Comment("x".to_owned()).is_terminator());
        assert!(!InstrKind::StartupRuntime.is_terminator());
    }
}
