use std::fmt;

use odin_types::NodeId;

use crate::{ProcId, ValueId};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BlockId(u32);

impl BlockId {
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Dominator-tree slot. Filled in by later passes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DomNode {
    pub idom: Option<BlockId>,
    pub children: Vec<BlockId>,
    pub pre: i32,
    pub post: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    /// Position within the parent procedure; used in labels.
    pub index: usize,
    pub label: String,
    pub parent: ProcId,
    pub node: Option<NodeId>,
    /// Scope depth of the procedure when the block was created.
    pub scope_index: i32,
    pub dom: DomNode,
    pub instrs: Vec<ValueId>,
    pub locals: Vec<ValueId>,
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
}

impl Block {
    pub fn new(parent: ProcId, index: usize, label: impl Into<String>, node: Option<NodeId>, scope_index: i32) -> Self {
        Self {
            index,
            label: label.into(),
            parent,
            node,
            scope_index,
            dom: DomNode::default(),
            instrs: Vec::new(),
            locals: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
        }
    }

    pub fn last_instr(&self) -> Option<ValueId> {
        self.instrs.last().copied()
    }
}
