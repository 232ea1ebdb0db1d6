use bitflags::bitflags;
use std::fmt;

use odin_types::{EntityId, NodeId, TypeId};

use crate::{BlockId, Defer, ValueId};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ProcId(u32);

impl ProcId {
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ProcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

bitflags! {
    pub struct ProcFlags: u16 {
        const FOREIGN = 1 << 0;
        const EXPORT = 1 << 1;
        const ENTRY_POINT = 1 << 2;
        const STARTUP = 1 << 3;
        const INLINE = 1 << 4;
        const NO_INLINE = 1 << 5;
        const BOUNDS_CHECK = 1 << 6;
        const NO_BOUNDS_CHECK = 1 << 7;
    }
}

/// Where `break`, `continue` and `fallthrough` go inside one loop or
/// match clause.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TargetList {
    pub break_block: Option<BlockId>,
    pub continue_block: Option<BlockId>,
    pub fallthrough_block: Option<BlockId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Procedure {
    pub name: String,
    pub entity: Option<EntityId>,
    pub ty: TypeId,
    /// The `Value::Proc` standing for this procedure.
    pub value: ValueId,
    pub parent: Option<ProcId>,
    pub children: Vec<ProcId>,
    pub body: Option<NodeId>,
    pub flags: ProcFlags,
    pub link_name: Option<String>,

    pub params: Vec<ValueId>,
    pub blocks: Vec<BlockId>,
    pub decl_block: Option<BlockId>,
    pub entry_block: Option<BlockId>,
    pub curr_block: Option<BlockId>,

    pub scope_index: i32,
    pub defer_stmts: Vec<Defer>,
    pub target_lists: Vec<TargetList>,
    pub referrers: Vec<ValueId>,

    pub local_count: usize,
    pub instr_count: usize,
}

impl Procedure {
    pub fn new(name: impl Into<String>, entity: Option<EntityId>, ty: TypeId, value: ValueId) -> Self {
        Self {
            name: name.into(),
            entity,
            ty,
            value,
            parent: None,
            children: Vec::new(),
            body: None,
            flags: ProcFlags::empty(),
            link_name: None,
            params: Vec::new(),
            blocks: Vec::new(),
            decl_block: None,
            entry_block: None,
            curr_block: None,
            scope_index: 0,
            defer_stmts: Vec::new(),
            target_lists: Vec::new(),
            referrers: Vec::new(),
            local_count: 0,
            instr_count: 0,
        }
    }

    pub fn is_foreign(&self) -> bool {
        self.flags.contains(ProcFlags::FOREIGN)
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn target_list(&self) -> Option<&TargetList> {
        self.target_lists.last()
    }

    /// The innermost enclosing target with a `break` block, and so on.
    pub fn break_target(&self) -> Option<BlockId> {
        self.target_lists.iter().rev().find_map(|t| t.break_block)
    }

    pub fn continue_target(&self) -> Option<BlockId> {
        self.target_lists.iter().rev().find_map(|t| t.continue_block)
    }

    /// Only the innermost match clause can be fallen through.
    pub fn fallthrough_target(&self) -> Option<BlockId> {
        self.target_list().and_then(|t| t.fallthrough_block)
    }
}
