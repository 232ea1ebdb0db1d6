use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};

use odin_types::{EntityId, ExactValue, NodeId, TypeId};

use crate::ast::{ProcTags, TokenPos};

use super::ScopeId;

bitflags! {
    pub struct EntityFlags: u8 {
        const VISITED = 1 << 0;
        const USED = 1 << 1;
        /// Introduced through `using`.
        const ANONYMOUS = 1 << 2;
        const FIELD = 1 << 3;
        const PARAM = 1 << 4;
        const VECTOR_ELEM = 1 << 5;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EntityKind {
    Constant(ExactValue),
    Variable {
        field_index: usize,
        field_src_index: usize,
        /// Type-match variables.
        is_immutable: bool,
    },
    TypeName,
    Procedure {
        tags: ProcTags,
        foreign_library: Option<EntityId>,
        foreign_name: Option<String>,
        link_name: Option<String>,
    },
    Builtin(BuiltinId),
    ImportName {
        path: String,
        name: String,
        scope: ScopeId,
        used: bool,
    },
    LibraryName {
        path: String,
        name: String,
        used: bool,
    },
    Nil,
    ImplicitValue {
        id: ImplicitValueId,
        backing: Option<EntityId>,
    },
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Constant(_) => "constant",
            EntityKind::Variable { .. } => "variable",
            EntityKind::TypeName => "type name",
            EntityKind::Procedure { .. } => "procedure",
            EntityKind::Builtin(_) => "builtin procedure",
            EntityKind::ImportName { .. } => "import name",
            EntityKind::LibraryName { .. } => "library name",
            EntityKind::Nil => "nil",
            EntityKind::ImplicitValue { .. } => "implicit value",
        }
    }
}

/// One named thing: a constant, variable, type, procedure, import...
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub kind: EntityKind,
    pub flags: EntityFlags,
    pub name: String,
    pub pos: TokenPos,
    /// The scope that owns the entity. Set by the first insertion.
    pub scope: Option<ScopeId>,
    /// `None` until the entity's declaration has been checked.
    pub ty: Option<TypeId>,
    pub identifier: Option<NodeId>,
    pub using_parent: Option<EntityId>,
    pub using_expr: Option<NodeId>,
}

impl Entity {
    pub fn new(kind: EntityKind, name: impl Into<String>, pos: TokenPos, scope: Option<ScopeId>, ty: Option<TypeId>) -> Self {
        Self {
            kind,
            flags: EntityFlags::empty(),
            name: name.into(),
            pos,
            scope,
            ty,
            identifier: None,
            using_parent: None,
            using_expr: None,
        }
    }

    pub fn variable(name: impl Into<String>, pos: TokenPos, scope: Option<ScopeId>, ty: Option<TypeId>) -> Self {
        Self::new(
            EntityKind::Variable {
                field_index: 0,
                field_src_index: 0,
                is_immutable: false,
            },
            name,
            pos,
            scope,
            ty,
        )
    }

    pub fn with_identifier(mut self, id: NodeId) -> Self {
        self.identifier = Some(id);
        self
    }

    pub fn with_flags(mut self, flags: EntityFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.kind, EntityKind::Variable { .. })
    }

    pub fn is_type_name(&self) -> bool {
        matches!(self.kind, EntityKind::TypeName)
    }

    pub fn is_procedure(&self) -> bool {
        matches!(self.kind, EntityKind::Procedure { .. })
    }

    pub fn is_blank(&self) -> bool {
        self.name == "_"
    }

    pub fn is_used(&self) -> bool {
        self.flags.contains(EntityFlags::USED)
    }

    pub fn proc_tags(&self) -> ProcTags {
        match &self.kind {
            EntityKind::Procedure { tags, .. } => *tags,
            _ => ProcTags::empty(),
        }
    }

    pub fn is_foreign(&self) -> bool {
        self.proc_tags().contains(ProcTags::FOREIGN)
    }

    pub fn constant_value(&self) -> Option<&ExactValue> {
        match &self.kind {
            EntityKind::Constant(value) => Some(value),
            _ => None,
        }
    }
}

/// Whether a builtin may stand alone as a statement.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BuiltinUse {
    Expr,
    Stmt,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Hash, PartialEq, ToPrimitive)]
pub enum BuiltinId {
    Len,
    Cap,
    New,
    NewSlice,
    Free,
    Reserve,
    Clear,
    Append,
    SizeOf,
    SizeOfVal,
    AlignOf,
    AlignOfVal,
    OffsetOf,
    OffsetOfVal,
    TypeOfVal,
    TypeInfo,
    TypeInfoOfVal,
    CompileAssert,
    Assert,
    Panic,
    Copy,
    Swizzle,
    SlicePtr,
    Min,
    Max,
    Abs,
    Clamp,
    Transmute,
}

#[derive(Clone, Copy, Debug)]
pub struct BuiltinProc {
    pub id: BuiltinId,
    pub name: &'static str,
    pub arg_count: usize,
    pub variadic: bool,
    pub kind: BuiltinUse,
}

const fn builtin(id: BuiltinId, name: &'static str, arg_count: usize, variadic: bool, kind: BuiltinUse) -> BuiltinProc {
    BuiltinProc {
        id,
        name,
        arg_count,
        variadic,
        kind,
    }
}

pub static BUILTINS: [BuiltinProc; BuiltinId::COUNT] = [
    builtin(BuiltinId::Len, "len", 1, false, BuiltinUse::Expr),
    builtin(BuiltinId::Cap, "cap", 1, false, BuiltinUse::Expr),
    builtin(BuiltinId::New, "new", 1, false, BuiltinUse::Expr),
    builtin(BuiltinId::NewSlice, "new_slice", 2, true, BuiltinUse::Expr),
    builtin(BuiltinId::Free, "free", 1, false, BuiltinUse::Stmt),
    builtin(BuiltinId::Reserve, "reserve", 2, false, BuiltinUse::Stmt),
    builtin(BuiltinId::Clear, "clear", 1, false, BuiltinUse::Stmt),
    builtin(BuiltinId::Append, "append", 1, true, BuiltinUse::Expr),
    builtin(BuiltinId::SizeOf, "size_of", 1, false, BuiltinUse::Expr),
    builtin(BuiltinId::SizeOfVal, "size_of_val", 1, false, BuiltinUse::Expr),
    builtin(BuiltinId::AlignOf, "align_of", 1, false, BuiltinUse::Expr),
    builtin(BuiltinId::AlignOfVal, "align_of_val", 1, false, BuiltinUse::Expr),
    builtin(BuiltinId::OffsetOf, "offset_of", 2, false, BuiltinUse::Expr),
    builtin(BuiltinId::OffsetOfVal, "offset_of_val", 1, false, BuiltinUse::Expr),
    builtin(BuiltinId::TypeOfVal, "type_of_val", 1, false, BuiltinUse::Expr),
    builtin(BuiltinId::TypeInfo, "type_info", 1, false, BuiltinUse::Expr),
    builtin(BuiltinId::TypeInfoOfVal, "type_info_of_val", 1, false, BuiltinUse::Expr),
    builtin(BuiltinId::CompileAssert, "compile_assert", 1, false, BuiltinUse::Stmt),
    builtin(BuiltinId::Assert, "assert", 1, false, BuiltinUse::Stmt),
    builtin(BuiltinId::Panic, "panic", 1, false, BuiltinUse::Stmt),
    builtin(BuiltinId::Copy, "copy", 2, false, BuiltinUse::Expr),
    builtin(BuiltinId::Swizzle, "swizzle", 1, true, BuiltinUse::Expr),
    builtin(BuiltinId::SlicePtr, "slice_ptr", 2, true, BuiltinUse::Expr),
    builtin(BuiltinId::Min, "min", 2, false, BuiltinUse::Expr),
    builtin(BuiltinId::Max, "max", 2, false, BuiltinUse::Expr),
    builtin(BuiltinId::Abs, "abs", 1, false, BuiltinUse::Expr),
    builtin(BuiltinId::Clamp, "clamp", 3, false, BuiltinUse::Expr),
    builtin(BuiltinId::Transmute, "transmute", 2, false, BuiltinUse::Expr),
];

impl BuiltinId {
    pub const COUNT: usize = BuiltinId::Transmute as usize + 1;

    pub fn info(self) -> &'static BuiltinProc {
        &BUILTINS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn iter() -> impl Iterator<Item = BuiltinId> {
        (0..Self::COUNT as u8).filter_map(num_traits::FromPrimitive::from_u8)
    }
}

/// Values the compiler passes around implicitly.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ImplicitValueId {
    Context,
}

impl ImplicitValueId {
    pub fn name(self) -> &'static str {
        match self {
            ImplicitValueId::Context => "context",
        }
    }

    /// The global that holds the value.
    pub fn backing_name(self) -> &'static str {
        match self {
            ImplicitValueId::Context => "__context",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_matches_ids() {
        for id in BuiltinId::iter() {
            assert_eq!(id.info().id, id);
        }
        assert_eq!(BuiltinId::iter().count(), BuiltinId::COUNT);
        assert_eq!(BuiltinId::Clamp.info().arg_count, 3);
        assert!(BuiltinId::NewSlice.info().variadic);
    }
}
