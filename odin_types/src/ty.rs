use crate::{EntityId, TypeId};

#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    Basic(crate::BasicKind),
    Named(NamedType),
    Pointer(TypeId),
    Array { elem: TypeId, count: i64 },
    Slice(TypeId),
    DynamicArray(TypeId),
    Vector { elem: TypeId, count: i64 },
    Record(Record),
    /// Multiple return values and parameter lists.
    Tuple(Vec<Field>),
    Proc(ProcType),
}

/// A type with an identity. `base` stays `None` while the declaration
/// that introduces the name is still being checked, which is what lets a
/// type refer to itself through a pointer.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedType {
    pub name: String,
    pub base: Option<TypeId>,
    pub type_name: Option<EntityId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: TypeId,
    /// Introduced with `using`; its own fields are reachable from the
    /// enclosing record.
    pub anonymous: bool,
    pub entity: Option<EntityId>,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        Self {
            name: name.into(),
            ty,
            anonymous: false,
            entity: None,
        }
    }

    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }

    pub fn with_entity(mut self, entity: EntityId) -> Self {
        self.entity = Some(entity);
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RecordKind {
    Struct,
    /// Tagged union. Its fields are the variants; variant `i` is stored
    /// with tag `i + 1` and tag `0` means "no variant".
    Union,
    RawUnion,
    Enum,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub kind: RecordKind,
    pub fields: Vec<Field>,
    /// Enum only, parallel to `fields`.
    pub enum_values: Vec<i128>,
    pub enum_base: Option<TypeId>,
    pub is_packed: bool,
    pub is_ordered: bool,
}

impl Record {
    pub fn new(kind: RecordKind, fields: Vec<Field>) -> Self {
        Self {
            kind,
            fields,
            enum_values: Vec::new(),
            enum_base: None,
            is_packed: false,
            is_ordered: false,
        }
    }

    pub fn new_enum(base: TypeId, fields: Vec<Field>, values: Vec<i128>) -> Self {
        Self {
            kind: RecordKind::Enum,
            fields,
            enum_values: values,
            enum_base: Some(base),
            is_packed: false,
            is_ordered: false,
        }
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CallingConvention {
    Odin,
    C,
    Std,
    Fast,
}

impl Default for CallingConvention {
    fn default() -> Self {
        Self::Odin
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProcType {
    /// Always a [`Type::Tuple`], possibly empty.
    pub params: TypeId,
    /// Always a [`Type::Tuple`], possibly empty.
    pub results: TypeId,
    pub variadic: bool,
    pub calling_convention: CallingConvention,
}
