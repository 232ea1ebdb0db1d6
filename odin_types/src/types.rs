use std::collections::HashMap;

use crate::{
    basic::{BasicFlags, BasicKind},
    ty::{CallingConvention, Field, NamedType, ProcType, Record, RecordKind, Type},
    EntityId, TypeId,
};

/// Types the runtime support library declares and the checker looks up by
/// name once they exist.
#[derive(Clone, Copy, Debug, Default)]
pub struct WellKnown {
    pub type_info: Option<TypeId>,
    pub type_info_member: Option<TypeId>,
    pub allocator: Option<TypeId>,
    pub context: Option<TypeId>,
}

/// Holds every type of a compilation.
///
/// Types are never removed. The only in-place mutation is back-filling
/// the base of a [`NamedType`] once its declaration has been checked.
#[derive(Clone, Debug)]
pub struct Types {
    types: Vec<Type>,
    pointers: HashMap<TypeId, TypeId>,
    slices: HashMap<TypeId, TypeId>,
    empty_tuple: TypeId,
    pub well_known: WellKnown,
}

impl Default for Types {
    fn default() -> Self {
        Self::new()
    }
}

impl Types {
    pub fn new() -> Self {
        let mut types: Vec<Type> = BasicKind::iter().map(Type::Basic).collect();
        let empty_tuple = TypeId(types.len() as u32);
        types.push(Type::Tuple(Vec::new()));

        Self {
            types,
            pointers: HashMap::new(),
            slices: HashMap::new(),
            empty_tuple,
            well_known: WellKnown::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn add(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &Type)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, ty)| (TypeId(i as u32), ty))
    }

    pub fn make_pointer(&mut self, elem: TypeId) -> TypeId {
        if let Some(&ptr) = self.pointers.get(&elem) {
            return ptr;
        }

        let ptr = self.add(Type::Pointer(elem));
        self.pointers.insert(elem, ptr);
        ptr
    }

    pub fn make_slice(&mut self, elem: TypeId) -> TypeId {
        if let Some(&slice) = self.slices.get(&elem) {
            return slice;
        }

        let slice = self.add(Type::Slice(elem));
        self.slices.insert(elem, slice);
        slice
    }

    pub fn make_array(&mut self, elem: TypeId, count: i64) -> TypeId {
        self.add(Type::Array { elem, count })
    }

    pub fn make_vector(&mut self, elem: TypeId, count: i64) -> TypeId {
        self.add(Type::Vector { elem, count })
    }

    pub fn make_dynamic_array(&mut self, elem: TypeId) -> TypeId {
        self.add(Type::DynamicArray(elem))
    }

    pub fn make_tuple(&mut self, fields: Vec<Field>) -> TypeId {
        if fields.is_empty() {
            return self.empty_tuple;
        }

        self.add(Type::Tuple(fields))
    }

    pub fn empty_tuple(&self) -> TypeId {
        self.empty_tuple
    }

    pub fn make_record(&mut self, record: Record) -> TypeId {
        self.add(Type::Record(record))
    }

    pub fn make_named(&mut self, name: impl Into<String>, base: Option<TypeId>, type_name: Option<EntityId>) -> TypeId {
        self.add(Type::Named(NamedType {
            name: name.into(),
            base,
            type_name,
        }))
    }

    /// Sets the base of a named type. Only the first call has an effect.
    pub fn set_named_base(&mut self, named: TypeId, base: TypeId) {
        if let Type::Named(n) = &mut self.types[named.index()] {
            if n.base.is_none() {
                n.base = Some(base);
            }
        }
    }

    pub fn make_proc(
        &mut self,
        params: Vec<Field>,
        results: Vec<Field>,
        variadic: bool,
        calling_convention: CallingConvention,
    ) -> TypeId {
        let params = self.make_tuple(params);
        let results = self.make_tuple(results);
        self.add(Type::Proc(ProcType {
            params,
            results,
            variadic,
            calling_convention,
        }))
    }

    /// `(T, bool)`, the result of a `union_cast`.
    pub fn make_optional_ok(&mut self, ty: TypeId) -> TypeId {
        self.make_tuple(vec![Field::new("", ty), Field::new("", TypeId::BOOL)])
    }

    pub fn type_info_ptr(&mut self) -> TypeId {
        match self.well_known.type_info {
            Some(type_info) => self.make_pointer(type_info),
            None => TypeId::RAWPTR,
        }
    }

    /// Follows named types to the underlying structural type. An unresolved
    /// or self-referential chain yields [`TypeId::INVALID`].
    pub fn base_type(&self, mut ty: TypeId) -> TypeId {
        for _ in 0..=self.types.len() {
            match self.get(ty) {
                Type::Named(NamedType { base: Some(base), .. }) if *base != ty => ty = *base,
                Type::Named(_) => return TypeId::INVALID,
                _ => return ty,
            }
        }

        TypeId::INVALID
    }

    /// Like [`base_type`](Self::base_type), but also looks through enums.
    pub fn core_type(&self, ty: TypeId) -> TypeId {
        let base = self.base_type(ty);
        match self.get(base) {
            Type::Record(Record {
                kind: RecordKind::Enum,
                enum_base: Some(enum_base),
                ..
            }) => self.base_type(*enum_base),
            _ => base,
        }
    }

    /// The pointee of a pointer type, or the type itself.
    pub fn deref(&self, ty: TypeId) -> TypeId {
        match self.get(self.base_type(ty)) {
            Type::Pointer(elem) => *elem,
            _ => ty,
        }
    }

    pub fn record(&self, ty: TypeId) -> Option<&Record> {
        match self.get(self.base_type(ty)) {
            Type::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn tuple(&self, ty: TypeId) -> Option<&[Field]> {
        match self.get(self.base_type(ty)) {
            Type::Tuple(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn proc_type(&self, ty: TypeId) -> Option<&ProcType> {
        match self.get(self.base_type(ty)) {
            Type::Proc(proc_type) => Some(proc_type),
            _ => None,
        }
    }

    /// The element type of pointers, arrays, slices, dynamic arrays and
    /// vectors.
    pub fn elem(&self, ty: TypeId) -> Option<TypeId> {
        match self.get(self.base_type(ty)) {
            Type::Pointer(elem)
            | Type::Slice(elem)
            | Type::DynamicArray(elem)
            | Type::Array { elem, .. }
            | Type::Vector { elem, .. } => Some(*elem),
            _ => None,
        }
    }

    pub fn named_entity(&self, ty: TypeId) -> Option<EntityId> {
        match self.get(ty) {
            Type::Named(n) => n.type_name,
            _ => None,
        }
    }

    pub fn basic_kind(&self, ty: TypeId) -> Option<BasicKind> {
        match self.get(self.core_type(ty)) {
            Type::Basic(kind) => Some(*kind),
            _ => None,
        }
    }

    fn basic_flags(&self, ty: TypeId) -> BasicFlags {
        self.basic_kind(ty).map_or(BasicFlags::empty(), BasicKind::flags)
    }

    pub fn is_invalid(&self, ty: TypeId) -> bool {
        self.base_type(ty) == TypeId::INVALID
    }

    pub fn is_named(&self, ty: TypeId) -> bool {
        matches!(self.get(ty), Type::Named(_))
    }

    pub fn is_untyped(&self, ty: TypeId) -> bool {
        matches!(self.get(self.base_type(ty)), Type::Basic(kind) if kind.is_untyped())
    }

    pub fn is_typed(&self, ty: TypeId) -> bool {
        !self.is_untyped(ty)
    }

    pub fn is_untyped_nil(&self, ty: TypeId) -> bool {
        self.base_type(ty) == TypeId::UNTYPED_NIL
    }

    pub fn is_boolean(&self, ty: TypeId) -> bool {
        self.basic_flags(ty).contains(BasicFlags::BOOLEAN)
    }

    pub fn is_integer(&self, ty: TypeId) -> bool {
        self.basic_flags(ty).contains(BasicFlags::INTEGER)
    }

    pub fn is_unsigned(&self, ty: TypeId) -> bool {
        self.basic_flags(ty).contains(BasicFlags::UNSIGNED)
    }

    pub fn is_float(&self, ty: TypeId) -> bool {
        self.basic_flags(ty).contains(BasicFlags::FLOAT)
    }

    pub fn is_numeric(&self, ty: TypeId) -> bool {
        self.basic_flags(ty).intersects(BasicFlags::NUMERIC)
    }

    pub fn is_string(&self, ty: TypeId) -> bool {
        self.basic_flags(ty).contains(BasicFlags::STRING)
    }

    pub fn is_rune(&self, ty: TypeId) -> bool {
        self.basic_flags(ty).contains(BasicFlags::RUNE)
    }

    pub fn is_ordered(&self, ty: TypeId) -> bool {
        self.basic_flags(ty).intersects(BasicFlags::ORDERED)
    }

    pub fn is_constant_type(&self, ty: TypeId) -> bool {
        self.basic_flags(ty).intersects(BasicFlags::CONSTANT_TYPE)
    }

    pub fn is_rawptr(&self, ty: TypeId) -> bool {
        self.base_type(ty) == TypeId::RAWPTR
    }

    pub fn is_any(&self, ty: TypeId) -> bool {
        self.base_type(ty) == TypeId::ANY
    }

    pub fn is_pointer(&self, ty: TypeId) -> bool {
        matches!(self.get(self.base_type(ty)), Type::Pointer(_))
    }

    pub fn is_array(&self, ty: TypeId) -> bool {
        matches!(self.get(self.base_type(ty)), Type::Array { .. })
    }

    pub fn is_vector(&self, ty: TypeId) -> bool {
        matches!(self.get(self.base_type(ty)), Type::Vector { .. })
    }

    pub fn is_slice(&self, ty: TypeId) -> bool {
        matches!(self.get(self.base_type(ty)), Type::Slice(_))
    }

    pub fn is_dynamic_array(&self, ty: TypeId) -> bool {
        matches!(self.get(self.base_type(ty)), Type::DynamicArray(_))
    }

    pub fn is_tuple(&self, ty: TypeId) -> bool {
        matches!(self.get(self.base_type(ty)), Type::Tuple(_))
    }

    pub fn is_proc(&self, ty: TypeId) -> bool {
        matches!(self.get(self.base_type(ty)), Type::Proc(_))
    }

    fn is_record_kind(&self, ty: TypeId, kind: RecordKind) -> bool {
        self.record(ty).map_or(false, |r| r.kind == kind)
    }

    pub fn is_struct(&self, ty: TypeId) -> bool {
        self.is_record_kind(ty, RecordKind::Struct)
    }

    pub fn is_union(&self, ty: TypeId) -> bool {
        self.is_record_kind(ty, RecordKind::Union)
    }

    pub fn is_raw_union(&self, ty: TypeId) -> bool {
        self.is_record_kind(ty, RecordKind::RawUnion)
    }

    pub fn is_enum(&self, ty: TypeId) -> bool {
        self.is_record_kind(ty, RecordKind::Enum)
    }

    /// Types that can be the operand of `==` and `!=`.
    pub fn is_comparable(&self, ty: TypeId) -> bool {
        let base = self.base_type(ty);
        match self.get(base) {
            Type::Basic(kind) => *kind != BasicKind::Any && *kind != BasicKind::Invalid,
            Type::Pointer(_) | Type::Proc(_) => true,
            Type::Record(record) => record.kind == RecordKind::Enum,
            Type::Vector { elem, .. } => self.is_comparable(*elem),
            _ => false,
        }
    }

    /// Types that `nil` can be assigned to.
    pub fn has_nil(&self, ty: TypeId) -> bool {
        match self.get(self.base_type(ty)) {
            Type::Basic(kind) => matches!(kind, BasicKind::Rawptr | BasicKind::Any | BasicKind::UntypedNil),
            Type::Pointer(_) | Type::Slice(_) | Type::DynamicArray(_) | Type::Proc(_) => true,
            Type::Record(record) => record.kind == RecordKind::Union,
            _ => false,
        }
    }

    /// The tag stored for `variant` in `union_ty`, if it is one of its
    /// variants.
    pub fn union_tag_of(&self, union_ty: TypeId, variant: TypeId) -> Option<i64> {
        let record = self.record(union_ty)?;
        if record.kind != RecordKind::Union {
            return None;
        }

        record
            .fields
            .iter()
            .position(|f| self.are_types_identical(f.ty, variant))
            .map(|i| i as i64 + 1)
    }

    /// Structural type identity. Named types are identical only when they
    /// come from the same declaration, so the comparison never recurses
    /// into a named type's base.
    pub fn are_types_identical(&self, x: TypeId, y: TypeId) -> bool {
        if x == y {
            return true;
        }

        match (self.get(x), self.get(y)) {
            (Type::Basic(a), Type::Basic(b)) => a == b,

            (Type::Named(a), Type::Named(b)) => match (a.type_name, b.type_name) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },

            (Type::Pointer(a), Type::Pointer(b))
            | (Type::Slice(a), Type::Slice(b))
            | (Type::DynamicArray(a), Type::DynamicArray(b)) => self.are_types_identical(*a, *b),

            (
                Type::Array {
                    elem: a,
                    count: count_a,
                },
                Type::Array {
                    elem: b,
                    count: count_b,
                },
            )
            | (
                Type::Vector {
                    elem: a,
                    count: count_a,
                },
                Type::Vector {
                    elem: b,
                    count: count_b,
                },
            ) => count_a == count_b && self.are_types_identical(*a, *b),

            (Type::Record(a), Type::Record(b)) => {
                if a.kind != b.kind || a.kind == RecordKind::Enum {
                    // Every enum declaration is its own type.
                    return false;
                }

                a.is_packed == b.is_packed
                    && a.is_ordered == b.is_ordered
                    && self.fields_identical(&a.fields, &b.fields, true)
            },

            (Type::Tuple(a), Type::Tuple(b)) => self.fields_identical(a, b, false),

            (Type::Proc(a), Type::Proc(b)) => {
                a.calling_convention == b.calling_convention
                    && a.variadic == b.variadic
                    && self.are_types_identical(a.params, b.params)
                    && self.are_types_identical(a.results, b.results)
            },

            _ => false,
        }
    }

    fn fields_identical(&self, a: &[Field], b: &[Field], compare_names: bool) -> bool {
        a.len() == b.len()
            && a.iter().zip(b).all(|(fa, fb)| {
                (!compare_names || fa.name == fb.name) && self.are_types_identical(fa.ty, fb.ty)
            })
    }

    /// The concrete type an untyped constant takes by default.
    pub fn default_type(&self, ty: TypeId) -> TypeId {
        match self.get(ty) {
            Type::Basic(kind) => TypeId::basic(kind.default_kind()),
            _ => ty,
        }
    }

    pub fn type_to_string(&self, ty: TypeId) -> String {
        self.write_type(ty, 0)
    }

    fn write_type(&self, ty: TypeId, depth: usize) -> String {
        // Anonymous records can nest arbitrarily deep; named types stop
        // the recursion.
        if depth > 32 {
            return "...".to_owned();
        }

        let fields_to_string = |fields: &[Field]| {
            fields
                .iter()
                .map(|f| {
                    let ty = self.write_type(f.ty, depth + 1);
                    if f.name.is_empty() {
                        ty
                    } else if f.anonymous {
                        format!("using {}: {}", f.name, ty)
                    } else {
                        format!("{}: {}", f.name, ty)
                    }
                })
                .collect::<Vec<_>>()
                .join(", ")
        };

        match self.get(ty) {
            Type::Basic(kind) => kind.name().to_owned(),
            Type::Named(n) => n.name.clone(),
            Type::Pointer(elem) => format!("^{}", self.write_type(*elem, depth + 1)),
            Type::Array { elem, count } => format!("[{}]{}", count, self.write_type(*elem, depth + 1)),
            Type::Slice(elem) => format!("[]{}", self.write_type(*elem, depth + 1)),
            Type::DynamicArray(elem) => format!("[dynamic]{}", self.write_type(*elem, depth + 1)),
            Type::Vector { elem, count } => format!("[vector {}]{}", count, self.write_type(*elem, depth + 1)),

            Type::Record(record) => match record.kind {
                RecordKind::Struct => {
                    let mut res = "struct ".to_owned();
                    if record.is_packed {
                        res.push_str("#packed ");
                    }
                    if record.is_ordered {
                        res.push_str("#ordered ");
                    }
                    format!("{}{{{}}}", res, fields_to_string(&record.fields))
                },
                RecordKind::Union => format!("union {{{}}}", fields_to_string(&record.fields)),
                RecordKind::RawUnion => format!("raw_union {{{}}}", fields_to_string(&record.fields)),
                RecordKind::Enum => {
                    let base = record
                        .enum_base
                        .map_or_else(|| "int".to_owned(), |b| self.write_type(b, depth + 1));
                    let names = record
                        .fields
                        .iter()
                        .map(|f| f.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("enum {} {{{}}}", base, names)
                },
            },

            Type::Tuple(fields) => format!("({})", fields_to_string(fields)),

            Type::Proc(proc_type) => {
                let params = self.tuple(proc_type.params).map(|p| p.to_vec()).unwrap_or_default();
                let results = self.tuple(proc_type.results).map(|r| r.to_vec()).unwrap_or_default();
                let mut res = format!("proc({})", fields_to_string(&params));
                match results.len() {
                    0 => {},
                    1 => {
                        res.push_str(" -> ");
                        res.push_str(&self.write_type(results[0].ty, depth + 1));
                    },
                    _ => {
                        res.push_str(" -> (");
                        res.push_str(&fields_to_string(&results));
                        res.push(')');
                    },
                }
                res
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basics_have_fixed_ids() {
        let types = Types::new();
        for kind in BasicKind::iter() {
            assert_eq!(types.get(TypeId::basic(kind)), &Type::Basic(kind));
        }
    }

    #[test]
    fn pointers_and_slices_are_interned() {
        let mut types = Types::new();
        let a = types.make_pointer(TypeId::INT);
        let b = types.make_pointer(TypeId::INT);
        assert_eq!(a, b);
        let s = types.make_slice(TypeId::U8);
        assert_eq!(s, types.make_slice(TypeId::U8));
        assert_ne!(a, s);
    }

    #[test]
    fn base_type_of_unresolved_named_is_invalid() {
        let mut types = Types::new();
        let named = types.make_named("Foo", None, None);
        assert_eq!(types.base_type(named), TypeId::INVALID);
        types.set_named_base(named, TypeId::INT);
        assert_eq!(types.base_type(named), TypeId::INT);
        // Second back-fill is ignored.
        types.set_named_base(named, TypeId::BOOL);
        assert_eq!(types.base_type(named), TypeId::INT);
    }

    #[test]
    fn self_loop_is_invalid() {
        let mut types = Types::new();
        let named = types.make_named("Loop", None, None);
        types.set_named_base(named, named);
        assert_eq!(types.base_type(named), TypeId::INVALID);
    }

    #[test]
    fn default_types() {
        let types = Types::new();
        assert_eq!(types.default_type(TypeId::UNTYPED_INTEGER), TypeId::INT);
        assert_eq!(types.default_type(TypeId::UNTYPED_FLOAT), TypeId::F64);
        assert_eq!(types.default_type(TypeId::UNTYPED_BOOL), TypeId::BOOL);
        assert_eq!(types.default_type(TypeId::UNTYPED_STRING), TypeId::STRING);
        assert_eq!(types.default_type(TypeId::UNTYPED_RUNE), TypeId::I32);
        assert_eq!(types.default_type(TypeId::UNTYPED_NIL), TypeId::UNTYPED_NIL);
    }

    #[test]
    fn structs_compare_structurally() {
        let mut types = Types::new();
        let a = types.make_record(Record::new(RecordKind::Struct, vec![Field::new("x", TypeId::INT)]));
        let b = types.make_record(Record::new(RecordKind::Struct, vec![Field::new("x", TypeId::INT)]));
        let c = types.make_record(Record::new(RecordKind::Struct, vec![Field::new("y", TypeId::INT)]));
        assert!(types.are_types_identical(a, b));
        assert!(!types.are_types_identical(a, c));
    }

    #[test]
    fn enums_are_unique() {
        let mut types = Types::new();
        let fields = vec![Field::new("A", TypeId::INT)];
        let a = types.make_record(Record::new_enum(TypeId::INT, fields.clone(), vec![0]));
        let b = types.make_record(Record::new_enum(TypeId::INT, fields, vec![0]));
        assert!(types.are_types_identical(a, a));
        assert!(!types.are_types_identical(a, b));
    }

    #[test]
    fn named_types_compare_by_entity() {
        let mut types = Types::new();
        let shape = types.make_record(Record::new(RecordKind::Struct, vec![Field::new("x", TypeId::INT)]));
        let a = types.make_named("A", Some(shape), Some(EntityId::new(1)));
        let b = types.make_named("B", Some(shape), Some(EntityId::new(2)));
        let a_again = types.make_named("A", Some(shape), Some(EntityId::new(1)));
        assert!(!types.are_types_identical(a, b));
        assert!(types.are_types_identical(a, a_again));
    }

    #[test]
    fn union_tags_start_at_one() {
        let mut types = Types::new();
        let u = types.make_record(Record::new(
            RecordKind::Union,
            vec![Field::new("A", TypeId::INT), Field::new("B", TypeId::F64)],
        ));
        assert_eq!(types.union_tag_of(u, TypeId::INT), Some(1));
        assert_eq!(types.union_tag_of(u, TypeId::F64), Some(2));
        assert_eq!(types.union_tag_of(u, TypeId::BOOL), None);
    }

    #[test]
    fn printing() {
        let mut types = Types::new();
        let ptr = types.make_pointer(TypeId::U8);
        let slice = types.make_slice(ptr);
        assert_eq!(types.type_to_string(slice), "[]^u8");
        let p = types.make_proc(vec![Field::new("x", TypeId::INT)], vec![Field::new("", TypeId::BOOL)], false, CallingConvention::Odin);
        assert_eq!(types.type_to_string(p), "proc(x: int) -> bool");
    }
}
