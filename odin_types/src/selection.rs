//! Field lookup through embedding.
//!
//! A lookup produces an index *path* rather than a single index: each
//! step selects a field of the record reached so far, so a field promoted
//! through several levels of `using` is reached by walking the path.

use crate::{
    exact_value::ExactValue,
    ty::{Field, RecordKind, Type},
    EntityId, TypeId, Types,
};

#[derive(Clone, Debug, PartialEq)]
pub enum SelectionKind {
    Field,
    /// `array.count`, `vector.count`, `Enum.Value`, `Enum.count`.
    Constant(ExactValue),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    pub kind: SelectionKind,
    pub ty: TypeId,
    pub index: Vec<usize>,
    /// Some step of the path goes through a pointer.
    pub indirect: bool,
    pub entity: Option<EntityId>,
}

impl Selection {
    fn field(ty: TypeId, index: usize) -> Self {
        Self {
            kind: SelectionKind::Field,
            ty,
            index: vec![index],
            indirect: false,
            entity: None,
        }
    }

    fn constant(ty: TypeId, value: ExactValue) -> Self {
        Self {
            kind: SelectionKind::Constant(value),
            ty,
            index: Vec::new(),
            indirect: false,
            entity: None,
        }
    }

    pub fn is_field(&self) -> bool {
        self.kind == SelectionKind::Field
    }
}

const VECTOR_ELEMS: [&str; 4] = ["x", "y", "z", "w"];

impl Types {
    /// Looks `name` up on a value of type `ty` or, when `is_type` is set,
    /// on the type itself (enum constants).
    pub fn lookup_field(&mut self, ty: TypeId, name: &str, is_type: bool) -> Option<Selection> {
        if name == "_" {
            return None;
        }

        let derefed = self.deref(ty);
        let indirect = derefed != ty;
        let base = self.base_type(derefed);

        if is_type {
            return self.lookup_type_field(derefed, base, name);
        }

        let mut sel = match self.get(base).clone() {
            Type::Basic(kind) => match (kind, name) {
                (crate::BasicKind::Any, "type_info") => {
                    let ty = self.type_info_ptr();
                    Some(Selection::field(ty, 0))
                },
                (crate::BasicKind::Any, "data") => Some(Selection::field(TypeId::RAWPTR, 1)),
                (crate::BasicKind::String, "data") => {
                    let ty = self.make_pointer(TypeId::U8);
                    Some(Selection::field(ty, 0))
                },
                (crate::BasicKind::String, "count") => Some(Selection::field(TypeId::INT, 1)),
                _ => None,
            },

            Type::Array { count, .. } if name == "count" => {
                Some(Selection::constant(TypeId::UNTYPED_INTEGER, ExactValue::Integer(count as i128)))
            },

            Type::Vector { elem, count } => {
                if name == "count" {
                    Some(Selection::constant(
                        TypeId::UNTYPED_INTEGER,
                        ExactValue::Integer(count as i128),
                    ))
                } else {
                    VECTOR_ELEMS
                        .iter()
                        .take(count.max(0) as usize)
                        .position(|&n| n == name)
                        .map(|i| Selection::field(elem, i))
                }
            },

            Type::Slice(elem) => match name {
                "data" => {
                    let ty = self.make_pointer(elem);
                    Some(Selection::field(ty, 0))
                },
                "count" => Some(Selection::field(TypeId::INT, 1)),
                "capacity" => Some(Selection::field(TypeId::INT, 2)),
                _ => None,
            },

            Type::DynamicArray(elem) => match name {
                "data" => {
                    let ty = self.make_pointer(elem);
                    Some(Selection::field(ty, 0))
                },
                "count" => Some(Selection::field(TypeId::INT, 1)),
                "capacity" => Some(Selection::field(TypeId::INT, 2)),
                "allocator" => self.well_known.allocator.map(|a| Selection::field(a, 3)),
                _ => None,
            },

            Type::Record(record) if record.kind == RecordKind::Struct || record.kind == RecordKind::RawUnion => {
                self.lookup_record_field(&record.fields, name)
            },

            Type::Tuple(fields) => fields
                .iter()
                .position(|f| !f.name.is_empty() && f.name == name)
                .map(|i| Selection {
                    entity: fields[i].entity,
                    ..Selection::field(fields[i].ty, i)
                }),

            _ => None,
        }?;

        sel.indirect |= indirect;
        Some(sel)
    }

    fn lookup_type_field(&self, ty: TypeId, base: TypeId, name: &str) -> Option<Selection> {
        let record = self.record(base)?;
        if record.kind != RecordKind::Enum {
            return None;
        }

        if name == "count" {
            return Some(Selection::constant(
                TypeId::UNTYPED_INTEGER,
                ExactValue::Integer(record.fields.len() as i128),
            ));
        }

        let index = record.field_index(name)?;
        let value = record.enum_values.get(index).copied().unwrap_or(index as i128);
        Some(Selection {
            entity: record.fields[index].entity,
            ..Selection::constant(ty, ExactValue::Integer(value))
        })
    }

    /// Direct fields win over promoted ones; promoted fields are searched
    /// in declaration order, depth first.
    fn lookup_record_field(&mut self, fields: &[Field], name: &str) -> Option<Selection> {
        if let Some(i) = fields.iter().position(|f| f.name == name) {
            return Some(Selection {
                entity: fields[i].entity,
                ..Selection::field(fields[i].ty, i)
            });
        }

        for (i, field) in fields.iter().enumerate() {
            if !field.anonymous {
                continue;
            }

            if let Some(mut sel) = self.lookup_field(field.ty, name, false) {
                if sel.is_field() {
                    sel.index.insert(0, i);
                    sel.indirect |= self.is_pointer(field.ty);
                    return Some(sel);
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::Record;

    #[test]
    fn slice_fields_carry_capacity() {
        let mut types = Types::new();
        let slice = types.make_slice(TypeId::INT);
        let cap = types.lookup_field(slice, "capacity", false).unwrap();
        assert_eq!(cap.index, vec![2]);
        assert_eq!(cap.ty, TypeId::INT);
        let data = types.lookup_field(slice, "data", false).unwrap();
        assert_eq!(types.get(data.ty), &Type::Pointer(TypeId::INT));
    }

    #[test]
    fn array_count_is_constant() {
        let mut types = Types::new();
        let array = types.make_array(TypeId::INT, 5);
        let sel = types.lookup_field(array, "count", false).unwrap();
        assert_eq!(sel.kind, SelectionKind::Constant(ExactValue::Integer(5)));
    }

    #[test]
    fn vector_lanes_are_bounded_by_count() {
        let mut types = Types::new();
        let v2 = types.make_vector(TypeId::F64, 2);
        assert_eq!(types.lookup_field(v2, "y", false).unwrap().index, vec![1]);
        assert!(types.lookup_field(v2, "z", false).is_none());
    }

    #[test]
    fn promoted_fields_build_a_path() {
        let mut types = Types::new();
        let inner = types.make_record(Record::new(
            RecordKind::Struct,
            vec![Field::new("a", TypeId::INT), Field::new("b", TypeId::BOOL)],
        ));
        let inner_ptr = types.make_pointer(inner);
        let outer = types.make_record(Record::new(
            RecordKind::Struct,
            vec![
                Field::new("x", TypeId::F64),
                Field::new("by_value", inner).anonymous(),
            ],
        ));
        let sel = types.lookup_field(outer, "b", false).unwrap();
        assert_eq!(sel.index, vec![1, 1]);
        assert!(!sel.indirect);

        let through_ptr = types.make_record(Record::new(
            RecordKind::Struct,
            vec![Field::new("p", inner_ptr).anonymous()],
        ));
        let sel = types.lookup_field(through_ptr, "a", false).unwrap();
        assert_eq!(sel.index, vec![0, 0]);
        assert!(sel.indirect);
    }

    #[test]
    fn enum_constants_on_the_type() {
        let mut types = Types::new();
        let e = types.make_record(Record::new_enum(
            TypeId::INT,
            vec![Field::new("A", TypeId::INT), Field::new("B", TypeId::INT)],
            vec![0, 7],
        ));
        let named = types.make_named("E", Some(e), None);
        let sel = types.lookup_field(named, "B", true).unwrap();
        assert_eq!(sel.kind, SelectionKind::Constant(ExactValue::Integer(7)));
        assert_eq!(sel.ty, named);
        assert!(types.lookup_field(named, "B", false).is_none());
    }
}
