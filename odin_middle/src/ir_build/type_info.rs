//! The run-time `type_info` table.
//!
//! Every type the checker registered has a slot in one global array of
//! `Type_Info`. Record and tuple members live in a second array that the
//! `members` slices of the entries point into. The startup procedure fills
//! both.

use odin_ir::{GlobalFlags, Value, ValueId, TYPE_INFO_DATA_MEMBER_NAME, TYPE_INFO_DATA_NAME};
use odin_types::{BasicKind, Field, RecordKind, Type, TypeId};

use super::{Addr, IrBuilder, IrError};

/// The variant of `Type_Info` that describes a type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TypeInfoKind {
    Named,
    Integer,
    Float,
    String,
    Boolean,
    Any,
    Pointer,
    Procedure,
    Array,
    DynamicArray,
    Slice,
    Vector,
    Tuple,
    Struct,
    Union,
    RawUnion,
    Enum,
}

impl TypeInfoKind {
    fn name(self) -> &'static str {
        match self {
            Self::Named => "Named",
            Self::Integer => "Integer",
            Self::Float => "Float",
            Self::String => "String",
            Self::Boolean => "Boolean",
            Self::Any => "Any",
            Self::Pointer => "Pointer",
            Self::Procedure => "Procedure",
            Self::Array => "Array",
            Self::DynamicArray => "DynamicArray",
            Self::Slice => "Slice",
            Self::Vector => "Vector",
            Self::Tuple => "Tuple",
            Self::Struct => "Struct",
            Self::Union => "Union",
            Self::RawUnion => "RawUnion",
            Self::Enum => "Enum",
        }
    }
}

impl<'a> IrBuilder<'a> {
    /// Declares the two table arrays. Programs without a `Type_Info`
    /// declaration get no table.
    pub(super) fn add_type_info_globals(&mut self) -> Result<(), IrError> {
        let well_known = self.types().well_known;
        let (type_info, member) = match (well_known.type_info, well_known.type_info_member) {
            (Some(type_info), Some(member)) => (type_info, member),
            (None, _) => {
                odin_log::debug!("no `Type_Info` declaration, skipping the type_info table");
                return Ok(());
            },
            (Some(_), None) => return Err(IrError::MissingTypeInfo("Type_Info_Member".to_owned())),
        };

        let member_count: usize = self
            .type_info_entries()
            .into_iter()
            .map(|(_, ty)| self.members_of(ty).map_or(0, |m| m.len()))
            .sum();

        let count = self.info.type_info_count as i64;
        let data_ty = self.types_mut().make_array(type_info, count);
        let data = self.module.add_global(TYPE_INFO_DATA_NAME, None, data_ty, None);
        let member_ty = self.types_mut().make_array(member, member_count as i64);
        let members = self.module.add_global(TYPE_INFO_DATA_MEMBER_NAME, None, member_ty, None);

        for global in [data, members] {
            if let Value::Global(g) = self.module.value_mut(global) {
                g.flags |= GlobalFlags::PRIVATE;
            }
        }

        odin_log::trace!("type_info table: {} entries, {} members", count, member_count);
        Ok(())
    }

    /// One type per table slot, in slot order.
    fn type_info_entries(&self) -> Vec<(usize, TypeId)> {
        let mut entries: Vec<(usize, TypeId)> = Vec::with_capacity(self.info.type_info_count);
        for (&ty, &index) in &self.info.type_info_map {
            if !entries.iter().any(|&(i, _)| i == index) {
                entries.push((index, ty));
            }
        }
        entries.sort_by_key(|&(index, _)| index);
        entries
    }

    fn members_of(&self, ty: TypeId) -> Option<Vec<Field>> {
        let base = self.types().base_type(ty);
        if base != ty && matches!(self.types().get(ty), Type::Named(_)) {
            return None;
        }

        match self.types().get(base) {
            Type::Tuple(fields) => Some(fields.clone()),
            Type::Record(record) if matches!(record.kind, RecordKind::Struct | RecordKind::RawUnion) => {
                Some(record.fields.clone())
            },
            _ => None,
        }
    }

    /// The slot of `ty`. Types made after checking are matched to an
    /// identical registered type.
    fn type_info_index(&self, ty: TypeId) -> Option<usize> {
        let ty = self.types().default_type(ty);
        if let Some(&index) = self.info.type_info_map.get(&ty) {
            return Some(index);
        }

        self.info
            .type_info_map
            .iter()
            .find(|(&other, _)| self.types().are_types_identical(other, ty))
            .map(|(_, &index)| index)
    }

    /// `^Type_Info` of `ty`: a pointer into the table.
    pub(super) fn type_info_ptr(&mut self, ty: TypeId) -> Result<ValueId, IrError> {
        let index = self
            .type_info_index(ty)
            .ok_or_else(|| IrError::MissingTypeInfo(self.type_str(ty)))?;
        let data = self.module.member(TYPE_INFO_DATA_NAME)?;
        let index = self.module.const_i32(index as i32);
        Ok(self.emit_array_ep(data, index))
    }

    /// Fills in every table entry. Runs inside the startup procedure.
    pub(super) fn build_type_info_table(&mut self) -> Result<(), IrError> {
        let members = match self.module.member(TYPE_INFO_DATA_MEMBER_NAME) {
            Ok(members) => members,
            Err(_) => return Ok(()),
        };

        let mut member_index = 0;
        for (index, ty) in self.type_info_entries() {
            let data = self.module.member(TYPE_INFO_DATA_NAME)?;
            let index = self.module.const_i32(index as i32);
            let entry = self.emit_array_ep(data, index);
            member_index += self.build_type_info_entry(entry, ty, members, member_index)?;
        }
        Ok(())
    }

    /// Stores the variant for `ty` into `entry`. Returns how many members
    /// it took from the member array.
    fn build_type_info_entry(
        &mut self,
        entry: ValueId,
        ty: TypeId,
        members: ValueId,
        member_index: usize,
    ) -> Result<usize, IrError> {
        let base = self.types().base_type(ty);
        let kind = self.type_info_kind(ty);
        let payload = self.type_info_variant(entry, kind)?;

        let ctx = &self.module.ctx;
        let (size, align) = (self.types().size_of(ctx, ty), self.types().align_of(ctx, ty));
        let size = self.module.const_int(size);
        let align = self.module.const_int(align);
        self.store_field(payload, "size", size)?;
        self.store_field(payload, "align", align)?;

        if kind == TypeInfoKind::Named {
            let name = match self.types().get(ty) {
                Type::Named(named) => Some(named.name.clone()),
                _ => None,
            };
            if let Some(name) = name {
                let name = self.module.const_string(name);
                self.store_field(payload, "name", name)?;
            }
            let base = self.type_info_ptr(base)?;
            self.store_field(payload, "base", base)?;
            return Ok(0);
        }

        match self.types().get(base).clone() {
            Type::Basic(BasicKind::Rawptr) => {
                let ti_ptr = self.types_mut().type_info_ptr();
                let nil = self.module.nil(ti_ptr);
                self.store_field(payload, "elem", nil)?;
            },
            Type::Basic(_) if kind == TypeInfoKind::Integer => {
                let signed = self.module.const_bool(!self.types().is_unsigned(base));
                self.store_field(payload, "signed", signed)?;
            },
            Type::Pointer(elem) => {
                let elem = self.type_info_ptr(elem)?;
                self.store_field(payload, "elem", elem)?;
            },
            Type::Proc(proc_type) => {
                let params = self.type_info_ptr(proc_type.params)?;
                self.store_field(payload, "params", params)?;
                let results = self.type_info_ptr(proc_type.results)?;
                self.store_field(payload, "results", results)?;
                let variadic = self.module.const_bool(proc_type.variadic);
                self.store_field(payload, "variadic", variadic)?;
            },
            Type::Array { elem, count } | Type::Vector { elem, count } => {
                self.store_elem_fields(payload, elem)?;
                let count = self.module.const_int(count);
                self.store_field(payload, "count", count)?;
            },
            Type::Slice(elem) | Type::DynamicArray(elem) => self.store_elem_fields(payload, elem)?,
            Type::Record(record) if record.kind == RecordKind::Enum => {
                let enum_base = record.enum_base.unwrap_or(TypeId::INT);
                let enum_base = self.type_info_ptr(enum_base)?;
                self.store_field(payload, "base", enum_base)?;
            },
            Type::Record(record) if record.kind == RecordKind::Struct => {
                let packed = self.module.const_bool(record.is_packed);
                self.store_field(payload, "packed", packed)?;
                let ordered = self.module.const_bool(record.is_ordered);
                self.store_field(payload, "ordered", ordered)?;
            },
            _ => {},
        }

        match self.members_of(ty) {
            Some(fields) => self.store_members(payload, base, &fields, members, member_index),
            None => Ok(0),
        }
    }

    fn type_info_kind(&self, ty: TypeId) -> TypeInfoKind {
        let types = self.types();
        let base = types.base_type(ty);
        if base != ty && matches!(types.get(ty), Type::Named(_)) {
            return TypeInfoKind::Named;
        }

        match types.get(base) {
            Type::Basic(BasicKind::Bool) => TypeInfoKind::Boolean,
            Type::Basic(BasicKind::String) => TypeInfoKind::String,
            Type::Basic(BasicKind::Any) => TypeInfoKind::Any,
            Type::Basic(BasicKind::Rawptr) | Type::Pointer(_) => TypeInfoKind::Pointer,
            Type::Basic(_) if types.is_float(base) => TypeInfoKind::Float,
            Type::Basic(_) => TypeInfoKind::Integer,
            Type::Named(_) => TypeInfoKind::Named,
            Type::Array { .. } => TypeInfoKind::Array,
            Type::Slice(_) => TypeInfoKind::Slice,
            Type::DynamicArray(_) => TypeInfoKind::DynamicArray,
            Type::Vector { .. } => TypeInfoKind::Vector,
            Type::Tuple(_) => TypeInfoKind::Tuple,
            Type::Proc(_) => TypeInfoKind::Procedure,
            Type::Record(record) => match record.kind {
                RecordKind::Struct => TypeInfoKind::Struct,
                RecordKind::Union => TypeInfoKind::Union,
                RecordKind::RawUnion => TypeInfoKind::RawUnion,
                RecordKind::Enum => TypeInfoKind::Enum,
            },
        }
    }

    /// Tags `entry` with the variant and returns a pointer to its payload.
    fn type_info_variant(&mut self, entry: ValueId, kind: TypeInfoKind) -> Result<ValueId, IrError> {
        let type_info = self.types().deref(self.module.type_of(entry));
        let variant = self
            .types()
            .record(type_info)
            .and_then(|r| r.fields.iter().find(|f| f.name == kind.name()))
            .map(|f| f.ty)
            .ok_or_else(|| IrError::MissingTypeInfo(format!("Type_Info.{}", kind.name())))?;
        let tag = self
            .types()
            .union_tag_of(type_info, variant)
            .ok_or_else(|| IrError::MissingTypeInfo(format!("Type_Info.{}", kind.name())))?;

        let tag_ptr = self.emit_union_tag_ptr(entry);
        let tag = self.module.const_int(tag);
        self.emit_store(tag_ptr, tag);

        let variant_ptr = self.types_mut().make_pointer(variant);
        Ok(self.emit_bitcast(entry, variant_ptr))
    }

    /// Stores `value` into the field `name` of the record `ptr` points to.
    /// Runtimes that leave a field out simply do not get it.
    fn store_field(&mut self, ptr: ValueId, name: &str, value: ValueId) -> Result<(), IrError> {
        let record = self.types().deref(self.module.type_of(ptr));
        let index = match self.types().record(record).and_then(|r| r.field_index(name)) {
            Some(index) => index,
            None => {
                odin_log::trace!("`{}` has no field `{}`", self.type_str(record), name);
                return Ok(());
            },
        };

        let field = self.emit_struct_ep(ptr, index)?;
        self.addr_store(Addr::Ptr(field), value)
    }

    fn store_elem_fields(&mut self, payload: ValueId, elem: TypeId) -> Result<(), IrError> {
        let elem_info = self.type_info_ptr(elem)?;
        self.store_field(payload, "elem", elem_info)?;

        let ctx = &self.module.ctx;
        let types = self.types();
        let stride = align_formula(types.size_of(ctx, elem), types.align_of(ctx, elem));
        let stride = self.module.const_int(stride);
        self.store_field(payload, "elem_size", stride)
    }

    fn store_members(
        &mut self,
        payload: ValueId,
        ty: TypeId,
        fields: &[Field],
        members: ValueId,
        first: usize,
    ) -> Result<usize, IrError> {
        let offsets = self.types().offsets_of(&self.module.ctx, ty);

        for (j, field) in fields.iter().enumerate() {
            let index = self.module.const_int((first + j) as i64);
            let member = self.emit_array_ep(members, index);

            let name = self.module.const_string(field.name.clone());
            self.store_field(member, "name", name)?;
            let type_info = self.type_info_ptr(field.ty)?;
            self.store_field(member, "type_info", type_info)?;
            let offset = self.module.const_int(offsets.get(j).copied().unwrap_or(0));
            self.store_field(member, "offset", offset)?;
        }

        let slice_field = {
            let record = self.types().deref(self.module.type_of(payload));
            self.types().record(record).and_then(|r| r.field_index("members"))
        };
        if let Some(slice_field) = slice_field {
            let slice = self.emit_struct_ep(payload, slice_field)?;
            let start = self.module.const_int(first as i64);
            let data = self.emit_array_ep(members, start);
            let len = self.module.const_int(fields.len() as i64);
            self.fill_slice(slice, data, len, Some(len))?;
        }

        Ok(fields.len())
    }
}

fn align_formula(size: i64, align: i64) -> i64 {
    if align <= 0 {
        return size;
    }
    (size + align - 1) / align * align
}
