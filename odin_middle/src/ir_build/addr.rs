//! Addresses of assignable expressions, and pointers into aggregates.

use odin_ir::{InstrKind, SourcePos, Value, ValueId};
use odin_types::{BasicKind, EntityId, RecordKind, Selection, Type, TypeId};

use super::{IrBuilder, IrError};
use crate::{
    ast::{Expr, ExprKind},
    checker::{EntityFlags, EntityKind},
};

/// Where an assignable expression lives.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Addr {
    Ptr(ValueId),
    /// One lane of the vector that `address` points to. Lanes have no
    /// address of their own, so they are read and written through the
    /// whole vector.
    Vector { address: ValueId, index: ValueId },
}

impl<'a> IrBuilder<'a> {
    pub(super) fn addr_load(&mut self, addr: Addr) -> ValueId {
        match addr {
            Addr::Ptr(ptr) => self.emit_load(ptr),
            Addr::Vector { address, index } => {
                let vector = self.emit_load(address);
                let elem = self.elem_type(self.module.type_of(vector));
                self.emit(InstrKind::VectorExtractElement { vector, index }, elem)
            },
        }
    }

    pub(super) fn addr_store(&mut self, addr: Addr, value: ValueId) -> Result<(), IrError> {
        match addr {
            Addr::Ptr(ptr) => {
                let ty = self.types().deref(self.module.type_of(ptr));
                let value = self.emit_conv(value, ty)?;
                self.emit_store(ptr, value);
            },
            Addr::Vector { address, index } => {
                let vector = self.emit_load(address);
                let vector_ty = self.module.type_of(vector);
                let elem = self.elem_type(vector_ty);
                let elem = self.emit_conv(value, elem)?;
                let vector = self.emit(InstrKind::VectorInsertElement { vector, elem, index }, vector_ty);
                self.emit_store(address, vector);
            },
        }
        Ok(())
    }

    pub(super) fn build_addr(&mut self, expr: &'a Expr) -> Result<Addr, IrError> {
        let info = self.info;
        let expr = expr.unparen();

        match &expr.kind {
            ExprKind::Ident(_) => {
                let e = info
                    .entity_of_ident(expr.id)
                    .ok_or_else(|| IrError::MissingEntityValue(expr.to_string()))?;
                self.entity_addr(e)
            },
            ExprKind::Selector { expr: base, name } => match info.selections.get(&expr.id) {
                Some(selection) => self.build_selector_addr(base, selection),
                // Qualified by an import name.
                None => {
                    let e = info
                        .entity_of_ident(name.id)
                        .ok_or_else(|| IrError::MissingEntityValue(expr.to_string()))?;
                    self.entity_addr(e)
                },
            },
            ExprKind::Index { expr: base, index } => self.build_index_addr(expr, base, index),
            ExprKind::Deref(inner) => self.build_expr(inner).map(Addr::Ptr),
            ExprKind::CompoundLit { elems, .. } => self.build_compound_lit(expr, elems).map(Addr::Ptr),
            _ => {
                let value = self.build_expr(expr)?;
                Ok(Addr::Ptr(self.spill(value)))
            },
        }
    }

    /// The address of a variable. Fields brought into scope by `using` are
    /// reached through the variable or expression they came from.
    pub(super) fn entity_addr(&mut self, e: EntityId) -> Result<Addr, IrError> {
        let entity = self.info.entity(e);

        match &entity.kind {
            EntityKind::ImplicitValue {
                backing: Some(backing), ..
            } => self.entity_value(*backing).map(Addr::Ptr),
            EntityKind::Variable { field_index, .. } if entity.flags.contains(EntityFlags::ANONYMOUS) => {
                let parent = match (entity.using_parent, entity.using_expr) {
                    (Some(parent), _) => self.entity_addr(parent)?,
                    (None, Some(node)) => {
                        let expr = self
                            .using_exprs
                            .get(&node)
                            .copied()
                            .ok_or_else(|| IrError::MissingEntityValue(entity.name.clone()))?;
                        self.build_addr(expr)?
                    },
                    (None, None) => return self.entity_value(e).map(Addr::Ptr),
                };
                let parent = self.addr_ptr(parent)?;
                self.field_addr(parent, &[*field_index])
            },
            _ => self.entity_value(e).map(Addr::Ptr),
        }
    }

    fn build_selector_addr(&mut self, base: &'a Expr, selection: &Selection) -> Result<Addr, IrError> {
        let ptr = self.addr_or_pointer(base)?;
        self.field_addr(ptr, &selection.index)
    }

    /// A pointer to the value of `expr`, or the value itself if it already
    /// is a pointer.
    pub(super) fn addr_or_pointer(&mut self, expr: &'a Expr) -> Result<ValueId, IrError> {
        let ty = self.expr_type(expr)?;
        if self.types().is_pointer(ty) {
            return self.build_expr(expr);
        }
        let addr = self.build_addr(expr)?;
        self.addr_ptr(addr)
    }

    fn addr_ptr(&mut self, addr: Addr) -> Result<ValueId, IrError> {
        match addr {
            Addr::Ptr(ptr) => Ok(ptr),
            Addr::Vector { address, .. } => {
                let ty = self.types().deref(self.module.type_of(address));
                Err(IrError::UngepableType(self.type_str(ty)))
            },
        }
    }

    /// Follows a field path from the value `ptr` points to. The last step
    /// may select a vector lane.
    pub(super) fn field_addr(&mut self, ptr: ValueId, path: &[usize]) -> Result<Addr, IrError> {
        let (&last, init) = match path.split_last() {
            Some(split) => split,
            None => return Ok(Addr::Ptr(ptr)),
        };

        let mut ptr = self.emit_deep_field_gep(ptr, init)?;
        if self.types().is_pointer(self.types().deref(self.module.type_of(ptr))) {
            ptr = self.emit_load(ptr);
        }
        if self.types().is_vector(self.types().deref(self.module.type_of(ptr))) {
            let index = self.module.const_i32(last as i32);
            return Ok(Addr::Vector { address: ptr, index });
        }
        self.emit_struct_ep(ptr, last).map(Addr::Ptr)
    }

    fn build_index_addr(&mut self, expr: &'a Expr, base: &'a Expr, index: &'a Expr) -> Result<Addr, IrError> {
        let info = self.info;

        let mut ptr = self.addr_or_pointer(base)?;
        // Indexing a struct goes through its indexable `using` field.
        if let Some(selection) = info.selections.get(&expr.id) {
            ptr = self.emit_deep_field_gep(ptr, &selection.index)?;
        }
        if self.types().is_pointer(self.types().deref(self.module.type_of(ptr))) {
            ptr = self.emit_load(ptr);
        }

        let index_value = self.build_expr(index)?;
        let index_value = self.emit_conv(index_value, TypeId::INT)?;
        let pos = self.source_pos(index.pos);

        let target = self.types().base_type(self.types().deref(self.module.type_of(ptr)));
        match self.types().get(target).clone() {
            Type::Array { count, .. } => {
                let len = self.module.const_int(count);
                self.emit_bounds_check(pos, index_value, len);
                Ok(Addr::Ptr(self.emit_array_ep(ptr, index_value)))
            },
            Type::Vector { count, .. } => {
                let len = self.module.const_int(count);
                self.emit_bounds_check(pos, index_value, len);
                Ok(Addr::Vector {
                    address: ptr,
                    index: index_value,
                })
            },
            Type::Slice(_) | Type::DynamicArray(_) | Type::Basic(BasicKind::String) => {
                let data = self.emit_struct_ep(ptr, 0)?;
                let data = self.emit_load(data);
                let len = self.emit_struct_ep(ptr, 1)?;
                let len = self.emit_load(len);
                self.emit_bounds_check(pos, index_value, len);
                Ok(Addr::Ptr(self.emit_ptr_offset(data, index_value)))
            },
            _ => Err(IrError::UngepableType(self.type_str(target))),
        }
    }

    /// Stores a value in a fresh local so that it has an address.
    pub(super) fn spill(&mut self, value: ValueId) -> ValueId {
        let ty = self.module.type_of(value);
        let local = self.add_local(ty, false);
        self.emit_store(local, value);
        local
    }

    // Element pointers

    /// Walks `path` from the value `ptr` points to, loading through every
    /// pointer met on the way.
    pub(super) fn emit_deep_field_gep(&mut self, mut ptr: ValueId, path: &[usize]) -> Result<ValueId, IrError> {
        for &index in path {
            if self.types().is_pointer(self.types().deref(self.module.type_of(ptr))) {
                ptr = self.emit_load(ptr);
            }
            ptr = self.emit_struct_ep(ptr, index)?;
        }
        Ok(ptr)
    }

    /// Like [`emit_deep_field_gep`](Self::emit_deep_field_gep), but on a
    /// value. Once the path reaches a pointer, the rest is addressed.
    pub(super) fn emit_deep_field_ev(&mut self, mut value: ValueId, path: &[usize]) -> Result<ValueId, IrError> {
        for (i, &index) in path.iter().enumerate() {
            if self.types().is_pointer(self.module.type_of(value)) {
                let ptr = self.emit_deep_field_gep(value, &path[i..])?;
                return Ok(self.emit_load(ptr));
            }
            value = self.emit_struct_ev(value, index)?;
        }
        Ok(value)
    }

    pub(super) fn emit_struct_ep(&mut self, ptr: ValueId, index: usize) -> Result<ValueId, IrError> {
        let ty = self.types().deref(self.module.type_of(ptr));
        let field = self.field_type(ty, index)?;
        let field_ptr = self.types_mut().make_pointer(field);
        Ok(self.emit(InstrKind::StructElementPtr { address: ptr, index }, field_ptr))
    }

    pub(super) fn emit_struct_ev(&mut self, value: ValueId, index: usize) -> Result<ValueId, IrError> {
        let ty = self.module.type_of(value);
        let field = self.field_type(ty, index)?;
        Ok(self.emit(InstrKind::StructExtractValue { value, index }, field))
    }

    pub(super) fn emit_array_ep(&mut self, ptr: ValueId, index: ValueId) -> ValueId {
        let elem = self.elem_type(self.types().deref(self.module.type_of(ptr)));
        let elem_ptr = self.types_mut().make_pointer(elem);
        self.emit(InstrKind::ArrayElementPtr { address: ptr, index }, elem_ptr)
    }

    pub(super) fn emit_ptr_offset(&mut self, ptr: ValueId, offset: ValueId) -> ValueId {
        let ty = self.module.type_of(ptr);
        self.emit(InstrKind::PtrOffset { address: ptr, offset }, ty)
    }

    pub(super) fn emit_union_tag_ptr(&mut self, address: ValueId) -> ValueId {
        let ty = self.types_mut().make_pointer(TypeId::INT);
        self.emit(InstrKind::UnionTagPtr { address }, ty)
    }

    /// Stores the fields of a slice, or of a string when `cap` is `None`.
    pub(super) fn fill_slice(
        &mut self,
        ptr: ValueId,
        data: ValueId,
        len: ValueId,
        cap: Option<ValueId>,
    ) -> Result<(), IrError> {
        let fields = [Some(data), Some(len), cap];
        for (index, value) in fields.iter().enumerate() {
            if let Some(value) = *value {
                let field = self.emit_struct_ep(ptr, index)?;
                self.addr_store(Addr::Ptr(field), value)?;
            }
        }
        Ok(())
    }

    /// Field `index` of anything laid out like a struct. Strings, `any`,
    /// slices and dynamic arrays count.
    fn field_type(&mut self, ty: TypeId, index: usize) -> Result<TypeId, IrError> {
        let base = self.types().base_type(ty);
        let well_known = self.types().well_known;

        let (field, is_pointer) = match self.types().get(base) {
            Type::Record(record) if matches!(record.kind, RecordKind::Struct | RecordKind::RawUnion) => {
                (record.fields.get(index).map(|f| f.ty), false)
            },
            Type::Tuple(fields) => (fields.get(index).map(|f| f.ty), false),
            Type::Slice(elem) | Type::DynamicArray(elem) if index == 0 => (Some(*elem), true),
            Type::Slice(_) | Type::DynamicArray(_) if index < 3 => (Some(TypeId::INT), false),
            Type::DynamicArray(_) if index == 3 => (well_known.allocator, false),
            Type::Basic(BasicKind::String) => match index {
                0 => (Some(TypeId::U8), true),
                1 => (Some(TypeId::INT), false),
                _ => (None, false),
            },
            Type::Basic(BasicKind::Any) => match index {
                0 => (well_known.type_info, true),
                1 => (Some(TypeId::RAWPTR), false),
                _ => (None, false),
            },
            _ => (None, false),
        };

        match field {
            Some(field) if is_pointer => Ok(self.types_mut().make_pointer(field)),
            Some(field) => Ok(field),
            None => Err(IrError::UngepableType(self.type_str(ty))),
        }
    }

    pub(super) fn elem_type(&self, ty: TypeId) -> TypeId {
        self.types().elem(ty).unwrap_or(TypeId::INVALID)
    }

    // Bounds checks

    pub(super) fn emit_bounds_check(&mut self, pos: SourcePos, index: ValueId, len: ValueId) {
        if !self.bounds_checks_enabled() {
            return;
        }
        if let (Some(i), Some(n)) = (self.const_int_of(index), self.const_int_of(len)) {
            if 0 <= i && i < n {
                return;
            }
        }

        let void = self.void();
        self.emit(InstrKind::BoundsCheck { pos, index, len }, void);
    }

    pub(super) fn emit_slice_bounds_check(
        &mut self,
        pos: SourcePos,
        low: ValueId,
        high: ValueId,
        max: Option<ValueId>,
        is_substring: bool,
    ) {
        if !self.bounds_checks_enabled() {
            return;
        }

        let void = self.void();
        self.emit(
            InstrKind::SliceBoundsCheck {
                pos,
                low,
                high,
                max,
                is_substring,
            },
            void,
        );
    }

    fn const_int_of(&self, value: ValueId) -> Option<i128> {
        match self.module.value(value) {
            Value::Constant { value, .. } => value.as_integer(),
            _ => None,
        }
    }
}
