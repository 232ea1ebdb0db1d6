//! Conversions between types.

use odin_ir::{ConvKind, InstrKind, Value, ValueId};
use odin_types::{BinaryOp, ExactValue, TypeId};

use super::{Addr, IrBuilder, IrError};
use crate::ast::Expr;

impl<'a> IrBuilder<'a> {
    /// Converts `value` to `to`. The checker has already decided that the
    /// conversion is legal; this only picks the instructions.
    pub(super) fn emit_conv(&mut self, value: ValueId, to: TypeId) -> Result<ValueId, IrError> {
        let from = self.module.type_of(value);
        if from == to || self.types().are_types_identical(from, to) {
            return Ok(value);
        }

        match self.module.value(value) {
            Value::Nil(_) => return Ok(self.module.nil(to)),
            Value::Constant { value: constant, .. } => {
                if self.types().basic_kind(to).is_some() && !self.types().is_any(to) {
                    let constant = constant.clone();
                    return Ok(self.const_value(to, &constant));
                }
            },
            _ => {},
        }

        let types = self.types();
        let from = types.default_type(from);
        let (src, dst) = (types.core_type(from), types.core_type(to));
        if types.are_types_identical(src, dst) {
            return Ok(value);
        }

        let ctx = &self.module.ctx;
        let (src_size, dst_size) = (types.size_of(ctx, src), types.size_of(ctx, dst));
        let resize = |shrink, grow| match src_size.cmp(&dst_size) {
            std::cmp::Ordering::Greater => shrink,
            std::cmp::Ordering::Less => grow,
            std::cmp::Ordering::Equal => ConvKind::Bitcast,
        };

        let is_pointer_like = |ty| types.is_pointer(ty) || types.is_rawptr(ty) || types.is_proc(ty);
        let extend = if types.is_unsigned(src) {
            ConvKind::Zext
        } else {
            ConvKind::Sext
        };

        let kind = if types.is_integer(src) && types.is_integer(dst) {
            Some(resize(ConvKind::Trunc, extend))
        } else if types.is_boolean(src) && types.is_integer(dst) {
            Some(resize(ConvKind::Trunc, ConvKind::Zext))
        } else if types.is_float(src) && types.is_float(dst) {
            Some(resize(ConvKind::Fptrunc, ConvKind::Fpext))
        } else if types.is_float(src) && types.is_integer(dst) {
            Some(if types.is_unsigned(dst) {
                ConvKind::Fptoui
            } else {
                ConvKind::Fptosi
            })
        } else if types.is_integer(src) && types.is_float(dst) {
            Some(if types.is_unsigned(src) {
                ConvKind::Uitofp
            } else {
                ConvKind::Sitofp
            })
        } else if is_pointer_like(src) && is_pointer_like(dst) {
            Some(ConvKind::Bitcast)
        } else if is_pointer_like(src) && types.is_integer(dst) {
            Some(ConvKind::Ptrtoint)
        } else if types.is_integer(src) && is_pointer_like(dst) {
            Some(ConvKind::Inttoptr)
        } else {
            None
        };

        if let Some(kind) = kind {
            return Ok(self.emit_conv_kind(kind, value, from, to));
        }

        if self.types().is_integer(src) && self.types().is_boolean(dst) {
            let zero = self.module.constant(from, ExactValue::Integer(0));
            let cond = self.emit(
                InstrKind::BinaryOp {
                    op: BinaryOp::NotEq,
                    left: value,
                    right: zero,
                },
                TypeId::BOOL,
            );
            return self.emit_conv(cond, to);
        }

        if let Some(tag) = self.types().union_tag_of(dst, from) {
            return self.emit_union_wrap(value, tag, to);
        }

        if self.types().is_any(dst) {
            return self.emit_any_wrap(value, from, to);
        }

        let is_bytes = |b: &Self, ty| b.types().is_slice(ty) && b.types().elem(ty) == Some(TypeId::U8);
        if self.types().is_string(src) && is_bytes(self, dst) {
            let data = self.emit_struct_ev(value, 0)?;
            let len = self.emit_struct_ev(value, 1)?;
            let local = self.add_local(to, true);
            self.fill_slice(local, data, len, Some(len))?;
            return Ok(self.emit_load(local));
        }
        if is_bytes(self, src) && self.types().is_string(dst) {
            let data = self.emit_struct_ev(value, 0)?;
            let len = self.emit_struct_ev(value, 1)?;
            let local = self.add_local(to, true);
            self.fill_slice(local, data, len, None)?;
            return Ok(self.emit_load(local));
        }

        if self.types().is_vector(dst) && !self.types().is_vector(src) {
            return self.emit_splat(value, to);
        }

        Err(IrError::InvalidConversion(self.type_str(from), self.type_str(to)))
    }

    fn emit_conv_kind(&mut self, kind: ConvKind, value: ValueId, from: TypeId, to: TypeId) -> ValueId {
        self.emit(InstrKind::Conv { kind, value, from, to }, to)
    }

    pub(super) fn emit_bitcast(&mut self, value: ValueId, to: TypeId) -> ValueId {
        let from = self.module.type_of(value);
        self.emit_conv_kind(ConvKind::Bitcast, value, from, to)
    }

    /// Stores a variant into a fresh union, tag first.
    fn emit_union_wrap(&mut self, value: ValueId, tag: i64, union_ty: TypeId) -> Result<ValueId, IrError> {
        let local = self.add_local(union_ty, true);

        let tag_ptr = self.emit_union_tag_ptr(local);
        let tag = self.module.const_int(tag);
        self.emit_store(tag_ptr, tag);

        let variant_ty = self.module.type_of(value);
        let variant_ptr = self.types_mut().make_pointer(variant_ty);
        let data = self.emit_bitcast(local, variant_ptr);
        self.emit_store(data, value);

        Ok(self.emit_load(local))
    }

    /// An `any` is a pointer to the value's `Type_Info` and a pointer to a
    /// copy of the value.
    fn emit_any_wrap(&mut self, value: ValueId, from: TypeId, any: TypeId) -> Result<ValueId, IrError> {
        let value = self.emit_conv(value, from)?;
        let type_info = self.type_info_ptr(from)?;
        let copy = self.spill(value);
        let data = self.emit_bitcast(copy, TypeId::RAWPTR);

        let local = self.add_local(any, false);
        for (index, field) in [type_info, data].iter().copied().enumerate() {
            let ptr = self.emit_struct_ep(local, index)?;
            self.addr_store(Addr::Ptr(ptr), field)?;
        }
        Ok(self.emit_load(local))
    }

    /// Broadcasts a scalar to every lane of a vector.
    fn emit_splat(&mut self, value: ValueId, vector_ty: TypeId) -> Result<ValueId, IrError> {
        let elem = self.elem_type(vector_ty);
        let count = match self.types().get(self.types().base_type(vector_ty)) {
            odin_types::Type::Vector { count, .. } => *count,
            _ => 0,
        };

        let elem = self.emit_conv(value, elem)?;
        let vector = self.module.nil(vector_ty);
        let index = self.module.const_i32(0);
        let vector = self.emit(InstrKind::VectorInsertElement { vector, elem, index }, vector_ty);
        Ok(self.emit(
            InstrKind::VectorShuffle {
                vector,
                indices: vec![0; count as usize],
            },
            vector_ty,
        ))
    }

    /// Reinterprets the bits of a value. Aggregates go through memory.
    pub(super) fn emit_transmute(&mut self, value: ValueId, to: TypeId) -> Result<ValueId, IrError> {
        let from = self.module.type_of(value);
        if self.types().are_types_identical(from, to) {
            return Ok(value);
        }

        let is_scalar = |b: &Self, ty| b.types().basic_kind(ty).is_some() || b.types().is_pointer(ty);
        if is_scalar(self, from) && is_scalar(self, to) {
            return Ok(self.emit_bitcast(value, to));
        }

        let ptr = self.spill(value);
        let to_ptr = self.types_mut().make_pointer(to);
        let ptr = self.emit_bitcast(ptr, to_ptr);
        Ok(self.emit_load(ptr))
    }

    /// Steps back from an embedded field to the struct that contains it.
    pub(super) fn emit_down_cast(&mut self, expr: &Expr, value: ValueId, to: TypeId) -> Result<ValueId, IrError> {
        let selection = self
            .info
            .selections
            .get(&expr.id)
            .ok_or_else(|| IrError::InvalidExpr(expr.to_string()))?;

        let derived = self.types().deref(to);
        let offset = self
            .types()
            .offset_of_selection(&self.module.ctx, derived, &selection.index)
            .ok_or_else(|| IrError::InvalidConversion(self.type_str(self.module.type_of(value)), self.type_str(to)))?;

        let bytes = self.types_mut().make_pointer(TypeId::U8);
        let ptr = self.emit_bitcast(value, bytes);
        let offset = self.module.const_int(-offset);
        let ptr = self.emit_ptr_offset(ptr, offset);
        Ok(self.emit_bitcast(ptr, to))
    }

    /// `union_cast(T)u` yields `(T, bool)`: the variant and whether the
    /// union held it. On a mismatch the variant is zero.
    pub(super) fn emit_union_cast(&mut self, value: ValueId, tuple_ty: TypeId) -> Result<ValueId, IrError> {
        let union_ty = self.module.type_of(value);
        let variant_ty = self
            .types()
            .tuple(tuple_ty)
            .and_then(|fields| fields.first())
            .map(|f| f.ty)
            .unwrap_or(TypeId::INVALID);
        let tag = self
            .types()
            .union_tag_of(union_ty, variant_ty)
            .ok_or_else(|| IrError::InvalidConversion(self.type_str(union_ty), self.type_str(variant_ty)))?;

        let result = self.add_local(tuple_ty, true);
        let union_ptr = self.spill(value);

        let tag_ptr = self.emit_union_tag_ptr(union_ptr);
        let actual = self.emit_load(tag_ptr);
        let expected = self.module.const_int(tag);
        let matches = self.emit_comp(BinaryOp::CmpEq, actual, expected)?;

        let ok = self.add_block("union_cast.ok");
        let end = self.add_block("union_cast.end");
        self.emit_if(matches, ok, end);

        self.start_block(ok);
        let variant_ptr = self.types_mut().make_pointer(variant_ty);
        let data = self.emit_bitcast(union_ptr, variant_ptr);
        let data = self.emit_load(data);
        let field = self.emit_struct_ep(result, 0)?;
        self.emit_store(field, data);
        let field = self.emit_struct_ep(result, 1)?;
        let yes = self.module.const_bool(true);
        self.emit_store(field, yes);
        self.emit_jump(end);

        self.start_block(end);
        Ok(self.emit_load(result))
    }
}
