//! Builtin procedure calls.
//!
//! Builtins whose result the checker already folded to a constant never
//! get here. Memory management goes through the runtime support
//! procedures (`alloc_align`, `free_ptr`, `__dynamic_array_*`...).

use odin_ir::{InstrKind, ValueId};
use odin_types::{BinaryOp, ExactValue, TypeId, UnaryOp};

use super::{Addr, IrBuilder, IrError};
use crate::{
    ast::Expr,
    checker::{BuiltinId, TypeAndValue},
};

impl<'a> IrBuilder<'a> {
    pub(super) fn build_builtin(
        &mut self,
        call: &'a Expr,
        id: BuiltinId,
        args: &'a [Expr],
        ellipsis: bool,
        tv: &TypeAndValue,
    ) -> Result<ValueId, IrError> {
        let ty = tv.ty;

        match id {
            BuiltinId::Len | BuiltinId::Cap => {
                let mut value = self.build_expr(&args[0])?;
                if self.types().is_pointer(self.module.type_of(value)) {
                    value = self.emit_load(value);
                }
                let index = if id == BuiltinId::Len { 1 } else { 2 };
                self.emit_struct_ev(value, index)
            },
            BuiltinId::New => {
                let elem = self.types().deref(ty);
                let ptr = self.emit_alloc(elem, None)?;
                self.emit_conv(ptr, ty)
            },
            BuiltinId::NewSlice => {
                let elem = self.elem_type(ty);
                let len = self.build_int(&args[1])?;
                let cap = args.get(2).map(|arg| self.build_int(arg)).transpose()?;
                let zero = self.module.const_int(0);
                let pos = self.source_pos(call.pos);
                self.emit_slice_bounds_check(pos, zero, len, cap, false);

                let cap = cap.unwrap_or(len);
                let data = self.emit_alloc(elem, Some(cap))?;
                let elem_ptr = self.types_mut().make_pointer(elem);
                let data = self.emit_conv(data, elem_ptr)?;
                self.make_slice(ty, data, len, cap)
            },
            BuiltinId::Free => {
                let value = self.build_expr(&args[0])?;
                let value_ty = self.module.type_of(value);
                let ptr = if self.types().is_pointer(value_ty) || self.types().is_rawptr(value_ty) {
                    value
                } else {
                    self.emit_struct_ev(value, 0)?
                };
                let ptr = self.emit_conv(ptr, TypeId::RAWPTR)?;
                self.emit_runtime_call("free_ptr", vec![ptr])
            },
            BuiltinId::Reserve => {
                let array = self.build_expr(&args[0])?;
                let elem = self.dynamic_array_elem(array);
                let (size, align) = self.size_and_align(elem);
                let capacity = self.build_int(&args[1])?;
                let array = self.emit_conv(array, TypeId::RAWPTR)?;
                self.emit_runtime_call("__dynamic_array_reserve", vec![array, size, align, capacity])
            },
            BuiltinId::Clear => {
                let ptr = self.addr_or_pointer(&args[0])?;
                let count = self.emit_struct_ep(ptr, 1)?;
                let zero = self.module.const_int(0);
                self.emit_store(count, zero);
                Ok(self.module.nil(self.void()))
            },
            BuiltinId::Append => self.build_append(args, ellipsis, tv),
            BuiltinId::TypeInfo => {
                let of = self.expr_type(&args[0])?;
                self.type_info_ptr(of)
            },
            BuiltinId::TypeInfoOfVal => {
                let of = self.expr_type(&args[0])?;
                let of = self.types().default_type(of);
                self.type_info_ptr(of)
            },
            BuiltinId::Assert => self.build_assert(call, &args[0]),
            BuiltinId::Panic => {
                let msg = self.build_expr(&args[0])?;
                let mut call_args = self.pos_args(call);
                call_args.push(msg);
                self.emit_runtime_call("__panic", call_args)
            },
            BuiltinId::Copy => self.build_copy(&args[0], &args[1]),
            BuiltinId::Swizzle => {
                let vector = self.build_expr(&args[0])?;
                let mut indices = Vec::with_capacity(args.len() - 1);
                for arg in &args[1..] {
                    let index = self.tv(arg)?.value.as_integer().unwrap_or_default();
                    indices.push(index as i32);
                }
                Ok(self.emit(InstrKind::VectorShuffle { vector, indices }, ty))
            },
            BuiltinId::SlicePtr => {
                let ptr = self.build_expr(&args[0])?;
                let len = self.build_int(&args[1])?;
                let cap = args.get(2).map(|arg| self.build_int(arg)).transpose()?;
                let zero = self.module.const_int(0);
                let pos = self.source_pos(call.pos);
                self.emit_slice_bounds_check(pos, zero, len, cap, false);
                self.make_slice(ty, ptr, len, cap.unwrap_or(len))
            },
            BuiltinId::Min | BuiltinId::Max => {
                let a = self.build_typed(&args[0], ty)?;
                let b = self.build_typed(&args[1], ty)?;
                let op = if id == BuiltinId::Min { BinaryOp::Lt } else { BinaryOp::Gt };
                let cond = self.emit_comp(op, a, b)?;
                Ok(self.emit_select(cond, a, b, ty))
            },
            BuiltinId::Abs => {
                let x = self.build_typed(&args[0], ty)?;
                self.emit_abs(x, ty)
            },
            BuiltinId::Clamp => {
                let x = self.build_typed(&args[0], ty)?;
                let lo = self.build_typed(&args[1], ty)?;
                let hi = self.build_typed(&args[2], ty)?;

                let below = self.emit_comp(BinaryOp::Lt, x, lo)?;
                let x = self.emit_select(below, lo, x, ty);
                let above = self.emit_comp(BinaryOp::Gt, x, hi)?;
                Ok(self.emit_select(above, hi, x, ty))
            },
            BuiltinId::Transmute => {
                let value = self.build_expr(&args[1])?;
                self.emit_transmute(value, ty)
            },
            BuiltinId::SizeOf
            | BuiltinId::SizeOfVal
            | BuiltinId::AlignOf
            | BuiltinId::AlignOfVal
            | BuiltinId::OffsetOf
            | BuiltinId::OffsetOfVal
            | BuiltinId::TypeOfVal
            | BuiltinId::CompileAssert => Err(IrError::InvalidExpr(call.to_string())),
        }
    }

    fn build_typed(&mut self, expr: &'a Expr, ty: TypeId) -> Result<ValueId, IrError> {
        let value = self.build_expr(expr)?;
        self.emit_conv(value, ty)
    }

    /// `alloc_align` room for `count` values of `elem`, or one when `count`
    /// is `None`.
    fn emit_alloc(&mut self, elem: TypeId, count: Option<ValueId>) -> Result<ValueId, IrError> {
        let (size, align) = self.size_and_align(elem);
        let size = match count {
            Some(count) => self.emit_arith(BinaryOp::Mul, count, size, TypeId::INT)?,
            None => size,
        };
        self.emit_runtime_call("alloc_align", vec![size, align])
    }

    fn make_slice(&mut self, slice_ty: TypeId, data: ValueId, len: ValueId, cap: ValueId) -> Result<ValueId, IrError> {
        let slice = self.add_local(slice_ty, false);
        self.fill_slice(slice, data, len, Some(cap))?;
        Ok(self.emit_load(slice))
    }

    fn dynamic_array_elem(&self, array_ptr: ValueId) -> TypeId {
        let array = self.types().deref(self.module.type_of(array_ptr));
        self.elem_type(array)
    }

    /// `append(&array, items...)` or `append(&array, ..slice)`. Returns the
    /// new length.
    fn build_append(&mut self, args: &'a [Expr], ellipsis: bool, tv: &TypeAndValue) -> Result<ValueId, IrError> {
        let array = self.build_expr(&args[0])?;
        let elem = self.dynamic_array_elem(array);
        let (size, align) = self.size_and_align(elem);

        let (items, count) = if ellipsis {
            let slice = self.build_expr(&args[1])?;
            let data = self.emit_struct_ev(slice, 0)?;
            let len = self.emit_struct_ev(slice, 1)?;
            (data, len)
        } else {
            let items = &args[1..];
            if items.is_empty() {
                let len = self.emit_struct_ep(array, 1)?;
                return Ok(self.emit_load(len));
            }

            let count = items.len() as i64;
            let array_ty = self.types_mut().make_array(elem, count);
            let local = self.add_local(array_ty, false);
            for (i, item) in items.iter().enumerate() {
                let value = self.build_expr(item)?;
                let index = self.module.const_int(i as i64);
                let ptr = self.emit_array_ep(local, index);
                self.addr_store(Addr::Ptr(ptr), value)?;
            }
            let zero = self.module.const_int(0);
            let data = self.emit_array_ep(local, zero);
            (data, self.module.const_int(count))
        };

        let array = self.emit_conv(array, TypeId::RAWPTR)?;
        let items = self.emit_conv(items, TypeId::RAWPTR)?;
        let len = self.emit_runtime_call("__dynamic_array_append", vec![array, size, align, items, count])?;
        self.emit_conv(len, tv.ty)
    }

    /// Calls `__assert` when the condition is false.
    fn build_assert(&mut self, call: &'a Expr, cond: &'a Expr) -> Result<ValueId, IrError> {
        let value = self.build_typed(cond, TypeId::BOOL)?;
        let no = self.module.const_bool(false);
        let failed = self.emit_comp(BinaryOp::CmpEq, value, no)?;

        let err = self.add_block("builtin.assert.err");
        let done = self.add_block("builtin.assert.done");
        self.emit_if(failed, err, done);

        self.start_block(err);
        let mut args = self.pos_args(call);
        args.push(self.module.const_string(cond.to_string()));
        self.emit_runtime_call("__assert", args)?;
        self.emit_jump(done);

        self.start_block(done);
        Ok(self.module.nil(self.void()))
    }

    /// `file, line, column` of a call, for the runtime's messages.
    fn pos_args(&mut self, call: &Expr) -> Vec<ValueId> {
        let pos = self.source_pos(call.pos);
        vec![
            self.module.const_string(pos.file),
            self.module.const_int(i64::from(pos.line)),
            self.module.const_int(i64::from(pos.column)),
        ]
    }

    /// `min(len(dst), len(src))` elements are copied. Returns that count.
    fn build_copy(&mut self, dst: &'a Expr, src: &'a Expr) -> Result<ValueId, IrError> {
        let dst = self.build_expr(dst)?;
        let src = self.build_expr(src)?;
        let elem = self.elem_type(self.module.type_of(dst));

        let dst_len = self.emit_struct_ev(dst, 1)?;
        let src_len = self.emit_struct_ev(src, 1)?;
        let shorter = self.emit_comp(BinaryOp::Lt, dst_len, src_len)?;
        let len = self.emit_select(shorter, dst_len, src_len, TypeId::INT);

        let (size, _) = self.size_and_align(elem);
        let bytes = self.emit_arith(BinaryOp::Mul, len, size, TypeId::INT)?;

        let dst_data = self.emit_struct_ev(dst, 0)?;
        let dst_data = self.emit_conv(dst_data, TypeId::RAWPTR)?;
        let src_data = self.emit_struct_ev(src, 0)?;
        let src_data = self.emit_conv(src_data, TypeId::RAWPTR)?;
        self.emit_runtime_call("__mem_copy", vec![dst_data, src_data, bytes])?;

        Ok(len)
    }

    fn emit_select(&mut self, cond: ValueId, then_value: ValueId, else_value: ValueId, ty: TypeId) -> ValueId {
        self.emit(
            InstrKind::Select {
                cond,
                then_value,
                else_value,
            },
            ty,
        )
    }

    /// Signed integers use `(x + (x >> n-1)) ^ (x >> n-1)`.
    fn emit_abs(&mut self, x: ValueId, ty: TypeId) -> Result<ValueId, IrError> {
        if self.types().is_float(ty) {
            let zero = self.const_value(ty, &ExactValue::Integer(0));
            let negative = self.emit_comp(BinaryOp::Lt, x, zero)?;
            let negated = self.emit(InstrKind::UnaryOp { op: UnaryOp::Minus, expr: x }, ty);
            return Ok(self.emit_select(negative, negated, x, ty));
        }
        if self.types().is_unsigned(ty) {
            return Ok(x);
        }

        let bits = self.types().size_of(&self.module.ctx, ty) * 8;
        let shift = self.const_value(ty, &ExactValue::Integer(i128::from(bits - 1)));
        let mask = self.emit(
            InstrKind::BinaryOp {
                op: BinaryOp::Shr,
                left: x,
                right: shift,
            },
            ty,
        );
        let sum = self.emit(
            InstrKind::BinaryOp {
                op: BinaryOp::Add,
                left: x,
                right: mask,
            },
            ty,
        );
        Ok(self.emit(
            InstrKind::BinaryOp {
                op: BinaryOp::Xor,
                left: sum,
                right: mask,
            },
            ty,
        ))
    }
}
