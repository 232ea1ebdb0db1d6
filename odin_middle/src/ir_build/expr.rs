//! Expressions.

use odin_ir::{InstrKind, ValueId};
use odin_types::{BinaryOp, ExactValue, RecordKind, Type, TypeId, UnaryOp};

use super::{Addr, IrBuilder, IrError};
use crate::{
    ast::{CastKind, Expr, ExprKind, ProcTags, Stmt},
    checker::{AddressingMode, BuiltinId, EntityKind, TypeAndValue},
};

impl<'a> IrBuilder<'a> {
    /// Lowers an expression to its value. Constants never emit code.
    pub(super) fn build_expr(&mut self, expr: &'a Expr) -> Result<ValueId, IrError> {
        let tv = self.tv(expr)?;
        if tv.mode == AddressingMode::Constant {
            return Ok(self.const_value(tv.ty, &tv.value));
        }

        let expr = expr.unparen();
        if tv.mode == AddressingMode::Variable {
            let addr = self.build_addr(expr)?;
            return Ok(self.addr_load(addr));
        }
        self.build_single_expr(expr, tv)
    }

    /// A constant of type `ty`. Untyped constants take their default type.
    pub(super) fn const_value(&mut self, ty: TypeId, value: &ExactValue) -> ValueId {
        let types = self.types();
        let ty = types.default_type(ty);
        let (is_nil, is_float, is_integer) = (types.is_untyped_nil(ty), types.is_float(ty), types.is_integer(ty));

        if is_nil || value.is_invalid() {
            return self.module.nil(ty);
        }
        let value = if is_float {
            value.to_float()
        } else if is_integer {
            value.to_integer()
        } else {
            value.clone()
        };
        self.module.constant(ty, value)
    }

    fn build_single_expr(&mut self, expr: &'a Expr, tv: &TypeAndValue) -> Result<ValueId, IrError> {
        let info = self.info;

        match &expr.kind {
            ExprKind::Ident(_) => self.build_ident(expr, expr.id, tv.ty),
            ExprKind::Selector { expr: base, name } => match info.selections.get(&expr.id) {
                None => self.build_ident(expr, name.id, tv.ty),
                Some(selection) => {
                    let base_ty = self.expr_type(base)?;
                    if self.types().is_pointer(base_ty) {
                        let addr = self.build_addr(expr)?;
                        return Ok(self.addr_load(addr));
                    }

                    let value = self.build_expr(base)?;
                    if self.types().is_vector(base_ty) {
                        let lane = selection.index.first().copied().unwrap_or(0);
                        let index = self.module.const_i32(lane as i32);
                        return Ok(self.emit(InstrKind::VectorExtractElement { vector: value, index }, tv.ty));
                    }
                    self.emit_deep_field_ev(value, &selection.index)
                },
            },
            ExprKind::Unary { op, expr: operand } => {
                let value = self.build_expr(operand)?;
                let value = self.emit_conv(value, tv.ty)?;
                match op {
                    UnaryOp::Plus => Ok(value),
                    _ => Ok(self.emit(InstrKind::UnaryOp { op: *op, expr: value }, tv.ty)),
                }
            },
            ExprKind::AddressOf(operand) => {
                let addr = self.build_addr(operand)?;
                match addr {
                    Addr::Ptr(ptr) => Ok(ptr),
                    Addr::Vector { .. } => Err(IrError::InvalidExpr(expr.to_string())),
                }
            },
            ExprKind::Deref(operand) => {
                let ptr = self.build_expr(operand)?;
                Ok(self.emit_load(ptr))
            },
            ExprKind::Binary { op, left, right } => self.build_binary(*op, left, right, tv.ty),
            ExprKind::Paren(inner) => self.build_expr(inner),
            ExprKind::Call { callee, args, ellipsis } => self.build_call(expr, callee, args, *ellipsis, tv),
            ExprKind::Index { .. } => {
                let addr = self.build_addr(expr)?;
                Ok(self.addr_load(addr))
            },
            ExprKind::Slice { expr: base, low, high, max } => {
                self.build_slice_expr(expr, base, low.as_deref(), high.as_deref(), max.as_deref(), tv.ty)
            },
            ExprKind::CompoundLit { elems, .. } => {
                let local = self.build_compound_lit(expr, elems)?;
                Ok(self.emit_load(local))
            },
            ExprKind::Cast {
                kind, expr: operand, ..
            } => {
                let value = self.build_expr(operand)?;
                match kind {
                    CastKind::Cast => self.emit_conv(value, tv.ty),
                    CastKind::Transmute => self.emit_transmute(value, tv.ty),
                    CastKind::DownCast => self.emit_down_cast(expr, value, tv.ty),
                    CastKind::UnionCast => self.emit_union_cast(value, tv.ty),
                }
            },
            ExprKind::ProcLit { body, tags, .. } => Ok(self.build_proc_lit(body.as_deref(), *tags, tv.ty)),
            _ => Err(IrError::InvalidExpr(expr.to_string())),
        }
    }

    fn build_ident(&mut self, expr: &Expr, ident: odin_types::NodeId, ty: TypeId) -> Result<ValueId, IrError> {
        let e = self
            .info
            .entity_of_ident(ident)
            .ok_or_else(|| IrError::MissingEntityValue(expr.to_string()))?;

        match self.info.entity(e).kind {
            EntityKind::Nil => Ok(self.module.nil(ty)),
            EntityKind::Procedure { .. } => self.entity_value(e),
            _ => {
                let addr = self.entity_addr(e)?;
                Ok(self.addr_load(addr))
            },
        }
    }

    // Operators

    fn build_binary(&mut self, op: BinaryOp, left: &'a Expr, right: &'a Expr, ty: TypeId) -> Result<ValueId, IrError> {
        if op.is_logical() {
            return self.build_logical(op, left, right, ty);
        }

        let left = self.build_expr(left)?;
        let right = self.build_expr(right)?;
        if op.is_comparison() {
            return self.emit_comp(op, left, right);
        }
        self.emit_arith(op, left, right, ty)
    }

    pub(super) fn emit_arith(&mut self, op: BinaryOp, left: ValueId, right: ValueId, ty: TypeId) -> Result<ValueId, IrError> {
        let left = self.emit_conv(left, ty)?;
        let mut right = self.emit_conv(right, ty)?;

        let op = match op {
            BinaryOp::AndNot => {
                right = self.emit(InstrKind::UnaryOp { op: UnaryOp::Xor, expr: right }, ty);
                BinaryOp::And
            },
            op => op,
        };
        Ok(self.emit(InstrKind::BinaryOp { op, left, right }, ty))
    }

    /// Compares two values after bringing the constant side, if any, to
    /// the type of the other.
    pub(super) fn emit_comp(&mut self, op: BinaryOp, left: ValueId, right: ValueId) -> Result<ValueId, IrError> {
        let (lt, rt) = (self.module.type_of(left), self.module.type_of(right));

        let (left, right) = if self.types().are_types_identical(lt, rt) {
            (left, right)
        } else if self.module.value(left).is_constant() {
            (self.emit_conv(left, rt)?, right)
        } else {
            (left, self.emit_conv(right, lt)?)
        };
        Ok(self.emit(InstrKind::BinaryOp { op, left, right }, TypeId::BOOL))
    }

    /// `&&` and `||` as a value: every edge that short-circuits into the
    /// join block carries the deciding constant.
    fn build_logical(&mut self, op: BinaryOp, left: &'a Expr, right: &'a Expr, ty: TypeId) -> Result<ValueId, IrError> {
        let rhs = self.add_block("logical.cmp.rhs");
        let done = self.add_block("logical.cmp.done");
        let short_circuit = self.module.constant(ty, ExactValue::Bool(op == BinaryOp::CmpOr));

        if op == BinaryOp::CmpAnd {
            self.build_cond(left, rhs, done)?;
        } else {
            self.build_cond(left, done, rhs)?;
        }

        self.start_block(rhs);
        let edge = self.build_expr(right)?;
        let edge = self.emit_conv(edge, ty)?;
        self.emit_jump(done);

        self.start_block(done);
        let preds = self.module.block(done).preds.len();
        let mut edges = vec![short_circuit; preds.saturating_sub(1)];
        edges.push(edge);
        Ok(self.emit(InstrKind::Phi { edges }, ty))
    }

    /// Branches on a condition, short-circuiting `&&`, `||` and `!`
    /// straight into the targets.
    pub(super) fn build_cond(
        &mut self,
        cond: &'a Expr,
        true_block: odin_ir::BlockId,
        false_block: odin_ir::BlockId,
    ) -> Result<(), IrError> {
        if self.tv(cond)?.mode != AddressingMode::Constant {
            match &cond.kind {
                ExprKind::Paren(inner) => return self.build_cond(inner, true_block, false_block),
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    expr: inner,
                } => return self.build_cond(inner, false_block, true_block),
                ExprKind::Binary {
                    op: BinaryOp::CmpAnd,
                    left,
                    right,
                } => {
                    let block = self.add_block("cmp.and");
                    self.build_cond(left, block, false_block)?;
                    self.start_block(block);
                    return self.build_cond(right, true_block, false_block);
                },
                ExprKind::Binary {
                    op: BinaryOp::CmpOr,
                    left,
                    right,
                } => {
                    let block = self.add_block("cmp.or");
                    self.build_cond(left, true_block, block)?;
                    self.start_block(block);
                    return self.build_cond(right, true_block, false_block);
                },
                _ => {},
            }
        }

        let value = self.build_expr(cond)?;
        let value = self.emit_conv(value, TypeId::BOOL)?;
        self.emit_if(value, true_block, false_block);
        Ok(())
    }

    // Calls

    fn builtin_of(&self, callee: &Expr) -> Option<BuiltinId> {
        let ident = match &callee.unparen().kind {
            ExprKind::Ident(_) => callee.unparen().id,
            ExprKind::Selector { name, .. } => name.id,
            _ => return None,
        };
        match self.info.entity_of_ident(ident).map(|e| &self.info.entity(e).kind) {
            Some(EntityKind::Builtin(id)) => Some(*id),
            _ => None,
        }
    }

    fn build_call(
        &mut self,
        expr: &'a Expr,
        callee: &'a Expr,
        args: &'a [Expr],
        ellipsis: bool,
        tv: &TypeAndValue,
    ) -> Result<ValueId, IrError> {
        if let Some(id) = self.builtin_of(callee) {
            return self.build_builtin(expr, id, args, ellipsis, tv);
        }

        let callee_value = self.build_expr(callee)?;
        let callee_ty = self.expr_type(callee)?;
        let proc_type = self
            .types()
            .proc_type(callee_ty)
            .cloned()
            .ok_or_else(|| IrError::InvalidExpr(callee.to_string()))?;
        let params = self.tuple_types(proc_type.params);

        // A multi-valued call as an argument supplies several arguments.
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let value = self.build_expr(arg)?;
            let arg_ty = self.module.type_of(value);
            match self.types().tuple(arg_ty).map(<[_]>::len) {
                Some(count) if count > 1 => {
                    for i in 0..count {
                        values.push(self.emit_struct_ev(value, i)?);
                    }
                },
                _ => values.push(value),
            }
        }

        if proc_type.variadic && !ellipsis {
            let fixed = params.len().saturating_sub(1);
            let slice_ty = params.last().copied().unwrap_or(TypeId::INVALID);
            let extra = values.split_off(fixed.min(values.len()));
            let slice = self.build_variadic_slice(slice_ty, &extra)?;
            values.push(slice);
        }

        self.emit_call(callee_value, values)
    }

    /// Packs the trailing arguments of a variadic call into a slice over a
    /// local array.
    fn build_variadic_slice(&mut self, slice_ty: TypeId, values: &[ValueId]) -> Result<ValueId, IrError> {
        if values.is_empty() {
            return Ok(self.module.nil(slice_ty));
        }

        let elem = self.elem_type(slice_ty);
        let count = values.len() as i64;
        let array_ty = self.types_mut().make_array(elem, count);
        let array = self.add_local(array_ty, false);
        for (i, &value) in values.iter().enumerate() {
            let index = self.module.const_int(i as i64);
            let ptr = self.emit_array_ep(array, index);
            self.addr_store(Addr::Ptr(ptr), value)?;
        }

        let zero = self.module.const_int(0);
        let data = self.emit_array_ep(array, zero);
        let len = self.module.const_int(count);
        let slice = self.add_local(slice_ty, false);
        self.fill_slice(slice, data, len, Some(len))?;
        Ok(self.emit_load(slice))
    }

    /// Calls a procedure value, converting the arguments to the parameter
    /// types.
    pub(super) fn emit_call(&mut self, callee: ValueId, args: Vec<ValueId>) -> Result<ValueId, IrError> {
        let callee_ty = self.module.type_of(callee);
        let proc_type = match self.types().proc_type(callee_ty) {
            Some(pt) => pt.clone(),
            None => return Err(IrError::InvalidExpr(self.type_str(callee_ty))),
        };
        let params = self.tuple_types(proc_type.params);
        let results = self.tuple_types(proc_type.results);

        let mut converted = Vec::with_capacity(args.len());
        for (i, arg) in args.into_iter().enumerate() {
            match params.get(i) {
                Some(&param) => converted.push(self.emit_conv(arg, param)?),
                None => converted.push(arg),
            }
        }

        let ty = match results.as_slice() {
            [] => self.void(),
            [single] => *single,
            _ => proc_type.results,
        };
        Ok(self.emit(
            InstrKind::Call {
                callee,
                args: converted,
            },
            ty,
        ))
    }

    /// Calls one of the runtime support procedures by name.
    pub(super) fn emit_runtime_call(&mut self, name: &'static str, args: Vec<ValueId>) -> Result<ValueId, IrError> {
        let callee = self
            .module
            .members
            .get(name)
            .copied()
            .ok_or(IrError::MissingRuntimeProc(name))?;
        self.emit_call(callee, args)
    }

    pub(super) fn tuple_types(&self, tuple: TypeId) -> Vec<TypeId> {
        self.types()
            .tuple(tuple)
            .map(|fields| fields.iter().map(|f| f.ty).collect())
            .unwrap_or_default()
    }

    // Literals

    /// Builds a compound literal into a zeroed local and returns its
    /// address. Elements left out stay zero.
    pub(super) fn build_compound_lit(&mut self, expr: &'a Expr, elems: &'a [Expr]) -> Result<ValueId, IrError> {
        let info = self.info;
        let ty = self.expr_type(expr)?;
        let local = self.add_local(ty, true);

        let base = self.types().base_type(ty);
        match self.types().get(base).clone() {
            Type::Record(record) if record.kind == RecordKind::Struct => {
                for (i, elem) in elems.iter().enumerate() {
                    let (path, value) = match &elem.kind {
                        ExprKind::FieldValue { value, .. } => {
                            let selection = info
                                .selections
                                .get(&elem.id)
                                .ok_or_else(|| IrError::InvalidExpr(elem.to_string()))?;
                            (selection.index.clone(), value.as_ref())
                        },
                        _ => (vec![i], elem),
                    };
                    let value = self.build_expr(value)?;
                    let ptr = self.emit_deep_field_gep(local, &path)?;
                    self.addr_store(Addr::Ptr(ptr), value)?;
                }
            },
            Type::Array { .. } => {
                for (i, elem) in elems.iter().enumerate() {
                    let value = self.build_expr(elem)?;
                    let index = self.module.const_int(i as i64);
                    let ptr = self.emit_array_ep(local, index);
                    self.addr_store(Addr::Ptr(ptr), value)?;
                }
            },
            Type::Vector { .. } => {
                for (i, elem) in elems.iter().enumerate() {
                    let value = self.build_expr(elem)?;
                    let index = self.module.const_i32(i as i32);
                    self.addr_store(Addr::Vector { address: local, index }, value)?;
                }
            },
            Type::Slice(elem) if !elems.is_empty() => {
                let count = elems.len() as i64;
                let array_ty = self.types_mut().make_array(elem, count);
                let backing = self.add_local(array_ty, true);
                for (i, e) in elems.iter().enumerate() {
                    let value = self.build_expr(e)?;
                    let index = self.module.const_int(i as i64);
                    let ptr = self.emit_array_ep(backing, index);
                    self.addr_store(Addr::Ptr(ptr), value)?;
                }

                let zero = self.module.const_int(0);
                let data = self.emit_array_ep(backing, zero);
                let len = self.module.const_int(count);
                self.fill_slice(local, data, len, Some(len))?;
            },
            Type::DynamicArray(elem) if !elems.is_empty() => {
                self.build_dynamic_array_lit(local, elem, elems)?;
            },
            _ => {},
        }

        Ok(local)
    }

    /// Reserves room for twice the literal's elements, then appends them
    /// from a local array.
    fn build_dynamic_array_lit(&mut self, array: ValueId, elem: TypeId, elems: &'a [Expr]) -> Result<(), IrError> {
        let (size, align) = self.size_and_align(elem);
        let count = elems.len() as i64;

        let raw = self.emit_conv(array, TypeId::RAWPTR)?;
        let capacity = self.module.const_int(2 * count);
        self.emit_runtime_call("__dynamic_array_reserve", vec![raw, size, align, capacity])?;

        let items_ty = self.types_mut().make_array(elem, count);
        let items = self.add_local(items_ty, false);
        for (i, e) in elems.iter().enumerate() {
            let value = self.build_expr(e)?;
            let index = self.module.const_int(i as i64);
            let ptr = self.emit_array_ep(items, index);
            self.addr_store(Addr::Ptr(ptr), value)?;
        }

        let items = self.emit_conv(items, TypeId::RAWPTR)?;
        let count = self.module.const_int(count);
        self.emit_runtime_call("__dynamic_array_append", vec![raw, size, align, items, count])?;
        Ok(())
    }

    pub(super) fn size_and_align(&mut self, ty: TypeId) -> (ValueId, ValueId) {
        let size = self.types().size_of(&self.module.ctx, ty);
        let align = self.types().align_of(&self.module.ctx, ty);
        (self.module.const_int(size), self.module.const_int(align))
    }

    fn build_slice_expr(
        &mut self,
        expr: &'a Expr,
        base: &'a Expr,
        low: Option<&'a Expr>,
        high: Option<&'a Expr>,
        max: Option<&'a Expr>,
        ty: TypeId,
    ) -> Result<ValueId, IrError> {
        let low = match low {
            Some(low) => self.build_int(low)?,
            None => self.module.const_int(0),
        };
        let high = high.map(|e| self.build_int(e)).transpose()?;
        let max = max.map(|e| self.build_int(e)).transpose()?;

        let ptr = self.addr_or_pointer(base)?;
        let target = self.types().base_type(self.types().deref(self.module.type_of(ptr)));
        let is_string = self.types().is_string(target);
        let is_sequence = is_string || self.types().is_slice(target) || self.types().is_dynamic_array(target);

        let (data, high, max) = match self.types().get(target).clone() {
            Type::Array { count, .. } => {
                let count = self.module.const_int(count);
                let data = self.emit_array_ep(ptr, low);
                (data, high.unwrap_or(count), max.unwrap_or(count))
            },
            _ if is_sequence => {
                let data = self.emit_struct_ep(ptr, 0)?;
                let data = self.emit_load(data);
                let len = self.emit_struct_ep(ptr, 1)?;
                let len = self.emit_load(len);
                let cap = if is_string {
                    len
                } else {
                    let cap = self.emit_struct_ep(ptr, 2)?;
                    self.emit_load(cap)
                };
                let data = self.emit_ptr_offset(data, low);
                (data, high.unwrap_or(len), max.unwrap_or(cap))
            },
            _ => return Err(IrError::UngepableType(self.type_str(target))),
        };

        let pos = self.source_pos(expr.pos);
        self.emit_slice_bounds_check(pos, low, high, Some(max), is_string);

        let len = self.emit_arith(BinaryOp::Sub, high, low, TypeId::INT)?;
        let result = self.add_local(ty, false);
        if is_string {
            self.fill_slice(result, data, len, None)?;
        } else {
            let cap = self.emit_arith(BinaryOp::Sub, max, low, TypeId::INT)?;
            self.fill_slice(result, data, len, Some(cap))?;
        }
        Ok(self.emit_load(result))
    }

    pub(super) fn build_int(&mut self, expr: &'a Expr) -> Result<ValueId, IrError> {
        let value = self.build_expr(expr)?;
        self.emit_conv(value, TypeId::INT)
    }

    /// A procedure literal becomes a child of the procedure it appears in.
    fn build_proc_lit(&mut self, body: Option<&'a Stmt>, tags: ProcTags, ty: TypeId) -> ValueId {
        let parent = self.proc;
        let p = self.module.procedure(parent);
        let name = format!("{}-{}", p.name, p.children.len());

        let proc = self.module.add_procedure(name.clone(), None, ty, Some(parent));
        self.module.procedure_mut(proc).flags = super::proc_flags(tags);
        let value = self.module.procedure(proc).value;
        self.module.members.insert(name, value);

        if let Some(body) = body {
            self.queue_body(proc, body, tags);
        }
        value
    }
}
