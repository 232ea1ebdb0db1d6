//! Expression checking.
//!
//! Every expression produces an [`Operand`]. Untyped constants keep their
//! untyped type until a typed context forces one on them, at which point
//! [`Checker::convert_to_typed`] settles the type of the whole untyped
//! subtree.

use std::{collections::HashSet, convert::TryFrom};

use odin_types::{
    exact_value, BasicKind, BinaryOp, ExactValue, ProcType, Selection, SelectionKind, Type, TypeId, UnaryOp,
};

use super::{
    entity::EntityKind,
    universe::IOTA,
    AddressingMode, Checker, Operand,
};
use crate::ast::{CastKind, Expr, ExprKind, Ident, Literal, ProcTags, Stmt};

impl<'a> Checker<'a> {
    pub(super) fn size_of(&self, ty: TypeId) -> i64 {
        self.info.arena.types.size_of(&self.info.ctx, ty)
    }

    pub(super) fn align_of(&self, ty: TypeId) -> i64 {
        self.info.arena.types.align_of(&self.info.ctx, ty)
    }

    /// The source text of the operand's expression, for messages.
    pub(super) fn expr_str(&self, o: &Operand) -> String {
        o.expr
            .and_then(|id| self.nodes.get(&id))
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    pub(super) fn check_expr_base(&mut self, expr: &'a Expr, type_hint: Option<TypeId>) -> Operand {
        self.nodes.insert(expr.id, expr);

        let mut o = self.check_expr_kind(expr, type_hint);
        o.expr = Some(expr.id);

        if o.is_invalid() {
            o.ty = TypeId::INVALID;
        } else if self.types().is_untyped(o.ty) {
            self.add_untyped(expr.id, false, o.mode, o.ty, o.value.clone());
        } else {
            self.add_type_and_value(expr.id, o.mode, o.ty, o.value.clone());
        }

        o
    }

    /// A single value.
    pub(super) fn check_expr(&mut self, expr: &'a Expr) -> Operand {
        self.check_expr_with_type_hint(expr, None)
    }

    pub(super) fn check_expr_with_type_hint(&mut self, expr: &'a Expr, type_hint: Option<TypeId>) -> Operand {
        let mut o = self.check_expr_base(expr, type_hint);
        self.check_not_tuple(&mut o);
        self.error_operand_not_expression(&mut o);
        o
    }

    /// A value or a tuple of values, as returned by a call.
    pub(super) fn check_multi_expr(&mut self, expr: &'a Expr) -> Operand {
        let mut o = self.check_expr_base(expr, None);
        self.error_operand_not_expression(&mut o);
        o
    }

    pub(super) fn check_expr_or_type(&mut self, expr: &'a Expr) -> Operand {
        let mut o = self.check_expr_base(expr, None);
        self.check_not_tuple(&mut o);
        if o.mode == AddressingMode::NoValue {
            let msg = format!("`{}` used as value", expr);
            self.error(expr.pos, msg);
            o.invalidate();
        }
        o
    }

    pub(super) fn check_not_tuple(&mut self, o: &mut Operand) {
        if o.is_invalid() {
            return;
        }

        if let Some(fields) = self.types().tuple(o.ty) {
            if o.mode != AddressingMode::NoValue {
                let msg = format!("{}-valued tuple found where single value expected", fields.len());
                let pos = self.operand_pos(o);
                self.error(pos, msg);
                o.invalidate();
            }
        }
    }

    fn error_operand_not_expression(&mut self, o: &mut Operand) {
        let msg = match o.mode {
            AddressingMode::Type => format!("`{}` is not an expression", self.expr_str(o)),
            AddressingMode::Builtin => format!("`{}` must be called", self.expr_str(o)),
            AddressingMode::NoValue => format!("`{}` used as value", self.expr_str(o)),
            _ => return,
        };

        let pos = self.operand_pos(o);
        self.error(pos, msg);
        o.invalidate();
    }

    pub(super) fn operand_pos(&self, o: &Operand) -> crate::ast::TokenPos {
        o.expr
            .and_then(|id| self.nodes.get(&id))
            .map(|e| e.pos)
            .unwrap_or_default()
    }

    fn check_expr_kind(&mut self, expr: &'a Expr, type_hint: Option<TypeId>) -> Operand {
        match &expr.kind {
            ExprKind::Ident(name) => self.check_identifier(expr, name),

            ExprKind::Literal(lit) => match lit {
                Literal::Integer(i) => Operand::constant(TypeId::UNTYPED_INTEGER, ExactValue::Integer(*i)),
                Literal::Float(x) => Operand::constant(TypeId::UNTYPED_FLOAT, ExactValue::float(*x)),
                Literal::String(s) => Operand::constant(TypeId::UNTYPED_STRING, ExactValue::String(s.clone())),
                Literal::Rune(c) => Operand::constant(TypeId::UNTYPED_RUNE, ExactValue::Integer(*c as i128)),
            },

            ExprKind::Paren(inner) => self.check_expr_base(inner, type_hint),

            ExprKind::Unary { op, expr: inner } => self.check_unary(expr, *op, inner),

            ExprKind::AddressOf(inner) => {
                let mut o = self.check_expr(inner);
                if o.is_invalid() {
                    return o;
                }
                if o.mode != AddressingMode::Variable {
                    self.error(expr.pos, format!("Cannot take the pointer address of `{}`", inner));
                    return Operand::invalid();
                }

                o.mode = AddressingMode::Value;
                o.ty = self.types_mut().make_pointer(o.ty);
                o.value = ExactValue::Invalid;
                o
            },

            ExprKind::Deref(inner) => {
                let mut o = self.check_expr(inner);
                if o.is_invalid() {
                    return o;
                }

                if self.types().is_pointer(o.ty) {
                    o.ty = self.types().deref(o.ty);
                    o.mode = AddressingMode::Variable;
                    o.value = ExactValue::Invalid;
                    o
                } else {
                    let msg = format!("Cannot dereference `{}`", inner);
                    self.error(expr.pos, msg);
                    Operand::invalid()
                }
            },

            ExprKind::Binary { op, left, right } => self.check_binary(expr, *op, left, right),

            ExprKind::Call {
                callee,
                args,
                ellipsis,
            } => self.check_call(expr, callee, args, *ellipsis),

            ExprKind::Selector { expr: base, name } => self.check_selector(expr, base, name),

            ExprKind::Index { expr: base, index } => self.check_index(expr, base, index),

            ExprKind::Slice { expr: base, low, high, max } => {
                self.check_slice_expr(expr, base, low.as_deref(), high.as_deref(), max.as_deref())
            },

            ExprKind::CompoundLit { ty, elems } => self.check_compound_literal(expr, ty.as_deref(), elems, type_hint),

            ExprKind::FieldValue { .. } => {
                self.error(expr.pos, "`field = value` is only allowed in struct literals");
                Operand::invalid()
            },

            ExprKind::Cast { kind, ty, expr: value } => self.check_cast_expr(expr, *kind, ty, value),

            ExprKind::ProcLit { ty, body, tags } => self.check_proc_lit(expr, ty, body.as_deref(), *tags),

            ExprKind::PointerType(_)
            | ExprKind::ArrayType { .. }
            | ExprKind::DynamicArrayType(_)
            | ExprKind::VectorType { .. }
            | ExprKind::StructType { .. }
            | ExprKind::UnionType(_)
            | ExprKind::RawUnionType(_)
            | ExprKind::EnumType { .. }
            | ExprKind::ProcType { .. } => {
                let ty = self.check_type(expr);
                if self.types().is_invalid(ty) {
                    Operand::invalid()
                } else {
                    Operand::new(AddressingMode::Type, ty)
                }
            },
        }
    }

    fn check_identifier(&mut self, expr: &'a Expr, name: &str) -> Operand {
        if name == "_" {
            self.error(expr.pos, "`_` cannot be used as a value type");
            return Operand::invalid();
        }

        let e = match self.info.lookup_entity(self.context.scope, name) {
            Some(e) => e,
            None => {
                self.error(expr.pos, format!("Undeclared name: {}", name));
                return Operand::invalid();
            },
        };

        self.add_entity_use(expr.id, e);

        if name == IOTA && self.entity(e).scope == Some(self.info.universal_scope) {
            return match self.context.iota.clone() {
                Some(value) => Operand::constant(TypeId::UNTYPED_INTEGER, value),
                None => {
                    self.error(expr.pos, "Use of `iota` outside a constant declaration is not allowed");
                    Operand::invalid()
                },
            };
        }

        self.operand_for_entity(expr, e)
    }

    /// The operand an identifier (or an import selector) resolving to `e`
    /// evaluates to.
    fn operand_for_entity(&mut self, expr: &'a Expr, e: odin_types::EntityId) -> Operand {
        if self.entity(e).ty.is_none() {
            self.check_entity_decl(e);
        }

        let entity = self.entity(e).clone();
        let ty = entity.ty.unwrap_or(TypeId::INVALID);

        match &entity.kind {
            EntityKind::Builtin(id) => {
                let mut o = Operand::new(AddressingMode::Builtin, TypeId::INVALID);
                o.builtin = Some(*id);
                o
            },
            EntityKind::ImportName { .. } => {
                self.error(expr.pos, format!("Use of import `{}` not in selector", entity.name));
                Operand::invalid()
            },
            EntityKind::LibraryName { .. } => {
                self.error(expr.pos, format!("Use of library `{}` not in #foreign tag", entity.name));
                Operand::invalid()
            },
            _ if ty == TypeId::INVALID => Operand::invalid(),

            EntityKind::Constant(value) if value.is_invalid() => Operand::invalid(),
            EntityKind::Constant(value) => Operand::constant(ty, value.clone()),
            EntityKind::Variable { is_immutable, .. } => {
                if *is_immutable {
                    Operand::new(AddressingMode::Value, ty)
                } else {
                    Operand::new(AddressingMode::Variable, ty)
                }
            },
            EntityKind::TypeName => Operand::new(AddressingMode::Type, ty),
            EntityKind::Procedure { .. } => Operand::new(AddressingMode::Value, ty),
            EntityKind::Nil => Operand::new(AddressingMode::Value, TypeId::UNTYPED_NIL),
            EntityKind::ImplicitValue { .. } => Operand::new(AddressingMode::Variable, ty),
        }
    }

    // Operators

    fn check_unary(&mut self, expr: &'a Expr, op: UnaryOp, inner: &'a Expr) -> Operand {
        let mut o = self.check_expr(inner);
        if o.is_invalid() {
            return o;
        }

        if !self.check_unary_op(&o, op, expr) {
            return Operand::invalid();
        }

        if o.is_constant() {
            let ty = o.ty;
            let types = self.types();
            if !types.is_constant_type(ty) {
                let msg = format!("Invalid type, `{}`, for constant unary expression `{}`", self.type_str(ty), expr);
                self.error(expr.pos, msg);
                return Operand::invalid();
            }

            let unsigned_bits = if types.is_typed(ty) && types.is_unsigned(ty) {
                Some(self.size_of(ty) as u32 * 8)
            } else {
                None
            };

            o.value = exact_value::unary_op(op, &o.value, unsigned_bits);
            o.expr = Some(expr.id);
            if self.types().is_typed(ty) {
                self.check_is_expressible(&mut o, ty);
            }
            return o;
        }

        o.mode = AddressingMode::Value;
        o
    }

    fn check_unary_op(&mut self, o: &Operand, op: UnaryOp, expr: &Expr) -> bool {
        let types = self.types();
        let mut ty = types.base_type(o.ty);
        if let Type::Vector { elem, .. } = types.get(ty) {
            ty = *elem;
        }

        let (ok, what) = match op {
            UnaryOp::Plus | UnaryOp::Minus => (types.is_numeric(ty), "numeric expressions"),
            UnaryOp::Xor => (types.is_integer(ty) || types.is_boolean(ty), "integers or booleans"),
            UnaryOp::Not => (types.is_boolean(ty), "boolean expressions"),
        };

        if !ok {
            let msg = format!("Operator `{}` is only allowed with {}", op, what);
            self.error(expr.pos, msg);
        }
        ok
    }

    pub(super) fn check_binary_op(&mut self, o: &Operand, op: BinaryOp, expr: &Expr) -> bool {
        let types = self.types();
        let mut ty = types.base_type(o.ty);
        if let Type::Vector { elem, .. } = types.get(ty) {
            ty = *elem;
        }

        let (ok, what) = match op {
            BinaryOp::Add => (
                types.is_numeric(ty) || types.is_string(ty),
                "numeric or string expressions",
            ),
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Quo => (types.is_numeric(ty), "numeric expressions"),
            BinaryOp::Mod | BinaryOp::AndNot => (types.is_integer(ty), "integers"),
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => (
                types.is_integer(ty) || types.is_boolean(ty),
                "integers or booleans",
            ),
            BinaryOp::CmpAnd | BinaryOp::CmpOr => (types.is_boolean(ty), "boolean expressions"),
            _ => (true, ""),
        };

        if !ok {
            let msg = format!("Operator `{}` is only allowed with {}", op, what);
            self.error(expr.pos, msg);
        }
        ok
    }

    fn check_binary(&mut self, expr: &'a Expr, op: BinaryOp, left: &'a Expr, right: &'a Expr) -> Operand {
        if op.is_shift() {
            return self.check_shift(expr, op, left, right);
        }

        let mut x = self.check_expr(left);
        let mut y = self.check_expr(right);
        if x.is_invalid() || y.is_invalid() {
            return Operand::invalid();
        }

        if let Some(o) = self.check_pointer_arithmetic(expr, op, &x, &y) {
            return o;
        }

        self.convert_to_typed(&mut x, y.ty);
        if x.is_invalid() {
            return x;
        }
        self.convert_to_typed(&mut y, x.ty);
        if y.is_invalid() {
            return y;
        }

        if op.is_comparison() {
            self.check_comparison(expr, op, &mut x, &mut y);
            return x;
        }

        if !self.types().are_types_identical(x.ty, y.ty) {
            let msg = format!(
                "Mismatched types in binary expression `{}` : `{}` vs `{}`",
                expr,
                self.type_str(x.ty),
                self.type_str(y.ty)
            );
            self.error(expr.pos, msg);
            return Operand::invalid();
        }

        if !self.check_binary_op(&x, op, expr) {
            return Operand::invalid();
        }

        if matches!(op, BinaryOp::Quo | BinaryOp::Mod)
            && y.is_constant()
            && (x.is_constant() || self.types().is_integer(x.ty))
        {
            let zero = match &y.value {
                ExactValue::Integer(0) => true,
                ExactValue::Float(_) => y.value.as_f64() == Some(0.0),
                _ => false,
            };
            if zero {
                self.error(right.pos, "Division by zero not allowed");
                return Operand::invalid();
            }
        }

        if x.is_constant() && y.is_constant() {
            let value = exact_value::binary_op(op, &x.value, &y.value);
            if value.is_invalid() {
                self.error(expr.pos, format!("Constant expression `{}` cannot be evaluated", expr));
                return Operand::invalid();
            }

            x.value = value;
            x.expr = Some(expr.id);
            if self.types().is_typed(x.ty) {
                let ty = x.ty;
                self.check_is_expressible(&mut x, ty);
            }
            return x;
        }

        x.mode = AddressingMode::Value;
        x.value = ExactValue::Invalid;
        x
    }

    /// `ptr + int`, `int + ptr` and `ptr - int`.
    fn check_pointer_arithmetic(&mut self, expr: &'a Expr, op: BinaryOp, x: &Operand, y: &Operand) -> Option<Operand> {
        if !matches!(op, BinaryOp::Add | BinaryOp::Sub) {
            return None;
        }

        let types = self.types();
        let (ptr, offset) = if types.is_pointer(x.ty) && types.is_integer(y.ty) {
            (x, y)
        } else if op == BinaryOp::Add && types.is_integer(x.ty) && types.is_pointer(y.ty) {
            (y, x)
        } else {
            return None;
        };

        let elem = types.deref(ptr.ty);
        if self.size_of(elem) <= 0 {
            let msg = format!("Invalid pointer type for pointer arithmetic: `{}`", self.type_str(ptr.ty));
            self.error(expr.pos, msg);
            return Some(Operand::invalid());
        }

        let mut offset = offset.clone();
        self.convert_to_typed(&mut offset, TypeId::INT);
        if offset.is_invalid() {
            return Some(Operand::invalid());
        }

        Some(Operand::new(AddressingMode::Value, ptr.ty))
    }

    fn check_shift(&mut self, expr: &'a Expr, op: BinaryOp, left: &'a Expr, right: &'a Expr) -> Operand {
        let mut x = self.check_expr(left);
        let mut y = self.check_expr(right);
        if x.is_invalid() || y.is_invalid() {
            return Operand::invalid();
        }

        let x_is_integer = self.types().is_integer(x.ty)
            || (x.is_constant() && self.types().is_untyped(x.ty) && !x.value.to_integer().is_invalid());
        if !x_is_integer {
            self.error(left.pos, format!("Shifted operand `{}` must be an integer", left));
            return Operand::invalid();
        }

        if y.is_constant() {
            match y.value.as_integer() {
                Some(amount) if amount < 0 => {
                    self.error(right.pos, format!("Shift amount cannot be negative: `{}`", right));
                    return Operand::invalid();
                },
                Some(amount) if amount > 1023 => {
                    self.error(right.pos, format!("Shift amount too large: `{}`", right));
                    return Operand::invalid();
                },
                Some(_) => {},
                None => {
                    self.error(right.pos, format!("Shift amount `{}` must be an unsigned integer", right));
                    return Operand::invalid();
                },
            }
        }

        if !y.is_constant() || self.types().is_typed(y.ty) {
            if !self.types().is_unsigned(y.ty) {
                self.error(right.pos, format!("Shift amount `{}` must be an unsigned integer", right));
                return Operand::invalid();
            }
        }

        if x.is_constant() {
            if y.is_constant() {
                if self.types().is_untyped(x.ty) {
                    x.value = x.value.to_integer();
                    x.ty = TypeId::UNTYPED_INTEGER;
                }

                x.value = exact_value::binary_op(op, &x.value, &y.value);
                x.expr = Some(expr.id);
                if x.value.is_invalid() {
                    self.error(expr.pos, format!("Constant expression `{}` cannot be evaluated", expr));
                    return Operand::invalid();
                }
                if self.types().is_typed(x.ty) {
                    let ty = x.ty;
                    self.check_is_expressible(&mut x, ty);
                }
                return x;
            }

            if self.types().is_untyped(x.ty) {
                // Settled once the whole expression gets its type.
                self.add_untyped(left.id, true, x.mode, x.ty, x.value.clone());
                x.mode = AddressingMode::Value;
                x.value = ExactValue::Invalid;
                return x;
            }
        }

        if self.types().is_untyped(y.ty) {
            self.convert_to_typed(&mut y, TypeId::UINT);
            if y.is_invalid() {
                return y;
            }
        }

        x.mode = AddressingMode::Value;
        x.value = ExactValue::Invalid;
        x
    }

    fn is_ordered_type(&self, ty: TypeId) -> bool {
        let types = self.types();
        types.is_ordered(ty) || types.is_pointer(ty)
    }

    pub(super) fn check_comparison(&mut self, expr: &'a Expr, op: BinaryOp, x: &mut Operand, y: &mut Operand) {
        let assignable = self.is_assignable_to(x, y.ty) || self.is_assignable_to(y, x.ty);

        let err = if assignable {
            let types = self.types();
            let nil_cmp = (types.is_untyped_nil(x.ty) && types.has_nil(y.ty))
                || (types.is_untyped_nil(y.ty) && types.has_nil(x.ty));
            let defined = match op {
                BinaryOp::CmpEq | BinaryOp::NotEq => {
                    nil_cmp || (types.is_comparable(x.ty) && types.is_comparable(y.ty))
                },
                _ => self.is_ordered_type(x.ty) && self.is_ordered_type(y.ty),
            };

            if defined {
                None
            } else {
                let bad = if types.is_untyped_nil(x.ty) { y.ty } else { x.ty };
                Some(format!("operator `{}` not defined for type `{}`", op, self.type_str(bad)))
            }
        } else {
            Some(format!(
                "mismatched types `{}` and `{}`",
                self.type_str(x.ty),
                self.type_str(y.ty)
            ))
        };

        if let Some(err) = err {
            self.error(expr.pos, format!("Cannot compare expression, {}", err));
            x.invalidate();
            return;
        }

        if x.is_constant() && y.is_constant() {
            let res = exact_value::compare(op, &x.value, &y.value).unwrap_or(false);
            x.value = ExactValue::Bool(res);
            x.ty = TypeId::UNTYPED_BOOL;
            x.expr = Some(expr.id);
            return;
        }

        let x_ty = self.types().default_type(x.ty);
        let y_ty = self.types().default_type(y.ty);
        self.update_expr_type(x.expr, x_ty, true);
        self.update_expr_type(y.expr, y_ty, true);

        x.mode = AddressingMode::Value;
        x.value = ExactValue::Invalid;
        let vector_count = match self.types().get(self.types().base_type(x_ty)) {
            Type::Vector { count, .. } => Some(*count),
            _ => None,
        };
        x.ty = match vector_count {
            Some(count) => self.types_mut().make_vector(TypeId::BOOL, count),
            None => TypeId::BOOL,
        };
    }

    // Untyped constants

    /// The value `value` takes as a constant of type `ty`, if it fits.
    pub(super) fn representable(&self, value: &ExactValue, ty: TypeId) -> Option<ExactValue> {
        let types = self.types();
        let kind = types.basic_kind(ty)?;

        match kind {
            BasicKind::Bool | BasicKind::UntypedBool => value.as_bool().map(ExactValue::Bool),
            BasicKind::String | BasicKind::UntypedString => value.as_str().map(|s| ExactValue::String(s.to_owned())),
            BasicKind::UntypedInteger | BasicKind::UntypedRune => match value.to_integer() {
                ExactValue::Invalid => None,
                v => Some(v),
            },
            BasicKind::I8
            | BasicKind::U8
            | BasicKind::I16
            | BasicKind::U16
            | BasicKind::I32
            | BasicKind::U32
            | BasicKind::I64
            | BasicKind::U64
            | BasicKind::Int
            | BasicKind::Uint => {
                let i = value.to_integer().as_integer()?;
                let bits = self.size_of(ty) as u32 * 8;
                let (lo, hi) = if types.is_unsigned(ty) {
                    (0, (1i128 << bits) - 1)
                } else {
                    (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
                };
                if i < lo || i > hi {
                    return None;
                }
                Some(ExactValue::Integer(i))
            },
            BasicKind::F32 | BasicKind::F64 | BasicKind::UntypedFloat => match value.to_float() {
                ExactValue::Invalid => None,
                v => Some(v),
            },
            BasicKind::Rawptr => match value {
                ExactValue::Pointer(_) => Some(value.clone()),
                ExactValue::Integer(i) => Some(ExactValue::Pointer(*i as i64)),
                _ => None,
            },
            _ => None,
        }
    }

    pub(super) fn check_is_expressible(&mut self, o: &mut Operand, ty: TypeId) {
        if let Some(value) = self.representable(&o.value, ty) {
            o.value = value;
            return;
        }

        let text = self.expr_str(o);
        let ty_str = self.type_str(ty);
        let types = self.types();
        let msg = if types.is_integer(ty) && matches!(o.value, ExactValue::Float(_)) && o.value.to_integer().is_invalid() {
            format!("`{}` truncated to `{}`", text, ty_str)
        } else if types.is_integer(ty) && o.value.as_integer().is_some() {
            format!("`{} = {}` overflows `{}`", text, o.value, ty_str)
        } else {
            format!("`{}` cannot be represented by `{}`", text, ty_str)
        };

        let pos = self.operand_pos(o);
        self.error(pos, msg);
        o.invalidate();
    }

    /// Gives an untyped operand the type `target` and records it, along
    /// with every untyped subexpression, as final.
    pub(super) fn convert_to_typed(&mut self, o: &mut Operand, target: TypeId) {
        if o.is_invalid() || !self.types().is_untyped(o.ty) || target == TypeId::INVALID {
            return;
        }

        if self.types().is_untyped(target) {
            let types = self.types();
            let (x_kind, t_kind) = match (types.basic_kind(o.ty), types.basic_kind(target)) {
                (Some(x), Some(t)) => (x, t),
                _ => return,
            };
            let both_numeric = types.is_numeric(o.ty) && types.is_numeric(target);

            if both_numeric {
                if (x_kind as u32) < (t_kind as u32) {
                    o.ty = target;
                    self.update_expr_type(o.expr, target, false);
                }
            } else if x_kind != t_kind {
                self.invalid_conversion(o, target);
            }
            return;
        }

        let types = self.types();
        let target = if types.is_any(target) { types.default_type(o.ty) } else { target };
        let is_basic = matches!(
            types.get(types.core_type(target)),
            Type::Basic(kind) if *kind != BasicKind::Any
        );
        let is_nil = types.is_untyped_nil(o.ty);
        let target_has_nil = types.has_nil(target);
        let bool_mismatch = types.is_boolean(o.ty) && !types.is_boolean(target);

        if is_basic && o.is_constant() {
            self.check_is_expressible(o, target);
            if o.is_invalid() {
                return;
            }
        } else if is_nil {
            if !target_has_nil {
                self.invalid_conversion(o, target);
                return;
            }
        } else if !is_basic || bool_mismatch {
            self.invalid_conversion(o, target);
            return;
        }

        o.ty = target;
        self.update_expr_type(o.expr, target, true);
    }

    fn invalid_conversion(&mut self, o: &mut Operand, target: TypeId) {
        let msg = format!(
            "Cannot convert `{}` of type `{}` to `{}`",
            self.expr_str(o),
            self.type_str(o.ty),
            self.type_str(target)
        );
        let pos = self.operand_pos(o);
        self.error(pos, msg);
        o.invalidate();
    }

    /// Moves an untyped expression to its type. Non-final updates only
    /// widen the untyped kind.
    pub(super) fn update_expr_type(&mut self, node: Option<odin_types::NodeId>, ty: TypeId, is_final: bool) {
        let node = match node {
            Some(node) => node,
            None => return,
        };
        let old = match self.info.untyped.get(&node) {
            Some(old) => old.clone(),
            None => return,
        };

        if old.value.is_invalid() {
            if let Some(&expr) = self.nodes.get(&node) {
                match &expr.kind {
                    ExprKind::Unary { expr: inner, .. } | ExprKind::Paren(inner) => {
                        self.update_expr_type(Some(inner.id), ty, is_final);
                    },
                    ExprKind::Binary { op, left, right } if !op.is_comparison() => {
                        self.update_expr_type(Some(left.id), ty, is_final);
                        if !op.is_shift() {
                            self.update_expr_type(Some(right.id), ty, is_final);
                        }
                    },
                    _ => {},
                }
            }
        }

        if !is_final && self.types().is_untyped(ty) {
            let base = self.types().base_type(ty);
            if let Some(entry) = self.info.untyped.get_mut(&node) {
                entry.ty = base;
            }
            return;
        }

        self.info.untyped.shift_remove(&node);

        if old.is_lhs && !self.types().is_integer(ty) {
            let pos = self.nodes.get(&node).map(|e| e.pos).unwrap_or_default();
            let text = self.nodes.get(&node).map(ToString::to_string).unwrap_or_default();
            self.error(pos, format!("Shifted operand `{}` must be an integer", text));
            return;
        }

        self.add_type_and_value(node, old.mode, ty, old.value);
    }

    // Assignability and conversions

    /// The path to an anonymous field of type `target` inside the struct
    /// `ty`, searching through nested anonymous fields.
    pub(super) fn find_using_path(&self, ty: TypeId, target: TypeId) -> Option<Vec<usize>> {
        let types = self.types();
        let record = types.record(ty)?;
        if !types.is_struct(ty) {
            return None;
        }

        for (i, field) in record.fields.iter().enumerate() {
            if !field.anonymous {
                continue;
            }
            if types.are_types_identical(field.ty, target) {
                return Some(vec![i]);
            }
        }

        for (i, field) in record.fields.iter().enumerate() {
            if !field.anonymous || types.is_pointer(field.ty) {
                continue;
            }
            if let Some(mut path) = self.find_using_path(field.ty, target) {
                path.insert(0, i);
                return Some(path);
            }
        }

        None
    }

    pub(super) fn is_assignable_to(&self, o: &Operand, ty: TypeId) -> bool {
        if o.is_invalid() || ty == TypeId::INVALID {
            return true;
        }

        let types = self.types();
        let s = o.ty;
        if types.are_types_identical(s, ty) {
            return true;
        }

        let src = types.base_type(s);
        let dst = types.base_type(ty);

        if types.is_untyped(s) {
            if types.is_untyped_nil(s) {
                return types.has_nil(dst);
            }

            if let Type::Basic(kind) = types.get(types.core_type(ty)) {
                if *kind == BasicKind::Any {
                    return true;
                }
                if o.is_constant() {
                    return self.representable(&o.value, ty).is_some();
                }
                if types.is_boolean(s) {
                    return types.is_boolean(dst);
                }
            }
        }

        if types.are_types_identical(src, dst) && (!types.is_named(s) || !types.is_named(ty)) {
            return true;
        }

        if types.is_any(dst) {
            return true;
        }

        if types.is_rawptr(dst) && types.is_pointer(src) {
            return true;
        }

        if types.is_pointer(src) && types.is_pointer(dst) {
            let (from, to) = (types.deref(s), types.deref(ty));
            if self.find_using_path(from, to).is_some() {
                return true;
            }
        }

        if types.is_union(dst) && types.union_tag_of(dst, s).is_some() {
            return true;
        }

        false
    }

    /// Checks that `o` can be stored into a location of type `ty`. Without
    /// a type the operand just loses its untypedness.
    pub(super) fn check_assignment(&mut self, o: &mut Operand, ty: Option<TypeId>, context: &str) {
        self.check_not_tuple(o);
        if o.is_invalid() {
            return;
        }

        if self.types().is_untyped(o.ty) {
            let types = self.types();
            let target = match ty {
                None if types.is_untyped_nil(o.ty) => {
                    let pos = self.operand_pos(o);
                    self.error(pos, format!("Use of untyped nil in {}", context));
                    o.invalidate();
                    return;
                },
                None => types.default_type(o.ty),
                Some(t) if types.is_any(t) && !types.is_untyped_nil(o.ty) => types.default_type(o.ty),
                Some(t) => t,
            };

            self.convert_to_typed(o, target);
            if o.is_invalid() {
                return;
            }
        }

        let ty = match ty {
            Some(ty) => ty,
            None => return,
        };

        if !self.is_assignable_to(o, ty) {
            let msg = format!(
                "Cannot assign value `{}` of type `{}` to `{}` in {}",
                self.expr_str(o),
                self.type_str(o.ty),
                self.type_str(ty),
                context
            );
            let pos = self.operand_pos(o);
            self.error(pos, msg);
            o.invalidate();
            return;
        }

        if self.types().is_any(ty) && !self.types().is_any(o.ty) {
            self.add_type_info_type(o.ty);
        }
    }

    fn is_pointer_like(&self, ty: TypeId) -> bool {
        self.types().is_pointer(ty) || self.types().is_rawptr(ty)
    }

    fn is_int_or_uint(&self, ty: TypeId) -> bool {
        matches!(self.types().basic_kind(ty), Some(BasicKind::Int) | Some(BasicKind::Uint))
    }

    fn is_u8_slice(&self, ty: TypeId) -> bool {
        let types = self.types();
        match types.get(types.base_type(ty)) {
            Type::Slice(elem) => types.base_type(*elem) == TypeId::U8,
            _ => false,
        }
    }

    fn is_castable_to(&self, o: &Operand, ty: TypeId) -> bool {
        if self.is_assignable_to(o, ty) {
            return true;
        }

        let types = self.types();
        let src = o.ty;
        if types.are_types_identical(types.core_type(src), types.core_type(ty)) {
            return true;
        }

        // Arrays of the same shape
        if let (Type::Array { elem: a, count: n }, Type::Array { elem: b, count: m }) =
            (types.get(types.base_type(src)), types.get(types.base_type(ty)))
        {
            if n == m && types.are_types_identical(*a, *b) {
                return true;
            }
        }

        if (types.is_boolean(src) || types.is_integer(src)) && (types.is_boolean(ty) || types.is_integer(ty)) {
            return true;
        }
        if types.is_numeric(src) && types.is_numeric(ty) {
            return true;
        }
        if self.is_pointer_like(src) && self.is_pointer_like(ty) {
            return true;
        }
        if (self.is_int_or_uint(src) && self.is_pointer_like(ty)) || (self.is_pointer_like(src) && self.is_int_or_uint(ty)) {
            return true;
        }
        if (self.is_u8_slice(src) && types.is_string(ty)) || (types.is_string(src) && self.is_u8_slice(ty)) {
            return true;
        }
        if types.is_proc(src) && (types.is_proc(ty) || types.is_rawptr(ty)) {
            return true;
        }

        false
    }

    /// `cast(T)x`.
    pub(super) fn check_conversion(&mut self, o: &mut Operand, ty: TypeId) {
        let is_const_expr = o.is_constant();
        let is_const_target = self.types().is_constant_type(ty);
        let mut can_convert = false;

        if is_const_expr && is_const_target {
            if let Some(value) = self.representable(&o.value, ty) {
                o.value = value;
                can_convert = true;
            } else if self.types().is_string(ty) && self.types().is_integer(o.ty) {
                let c = o
                    .value
                    .as_integer()
                    .and_then(|i| u32::try_from(i).ok())
                    .and_then(char::from_u32)
                    .unwrap_or('\u{FFFD}');
                o.value = ExactValue::String(c.to_string());
                can_convert = true;
            }
        } else if self.is_castable_to(o, ty) {
            can_convert = true;
        }

        if !can_convert {
            let msg = format!(
                "Cannot cast `{}` as `{}` from `{}`",
                self.expr_str(o),
                self.type_str(ty),
                self.type_str(o.ty)
            );
            let pos = self.operand_pos(o);
            self.error(pos, msg);
            o.invalidate();
            return;
        }

        if self.types().is_untyped(o.ty) {
            let final_ty = if is_const_expr && !is_const_target {
                self.types().default_type(o.ty)
            } else {
                ty
            };
            self.update_expr_type(o.expr, final_ty, true);
        }

        if !is_const_expr || !is_const_target {
            o.mode = AddressingMode::Value;
            o.value = ExactValue::Invalid;
        }
        o.ty = ty;
    }

    fn check_cast_expr(&mut self, expr: &'a Expr, kind: CastKind, ty_expr: &'a Expr, value: &'a Expr) -> Operand {
        let ty = self.check_type(ty_expr);
        let mut o = self.check_expr(value);
        if o.is_invalid() || self.types().is_invalid(ty) {
            return Operand::invalid();
        }

        match kind {
            CastKind::Cast => {
                self.check_conversion(&mut o, ty);
                return o;
            },

            CastKind::Transmute => {
                if o.is_constant() {
                    self.error(expr.pos, "Cannot transmute constant expression");
                    return Operand::invalid();
                }
                if self.types().is_untyped(o.ty) {
                    let default = self.types().default_type(o.ty);
                    self.convert_to_typed(&mut o, default);
                }

                let (src_size, dst_size) = (self.size_of(o.ty), self.size_of(ty));
                if src_size != dst_size {
                    let msg = format!(
                        "Cannot transmute `{}` to `{}`, {} vs {} bytes",
                        value,
                        self.type_str(ty),
                        src_size,
                        dst_size
                    );
                    self.error(expr.pos, msg);
                    return Operand::invalid();
                }
                o.ty = ty;
            },

            CastKind::DownCast => {
                if o.is_constant() {
                    self.error(expr.pos, "Cannot `down_cast` a constant expression");
                    return Operand::invalid();
                }
                if !self.types().is_pointer(o.ty) || !self.types().is_pointer(ty) {
                    self.error(expr.pos, "Can only `down_cast` pointers");
                    return Operand::invalid();
                }

                let (base, derived) = (self.types().deref(o.ty), self.types().deref(ty));
                let path = match self.find_using_path(derived, base) {
                    Some(path) => path,
                    None => {
                        self.error(expr.pos, format!("Illegal `down_cast`: `{}`", value));
                        return Operand::invalid();
                    },
                };

                self.info.selections.insert(
                    expr.id,
                    Selection {
                        kind: SelectionKind::Field,
                        ty: base,
                        index: path,
                        indirect: false,
                        entity: None,
                    },
                );
                o.ty = ty;
            },

            CastKind::UnionCast => {
                if o.is_constant() {
                    self.error(expr.pos, "Cannot `union_cast` a constant expression");
                    return Operand::invalid();
                }
                if !self.types().is_union(o.ty) {
                    self.error(expr.pos, "`union_cast` can only operate on unions");
                    return Operand::invalid();
                }
                if self.types().union_tag_of(o.ty, ty).is_none() {
                    let msg = format!("Cannot `union_cast` `{}` to `{}`", value, self.type_str(ty));
                    self.error(expr.pos, msg);
                    return Operand::invalid();
                }
                o.ty = self.types_mut().make_optional_ok(ty);
            },
        }

        o.mode = AddressingMode::Value;
        o.value = ExactValue::Invalid;
        o
    }

    // Selectors, calls, indexing

    fn check_selector(&mut self, expr: &'a Expr, base: &'a Expr, sel: &'a Ident) -> Operand {
        if let Some(name) = base.as_ident() {
            if let Some(e) = self.info.lookup_entity(self.context.scope, name) {
                if let EntityKind::ImportName { scope, .. } = self.entity(e).kind {
                    return self.check_import_selector(base, e, scope, sel);
                }
            }
        }

        let o = self.check_expr_or_type(base);
        if o.is_invalid() {
            return o;
        }

        let is_type = o.is_type();
        let selection = match self.types_mut().lookup_field(o.ty, &sel.name, is_type) {
            Some(selection) => selection,
            None => {
                let msg = format!("`{}` (`{}`) has no field `{}`", base, self.type_str(o.ty), sel.name);
                self.error(sel.pos, msg);
                return Operand::invalid();
            },
        };

        if let Some(e) = selection.entity {
            self.add_entity_use(sel.id, e);
        }

        let res = match &selection.kind {
            SelectionKind::Constant(value) => Operand::constant(selection.ty, value.clone()),
            SelectionKind::Field if is_type => {
                self.error(sel.pos, format!("Cannot access non-constant field `{}`", expr));
                return Operand::invalid();
            },
            SelectionKind::Field => {
                let mode = if o.mode == AddressingMode::Variable || selection.indirect {
                    AddressingMode::Variable
                } else {
                    AddressingMode::Value
                };
                Operand::new(mode, selection.ty)
            },
        };

        self.info.selections.insert(expr.id, selection);
        res
    }

    fn check_import_selector(
        &mut self,
        base: &'a Expr,
        import: odin_types::EntityId,
        scope: super::ScopeId,
        sel: &'a Ident,
    ) -> Operand {
        self.add_entity_use(base.id, import);
        if let EntityKind::ImportName { used, .. } = &mut self.entity_mut(import).kind {
            *used = true;
        }

        let import_name = self.entity(import).name.clone();
        let found = match self.info.current_scope_lookup_entity(scope, &sel.name) {
            Some(found) => found,
            None => {
                self.error(
                    sel.pos,
                    format!("`{}` is not declared by `{}`", sel.name, import_name),
                );
                return Operand::invalid();
            },
        };

        let implicit = self.info.scope(scope).implicit.contains_key(&sel.name);
        if sel.name.starts_with('_') || implicit {
            self.error(
                sel.pos,
                format!("`{}` is not exported by `{}`", sel.name, import_name),
            );
            return Operand::invalid();
        }

        self.add_entity_use(sel.id, found);
        self.operand_for_entity(base, found)
    }

    fn check_call(&mut self, expr: &'a Expr, callee: &'a Expr, args: &'a [Expr], ellipsis: bool) -> Operand {
        let o = self.check_expr_or_type(callee);

        match o.mode {
            AddressingMode::Invalid => {
                self.check_args_for_errors(args);
                return Operand::invalid();
            },
            AddressingMode::Type => {
                let msg = format!("Expected a procedure, got a type `{}`", self.type_str(o.ty));
                self.error(callee.pos, msg);
                self.check_args_for_errors(args);
                return Operand::invalid();
            },
            AddressingMode::Builtin => {
                if let Some(id) = o.builtin {
                    return self.check_builtin_call(expr, id, args, ellipsis);
                }
            },
            _ => {},
        }

        let proc_type = match self.types().proc_type(o.ty) {
            Some(pt) => pt.clone(),
            None => {
                self.error(callee.pos, format!("Cannot call a non-procedure: `{}`", callee));
                self.check_args_for_errors(args);
                return Operand::invalid();
            },
        };

        self.check_call_arguments(expr, callee, &proc_type, args, ellipsis);

        let results = self.types().tuple(proc_type.results).map_or(0, |r| r.len());
        match results {
            0 => Operand::new(AddressingMode::NoValue, proc_type.results),
            1 => {
                let ty = self.types().tuple(proc_type.results).map_or(TypeId::INVALID, |r| r[0].ty);
                Operand::new(AddressingMode::Value, ty)
            },
            _ => Operand::new(AddressingMode::Value, proc_type.results),
        }
    }

    pub(super) fn check_args_for_errors(&mut self, args: &'a [Expr]) {
        for arg in args {
            self.check_expr_base(arg, None);
        }
    }

    fn check_call_arguments(
        &mut self,
        call: &'a Expr,
        callee: &'a Expr,
        proc_type: &ProcType,
        args: &'a [Expr],
        ellipsis: bool,
    ) {
        if ellipsis && !proc_type.variadic {
            let msg = format!("Cannot use `..` in call to a non-variadic procedure: `{}`", callee);
            self.error(call.pos, msg);
            self.check_args_for_errors(args);
            return;
        }

        let mut operands = Vec::new();
        for arg in args {
            let o = self.check_multi_expr(arg);
            let fields = if o.is_invalid() {
                None
            } else {
                self.types().tuple(o.ty).map(|fields| fields.to_vec())
            };

            match fields {
                Some(fields) => {
                    operands.extend(
                        fields
                            .iter()
                            .map(|f| Operand::new(AddressingMode::Value, f.ty).with_expr(arg.id)),
                    );
                },
                None => operands.push(o),
            }
        }

        let params = self.types().tuple(proc_type.params).map(|p| p.to_vec()).unwrap_or_default();
        let param_count = params.len();
        let arg_count = operands.len();
        let variadic = proc_type.variadic && !ellipsis;

        if ellipsis && arg_count > param_count {
            self.error(
                call.pos,
                "`..` in a variadic procedure can only have one variadic argument at the end",
            );
            return;
        }

        let too_few = if variadic {
            arg_count + 1 < param_count
        } else {
            arg_count < param_count
        };
        let too_many = !variadic && arg_count > param_count;

        if too_few || too_many {
            let msg = format!(
                "Too {} arguments for `{}`, expected {} arguments",
                if too_few { "few" } else { "many" },
                callee,
                if variadic { param_count - 1 } else { param_count }
            );
            self.error(call.pos, msg);
            return;
        }

        for (i, mut o) in operands.into_iter().enumerate() {
            let ty = if variadic && i + 1 >= param_count {
                let last = params[param_count - 1].ty;
                self.types().elem(last).unwrap_or(TypeId::INVALID)
            } else {
                params[i].ty
            };
            self.check_assignment(&mut o, Some(ty), "argument");
        }
    }

    /// The element type and mode of indexing `o`.
    fn check_index_data(&self, o: &Operand, ty: TypeId) -> Option<(TypeId, AddressingMode)> {
        let types = self.types();
        let keep_variable = if o.mode == AddressingMode::Variable {
            AddressingMode::Variable
        } else {
            AddressingMode::Value
        };

        match types.get(types.base_type(ty)) {
            Type::Basic(_) if types.is_string(ty) => Some((TypeId::U8, AddressingMode::Value)),
            Type::Array { elem, .. } | Type::Vector { elem, .. } => {
                if o.is_constant() {
                    return None;
                }
                Some((*elem, keep_variable))
            },
            Type::Slice(elem) | Type::DynamicArray(elem) => Some((*elem, AddressingMode::Variable)),
            _ => None,
        }
    }

    /// Checks an index or slice bound. `Err` after an error, otherwise the
    /// constant value if there is one. Constants past the end are left to
    /// the runtime bounds check.
    pub(super) fn check_index_value(&mut self, index: &'a Expr) -> Result<Option<i64>, ()> {
        let mut o = self.check_expr(index);
        if o.is_invalid() {
            return Err(());
        }

        self.convert_to_typed(&mut o, TypeId::INT);
        if o.is_invalid() {
            return Err(());
        }

        if !self.types().is_integer(o.ty) {
            self.error(index.pos, format!("Index `{}` must be an integer", index));
            return Err(());
        }

        if o.is_constant() {
            let i = o.value.as_integer().unwrap_or_default();
            if i < 0 {
                self.error(index.pos, format!("Index `{}` cannot be a negative value", index));
                return Err(());
            }
            return Ok(Some(i as i64));
        }

        Ok(None)
    }

    fn check_index(&mut self, expr: &'a Expr, base: &'a Expr, index: &'a Expr) -> Operand {
        let mut o = self.check_expr(base);
        if o.is_invalid() {
            self.check_expr(index);
            return o;
        }

        let mut ty = o.ty;
        if self.types().is_pointer(ty) {
            ty = self.types().deref(ty);
            o.mode = AddressingMode::Variable;
        }

        let mut data = self.check_index_data(&o, ty);

        if data.is_none() && self.types().is_struct(ty) {
            let using_field = self.types().record(ty).and_then(|record| {
                record
                    .fields
                    .iter()
                    .position(|f| f.anonymous && self.is_indexable(f.ty))
                    .map(|i| (i, record.fields[i].ty))
            });

            if let Some((i, field_ty)) = using_field {
                self.info.selections.insert(
                    expr.id,
                    Selection {
                        kind: SelectionKind::Field,
                        ty: field_ty,
                        index: vec![i],
                        indirect: false,
                        entity: None,
                    },
                );
                data = self.check_index_data(&o, field_ty);
            }
        }

        let (elem, mode) = match data {
            Some(data) => data,
            None => {
                let msg = if o.is_constant() {
                    format!("Cannot index a constant `{}`", base)
                } else {
                    format!("Cannot index `{}`", base)
                };
                self.error(base.pos, msg);
                self.check_expr(index);
                return Operand::invalid();
            },
        };

        if self.check_index_value(index).is_err() {
            return Operand::invalid();
        }

        Operand::new(mode, elem)
    }

    fn check_slice_expr(
        &mut self,
        expr: &'a Expr,
        base: &'a Expr,
        low: Option<&'a Expr>,
        high: Option<&'a Expr>,
        max: Option<&'a Expr>,
    ) -> Operand {
        let mut o = self.check_expr(base);
        if o.is_invalid() {
            return o;
        }

        let types = self.types();
        let base_ty = types.base_type(o.ty);

        let result_ty = match types.get(base_ty).clone() {
            Type::Basic(_) if types.is_string(base_ty) => {
                if max.is_some() {
                    self.error(expr.pos, "3-index slice on a string is not needed");
                    return Operand::invalid();
                }
                if self.types().is_untyped(o.ty) {
                    self.convert_to_typed(&mut o, TypeId::STRING);
                }
                o.ty
            },
            Type::Array { elem, .. } => {
                if o.mode != AddressingMode::Variable {
                    let msg = format!("Cannot slice array `{}`, value is not addressable", base);
                    self.error(base.pos, msg);
                    return Operand::invalid();
                }
                self.types_mut().make_slice(elem)
            },
            Type::Slice(_) => o.ty,
            Type::DynamicArray(elem) => self.types_mut().make_slice(elem),
            _ => {
                self.error(base.pos, format!("Cannot slice `{}`", base));
                return Operand::invalid();
            },
        };

        let mut values = Vec::new();
        for index in [low, high, max].iter().copied().flatten() {
            match self.check_index_value(index) {
                Ok(Some(v)) => values.push(v),
                Ok(None) => {},
                Err(()) => return Operand::invalid(),
            }
        }

        for pair in values.windows(2) {
            if pair[0] > pair[1] {
                self.error(expr.pos, format!("Invalid slice indices: [{} > {}]", pair[0], pair[1]));
                return Operand::invalid();
            }
        }

        Operand::new(AddressingMode::Value, result_ty)
    }

    // Literals

    fn check_compound_literal(
        &mut self,
        expr: &'a Expr,
        ty_expr: Option<&'a Expr>,
        elems: &'a [Expr],
        type_hint: Option<TypeId>,
    ) -> Operand {
        let ty = match (ty_expr, type_hint) {
            (Some(ty_expr), _) => self.check_type(ty_expr),
            (None, Some(hint)) => hint,
            (None, None) => {
                self.error(expr.pos, "Missing type in compound literal");
                self.check_args_for_errors(elems);
                return Operand::invalid();
            },
        };

        if self.types().is_invalid(ty) {
            self.check_args_for_errors(elems);
            return Operand::invalid();
        }

        let base = self.types().base_type(ty);
        match self.types().get(base).clone() {
            Type::Record(record) if self.types().is_struct(base) => {
                let field_tys: Vec<TypeId> = record.fields.iter().map(|f| f.ty).collect();
                self.check_struct_literal(ty, &field_tys, elems);
            },

            Type::Array { elem, count } => self.check_array_literal(elem, Some(count), elems, "array"),
            Type::Vector { elem, count } => self.check_array_literal(elem, Some(count), elems, "vector"),
            Type::Slice(elem) | Type::DynamicArray(elem) => self.check_array_literal(elem, None, elems, "array"),

            _ => {
                let msg = format!("Invalid compound literal type `{}`", self.type_str(ty));
                self.error(expr.pos, msg);
                self.check_args_for_errors(elems);
                return Operand::invalid();
            },
        }

        Operand::new(AddressingMode::Value, ty)
    }

    fn check_struct_literal(&mut self, ty: TypeId, field_tys: &[TypeId], elems: &'a [Expr]) {
        let first_is_field_value = match elems.first() {
            Some(first) => matches!(first.kind, ExprKind::FieldValue { .. }),
            None => return,
        };

        if first_is_field_value {
            let mut seen = HashSet::new();

            for elem in elems {
                let (name, value) = match &elem.kind {
                    ExprKind::FieldValue { name, value } => (name, value),
                    _ => {
                        self.error(
                            elem.pos,
                            "Mixture of `field = value` and value elements in a structure literal is not allowed",
                        );
                        self.check_expr_base(elem, None);
                        continue;
                    },
                };
                self.nodes.insert(elem.id, elem);

                let selection = match self.types_mut().lookup_field(ty, &name.name, false) {
                    Some(selection) if selection.is_field() => selection,
                    _ => {
                        self.error(name.pos, format!("Unknown field `{}` in structure literal", name.name));
                        self.check_expr_base(value, None);
                        continue;
                    },
                };

                if selection.index.len() > 1 {
                    self.error(
                        name.pos,
                        format!("Cannot assign to an anonymous field `{}` in a structure literal", name.name),
                    );
                    self.check_expr_base(value, None);
                    continue;
                }

                let index = selection.index[0];
                if !seen.insert(index) {
                    self.error(name.pos, format!("Duplicate field `{}` in structure literal", name.name));
                    self.check_expr_base(value, None);
                    continue;
                }

                let field_ty = field_tys[index];
                if let Some(e) = selection.entity {
                    self.add_entity_use(name.id, e);
                }
                self.info.selections.insert(elem.id, selection);

                let mut o = self.check_expr_with_type_hint(value, Some(field_ty));
                self.check_assignment(&mut o, Some(field_ty), "structure literal");
            }
            return;
        }

        for (i, elem) in elems.iter().enumerate() {
            if let ExprKind::FieldValue { .. } = elem.kind {
                self.error(
                    elem.pos,
                    "Mixture of `field = value` and value elements in a structure literal is not allowed",
                );
                continue;
            }

            let field_ty = match field_tys.get(i) {
                Some(&ty) => ty,
                None => {
                    let msg = format!("Too many values in structure literal, expected {}", field_tys.len());
                    self.error(elem.pos, msg);
                    break;
                },
            };

            let mut o = self.check_expr_with_type_hint(elem, Some(field_ty));
            self.check_assignment(&mut o, Some(field_ty), "structure literal");
        }

        if elems.len() < field_tys.len() {
            let pos = elems[elems.len() - 1].pos;
            let msg = format!(
                "Too few values in structure literal, expected {}, got {}",
                field_tys.len(),
                elems.len()
            );
            self.error(pos, msg);
        }
    }

    fn check_array_literal(&mut self, elem_ty: TypeId, max: Option<i64>, elems: &'a [Expr], what: &str) {
        for (i, elem) in elems.iter().enumerate() {
            if let ExprKind::FieldValue { .. } = elem.kind {
                self.error(elem.pos, "`field = value` is only allowed in struct literals");
                continue;
            }

            if let Some(max) = max {
                if i as i64 >= max {
                    let msg = format!("Index {} is out of bounds (>= {}) for {} literal", i, max, what);
                    self.error(elem.pos, msg);
                    break;
                }
            }

            let mut o = self.check_expr_with_type_hint(elem, Some(elem_ty));
            let context = format!("{} literal", what);
            self.check_assignment(&mut o, Some(elem_ty), &context);
        }
    }

    fn check_proc_lit(&mut self, expr: &'a Expr, ty_expr: &'a Expr, body: Option<&'a Stmt>, tags: ProcTags) -> Operand {
        let ty = self.check_type(ty_expr);
        if self.types().is_invalid(ty) {
            return Operand::invalid();
        }

        if !tags.is_empty() {
            self.error(expr.pos, "A procedure literal cannot have tags");
        }

        let body = match body {
            Some(body) => body,
            None => {
                self.error(expr.pos, "Invalid procedure literal");
                return Operand::invalid();
            },
        };

        let scope = match self.info.scopes.get(&ty_expr.unparen().id) {
            Some(&scope) => scope,
            None => return Operand::invalid(),
        };

        self.check_procedure_later(super::ProcedureInfo {
            file: self.context.file,
            decl: self.context.decl,
            scope,
            ty,
            body,
            tags,
        });

        Operand::new(AddressingMode::Value, ty)
    }
}
