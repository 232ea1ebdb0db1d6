//! Builtin procedure calls.

use odin_types::{exact_value, BinaryOp, ExactValue, Type, TypeId};

use super::{entity::BuiltinId, AddressingMode, Checker, Operand};
use crate::ast::{Expr, ExprKind, TokenPos};

impl<'a> Checker<'a> {
    pub(super) fn check_builtin_call(&mut self, call: &'a Expr, id: BuiltinId, args: &'a [Expr], ellipsis: bool) -> Operand {
        let info = id.info();

        let err = if args.len() < info.arg_count {
            Some("Too few")
        } else if args.len() > info.arg_count && !info.variadic {
            Some("Too many")
        } else {
            None
        };
        if let Some(err) = err {
            let msg = format!(
                "{} arguments for `{}`, expected {}, got {}",
                err,
                info.name,
                info.arg_count,
                args.len()
            );
            self.error(call.pos, msg);
            self.check_args_for_errors(args);
            return Operand::invalid();
        }

        if ellipsis && id != BuiltinId::Append {
            self.error(call.pos, format!("Cannot use `..` in call to `{}`", info.name));
        }

        let o = match id {
            BuiltinId::Len | BuiltinId::Cap => self.builtin_len_or_cap(id, args),
            BuiltinId::New => self.builtin_new(args),
            BuiltinId::NewSlice => self.builtin_new_slice(call, args),
            BuiltinId::Free => self.builtin_free(args),
            BuiltinId::Reserve => self.builtin_reserve(args),
            BuiltinId::Clear => self.builtin_clear(args),
            BuiltinId::Append => self.builtin_append(call, args, ellipsis),
            BuiltinId::SizeOf | BuiltinId::AlignOf => self.builtin_size_or_align(id, args),
            BuiltinId::SizeOfVal | BuiltinId::AlignOfVal => self.builtin_size_or_align_val(id, args),
            BuiltinId::OffsetOf => self.builtin_offset_of(args),
            BuiltinId::OffsetOfVal => self.builtin_offset_of_val(args),
            BuiltinId::TypeOfVal => self.builtin_type_of_val(args),
            BuiltinId::TypeInfo => self.builtin_type_info(args),
            BuiltinId::TypeInfoOfVal => self.builtin_type_info_of_val(args),
            BuiltinId::CompileAssert => self.builtin_compile_assert(call, args),
            BuiltinId::Assert => self.builtin_assert(call, args),
            BuiltinId::Panic => self.builtin_panic(call, args),
            BuiltinId::Copy => self.builtin_copy(call, args),
            BuiltinId::Swizzle => self.builtin_swizzle(call, args),
            BuiltinId::SlicePtr => self.builtin_slice_ptr(call, args),
            BuiltinId::Min | BuiltinId::Max => self.builtin_min_max(call, id, args),
            BuiltinId::Abs => self.builtin_abs(call, args),
            BuiltinId::Clamp => self.builtin_clamp(call, args),
            BuiltinId::Transmute => self.builtin_transmute(args),
        };

        o.unwrap_or_else(Operand::invalid)
    }

    /// The first argument of builtins that take a type.
    fn builtin_type_arg(&mut self, arg: &'a Expr, name: &str) -> Option<TypeId> {
        let o = self.check_expr_or_type(arg);
        if o.is_invalid() {
            return None;
        }
        if !o.is_type() || self.types().is_invalid(o.ty) {
            self.error(arg.pos, format!("Expected a type for `{}`", name));
            return None;
        }
        Some(o.ty)
    }

    fn valid_expr(&mut self, arg: &'a Expr) -> Option<Operand> {
        let o = self.check_expr(arg);
        if o.is_invalid() {
            None
        } else {
            Some(o)
        }
    }

    /// A length or capacity argument, converted to `int`.
    fn builtin_int_arg(&mut self, arg: &'a Expr, what: &str) -> Option<Operand> {
        let mut o = self.valid_expr(arg)?;
        self.convert_to_typed(&mut o, TypeId::INT);
        if o.is_invalid() {
            return None;
        }
        if !self.types().is_integer(o.ty) {
            let msg = format!("{} must be an integer, got `{}`", what, self.type_str(o.ty));
            self.error(arg.pos, msg);
            return None;
        }
        Some(o)
    }

    /// The dynamic array behind a `^[dynamic]T` argument.
    fn builtin_dynamic_array_ptr(&mut self, o: &Operand) -> Option<TypeId> {
        let types = self.types();
        if types.is_pointer(o.ty) {
            let array = types.deref(o.ty);
            if types.is_dynamic_array(array) {
                return Some(array);
            }
        }

        let msg = format!("Expected a pointer to a dynamic array, got `{}`", self.type_str(o.ty));
        let pos = self.operand_pos(o);
        self.error(pos, msg);
        None
    }

    /// `len` and `cap` look through one pointer. Arrays, vectors and
    /// constant strings give constants.
    fn builtin_len_or_cap(&mut self, id: BuiltinId, args: &'a [Expr]) -> Option<Operand> {
        let o = self.valid_expr(&args[0])?;
        let types = self.types();
        let ty = types.base_type(types.deref(o.ty));

        let count = match types.get(ty) {
            Type::Array { count, .. } | Type::Vector { count, .. } => Some(Some(i128::from(*count))),
            Type::Slice(_) | Type::DynamicArray(_) => Some(None),
            Type::Basic(_) if id == BuiltinId::Len && types.is_string(ty) => {
                Some(o.value.as_str().map(|s| s.len() as i128))
            },
            _ => None,
        };

        match count {
            Some(Some(n)) => Some(Operand::constant(TypeId::INT, ExactValue::Integer(n))),
            Some(None) => Some(Operand::new(AddressingMode::Value, TypeId::INT)),
            None => {
                let msg = format!("Invalid argument for `{}`, got `{}`", id.name(), self.type_str(o.ty));
                self.error(args[0].pos, msg);
                None
            },
        }
    }

    fn builtin_new(&mut self, args: &'a [Expr]) -> Option<Operand> {
        let ty = self.builtin_type_arg(&args[0], "new")?;
        let ptr = self.types_mut().make_pointer(ty);
        Some(Operand::new(AddressingMode::Value, ptr))
    }

    fn builtin_new_slice(&mut self, call: &'a Expr, args: &'a [Expr]) -> Option<Operand> {
        let ty = self.builtin_type_arg(&args[0], "new_slice");
        if args.len() > 3 {
            let msg = format!("`new_slice` expects 2 or 3 arguments, found {}", args.len());
            self.error(call.pos, msg);
            self.check_args_for_errors(&args[1..]);
            return None;
        }

        let mut sizes = Vec::new();
        for arg in &args[1..] {
            let o = self.builtin_int_arg(arg, "Length for `new_slice`")?;
            if let Some(v) = o.value.as_integer() {
                sizes.push(v);
            }
        }
        if let [len, cap] = sizes[..] {
            if len > cap {
                self.error(args[1].pos, "`new_slice` count and capacity are swapped");
            }
        }

        let slice = self.types_mut().make_slice(ty?);
        Some(Operand::new(AddressingMode::Value, slice))
    }

    fn builtin_free(&mut self, args: &'a [Expr]) -> Option<Operand> {
        let o = self.valid_expr(&args[0])?;
        let types = self.types();
        let ok = types.is_pointer(o.ty)
            || types.is_rawptr(o.ty)
            || types.is_slice(o.ty)
            || types.is_string(o.ty)
            || types.is_dynamic_array(o.ty);

        if !ok {
            let msg = format!("Invalid type for `free`, got `{}`", self.type_str(o.ty));
            self.error(args[0].pos, msg);
            return None;
        }

        Some(Operand::new(AddressingMode::NoValue, TypeId::INVALID))
    }

    fn builtin_reserve(&mut self, args: &'a [Expr]) -> Option<Operand> {
        let o = self.valid_expr(&args[0])?;
        self.builtin_dynamic_array_ptr(&o)?;
        self.builtin_int_arg(&args[1], "`reserve` capacity")?;
        Some(Operand::new(AddressingMode::NoValue, TypeId::INVALID))
    }

    fn builtin_clear(&mut self, args: &'a [Expr]) -> Option<Operand> {
        let o = self.valid_expr(&args[0])?;
        let types = self.types();
        let target = if types.is_pointer(o.ty) { types.deref(o.ty) } else { o.ty };

        if !types.is_dynamic_array(target) && !types.is_slice(target) {
            let msg = format!("Invalid type for `clear`, got `{}`", self.type_str(target));
            self.error(args[0].pos, msg);
            return None;
        }
        if !types.is_pointer(o.ty) && o.mode != AddressingMode::Variable {
            self.error(args[0].pos, format!("Cannot `clear` `{}`, value is not addressable", args[0]));
            return None;
        }

        Some(Operand::new(AddressingMode::NoValue, TypeId::INVALID))
    }

    fn builtin_append(&mut self, call: &'a Expr, args: &'a [Expr], ellipsis: bool) -> Option<Operand> {
        let o = self.valid_expr(&args[0])?;
        let array = self.builtin_dynamic_array_ptr(&o)?;
        let elem = self.types().elem(array).unwrap_or(TypeId::INVALID);

        if ellipsis {
            if args.len() != 2 {
                self.error(
                    call.pos,
                    "`..` in a variadic procedure can only have one variadic argument at the end",
                );
                return None;
            }
            let slice = self.types_mut().make_slice(elem);
            let mut item = self.check_expr(&args[1]);
            self.check_assignment(&mut item, Some(slice), "argument to `append`");
            return Some(Operand::new(AddressingMode::Value, TypeId::INT));
        }

        for arg in &args[1..] {
            let mut item = self.check_expr(arg);
            self.check_assignment(&mut item, Some(elem), "argument to `append`");
        }

        Some(Operand::new(AddressingMode::Value, TypeId::INT))
    }

    fn builtin_size_or_align(&mut self, id: BuiltinId, args: &'a [Expr]) -> Option<Operand> {
        let ty = self.builtin_type_arg(&args[0], id.name())?;
        let value = if id == BuiltinId::SizeOf {
            self.size_of(ty)
        } else {
            self.align_of(ty)
        };

        Some(Operand::constant(TypeId::UNTYPED_INTEGER, ExactValue::Integer(value.into())))
    }

    fn builtin_size_or_align_val(&mut self, id: BuiltinId, args: &'a [Expr]) -> Option<Operand> {
        let mut o = self.valid_expr(&args[0])?;
        let context = format!("argument of `{}`", id.name());
        self.check_assignment(&mut o, None, &context);
        if o.is_invalid() {
            return None;
        }

        let value = if id == BuiltinId::SizeOfVal {
            self.size_of(o.ty)
        } else {
            self.align_of(o.ty)
        };
        Some(Operand::constant(TypeId::UNTYPED_INTEGER, ExactValue::Integer(value.into())))
    }

    /// The byte offset of the field `name` within `ty`.
    fn builtin_field_offset(&mut self, ty: TypeId, name: &str, pos: TokenPos) -> Option<Operand> {
        let types = self.types();
        if types.is_array(ty) || types.is_vector(ty) {
            self.error(pos, "Invalid type for `offset_of`");
            return None;
        }

        let selection = match self.types_mut().lookup_field(ty, name, false) {
            Some(selection) if selection.is_field() => selection,
            _ => {
                let msg = format!("`{}` has no field named `{}`", self.type_str(ty), name);
                self.error(pos, msg);
                return None;
            },
        };

        if selection.indirect {
            let msg = format!("Field `{}` is embedded via a pointer in `{}`", name, self.type_str(ty));
            self.error(pos, msg);
            return None;
        }

        let offset = self
            .types()
            .offset_of_selection(&self.info.ctx, ty, &selection.index)?;
        Some(Operand::constant(TypeId::UNTYPED_INTEGER, ExactValue::Integer(offset.into())))
    }

    fn builtin_offset_of(&mut self, args: &'a [Expr]) -> Option<Operand> {
        let ty = self.builtin_type_arg(&args[0], "offset_of")?;
        match args[1].unparen().as_ident() {
            Some(name) => self.builtin_field_offset(ty, name, args[1].pos),
            None => {
                self.error(args[1].pos, "Expected an identifier for field argument");
                None
            },
        }
    }

    fn builtin_offset_of_val(&mut self, args: &'a [Expr]) -> Option<Operand> {
        let arg = args[0].unparen();
        let (base, name) = match &arg.kind {
            ExprKind::Selector { expr, name } => (expr, name),
            _ => {
                self.error(arg.pos, format!("`{}` is not a selector expression", arg));
                return None;
            },
        };

        let o = self.valid_expr(base)?;
        let mut ty = o.ty;
        if self.types().is_pointer(ty) {
            let elem = self.types().deref(ty);
            if self.types().is_struct(elem) {
                ty = elem;
            }
        }

        self.builtin_field_offset(ty, &name.name, name.pos)
    }

    fn builtin_type_of_val(&mut self, args: &'a [Expr]) -> Option<Operand> {
        let mut o = self.valid_expr(&args[0])?;
        self.check_assignment(&mut o, None, "argument of `type_of_val`");
        if o.is_invalid() || self.types().is_invalid(o.ty) {
            self.error(args[0].pos, "Invalid argument to `type_of_val`");
            return None;
        }
        Some(Operand::new(AddressingMode::Type, o.ty))
    }

    fn type_info_result(&mut self, ty: TypeId) -> Operand {
        // `Type_Info` may not have been looked up yet.
        self.init_preload();
        self.add_type_info_type(ty);
        let ptr = self.types_mut().type_info_ptr();
        Operand::new(AddressingMode::Value, ptr)
    }

    fn builtin_type_info(&mut self, args: &'a [Expr]) -> Option<Operand> {
        let o = self.check_expr_or_type(&args[0]);
        if o.is_invalid() {
            return None;
        }
        if !o.is_type() || self.types().is_invalid(o.ty) {
            self.error(args[0].pos, "Invalid argument to `type_info`");
            return None;
        }
        Some(self.type_info_result(o.ty))
    }

    fn builtin_type_info_of_val(&mut self, args: &'a [Expr]) -> Option<Operand> {
        let mut o = self.valid_expr(&args[0])?;
        self.check_assignment(&mut o, None, "argument of `type_info_of_val`");
        if o.is_invalid() {
            return None;
        }
        Some(self.type_info_result(o.ty))
    }

    fn builtin_compile_assert(&mut self, call: &'a Expr, args: &'a [Expr]) -> Option<Operand> {
        let o = self.valid_expr(&args[0])?;
        if !o.is_constant() || !self.types().is_boolean(o.ty) {
            self.error(call.pos, format!("`{}` is not a constant boolean", args[0]));
            return None;
        }
        if o.value.as_bool() != Some(true) {
            self.error(call.pos, format!("Compile time assertion: `{}`", args[0]));
        }

        Some(Operand::constant(TypeId::UNTYPED_BOOL, ExactValue::Bool(true)))
    }

    fn builtin_assert(&mut self, call: &'a Expr, args: &'a [Expr]) -> Option<Operand> {
        let mut o = self.valid_expr(&args[0])?;
        if !self.types().is_boolean(o.ty) {
            self.error(call.pos, format!("`{}` is not a boolean", args[0]));
            return None;
        }
        self.convert_to_typed(&mut o, TypeId::BOOL);
        Some(Operand::new(AddressingMode::NoValue, TypeId::INVALID))
    }

    fn builtin_panic(&mut self, call: &'a Expr, args: &'a [Expr]) -> Option<Operand> {
        let mut o = self.valid_expr(&args[0])?;
        if !self.types().is_string(o.ty) {
            self.error(call.pos, format!("`{}` is not a string", args[0]));
            return None;
        }
        self.convert_to_typed(&mut o, TypeId::STRING);
        Some(Operand::new(AddressingMode::NoValue, TypeId::INVALID))
    }

    fn builtin_copy(&mut self, call: &'a Expr, args: &'a [Expr]) -> Option<Operand> {
        let dst = self.valid_expr(&args[0])?;
        let src = self.valid_expr(&args[1])?;

        let types = self.types();
        let slice_elem = |ty: TypeId| match types.get(types.base_type(ty)) {
            Type::Slice(elem) => Some(*elem),
            _ => None,
        };

        let (d, s) = match (slice_elem(dst.ty), slice_elem(src.ty)) {
            (Some(d), Some(s)) => (d, s),
            _ => {
                self.error(call.pos, "`copy` only expects slices as arguments");
                return None;
            },
        };

        if !types.are_types_identical(d, s) {
            let msg = format!(
                "Arguments to `copy`, {}, {}, have different elem types: {} vs {}",
                args[0],
                args[1],
                self.type_str(d),
                self.type_str(s)
            );
            self.error(call.pos, msg);
            return None;
        }

        Some(Operand::new(AddressingMode::Value, TypeId::INT))
    }

    fn builtin_swizzle(&mut self, call: &'a Expr, args: &'a [Expr]) -> Option<Operand> {
        let o = self.valid_expr(&args[0])?;
        let (elem, max_count) = match self.types().get(self.types().base_type(o.ty)) {
            Type::Vector { elem, count } => (*elem, *count),
            _ => {
                let msg = format!("You can only `swizzle` a vector, got `{}`", self.type_str(o.ty));
                self.error(call.pos, msg);
                return None;
            },
        };

        let mut count = 0;
        for arg in &args[1..] {
            let mut index = self.valid_expr(arg)?;
            if !index.is_constant() || !self.types().is_integer(index.ty) {
                self.error(arg.pos, "Indices to `swizzle` must be constant integers");
                return None;
            }
            let i = index.value.as_integer().unwrap_or_default();
            if i < 0 {
                self.error(arg.pos, "Negative `swizzle` index");
                return None;
            }
            if i128::from(max_count) <= i {
                self.error(arg.pos, "`swizzle` index exceeds vector length");
                return None;
            }
            self.convert_to_typed(&mut index, TypeId::INT);
            count += 1;
        }

        if count > max_count {
            self.error(call.pos, format!("Too many `swizzle` indices, {} > {}", count, max_count));
            return None;
        }

        let ty = self.types_mut().make_vector(elem, count);
        Some(Operand::new(AddressingMode::Value, ty))
    }

    fn builtin_slice_ptr(&mut self, call: &'a Expr, args: &'a [Expr]) -> Option<Operand> {
        let o = self.valid_expr(&args[0])?;
        if self.types().is_rawptr(o.ty) {
            self.error(call.pos, "`rawptr` cannot have pointer arithmetic");
            return None;
        }
        if !self.types().is_pointer(o.ty) {
            let msg = format!("Expected a pointer to `slice_ptr`, got `{}`", self.type_str(o.ty));
            self.error(call.pos, msg);
            return None;
        }
        if args.len() > 3 {
            let msg = format!("`slice_ptr` expects 2 or 3 arguments, found {}", args.len());
            self.error(call.pos, msg);
            return None;
        }

        for arg in &args[1..] {
            self.builtin_int_arg(arg, "Length for `slice_ptr`")?;
        }

        let elem = self.types().deref(o.ty);
        let slice = self.types_mut().make_slice(elem);
        Some(Operand::new(AddressingMode::Value, slice))
    }

    fn is_min_max_operand(&self, o: &Operand) -> bool {
        let types = self.types();
        types.is_comparable(o.ty) && (types.is_numeric(o.ty) || types.is_string(o.ty))
    }

    /// Brings `operands` to one type for a non-constant min, max or clamp.
    fn unify_operands(&mut self, call: &Expr, name: &str, operands: &mut [Operand]) -> Option<TypeId> {
        for i in 0..operands.len() {
            for j in 0..operands.len() {
                if i == j {
                    continue;
                }
                let target = operands[j].ty;
                self.convert_to_typed(&mut operands[i], target);
                if operands[i].is_invalid() {
                    return None;
                }
            }
        }

        let first = operands[0].ty;
        if operands
            .iter()
            .any(|o| !self.types().are_types_identical(o.ty, first))
        {
            let tys: Vec<String> = operands
                .iter()
                .map(|o| format!("`{}`", self.type_str(o.ty)))
                .collect();
            self.error(call.pos, format!("Mismatched types to `{}`, {}", name, tys.join(", ")));
            return None;
        }

        // Settle anything still untyped, e.g. `min(x, 1)` with an untyped `x`.
        let ty = self.types().default_type(first);
        for o in operands.iter_mut() {
            self.convert_to_typed(o, ty);
        }
        Some(ty)
    }

    fn builtin_min_max(&mut self, call: &'a Expr, id: BuiltinId, args: &'a [Expr]) -> Option<Operand> {
        let name = id.name();
        let mut operands = Vec::with_capacity(2);
        for arg in args {
            let o = self.valid_expr(arg)?;
            if !self.is_min_max_operand(&o) {
                let msg = format!(
                    "Expected a comparable numeric or string type to `{}`, got `{}`",
                    name,
                    self.type_str(o.ty)
                );
                self.error(call.pos, msg);
                return None;
            }
            operands.push(o);
        }

        if operands.iter().all(Operand::is_constant) {
            let op = if id == BuiltinId::Min { BinaryOp::Lt } else { BinaryOp::Gt };
            let (a, b) = (&operands[0], &operands[1]);
            let pick = if exact_value::compare(op, &a.value, &b.value).unwrap_or(false) {
                a
            } else {
                b
            };
            return Some(Operand::constant(pick.ty, pick.value.clone()));
        }

        let ty = self.unify_operands(call, name, &mut operands)?;
        Some(Operand::new(AddressingMode::Value, ty))
    }

    fn builtin_abs(&mut self, call: &'a Expr, args: &'a [Expr]) -> Option<Operand> {
        let o = self.valid_expr(&args[0])?;
        if !self.types().is_numeric(o.ty) {
            let msg = format!("Expected a numeric type to `abs`, got `{}`", self.type_str(o.ty));
            self.error(call.pos, msg);
            return None;
        }

        if o.is_constant() {
            let value = match &o.value {
                ExactValue::Integer(i) => ExactValue::Integer(i.abs()),
                ExactValue::Float(_) => ExactValue::float(o.value.as_f64().unwrap_or_default().abs()),
                other => other.clone(),
            };
            return Some(Operand::constant(o.ty, value));
        }

        Some(Operand::new(AddressingMode::Value, o.ty))
    }

    fn builtin_clamp(&mut self, call: &'a Expr, args: &'a [Expr]) -> Option<Operand> {
        let mut operands = Vec::with_capacity(3);
        for arg in args {
            let o = self.valid_expr(arg)?;
            if !self.is_min_max_operand(&o) {
                let msg = format!(
                    "Expected a comparable numeric or string type to `clamp`, got `{}`",
                    self.type_str(o.ty)
                );
                self.error(call.pos, msg);
                return None;
            }
            operands.push(o);
        }

        if operands.iter().all(Operand::is_constant) {
            let (x, lo, hi) = (&operands[0], &operands[1], &operands[2]);
            let pick = if exact_value::compare(BinaryOp::Lt, &x.value, &lo.value).unwrap_or(false) {
                lo
            } else if exact_value::compare(BinaryOp::Gt, &x.value, &hi.value).unwrap_or(false) {
                hi
            } else {
                x
            };
            return Some(Operand::constant(pick.ty, pick.value.clone()));
        }

        let ty = self.unify_operands(call, "clamp", &mut operands)?;
        Some(Operand::new(AddressingMode::Value, ty))
    }

    fn builtin_transmute(&mut self, args: &'a [Expr]) -> Option<Operand> {
        let ty = self.builtin_type_arg(&args[0], "transmute")?;
        let o = self.valid_expr(&args[1])?;

        if o.is_constant() {
            let msg = format!("Cannot transmute a constant expression: `{}`", args[1]);
            self.error(args[1].pos, msg);
            return None;
        }
        if self.types().is_untyped(o.ty) {
            let msg = format!("Cannot transmute untyped expression: `{}`", args[1]);
            self.error(args[1].pos, msg);
            return None;
        }

        let (src, dst) = (self.size_of(o.ty), self.size_of(ty));
        if src != dst {
            let msg = format!(
                "Cannot transmute `{}` to `{}`, {} vs {} bytes",
                args[1],
                self.type_str(ty),
                src,
                dst
            );
            self.error(args[1].pos, msg);
            return None;
        }

        Some(Operand::new(AddressingMode::Value, ty))
    }
}
