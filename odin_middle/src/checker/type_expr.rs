//! Type expressions: `^T`, `[N]T`, `struct {...}`, `proc(...)` and names
//! that denote types.

use std::collections::HashSet;

use odin_types::{exact_value, BinaryOp, ExactValue, Field, Record, RecordKind, TypeId};

use super::{
    entity::{Entity, EntityFlags, EntityKind},
    AddressingMode, Checker, ScopeFlags,
};
use crate::ast::{EnumField, Expr, ExprKind, FieldDecl};

impl<'a> Checker<'a> {
    pub(super) fn check_type(&mut self, expr: &'a Expr) -> TypeId {
        self.check_type_named(expr, None)
    }

    /// `named` is the type being declared when `expr` is the right hand
    /// side of a type declaration. Enum constants take it as their type.
    pub(super) fn check_type_named(&mut self, expr: &'a Expr, named: Option<TypeId>) -> TypeId {
        self.nodes.insert(expr.id, expr);
        let ty = self.check_type_inner(expr, named);
        self.add_type_and_value(expr.id, AddressingMode::Type, ty, ExactValue::Invalid);
        ty
    }

    fn check_type_inner(&mut self, expr: &'a Expr, named: Option<TypeId>) -> TypeId {
        match &expr.kind {
            ExprKind::Paren(inner) => self.check_type_named(inner, named),

            ExprKind::PointerType(elem) => {
                let elem = self.check_type(elem);
                self.types_mut().make_pointer(elem)
            },

            ExprKind::ArrayType { count: Some(count), elem } => {
                let elem = self.check_type(elem);
                match self.check_array_count(count) {
                    Some(count) => self.types_mut().make_array(elem, count),
                    None => TypeId::INVALID,
                }
            },

            ExprKind::ArrayType { count: None, elem } => {
                let elem = self.check_type(elem);
                self.types_mut().make_slice(elem)
            },

            ExprKind::DynamicArrayType(elem) => {
                let elem = self.check_type(elem);
                self.types_mut().make_dynamic_array(elem)
            },

            ExprKind::VectorType { count, elem } => {
                let elem_ty = self.check_type(elem);
                let count = self.check_array_count(count);

                let base = self.types().base_type(elem_ty);
                let types = self.types();
                if !types.is_invalid(base) && !(types.is_numeric(base) || types.is_boolean(base)) {
                    let msg = format!(
                        "Vector element type must be numerical or a boolean. Got `{}`",
                        self.type_str(elem_ty)
                    );
                    self.error(elem.pos, msg);
                    return TypeId::INVALID;
                }

                match count {
                    Some(count) => self.types_mut().make_vector(elem_ty, count),
                    None => TypeId::INVALID,
                }
            },

            ExprKind::StructType {
                fields,
                is_packed,
                is_ordered,
            } => {
                self.open_scope(expr.id, ScopeFlags::empty());
                let fields = self.check_record_fields(fields, "structure");
                self.close_scope();

                let mut record = Record::new(RecordKind::Struct, fields);
                record.is_packed = *is_packed;
                record.is_ordered = *is_ordered;
                self.types_mut().make_record(record)
            },

            ExprKind::RawUnionType(fields) => {
                self.open_scope(expr.id, ScopeFlags::empty());
                let fields = self.check_record_fields(fields, "raw union");
                self.close_scope();
                self.types_mut().make_record(Record::new(RecordKind::RawUnion, fields))
            },

            ExprKind::UnionType(variants) => {
                self.open_scope(expr.id, ScopeFlags::empty());
                let variants = self.check_union_variants(variants);
                self.close_scope();
                self.types_mut().make_record(Record::new(RecordKind::Union, variants))
            },

            ExprKind::EnumType { base, fields } => {
                self.open_scope(expr.id, ScopeFlags::empty());
                let ty = self.check_enum_type(expr, base.as_deref(), fields, named);
                self.close_scope();
                ty
            },

            ExprKind::ProcType { .. } => {
                self.open_scope(expr.id, ScopeFlags::PROC);
                let ty = self.check_proc_type(expr);
                self.close_scope();
                ty
            },

            _ => {
                let o = self.check_expr_or_type(expr);
                match o.mode {
                    AddressingMode::Type => o.ty,
                    AddressingMode::Invalid => TypeId::INVALID,
                    _ => {
                        self.error(expr.pos, format!("`{}` is not a type", expr));
                        TypeId::INVALID
                    },
                }
            },
        }
    }

    /// The length of an array or vector type; `None` after an error.
    pub(super) fn check_array_count(&mut self, expr: &'a Expr) -> Option<i64> {
        let o = self.check_expr(expr);
        if o.is_invalid() {
            return None;
        }

        if !o.is_constant() {
            self.error(expr.pos, "Array count must be a constant");
            return None;
        }

        let types = self.types();
        if types.is_untyped(o.ty) || types.is_integer(o.ty) {
            if let ExactValue::Integer(count) = o.value.to_integer() {
                if count >= 0 && count <= i64::MAX as i128 {
                    return Some(count as i64);
                }
            }

            self.error(expr.pos, "Invalid array count");
            return None;
        }

        self.error(expr.pos, "Array count must be an integer");
        None
    }

    fn check_record_fields(&mut self, decls: &'a [FieldDecl], what: &str) -> Vec<Field> {
        let scope = self.context.scope;
        let mut seen = HashSet::new();
        let mut fields = Vec::new();
        let mut using_index_field: Option<usize> = None;

        for decl in decls {
            let ty = self.check_type(&decl.ty);

            if decl.is_using && decl.names.len() > 1 {
                self.error(decl.names[0].pos, "Cannot apply `using` to more than one of the same type");
            }

            for name in &decl.names {
                let field_index = fields.len();
                let mut flags = EntityFlags::FIELD;
                if decl.is_using {
                    flags |= EntityFlags::ANONYMOUS;
                }

                let e = Entity::new(
                    EntityKind::Variable {
                        field_index,
                        field_src_index: field_index,
                        is_immutable: false,
                    },
                    &name.name,
                    name.pos,
                    Some(scope),
                    Some(ty),
                )
                .with_identifier(name.id)
                .with_flags(flags);
                let id = self.info.add_entity_raw(e);
                self.info.definitions.insert(name.id, id);

                if !name.is_blank() {
                    if !seen.insert(name.name.as_str()) {
                        self.error(name.pos, format!("`{}` is already declared in this {}", name.name, what));
                        continue;
                    }
                    self.info.insert_entity(scope, id);
                }

                let mut field = Field::new(&name.name, ty).with_entity(id);
                if decl.is_using {
                    field = field.anonymous();
                }
                fields.push(field);
            }

            if !decl.is_using || decl.names.is_empty() || fields.is_empty() {
                continue;
            }

            let types = self.types();
            let t = types.base_type(types.deref(ty));
            if types.is_struct(t) || types.is_raw_union(t) || types.is_invalid(t) {
                continue;
            }

            let last = fields.len() - 1;
            let name = &decl.names[0];
            if self.is_indexable(t) {
                match using_index_field {
                    Some(_) => {
                        fields[last].anonymous = false;
                        self.error(
                            name.pos,
                            format!("Previous `using` for an index expression `{}`", name.name),
                        );
                    },
                    None => using_index_field = Some(last),
                }
            } else {
                fields[last].anonymous = false;
                self.error(
                    name.pos,
                    format!("`using` on a field `{}` must be a `struct` or `raw_union`", name.name),
                );
            }
        }

        fields
    }

    fn check_union_variants(&mut self, decls: &'a [FieldDecl]) -> Vec<Field> {
        let scope = self.context.scope;
        let mut seen = HashSet::new();
        let mut variants: Vec<Field> = Vec::new();

        for decl in decls {
            let ty = self.check_type(&decl.ty);

            for name in &decl.names {
                if name.is_blank() {
                    self.error(name.pos, "`_` cannot be used a union subtype");
                    continue;
                }
                if !seen.insert(name.name.as_str()) {
                    self.error(name.pos, format!("`{}` is already declared in this union", name.name));
                    continue;
                }
                if variants.iter().any(|v| self.types().are_types_identical(v.ty, ty)) {
                    let msg = format!("`{}` is already a variant of this union", self.type_str(ty));
                    self.error(name.pos, msg);
                    continue;
                }

                let e = Entity::new(EntityKind::TypeName, &name.name, name.pos, Some(scope), Some(ty))
                    .with_identifier(name.id)
                    .with_flags(EntityFlags::FIELD);
                let id = self.info.add_entity_raw(e);
                self.info.definitions.insert(name.id, id);
                self.info.insert_entity(scope, id);

                variants.push(Field::new(&name.name, ty).with_entity(id));
            }
        }

        variants
    }

    fn check_enum_type(
        &mut self,
        expr: &'a Expr,
        base: Option<&'a Expr>,
        fields: &'a [EnumField],
        named: Option<TypeId>,
    ) -> TypeId {
        let scope = self.context.scope;
        let base = match base {
            Some(base) => self.check_type(base),
            None => TypeId::INT,
        };

        if !self.types().is_integer(base) || self.types().is_enum(base) {
            if !self.types().is_invalid(base) {
                self.error(expr.pos, "Base type for enumeration must be an integer");
            }
            return TypeId::INVALID;
        }

        // The named type has no base yet, so values are checked against
        // the integer base.
        let constant_ty = named.unwrap_or(base);
        let mut seen = HashSet::new();
        let mut iota = ExactValue::Integer(-1);
        let mut record_fields = Vec::new();
        let mut values = Vec::new();

        for field in fields {
            let name = &field.name;
            let next = exact_value::binary_op(BinaryOp::Add, &iota, &ExactValue::Integer(1));

            iota = match &field.value {
                Some(value) => {
                    let mut o = self.check_expr(value);
                    if !o.is_invalid() && !o.is_constant() {
                        self.error(value.pos, "Enumeration value must be a constant");
                        o.invalidate();
                    }
                    if !o.is_invalid() {
                        self.check_assignment(&mut o, Some(base), "enumeration");
                    }
                    if o.is_invalid() {
                        next
                    } else {
                        o.value.to_integer()
                    }
                },
                None => next,
            };

            if name.is_blank() {
                continue;
            }
            if name.name == "count" {
                self.error(name.pos, "`count` is a reserved identifier for enumerations");
                continue;
            }
            if !seen.insert(name.name.as_str()) {
                self.error(name.pos, format!("`{}` is already declared in this enumeration", name.name));
                continue;
            }

            let value = iota.as_integer().unwrap_or_default();
            let e = Entity::new(
                EntityKind::Constant(ExactValue::Integer(value)),
                &name.name,
                name.pos,
                Some(scope),
                Some(constant_ty),
            )
            .with_identifier(name.id)
            .with_flags(EntityFlags::VISITED);
            let id = self.info.add_entity_raw(e);
            self.info.definitions.insert(name.id, id);
            self.info.insert_entity(scope, id);

            record_fields.push(Field::new(&name.name, constant_ty).with_entity(id));
            values.push(value);
        }

        self.types_mut().make_record(Record::new_enum(base, record_fields, values))
    }

    /// Checks a signature inside the procedure scope the caller opened.
    /// Parameters are declared in that scope.
    fn check_proc_type(&mut self, expr: &'a Expr) -> TypeId {
        let (params, results, variadic, calling_convention) = match &expr.kind {
            ExprKind::ProcType {
                params,
                results,
                variadic,
                calling_convention,
            } => (params, results, *variadic, *calling_convention),
            _ => return TypeId::INVALID,
        };

        let scope = self.context.scope;
        let mut param_fields = Vec::new();

        for (i, decl) in params.iter().enumerate() {
            let mut ty = self.check_type(&decl.ty);
            let is_last_decl = i + 1 == params.len();

            if decl.is_using && decl.names.len() > 1 {
                self.error(decl.names[0].pos, "Cannot apply `using` to more than one of the same type");
            }

            for (j, name) in decl.names.iter().enumerate() {
                if variadic && is_last_decl && j + 1 == decl.names.len() {
                    ty = self.types_mut().make_slice(ty);
                }

                let mut flags = EntityFlags::PARAM;
                if decl.is_using {
                    flags |= EntityFlags::ANONYMOUS;
                }

                let e = Entity::variable(&name.name, name.pos, Some(scope), Some(ty))
                    .with_identifier(name.id)
                    .with_flags(flags);
                let id = self.info.add_entity_raw(e);
                self.add_entity(scope, Some(name), id);

                let mut field = Field::new(&name.name, ty).with_entity(id);
                if decl.is_using {
                    field = field.anonymous();
                }
                param_fields.push(field);
            }
        }

        let mut result_fields = Vec::new();
        for decl in results {
            let ty = self.check_type(&decl.ty);
            if decl.names.is_empty() {
                result_fields.push(Field::new("", ty));
            } else {
                result_fields.extend(decl.names.iter().map(|name| Field::new(&name.name, ty)));
            }
        }

        self.types_mut()
            .make_proc(param_fields, result_fields, variadic, calling_convention)
    }

    /// Strings, arrays, vectors, slices and dynamic arrays.
    pub(super) fn is_indexable(&self, ty: TypeId) -> bool {
        let types = self.types();
        let t = types.base_type(ty);
        types.is_string(t) || types.is_array(t) || types.is_vector(t) || types.is_slice(t) || types.is_dynamic_array(t)
    }
}
