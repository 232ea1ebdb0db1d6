use bitflags::bitflags;
use std::collections::HashMap;

use odin_types::{BinaryOp, EntityId, ExactValue, NodeId, TypeId};

use super::{
    entity::{BuiltinId, Entity, EntityFlags, EntityKind},
    AddressingMode, Checker, DeclInfo, Operand, ProcedureInfo, ScopeFlags, ScopeId,
};
use crate::ast::{
    BranchKind, CaseClause, Decl, Expr, ExprKind, Ident, ProcTags, Stmt, StmtKind, StmtStateFlags, TokenPos,
};

bitflags! {
    /// Which branch statements the enclosing statements allow.
    pub(super) struct StmtFlags: u8 {
        const BREAK_ALLOWED = 1 << 0;
        const CONTINUE_ALLOWED = 1 << 1;
        const FALLTHROUGH_ALLOWED = 1 << 2;
    }
}

impl<'a> Checker<'a> {
    pub(super) fn check_stmt_list(&mut self, stmts: &'a [Stmt], flags: StmtFlags) {
        let fallthrough_ok = flags.contains(StmtFlags::FALLTHROUGH_ALLOWED);
        let flags = flags - StmtFlags::FALLTHROUGH_ALLOWED;

        // Trailing empty statements do not count as the last statement.
        let max = stmts
            .iter()
            .rposition(|s| !matches!(s.kind, StmtKind::Empty))
            .map_or(0, |i| i + 1);

        for (i, stmt) in stmts[..max].iter().enumerate() {
            if let StmtKind::Empty = stmt.kind {
                continue;
            }

            let mut new_flags = flags;
            if fallthrough_ok && i + 1 == max {
                new_flags |= StmtFlags::FALLTHROUGH_ALLOWED;
            }

            if i + 1 < max {
                if let StmtKind::Return(_) = stmt.kind {
                    self.error(stmt.pos, "Statements after this `return` are never executed");
                }
            }

            self.check_stmt(stmt, new_flags);
        }
    }

    pub(super) fn check_stmt(&mut self, stmt: &'a Stmt, flags: StmtFlags) {
        let prev_state = self.context.stmt_state_flags;

        if stmt.state_flags.contains(StmtStateFlags::BOUNDS_CHECK) {
            self.context.stmt_state_flags |= StmtStateFlags::BOUNDS_CHECK;
            self.context.stmt_state_flags -= StmtStateFlags::NO_BOUNDS_CHECK;
        } else if stmt.state_flags.contains(StmtStateFlags::NO_BOUNDS_CHECK) {
            self.context.stmt_state_flags |= StmtStateFlags::NO_BOUNDS_CHECK;
            self.context.stmt_state_flags -= StmtStateFlags::BOUNDS_CHECK;
        }

        if !self.context.stmt_state_flags.is_empty() {
            self.info.stmt_flags.insert(stmt.id, self.context.stmt_state_flags);
        }

        self.check_stmt_internal(stmt, flags);

        self.context.stmt_state_flags = prev_state;
    }

    fn check_stmt_internal(&mut self, stmt: &'a Stmt, flags: StmtFlags) {
        let mod_flags = flags - StmtFlags::FALLTHROUGH_ALLOWED;

        match &stmt.kind {
            StmtKind::Empty => {},

            StmtKind::Expr(expr) => self.check_expr_stmt(stmt, expr),

            StmtKind::Assign { op: None, lhs, rhs } => {
                if lhs.is_empty() {
                    self.error(stmt.pos, "Missing lhs in assignment statement");
                    return;
                }

                let rhs: Vec<&'a Expr> = rhs.iter().collect();
                let mut operands = self.check_unpacked_exprs(&rhs);
                for (lhs, o) in lhs.iter().zip(operands.iter_mut()) {
                    self.check_assignment_variable(lhs, o);
                }

                if lhs.len() != operands.len() {
                    let msg = format!("Assignment count mismatch `{}` = `{}`", lhs.len(), operands.len());
                    self.error(lhs[0].pos, msg);
                }
            },

            StmtKind::Assign { op: Some(op), lhs, rhs } => self.check_op_assign(stmt, *op, lhs, rhs),

            StmtKind::IncDec { op, expr } => {
                let x = self.check_expr(expr);
                if x.is_invalid() {
                    return;
                }

                if !self.types().is_numeric(x.ty) {
                    let keyword = if *op == BinaryOp::Add { "++" } else { "--" };
                    let msg = format!("Non numeric type `{}` for `{}`", self.type_str(x.ty), keyword);
                    self.error(expr.pos, msg);
                    return;
                }

                let mut result = Operand::new(AddressingMode::Value, x.ty).with_expr(expr.id);
                self.check_assignment_variable(expr, &mut result);
            },

            StmtKind::Block(stmts) => {
                self.open_scope(stmt.id, ScopeFlags::empty());
                self.check_stmt_list(stmts, mod_flags);
                self.close_scope();
            },

            StmtKind::If {
                init,
                cond,
                then,
                otherwise,
            } => {
                self.open_scope(stmt.id, ScopeFlags::empty());

                if let Some(init) = init {
                    self.check_stmt(init, StmtFlags::empty());
                }

                self.check_condition(cond, "if");
                self.check_stmt(then, mod_flags);

                if let Some(otherwise) = otherwise {
                    match otherwise.kind {
                        StmtKind::If { .. } | StmtKind::Block(_) => self.check_stmt(otherwise, mod_flags),
                        _ => self.error(otherwise.pos, "Invalid `else` statement in `if` statement"),
                    }
                }

                self.close_scope();
            },

            StmtKind::For { init, cond, post, body } => {
                self.open_scope(stmt.id, ScopeFlags::empty());

                if let Some(init) = init {
                    self.check_stmt(init, StmtFlags::empty());
                }
                if let Some(cond) = cond {
                    self.check_condition(cond, "for");
                }
                if let Some(post) = post {
                    if post.is_decl() {
                        self.error(post.pos, "`for` statement post statement cannot be a declaration");
                    } else {
                        self.check_stmt(post, StmtFlags::empty());
                    }
                }

                let body_flags = mod_flags | StmtFlags::BREAK_ALLOWED | StmtFlags::CONTINUE_ALLOWED;
                self.check_stmt(body, body_flags);

                self.close_scope();
            },

            StmtKind::Match { init, tag, clauses } => {
                self.check_match_stmt(stmt, init.as_deref(), tag.as_ref(), clauses, mod_flags)
            },

            StmtKind::TypeMatch { var, tag, clauses } => self.check_type_match_stmt(stmt, var, tag, clauses, mod_flags),

            StmtKind::Defer(body) => {
                if body.is_decl() {
                    self.error(stmt.pos, "You cannot defer a declaration");
                } else {
                    let prev = std::mem::replace(&mut self.context.in_defer, true);
                    self.check_stmt(body, StmtFlags::empty());
                    self.context.in_defer = prev;
                }
            },

            StmtKind::Return(values) => self.check_return_stmt(stmt, values),

            StmtKind::Branch(kind) => {
                let (allowed, msg) = match kind {
                    BranchKind::Break => (
                        flags.contains(StmtFlags::BREAK_ALLOWED),
                        "`break` only allowed in `for` or `match` statements",
                    ),
                    BranchKind::Continue => (
                        flags.contains(StmtFlags::CONTINUE_ALLOWED),
                        "`continue` only allowed in `for` statements",
                    ),
                    BranchKind::Fallthrough => (
                        flags.contains(StmtFlags::FALLTHROUGH_ALLOWED),
                        "`fallthrough` statement in illegal position",
                    ),
                };

                if !allowed {
                    self.error(stmt.pos, msg);
                }
            },

            StmtKind::Using(exprs) => {
                for expr in exprs {
                    if !self.check_using_expr(stmt.pos, expr) {
                        return;
                    }
                }
            },

            StmtKind::PushAllocator { expr, body } => {
                let mut o = self.check_expr(expr);
                let allocator = self.types().well_known.allocator;
                self.check_assignment(&mut o, allocator, "argument to push_allocator");
                self.check_stmt(body, mod_flags);
            },

            StmtKind::PushContext { expr, body } => {
                let mut o = self.check_expr(expr);
                let context = self.types().well_known.context;
                self.check_assignment(&mut o, context, "argument to push_context");
                self.check_stmt(body, mod_flags);
            },

            StmtKind::Decl(decl) => self.check_local_decl(stmt, decl),
        }
    }

    fn check_expr_stmt(&mut self, stmt: &'a Stmt, expr: &'a Expr) {
        let o = self.check_expr_base(expr, None);

        match o.mode {
            AddressingMode::Invalid | AddressingMode::NoValue => {},
            AddressingMode::Type => self.error(stmt.pos, format!("`{}` is not an expression", expr)),
            AddressingMode::Builtin => self.error(stmt.pos, format!("`{}` must be called", expr)),
            _ => {
                if !matches!(expr.unparen().kind, ExprKind::Call { .. }) {
                    self.error(stmt.pos, format!("Expression is not used: `{}`", expr));
                }
            },
        }
    }

    fn check_condition(&mut self, cond: &'a Expr, keyword: &str) {
        let o = self.check_expr(cond);
        if !o.is_invalid() && !self.types().is_boolean(o.ty) {
            self.error(cond.pos, format!("Non-boolean condition in `{}` statement", keyword));
        }
    }

    /// Checks each expression, spreading tuple results into one operand
    /// per value.
    pub(super) fn check_unpacked_exprs(&mut self, exprs: &[&'a Expr]) -> Vec<Operand> {
        let mut operands = Vec::with_capacity(exprs.len());

        for &expr in exprs {
            let o = self.check_multi_expr(expr);
            let fields = match self.types().tuple(o.ty) {
                Some(fields) if !o.is_invalid() => fields.iter().map(|f| f.ty).collect::<Vec<_>>(),
                _ => {
                    operands.push(o);
                    continue;
                },
            };

            operands.extend(fields.into_iter().map(|ty| Operand { ty, ..o.clone() }));
        }

        operands
    }

    /// Checks that `lhs` can be assigned `o` and returns the stored type.
    fn check_assignment_variable(&mut self, lhs: &'a Expr, o: &mut Operand) -> Option<TypeId> {
        if o.is_invalid() || o.ty == TypeId::INVALID {
            return None;
        }

        if lhs.unparen().as_ident() == Some("_") {
            self.check_assignment(o, None, "assignment to `_` identifier");
            return if o.is_invalid() { None } else { Some(o.ty) };
        }

        // Being assigned to does not count as a use.
        let target = lhs
            .unparen()
            .as_ident()
            .and_then(|name| self.info.lookup_entity(self.context.scope, name))
            .filter(|&e| self.entity(e).is_variable());
        let was_used = target.map(|e| self.entity(e).is_used());

        let z = self.check_expr(lhs);

        if let (Some(e), Some(false)) = (target, was_used) {
            self.entity_mut(e).flags -= EntityFlags::USED;
        }

        if z.is_invalid() || z.ty == TypeId::INVALID {
            return None;
        }
        if z.mode != AddressingMode::Variable {
            self.error(lhs.pos, format!("Cannot assign to `{}`", lhs));
            return None;
        }

        self.check_assignment(o, Some(z.ty), "assignment");
        if o.is_invalid() {
            None
        } else {
            Some(z.ty)
        }
    }

    /// `x op= y`.
    fn check_op_assign(&mut self, stmt: &'a Stmt, op: BinaryOp, lhs: &'a [Expr], rhs: &'a [Expr]) {
        if lhs.len() != 1 || rhs.len() != 1 {
            let msg = format!("Assignment operation `{}=` requires single-valued expressions", op);
            self.error(stmt.pos, msg);
            return;
        }

        let (left, right) = (&lhs[0], &rhs[0]);
        let x = self.check_expr(left);
        let mut y = self.check_expr(right);
        if x.is_invalid() || y.is_invalid() {
            return;
        }

        let types = self.types();
        let is_pointer_offset = types.is_pointer(x.ty) && matches!(op, BinaryOp::Add | BinaryOp::Sub);

        if op.is_shift() || is_pointer_offset {
            if op.is_shift() && !types.is_integer(x.ty) {
                self.error(left.pos, format!("Shifted operand `{}` must be an integer", left));
                return;
            }

            let target = if op.is_shift() { TypeId::UINT } else { TypeId::INT };
            self.convert_to_typed(&mut y, target);
            if y.is_invalid() {
                return;
            }
            if !self.types().is_integer(y.ty) {
                let msg = format!("`{}` must be an integer, got `{}`", right, self.type_str(y.ty));
                self.error(right.pos, msg);
                return;
            }
        } else {
            self.convert_to_typed(&mut y, x.ty);
            if y.is_invalid() {
                return;
            }

            if !self.types().are_types_identical(x.ty, y.ty) {
                let msg = format!(
                    "Mismatched types in assignment operation `{} {}= {}` : `{}` vs `{}`",
                    left,
                    op,
                    right,
                    self.type_str(x.ty),
                    self.type_str(y.ty)
                );
                self.error(stmt.pos, msg);
                return;
            }

            if !self.check_binary_op(&x, op, left) {
                return;
            }

            if matches!(op, BinaryOp::Quo | BinaryOp::Mod)
                && y.is_constant()
                && self.types().is_integer(x.ty)
                && y.value == ExactValue::Integer(0)
            {
                self.error(right.pos, "Division by zero not allowed");
                return;
            }
        }

        let mut result = Operand::new(AddressingMode::Value, x.ty).with_expr(left.id);
        self.check_assignment_variable(left, &mut result);
    }

    fn check_return_stmt(&mut self, stmt: &'a Stmt, values: &'a [Expr]) {
        if self.context.in_defer {
            self.error(stmt.pos, "You cannot `return` within a defer statement");
            return;
        }

        let proc_ty = match self.context.proc_ty {
            Some(proc_ty) => proc_ty,
            None => {
                self.error(stmt.pos, "`return` outside of a procedure");
                return;
            },
        };

        let types = self.types();
        let results: Vec<TypeId> = types
            .proc_type(proc_ty)
            .and_then(|pt| types.tuple(pt.results))
            .map(|fields| fields.iter().map(|f| f.ty).collect())
            .unwrap_or_default();

        if results.is_empty() {
            if let Some(first) = values.first() {
                self.error(first.pos, "Expected no return values");
            }
            return;
        }

        let values: Vec<&'a Expr> = values.iter().collect();
        let mut operands = if values.is_empty() {
            Vec::new()
        } else {
            self.check_unpacked_exprs(&values)
        };

        if operands.len() != results.len() {
            let msg = format!("Expected {} return values, got {}", results.len(), operands.len());
            self.error(stmt.pos, msg);
        }

        for (o, &ty) in operands.iter_mut().zip(&results) {
            self.check_assignment(o, Some(ty), "return statement");
        }
    }

    fn check_multiple_defaults(&mut self, clauses: &'a [CaseClause]) {
        let mut first: Option<TokenPos> = None;

        for clause in clauses.iter().filter(|c| c.is_default()) {
            match first {
                Some(first) => self.info.diagnostics.error_with_note(
                    clause.pos,
                    "Multiple `default` clauses",
                    first,
                    "first default clause",
                ),
                None => first = Some(clause.pos),
            }
        }
    }

    fn check_match_stmt(
        &mut self,
        stmt: &'a Stmt,
        init: Option<&'a Stmt>,
        tag: Option<&'a Expr>,
        clauses: &'a [CaseClause],
        flags: StmtFlags,
    ) {
        let flags = flags | StmtFlags::BREAK_ALLOWED;
        self.open_scope(stmt.id, ScopeFlags::empty());

        if let Some(init) = init {
            self.check_stmt(init, StmtFlags::empty());
        }

        // `match { case cond: }` compares each clause against `true`.
        let x = match tag {
            Some(tag) => {
                let mut x = self.check_expr(tag);
                self.check_assignment(&mut x, None, "match expression");
                x
            },
            None => Operand::constant(TypeId::BOOL, ExactValue::Bool(true)),
        };

        self.check_multiple_defaults(clauses);

        let mut seen: HashMap<ExactValue, Vec<(TypeId, TokenPos)>> = HashMap::new();

        for (i, clause) in clauses.iter().enumerate() {
            for expr in &clause.exprs {
                let mut y = self.check_expr(expr);
                if x.is_invalid() || y.is_invalid() {
                    continue;
                }

                self.convert_to_typed(&mut y, x.ty);
                if y.is_invalid() {
                    continue;
                }

                let (mut z, mut tag) = (y.clone(), x.clone());
                self.check_comparison(expr, BinaryOp::CmpEq, &mut z, &mut tag);
                if z.is_invalid() || !y.is_constant() || y.value.is_invalid() {
                    continue;
                }

                let previous = seen
                    .get(&y.value)
                    .and_then(|prev| prev.iter().find(|(ty, _)| self.types().are_types_identical(*ty, y.ty)))
                    .map(|&(_, pos)| pos);
                match previous {
                    Some(pos) => self.info.diagnostics.error_with_note(
                        expr.pos,
                        format!("Duplicate case `{}`", expr),
                        pos,
                        "previous case",
                    ),
                    None => seen.entry(y.value.clone()).or_default().push((y.ty, expr.pos)),
                }
            }

            self.open_scope(clause.id, ScopeFlags::empty());
            let mut clause_flags = flags;
            if i + 1 < clauses.len() {
                clause_flags |= StmtFlags::FALLTHROUGH_ALLOWED;
            }
            self.check_stmt_list(&clause.body, clause_flags);
            self.close_scope();
        }

        self.close_scope();
    }

    fn check_type_match_stmt(
        &mut self,
        stmt: &'a Stmt,
        var: &'a Ident,
        tag: &'a Expr,
        clauses: &'a [CaseClause],
        flags: StmtFlags,
    ) {
        let flags = flags | StmtFlags::BREAK_ALLOWED;
        self.open_scope(stmt.id, ScopeFlags::empty());

        let mut x = self.check_expr(tag);
        self.check_assignment(&mut x, None, "type match expression");
        if x.is_invalid() {
            self.close_scope();
            return;
        }

        let types = self.types();
        let is_union_ptr = types.is_pointer(x.ty) && types.is_union(types.deref(x.ty));
        if !is_union_ptr && !types.is_union(x.ty) {
            let msg = format!("Invalid type for this type match expression, got `{}`", self.type_str(x.ty));
            self.error(tag.pos, msg);
            self.close_scope();
            return;
        }
        let union_ty = if is_union_ptr { types.deref(x.ty) } else { x.ty };

        self.check_multiple_defaults(clauses);

        let mut seen: Vec<(TypeId, TokenPos)> = Vec::new();

        for clause in clauses {
            let mut case_ty = None;

            if let Some(type_expr) = clause.exprs.first() {
                let y = self.check_expr_or_type(type_expr);
                if y.is_invalid() {
                    continue;
                }
                if y.mode != AddressingMode::Type {
                    self.error(type_expr.pos, format!("`{}` is not a type", type_expr));
                    continue;
                }
                if self.types().union_tag_of(union_ty, y.ty).is_none() {
                    self.error(type_expr.pos, format!("Unknown tag type, got `{}`", self.type_str(y.ty)));
                    continue;
                }

                let previous = seen
                    .iter()
                    .find(|(ty, _)| self.types().are_types_identical(*ty, y.ty))
                    .map(|&(_, pos)| pos);
                if let Some(pos) = previous {
                    self.info.diagnostics.error_with_note(
                        type_expr.pos,
                        format!("Duplicate type case `{}`", type_expr),
                        pos,
                        "previous type case",
                    );
                    continue;
                }
                seen.push((y.ty, type_expr.pos));
                case_ty = Some(y.ty);
            }

            let scope = self.open_scope(clause.id, ScopeFlags::empty());

            if let Some(case_ty) = case_ty {
                self.add_type_info_type(case_ty);
                let var_ty = if is_union_ptr {
                    let ptr = self.types_mut().make_pointer(case_ty);
                    self.add_type_info_type(ptr);
                    ptr
                } else {
                    case_ty
                };

                let kind = EntityKind::Variable {
                    field_index: 0,
                    field_src_index: 0,
                    is_immutable: true,
                };
                let e = Entity::new(kind, &var.name, var.pos, Some(scope), Some(var_ty))
                    .with_identifier(var.id)
                    .with_flags(EntityFlags::USED);
                let e = self.info.add_entity_raw(e);
                self.add_entity(scope, Some(var), e);
            }

            self.check_stmt_list(&clause.body, flags);
            self.close_scope();
        }

        self.close_scope();
    }

    // `using`

    /// Brings the fields of the struct or raw union `ty` into the current
    /// scope as variables reached through `parent`.
    fn inject_using_fields(
        &mut self,
        parent: Option<EntityId>,
        using_expr: Option<NodeId>,
        ty: TypeId,
        what: &str,
        pos: TokenPos,
        is_immutable: bool,
    ) -> bool {
        let scope = self.context.scope;
        let fields = match self.types().record(ty) {
            Some(record) => record.fields.clone(),
            None => return true,
        };

        for (i, field) in fields.iter().enumerate() {
            if field.name.is_empty() || field.name == "_" {
                continue;
            }

            let field_pos = field.entity.map_or(pos, |f| self.entity(f).pos);
            let kind = EntityKind::Variable {
                field_index: i,
                field_src_index: i,
                is_immutable,
            };
            let mut uvar = Entity::new(kind, &field.name, field_pos, Some(scope), Some(field.ty))
                .with_flags(EntityFlags::ANONYMOUS);
            uvar.using_parent = parent;
            uvar.using_expr = using_expr;
            let uvar = self.info.add_entity_raw(uvar);

            if let Some(prev) = self.info.insert_entity(scope, uvar) {
                let msg = format!("Namespace collision while `using` `{}` of: {}", what, self.entity(prev).name);
                self.error(pos, msg);
                return false;
            }
        }

        true
    }

    /// `using x`. Returns false to stop at the first collision.
    fn check_using_expr(&mut self, pos: TokenPos, expr: &'a Expr) -> bool {
        let inner = expr.unparen();
        let what = inner.to_string();

        let (e, using_expr) = match &inner.kind {
            ExprKind::Ident(name) => {
                let e = self.info.lookup_entity(self.context.scope, name);
                if let Some(e) = e {
                    self.add_entity_use(inner.id, e);
                }
                (e, None)
            },
            ExprKind::Selector { name, .. } => {
                let o = self.check_expr_or_type(inner);
                if o.is_invalid() {
                    return true;
                }

                match self.info.uses.get(&name.id).copied() {
                    Some(e) if !self.entity(e).flags.contains(EntityFlags::FIELD) => (Some(e), None),
                    _ if o.mode == AddressingMode::Variable => {
                        let t = self.types().base_type(self.types().deref(o.ty));
                        let ok = self.types().is_struct(t) || self.types().is_raw_union(t);
                        if !ok {
                            self.error(pos, "`using` can only be applied to variables of type struct or raw_union");
                            return false;
                        }
                        return self.inject_using_fields(None, Some(inner.id), t, &what, pos, false);
                    },
                    _ => (None, None),
                }
            },
            _ => (None, None),
        };

        let e = match e {
            Some(e) => e,
            None => {
                self.error(pos, "`using` applied to an unknown entity");
                return false;
            },
        };

        if self.entity(e).ty.is_none() {
            self.check_entity_decl(e);
        }

        let entity = self.entity(e).clone();
        match &entity.kind {
            EntityKind::TypeName => {
                let t = self.types().base_type(entity.ty.unwrap_or(TypeId::INVALID));
                if !self.types().is_union(t) && !self.types().is_enum(t) {
                    self.error(pos, "`using` can be only applied to `union` or `enum` type entities");
                    return false;
                }

                let members: Vec<EntityId> = self
                    .types()
                    .record(t)
                    .map(|r| r.fields.iter().filter_map(|f| f.entity).collect())
                    .unwrap_or_default();
                for f in members {
                    if let Some(found) = self.info.insert_entity(self.context.scope, f) {
                        let msg = format!("Namespace collision while `using` `{}` of: {}", what, self.entity(found).name);
                        self.error(pos, msg);
                        return false;
                    }
                    self.entity_mut(f).using_parent = Some(e);
                }
                true
            },

            EntityKind::ImportName { scope, .. } => {
                if let EntityKind::ImportName { used, .. } = &mut self.entity_mut(e).kind {
                    *used = true;
                }

                let members: Vec<EntityId> = self.info.scope(*scope).elements.values().copied().collect();
                for decl in members {
                    if let Some(found) = self.info.insert_entity(self.context.scope, decl) {
                        if found == decl {
                            continue;
                        }
                        let msg = format!("Namespace collision while `using` `{}` of: {}", what, self.entity(found).name);
                        let (found_pos, decl_pos) = (self.entity(found).pos, self.entity(decl).pos);
                        self.info.diagnostics.error_with_notes(
                            pos,
                            msg,
                            vec![
                                (found_pos, "declared here".to_owned()),
                                (decl_pos, "and here".to_owned()),
                            ],
                        );
                        return false;
                    }
                }
                true
            },

            EntityKind::Variable { is_immutable, .. } => {
                let ty = entity.ty.unwrap_or(TypeId::INVALID);
                let t = self.types().base_type(self.types().deref(ty));
                if !self.types().is_struct(t) && !self.types().is_raw_union(t) {
                    self.error(pos, "`using` can only be applied to variables of type struct or raw_union");
                    return false;
                }
                self.inject_using_fields(Some(e), using_expr, t, &what, pos, *is_immutable)
            },

            EntityKind::Constant(_) => {
                self.error(pos, "`using` cannot be applied to a constant");
                true
            },
            EntityKind::Procedure { .. } | EntityKind::Builtin(_) => {
                self.error(pos, "`using` cannot be applied to a procedure");
                true
            },
            EntityKind::ImplicitValue { .. } => {
                self.error(pos, "`using` cannot be applied to an implicit value");
                true
            },
            EntityKind::Nil => {
                self.error(pos, "`using` cannot be applied to `nil`");
                true
            },
            EntityKind::LibraryName { .. } => {
                self.error(pos, "`using` cannot be applied to a library name");
                true
            },
        }
    }

    // Local declarations

    fn check_local_decl(&mut self, stmt: &'a Stmt, decl: &'a Decl) {
        let scope = self.context.scope;
        let file = self.context.file;

        match decl {
            Decl::Var {
                names,
                ty,
                values,
                is_using,
            } => {
                // Redeclared names still get an entity so the initializers
                // are checked, but it is never added to the scope.
                let mut entities = Vec::with_capacity(names.len());
                let mut redeclared = Vec::with_capacity(names.len());
                for name in names {
                    let found = if name.is_blank() {
                        None
                    } else {
                        self.info.current_scope_lookup_entity(scope, &name.name)
                    };
                    if let Some(found) = found {
                        let other = self.entity(found).pos;
                        self.info.diagnostics.error_with_note(
                            name.pos,
                            format!("Redeclaration of `{}` in this scope", name.name),
                            other,
                            "other declaration",
                        );
                    }

                    let e = Entity::variable(&name.name, name.pos, Some(scope), None).with_identifier(name.id);
                    let e = self.info.add_entity_raw(e);
                    self.info.definitions.insert(name.id, e);
                    entities.push(e);
                    redeclared.push(found.is_some());
                }

                let init_ty = ty.as_ref().map(|ty| self.check_type(ty));
                for &e in &entities {
                    let entity = self.entity_mut(e);
                    entity.flags |= EntityFlags::VISITED;
                    if entity.ty.is_none() {
                        entity.ty = init_ty;
                    }
                }

                self.check_arity_match(stmt.pos, names, ty.as_ref(), values, true);

                let values: Vec<&'a Expr> = values.iter().collect();
                if !values.is_empty() {
                    self.check_init_variables(&entities, &values, "variable declaration");
                }
                for &e in &entities {
                    self.entity_mut(e).ty.get_or_insert(TypeId::INVALID);
                }

                for ((name, &e), redeclared) in names.iter().zip(&entities).zip(redeclared) {
                    if !redeclared {
                        self.add_entity(scope, Some(name), e);
                    }
                }

                if *is_using {
                    if names.len() > 1 && ty.is_some() {
                        self.error(stmt.pos, "`using` can only be applied to one variable of the same type");
                    }

                    for (name, &e) in names.iter().zip(&entities) {
                        let ty = self.entity(e).ty.unwrap_or(TypeId::INVALID);
                        let t = self.types().base_type(self.types().deref(ty));
                        if !self.types().is_struct(t) && !self.types().is_raw_union(t) {
                            self.error(stmt.pos, "`using` can only be applied to variables of type struct or raw_union");
                            return;
                        }
                        if !self.inject_using_fields(Some(e), None, t, &name.name, stmt.pos, false) {
                            return;
                        }
                    }
                }
            },

            Decl::Const { names, ty, values } => {
                let mut checks = Vec::with_capacity(names.len());
                for (i, name) in names.iter().enumerate() {
                    let kind = EntityKind::Constant(ExactValue::Integer(i as i128));
                    let e = Entity::new(kind, &name.name, name.pos, Some(scope), None).with_identifier(name.id);
                    let e = self.info.add_entity_raw(e);

                    let mut d = DeclInfo::new(scope, file);
                    d.entities.push(e);
                    d.type_expr = ty.as_ref();
                    d.init_exprs.extend(values.get(i));
                    let d = self.info.add_decl(d);

                    self.add_entity(scope, Some(name), e);
                    checks.push((e, d));
                }

                self.check_arity_match(stmt.pos, names, ty.as_ref(), values, false);

                for (e, d) in checks {
                    self.check_entity_decl_in(e, d);
                }
            },

            Decl::Type { name, ty } => {
                let e = Entity::new(EntityKind::TypeName, &name.name, name.pos, Some(scope), None)
                    .with_identifier(name.id);
                let e = self.info.add_entity_raw(e);

                let mut d = DeclInfo::new(scope, file);
                d.entities.push(e);
                d.type_expr = Some(ty);
                let d = self.info.add_decl(d);

                self.add_entity(scope, Some(name), e);
                self.check_entity_decl_in(e, d);
            },

            Decl::Proc(pd) => {
                let kind = EntityKind::Procedure {
                    tags: pd.tags,
                    foreign_library: None,
                    foreign_name: None,
                    link_name: None,
                };
                let e = Entity::new(kind, &pd.name.name, pd.name.pos, Some(scope), None).with_identifier(pd.name.id);
                let e = self.info.add_entity_raw(e);

                let mut d = DeclInfo::new(scope, file);
                d.entities.push(e);
                d.proc_decl = Some(pd);
                let d = self.info.add_decl(d);

                self.add_entity(scope, Some(&pd.name), e);
                self.check_entity_decl_in(e, d);
            },

            Decl::Import(_) | Decl::ForeignLibrary(_) => {
                self.error(stmt.pos, "Imports and foreign libraries are only allowed at file scope");
            },
        }
    }

    // Termination

    fn is_panic_call(&self, expr: &Expr) -> bool {
        match &expr.unparen().kind {
            ExprKind::Call { callee, .. } => matches!(
                self.info.uses.get(&callee.unparen().id).map(|&e| &self.entity(e).kind),
                Some(EntityKind::Builtin(BuiltinId::Panic))
            ),
            _ => false,
        }
    }

    fn is_terminating_list(&self, stmts: &[Stmt]) -> bool {
        stmts
            .iter()
            .rev()
            .find(|s| !matches!(s.kind, StmtKind::Empty))
            .map_or(false, |s| self.is_terminating(s))
    }

    /// Whether control can never flow past the end of `stmt`.
    pub(super) fn is_terminating(&self, stmt: &Stmt) -> bool {
        match &stmt.kind {
            StmtKind::Return(_) => true,
            StmtKind::Block(stmts) => self.is_terminating_list(stmts),
            StmtKind::Expr(expr) => self.is_panic_call(expr),
            StmtKind::If {
                then,
                otherwise: Some(otherwise),
                ..
            } => self.is_terminating(then) && self.is_terminating(otherwise),
            StmtKind::For { cond, body, .. } => cond.is_none() && !has_break(body, true),
            StmtKind::Match { clauses, .. } | StmtKind::TypeMatch { clauses, .. } => {
                clauses.iter().any(CaseClause::is_default)
                    && clauses
                        .iter()
                        .all(|c| self.is_terminating_list(&c.body) && !has_break_list(&c.body, true))
            },
            StmtKind::PushAllocator { body, .. } | StmtKind::PushContext { body, .. } => self.is_terminating(body),
            _ => false,
        }
    }

    // Procedure bodies

    pub(super) fn check_proc_body(&mut self, pi: &ProcedureInfo<'a>) {
        let prev = self.context.clone();
        self.context.scope = pi.scope;
        self.context.decl = pi.decl;
        self.context.file = pi.file;
        self.context.proc_ty = Some(pi.ty);
        self.context.in_defer = false;
        self.context.iota = None;
        self.context.stmt_state_flags = if pi.tags.contains(ProcTags::BOUNDS_CHECK) {
            StmtStateFlags::BOUNDS_CHECK
        } else if pi.tags.contains(ProcTags::NO_BOUNDS_CHECK) {
            StmtStateFlags::NO_BOUNDS_CHECK
        } else {
            StmtStateFlags::empty()
        };

        let params = self
            .types()
            .proc_type(pi.ty)
            .and_then(|pt| self.types().tuple(pt.params))
            .map(<[_]>::to_vec)
            .unwrap_or_default();
        for param in params.iter().filter(|p| p.anonymous) {
            let e = match param.entity {
                Some(e) => e,
                None => continue,
            };
            let pos = self.entity(e).pos;
            let t = self.types().base_type(self.types().deref(param.ty));
            if !self.types().is_struct(t) && !self.types().is_raw_union(t) {
                self.error(pos, "`using` can only be applied to variables of type struct or raw_union");
                break;
            }
            if !self.inject_using_fields(Some(e), None, t, &param.name, pos, false) {
                break;
            }
        }

        match &pi.body.kind {
            StmtKind::Block(stmts) => self.check_stmt_list(stmts, StmtFlags::empty()),
            _ => self.check_stmt(pi.body, StmtFlags::empty()),
        }

        let has_results = self
            .types()
            .proc_type(pi.ty)
            .and_then(|pt| self.types().tuple(pt.results))
            .map_or(false, |fields| !fields.is_empty());
        if has_results && !self.is_terminating(pi.body) {
            self.error(pi.body.pos, "Missing return statement at the end of the procedure");
        }

        self.check_scope_usage(pi.scope);
        self.context = prev;
    }

    /// Warns about local variables that are never used. Nested procedures
    /// are checked with their own bodies.
    pub(super) fn check_scope_usage(&mut self, scope: ScopeId) {
        let sc = self.info.scope(scope);
        let skip = EntityFlags::PARAM | EntityFlags::FIELD | EntityFlags::ANONYMOUS;

        let unused: Vec<(TokenPos, String)> = sc
            .elements
            .values()
            .map(|&e| self.entity(e))
            .filter(|e| e.is_variable() && !e.is_used() && !e.is_blank() && !e.flags.intersects(skip))
            .filter(|e| e.scope == Some(scope))
            .map(|e| (e.pos, e.name.clone()))
            .collect();
        let children: Vec<ScopeId> = sc
            .children
            .iter()
            .copied()
            .filter(|&child| !self.info.scope(child).is_proc())
            .collect();

        for (pos, name) in unused {
            self.warning(pos, format!("Unused variable `{}`", name));
        }
        for child in children {
            self.check_scope_usage(child);
        }
    }
}

fn has_break_list(stmts: &[Stmt], implicit: bool) -> bool {
    stmts.iter().any(|s| has_break(s, implicit))
}

/// Whether `stmt` contains a `break` out of the statement that encloses
/// it. Nested loops and matches take their own breaks.
fn has_break(stmt: &Stmt, implicit: bool) -> bool {
    match &stmt.kind {
        StmtKind::Branch(BranchKind::Break) => implicit,
        StmtKind::Block(stmts) => has_break_list(stmts, implicit),
        StmtKind::If { then, otherwise, .. } => {
            has_break(then, implicit) || otherwise.as_ref().map_or(false, |o| has_break(o, implicit))
        },
        _ => false,
    }
}
