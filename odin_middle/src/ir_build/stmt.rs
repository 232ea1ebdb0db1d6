//! Statements, scopes and deferred statements.

use odin_ir::{plan_defers, Defer, DeferExit, DeferKind, Instr, InstrKind, ValueId};
use odin_types::{BinaryOp, ExactValue, TypeId};

use super::{Addr, IrBuilder, IrError};
use crate::{
    ast::{BranchKind, CaseClause, Decl, Expr, ProcDecl, Stmt, StmtKind},
    checker::ImplicitValueId,
};

impl<'a> IrBuilder<'a> {
    pub(super) fn build_stmt_list(&mut self, stmts: &'a [Stmt]) -> Result<(), IrError> {
        for stmt in stmts {
            self.build_stmt(stmt)?;
        }
        Ok(())
    }

    pub(super) fn build_stmt(&mut self, stmt: &'a Stmt) -> Result<(), IrError> {
        let prev = self.stmt_flags;
        if let Some(&flags) = self.info.stmt_flags.get(&stmt.id) {
            self.stmt_flags = flags;
        }

        let res = self.build_stmt_internal(stmt);
        self.stmt_flags = prev;
        res
    }

    fn build_stmt_internal(&mut self, stmt: &'a Stmt) -> Result<(), IrError> {
        match &stmt.kind {
            StmtKind::Empty => {},
            StmtKind::Expr(expr) => {
                self.build_expr(expr)?;
            },
            StmtKind::Assign { op: None, lhs, rhs } => self.build_assign(lhs, rhs)?,
            StmtKind::Assign { op: Some(op), lhs, rhs } => {
                for (lhs, rhs) in lhs.iter().zip(rhs) {
                    let value = self.build_expr(rhs)?;
                    self.build_op_assign(*op, lhs, value)?;
                }
            },
            StmtKind::IncDec { op, expr } => {
                let ty = self.expr_type(expr)?;
                let one = self.const_value(ty, &ExactValue::Integer(1));
                self.build_op_assign(*op, expr, one)?;
            },
            StmtKind::Block(stmts) => {
                self.open_scope();
                self.build_stmt_list(stmts)?;
                self.close_scope()?;
            },
            StmtKind::If {
                init,
                cond,
                then,
                otherwise,
            } => self.build_if(init.as_deref(), cond, then, otherwise.as_deref())?,
            StmtKind::For { init, cond, post, body } => {
                self.build_for(stmt, init.as_deref(), cond.as_ref(), post.as_deref(), body)?
            },
            StmtKind::Match { init, tag, clauses } => self.build_match(init.as_deref(), tag.as_ref(), clauses)?,
            StmtKind::TypeMatch { var, tag, clauses } => self.build_type_match(&var.name, tag, clauses)?,
            StmtKind::Defer(body) => {
                self.deferred.insert(body.id, body);
                self.module.push_defer(self.proc, DeferKind::Node(body.id));
            },
            StmtKind::Return(values) => self.build_return(values)?,
            StmtKind::Branch(kind) => {
                let p = self.module.procedure(self.proc);
                let target = match kind {
                    BranchKind::Break => p.break_target(),
                    BranchKind::Continue => p.continue_target(),
                    BranchKind::Fallthrough => p.fallthrough_target(),
                };
                if let Some(target) = target {
                    let target_scope_index = self.module.block(target).scope_index;
                    self.emit_defers(DeferExit::Branch { target_scope_index })?;
                    self.emit_jump(target);
                }
            },
            StmtKind::Using(exprs) => {
                for expr in exprs {
                    let expr = expr.unparen();
                    self.using_exprs.insert(expr.id, expr);
                }
            },
            StmtKind::PushAllocator { expr, body } => self.build_push_context(expr, body, true)?,
            StmtKind::PushContext { expr, body } => self.build_push_context(expr, body, false)?,
            StmtKind::Decl(decl) => self.build_local_decl(decl)?,
        }
        Ok(())
    }

    // Assignments

    /// Every address and value is computed before anything is stored, so
    /// `a, b = b, a` swaps.
    fn build_assign(&mut self, lhs: &'a [Expr], rhs: &'a [Expr]) -> Result<(), IrError> {
        let mut addrs = Vec::with_capacity(lhs.len());
        for expr in lhs {
            if expr.as_ident() == Some("_") {
                addrs.push(None);
            } else {
                addrs.push(Some(self.build_addr(expr)?));
            }
        }

        let values = self.build_values(rhs, lhs.len())?;
        for (addr, value) in addrs.into_iter().zip(values) {
            if let Some(addr) = addr {
                self.addr_store(addr, value)?;
            }
        }
        Ok(())
    }

    /// Evaluates right-hand sides. A single multi-valued expression
    /// standing for `count` values is split into its fields.
    fn build_values(&mut self, exprs: &'a [Expr], count: usize) -> Result<Vec<ValueId>, IrError> {
        if let [expr] = exprs {
            if count > 1 {
                let tuple = self.build_expr(expr)?;
                return (0..count).map(|i| self.emit_struct_ev(tuple, i)).collect();
            }
        }

        exprs.iter().map(|expr| self.build_expr(expr)).collect()
    }

    fn build_op_assign(&mut self, op: BinaryOp, lhs: &'a Expr, value: ValueId) -> Result<(), IrError> {
        let ty = self.expr_type(lhs)?;
        let addr = self.build_addr(lhs)?;
        let old = self.addr_load(addr);
        let new = self.emit_arith(op, old, value, ty)?;
        self.addr_store(addr, new)
    }

    // Control flow

    fn build_if(
        &mut self,
        init: Option<&'a Stmt>,
        cond: &'a Expr,
        then: &'a Stmt,
        otherwise: Option<&'a Stmt>,
    ) -> Result<(), IrError> {
        self.open_scope();
        if let Some(init) = init {
            self.build_stmt(init)?;
        }

        let then_block = self.add_block_for(then.id, "if.then");
        let else_block = otherwise.map(|other| self.add_block_for(other.id, "if.else"));
        let done = self.add_block("if.done");
        self.build_cond(cond, then_block, else_block.unwrap_or(done))?;

        self.start_block(then_block);
        self.build_scoped(then)?;
        self.emit_jump(done);

        if let (Some(else_block), Some(other)) = (else_block, otherwise) {
            self.start_block(else_block);
            self.build_scoped(other)?;
            self.emit_jump(done);
        }

        self.start_block(done);
        self.close_scope()
    }

    fn build_for(
        &mut self,
        stmt: &'a Stmt,
        init: Option<&'a Stmt>,
        cond: Option<&'a Expr>,
        post: Option<&'a Stmt>,
        body: &'a Stmt,
    ) -> Result<(), IrError> {
        self.open_scope();
        if let Some(init) = init {
            self.build_stmt(init)?;
        }

        let loop_block = cond.map(|_| self.add_block_for(stmt.id, "for.loop"));
        let body_block = self.add_block_for(body.id, "for.body");
        let post_block = post.map(|_| self.add_block("for.post"));
        let done = self.add_block("for.done");

        let head = loop_block.unwrap_or(body_block);
        let cont = post_block.unwrap_or(head);
        self.emit_jump(head);

        if let (Some(loop_block), Some(cond)) = (loop_block, cond) {
            self.start_block(loop_block);
            self.build_cond(cond, body_block, done)?;
        }

        self.start_block(body_block);
        self.module.push_target_list(self.proc, Some(done), Some(cont), None);
        self.build_scoped(body)?;
        self.module.pop_target_list(self.proc);
        self.emit_jump(cont);

        if let (Some(post_block), Some(post)) = (post_block, post) {
            self.start_block(post_block);
            self.build_stmt(post)?;
            self.emit_jump(head);
        }

        self.start_block(done);
        self.close_scope()
    }

    /// Compares the tag against every case expression in order. Each body
    /// may fall through to the next clause's body.
    fn build_match(&mut self, init: Option<&'a Stmt>, tag: Option<&'a Expr>, clauses: &'a [CaseClause]) -> Result<(), IrError> {
        self.open_scope();
        if let Some(init) = init {
            self.build_stmt(init)?;
        }

        let tag = match tag {
            Some(tag) => self.build_expr(tag)?,
            None => self.module.const_bool(true),
        };

        let bodies: Vec<_> = clauses
            .iter()
            .map(|clause| {
                let label = if clause.is_default() {
                    "match.dflt.body"
                } else {
                    "match.case.body"
                };
                self.add_block_for(clause.id, label)
            })
            .collect();
        let done = self.add_block("match.done");
        let mut default = None;

        for (clause, &body) in clauses.iter().zip(&bodies) {
            if clause.is_default() {
                default = Some(body);
                continue;
            }
            for expr in &clause.exprs {
                let next = self.add_block("match.next");
                let value = self.build_expr(expr)?;
                let cond = self.emit_comp(BinaryOp::CmpEq, tag, value)?;
                self.emit_if(cond, body, next);
                self.start_block(next);
            }
        }
        self.emit_jump(default.unwrap_or(done));

        for (i, clause) in clauses.iter().enumerate() {
            let fall = bodies.get(i + 1).copied().unwrap_or(done);
            self.start_block(bodies[i]);
            self.module.push_target_list(self.proc, Some(done), None, Some(fall));
            self.open_scope();
            self.build_stmt_list(&clause.body)?;
            self.close_scope()?;
            self.module.pop_target_list(self.proc);
            self.emit_jump(done);
        }

        self.start_block(done);
        self.close_scope()
    }

    /// Dispatches on a union's tag. In each case the variable is the
    /// union's payload, or a pointer to it when matching through a pointer.
    fn build_type_match(&mut self, var: &str, tag: &'a Expr, clauses: &'a [CaseClause]) -> Result<(), IrError> {
        let info = self.info;
        self.open_scope();

        let through_pointer = self.types().is_pointer(self.expr_type(tag)?);
        let union_ptr = self.addr_or_pointer(tag)?;
        let union_ty = self.types().deref(self.module.type_of(union_ptr));

        let tag_ptr = self.emit_union_tag_ptr(union_ptr);
        let tag_value = self.emit_load(tag_ptr);

        let done = self.add_block("type_match.done");
        self.module.push_target_list(self.proc, Some(done), None, None);

        let mut default = None;
        for clause in clauses {
            let case_ty = match clause.exprs.first() {
                Some(expr) => self.expr_type(expr)?,
                None => {
                    default = Some(clause);
                    continue;
                },
            };
            let tag = self
                .types()
                .union_tag_of(union_ty, case_ty)
                .ok_or_else(|| IrError::InvalidConversion(self.type_str(union_ty), self.type_str(case_ty)))?;

            let body = self.add_block_for(clause.id, "type_match.case.body");
            let next = self.add_block("type_match.next");
            let expected = self.module.const_int(tag);
            let cond = self.emit_comp(BinaryOp::CmpEq, tag_value, expected)?;
            self.emit_if(cond, body, next);

            self.start_block(body);
            self.open_scope();
            let entity = info
                .scopes
                .get(&clause.id)
                .and_then(|&scope| info.scope(scope).elements.get(var).copied());
            if let Some(e) = entity {
                let case_ptr = self.types_mut().make_pointer(case_ty);
                let data = self.emit_bitcast(union_ptr, case_ptr);
                let var_ty = if through_pointer { case_ptr } else { case_ty };
                let local = self.module.add_local(self.proc, Some(e), var_ty, false);
                let value = if through_pointer { data } else { self.emit_load(data) };
                self.emit_store(local, value);
            }
            self.build_stmt_list(&clause.body)?;
            self.close_scope()?;
            self.emit_jump(done);

            self.start_block(next);
        }

        if let Some(clause) = default {
            self.open_scope();
            self.build_stmt_list(&clause.body)?;
            self.close_scope()?;
        }
        self.emit_jump(done);

        self.module.pop_target_list(self.proc);
        self.start_block(done);
        self.close_scope()
    }

    fn build_return(&mut self, exprs: &'a [Expr]) -> Result<(), IrError> {
        let results = self.result_types();

        let value = match results.as_slice() {
            [] => {
                for expr in exprs {
                    self.build_expr(expr)?;
                }
                None
            },
            [single] => match exprs.first() {
                Some(expr) => {
                    let value = self.build_expr(expr)?;
                    Some(self.emit_conv(value, *single)?)
                },
                None => None,
            },
            _ => {
                let values = self.build_values(exprs, results.len())?;
                let ty = self.module.procedure(self.proc).ty;
                let tuple_ty = self
                    .types()
                    .proc_type(ty)
                    .map_or(TypeId::INVALID, |pt| pt.results);

                let tuple = self.add_local(tuple_ty, false);
                for (i, value) in values.into_iter().enumerate() {
                    let field = self.emit_struct_ep(tuple, i)?;
                    self.addr_store(Addr::Ptr(field), value)?;
                }
                Some(self.emit_load(tuple))
            },
        };

        self.emit_return(value)
    }

    /// Runs every pending defer, then returns.
    pub(super) fn emit_return(&mut self, value: Option<ValueId>) -> Result<(), IrError> {
        self.emit_defers(DeferExit::Return)?;
        self.module.emit_return(self.proc, value);
        Ok(())
    }

    /// `push_allocator` and `push_context` overwrite the implicit context
    /// for their body. The old value comes back through a deferred store.
    fn build_push_context(&mut self, expr: &'a Expr, body: &'a Stmt, allocator_only: bool) -> Result<(), IrError> {
        let context = self
            .info
            .implicit_values
            .get(&ImplicitValueId::Context)
            .copied()
            .ok_or_else(|| IrError::MissingEntityValue(ImplicitValueId::Context.name().to_owned()))?;

        self.open_scope();
        let context_ptr = match self.entity_addr(context)? {
            Addr::Ptr(ptr) => ptr,
            Addr::Vector { .. } => return Err(IrError::InvalidExpr(expr.to_string())),
        };

        let saved = self.emit_load(context_ptr);
        let void = self.void();
        let restore = Instr::new(
            InstrKind::Store {
                address: context_ptr,
                value: saved,
            },
            void,
        );
        self.module.push_defer(self.proc, DeferKind::Instr(restore));

        let value = self.build_expr(expr)?;
        let target = if allocator_only {
            let context_ty = self.types().deref(self.module.type_of(context_ptr));
            let index = self
                .types()
                .record(context_ty)
                .and_then(|r| r.field_index("allocator"))
                .ok_or_else(|| IrError::UngepableType(self.type_str(context_ty)))?;
            self.emit_struct_ep(context_ptr, index)?
        } else {
            context_ptr
        };
        self.addr_store(Addr::Ptr(target), value)?;

        self.build_stmt(body)?;
        self.close_scope()
    }

    // Declarations

    fn build_local_decl(&mut self, decl: &'a Decl) -> Result<(), IrError> {
        let info = self.info;

        match decl {
            Decl::Var { names, values, .. } => {
                let mut locals = Vec::with_capacity(names.len());
                for name in names {
                    let local = match info.definitions.get(&name.id) {
                        Some(&e) if !name.is_blank() => {
                            let ty = info.entity(e).ty.unwrap_or(TypeId::INVALID);
                            Some(self.module.add_local(self.proc, Some(e), ty, values.is_empty()))
                        },
                        _ => None,
                    };
                    locals.push(local);
                }

                if !values.is_empty() {
                    let values = self.build_values(values, names.len())?;
                    for (local, value) in locals.into_iter().zip(values) {
                        if let Some(local) = local {
                            self.addr_store(Addr::Ptr(local), value)?;
                        }
                    }
                }
            },
            Decl::Type { name, .. } => {
                if let Some(e) = info.entity_of_ident(name.id) {
                    let p = self.module.procedure(self.proc);
                    let mangled = format!("{}.{}-{}", p.name, name.name, e.index());
                    let ty = info.entity(e).ty.unwrap_or(TypeId::INVALID);
                    self.module.add_type_name(mangled, Some(e), ty);
                }
            },
            Decl::Proc(pd) => self.build_local_proc(pd),
            Decl::Const { .. } | Decl::Import(_) | Decl::ForeignLibrary(_) => {},
        }
        Ok(())
    }

    fn build_local_proc(&mut self, pd: &'a ProcDecl) {
        let e = match self.info.entity_of_ident(pd.name.id) {
            Some(e) => e,
            None => return,
        };

        let p = self.module.procedure(self.proc);
        let name = format!("{}.{}-{}", p.name, pd.name.name, p.children.len());
        self.declare_procedure(e, name, pd, Some(self.proc));
    }

    // Scopes and defers

    fn open_scope(&mut self) {
        self.module.open_scope(self.proc);
    }

    /// Runs the defers of the innermost scope if its end is live, and
    /// drops them either way.
    fn close_scope(&mut self) -> Result<(), IrError> {
        let p = self.module.procedure(self.proc);
        let stack = p.defer_stmts.clone();
        let plan = plan_defers(&stack, DeferExit::Default, p.scope_index);

        if self.module.is_live(self.proc) {
            for &i in &plan.emit {
                self.emit_defer(&stack[i])?;
            }
        }

        let p = self.module.procedure_mut(self.proc);
        p.defer_stmts.truncate(stack.len() - plan.pop);
        self.module.pop_scope(self.proc);
        Ok(())
    }

    fn build_scoped(&mut self, stmt: &'a Stmt) -> Result<(), IrError> {
        self.open_scope();
        self.build_stmt(stmt)?;
        self.close_scope()
    }

    /// Emits the defers an exit runs, leaving the stack as it is. Nothing is
    /// emitted into a dead block.
    fn emit_defers(&mut self, exit: DeferExit) -> Result<(), IrError> {
        if !self.module.is_live(self.proc) {
            return Ok(());
        }
        let p = self.module.procedure(self.proc);
        let stack = p.defer_stmts.clone();
        let plan = plan_defers(&stack, exit, p.scope_index);

        for &i in &plan.emit {
            self.emit_defer(&stack[i])?;
        }
        Ok(())
    }

    /// Every emitted defer gets a block of its own.
    fn emit_defer(&mut self, defer: &Defer) -> Result<(), IrError> {
        let block = self.add_block("defer");
        self.emit_jump(block);
        self.start_block(block);

        match &defer.kind {
            DeferKind::Node(id) => {
                let stmt = self
                    .deferred
                    .get(id)
                    .copied()
                    .ok_or(IrError::UncheckedExpr(*id))?;
                self.build_stmt(stmt)?;
            },
            DeferKind::Instr(instr) => {
                self.module.emit_instr(self.proc, instr);
            },
        }
        Ok(())
    }
}
