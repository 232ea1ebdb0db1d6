//! Lowering of a checked program to an [`odin_ir::Module`].
//!
//! [`generate_ir`] first declares every package-level entity that the
//! program needs as a module member, so any body can refer to any of them.
//! Procedure bodies are then built from a queue that nested procedures and
//! procedure literals keep feeding. The startup procedure is built last: it
//! runs the global initializers and fills in the `type_info` table.

mod addr;
mod builtin;
mod conv;
mod expr;
mod startup;
mod stmt;
mod type_info;

#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use thiserror::Error;

use odin_ir::{
    BlockId, InstrKind, Module, ModuleError, ProcFlags, ProcId, SourcePos, ValueId, STARTUP_RUNTIME_PROC_NAME,
};
use odin_types::{CallingConvention, EntityId, NodeId, TypeId, Types};

use crate::{
    ast::{Expr, ProcDecl, ProcTags, Stmt, StmtKind, StmtStateFlags, TokenPos},
    checker::{CheckerInfo, DeclId, EntityKind, TypeAndValue},
};

pub use addr::Addr;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum IrError {
    #[error("cannot generate IR for a program with {0} error(s)")]
    ProgramHasErrors(usize),
    #[error("no `type_info` entry for `{0}`")]
    MissingTypeInfo(String),
    #[error("missing runtime procedure `{0}`")]
    MissingRuntimeProc(&'static str),
    #[error("cannot take the address of an element of `{0}`")]
    UngepableType(String),
    #[error("`{0}` has no value in the module")]
    MissingEntityValue(String),
    #[error("expression {0} was never checked")]
    UncheckedExpr(NodeId),
    #[error("`{0}` does not lower to a value")]
    InvalidExpr(String),
    #[error("cannot convert `{0}` to `{1}`")]
    InvalidConversion(String, String),
    #[error(transparent)]
    Module(#[from] ModuleError),
}

/// Builds the IR of a checked program.
///
/// A program with errors is refused outright.
pub fn generate_ir(info: &CheckerInfo<'_>) -> anyhow::Result<Module> {
    let errors = info.error_count();
    if errors > 0 {
        return Err(IrError::ProgramHasErrors(errors).into());
    }

    let mut builder = IrBuilder::new(info);
    builder.add_type_info_globals()?;
    builder.add_members()?;
    builder.build_queued_procedures()?;
    builder.build_startup_runtime()?;

    Ok(builder.into())
}

/// A procedure body waiting in the queue.
#[derive(Clone, Copy)]
struct PendingBody<'a> {
    body: &'a Stmt,
    tags: ProcTags,
}

/// The initializers of one global declaration, run by the startup
/// procedure. A single multi-valued initializer may feed several globals.
struct GlobalInit<'a> {
    globals: Vec<ValueId>,
    exprs: Vec<&'a Expr>,
}

/// This is used to hold state while building the module.
pub(crate) struct IrBuilder<'a> {
    info: &'a CheckerInfo<'a>,
    module: Module,
    /// The procedure whose body is being built.
    proc: ProcId,
    startup: ProcId,
    bodies: HashMap<ProcId, PendingBody<'a>>,
    /// Deferred statements, re-lowered at every exit that runs them.
    deferred: HashMap<NodeId, &'a Stmt>,
    /// Operands of `using` statements, which promoted fields point back at.
    using_exprs: HashMap<NodeId, &'a Expr>,
    global_inits: Vec<GlobalInit<'a>>,
    stmt_flags: StmtStateFlags,
}

impl<'a> IrBuilder<'a> {
    fn new(info: &'a CheckerInfo<'a>) -> Self {
        let mut module = Module::new(info.arena.types.clone(), info.ctx.clone());
        module.entry_point = info.entry_point;
        module.foreign_library_paths = info.foreign_libraries.clone();

        let ty = module
            .types
            .make_proc(Vec::new(), Vec::new(), false, CallingConvention::Odin);
        let startup = module.add_procedure(STARTUP_RUNTIME_PROC_NAME, None, ty, None);
        module.procedure_mut(startup).flags |= ProcFlags::STARTUP;
        let value = module.procedure(startup).value;
        module.members.insert(STARTUP_RUNTIME_PROC_NAME.to_owned(), value);

        Self {
            info,
            module,
            proc: startup,
            startup,
            bodies: HashMap::new(),
            deferred: HashMap::new(),
            using_exprs: HashMap::new(),
            global_inits: Vec::new(),
            stmt_flags: StmtStateFlags::empty(),
        }
    }

    // Package-level members

    /// Declares every package-level entity in the minimum dependency set.
    fn add_members(&mut self) -> Result<(), IrError> {
        let info = self.info;
        let mut seen_decls = HashSet::new();

        for (&e, &d) in &info.entities {
            if !info.min_dep_map.contains(&e) {
                continue;
            }

            let entity = info.entity(e);
            match &entity.kind {
                EntityKind::TypeName => {
                    let name = self.mangle_name(e);
                    let ty = entity.ty.unwrap_or(TypeId::INVALID);
                    self.module.add_type_name(name, Some(e), ty);
                },
                EntityKind::Variable { .. } => {
                    if seen_decls.insert(d) {
                        self.add_globals(d);
                    }
                },
                EntityKind::Procedure { .. } => {
                    if let Some(pd) = info.decl(d).proc_decl {
                        let name = self.link_name(e).unwrap_or_else(|| self.mangle_name(e));
                        self.declare_procedure(e, name, pd, None);
                    }
                },
                _ => {},
            }
        }

        odin_log::trace!("declared {} module members", self.module.members.len());
        Ok(())
    }

    fn add_globals(&mut self, d: DeclId) {
        let decl = self.info.decl(d);
        let paired = decl.init_exprs.len() == decl.entities.len();

        let mut globals = Vec::with_capacity(decl.entities.len());
        for (i, &e) in decl.entities.iter().enumerate() {
            let ty = self.info.entity(e).ty.unwrap_or(TypeId::INVALID);
            let init = if paired {
                self.constant_initializer(decl.init_exprs[i], ty)
            } else {
                None
            };
            let name = self.mangle_name(e);
            globals.push(self.module.add_global(name, Some(e), ty, init));
        }

        if !decl.init_exprs.is_empty() {
            self.global_inits.push(GlobalInit {
                globals,
                exprs: decl.init_exprs.clone(),
            });
        }
    }

    fn constant_initializer(&mut self, expr: &Expr, ty: TypeId) -> Option<ValueId> {
        let tv = self.info.type_and_value(expr.id)?;
        if tv.value.is_invalid() || self.types().is_any(ty) {
            return None;
        }
        let value = tv.value.clone();
        Some(self.const_value(ty, &value))
    }

    /// Creates the procedure for a declaration and queues its body.
    fn declare_procedure(&mut self, e: EntityId, name: String, pd: &'a ProcDecl, parent: Option<ProcId>) -> ProcId {
        let entity = self.info.entity(e);
        let ty = entity.ty.unwrap_or(TypeId::INVALID);
        let tags = entity.proc_tags();
        let is_entry_point = self.info.entry_point == Some(e);
        let link_name = self.link_name(e);

        let proc = self.module.add_procedure(name.clone(), Some(e), ty, parent);
        let p = self.module.procedure_mut(proc);
        p.flags = proc_flags(tags);
        if is_entry_point {
            p.flags |= ProcFlags::ENTRY_POINT;
        }
        p.link_name = link_name;
        let value = p.value;
        self.module.members.insert(name, value);

        if let Some(body) = &pd.body {
            self.queue_body(proc, body, tags);
        }
        proc
    }

    fn queue_body(&mut self, proc: ProcId, body: &'a Stmt, tags: ProcTags) {
        self.module.procedure_mut(proc).body = Some(body.id);
        self.bodies.insert(proc, PendingBody { body, tags });
        self.module.procs_to_generate.push(proc);
    }

    /// Package-level names outside the initial and shared files are
    /// prefixed with their file's name.
    fn mangle_name(&self, e: EntityId) -> String {
        let entity = self.info.entity(e);
        let scope = match entity.scope {
            Some(scope) => self.info.scope(scope),
            None => return entity.name.clone(),
        };

        if !scope.is_file() || scope.is_init() || scope.is_global() {
            return entity.name.clone();
        }
        match scope.file.and_then(|f| self.info.program.file(f)) {
            Some(file) => format!("{}.{}", file.stem(), entity.name),
            None => entity.name.clone(),
        }
    }

    /// The symbol a foreign or `#link_name` procedure must keep.
    fn link_name(&self, e: EntityId) -> Option<String> {
        let entity = self.info.entity(e);
        match &entity.kind {
            EntityKind::Procedure {
                tags,
                foreign_name,
                link_name,
                ..
            } => {
                if tags.contains(ProcTags::FOREIGN) {
                    Some(foreign_name.clone().unwrap_or_else(|| entity.name.clone()))
                } else {
                    link_name.clone()
                }
            },
            _ => None,
        }
    }

    // Procedure bodies

    fn build_queued_procedures(&mut self) -> Result<(), IrError> {
        let mut built = 0;
        while let Some(&proc) = self.module.procs_to_generate.get(built) {
            self.build_procedure(proc)?;
            built += 1;
        }

        odin_log::trace!("built {} procedure bodies", built);
        Ok(())
    }

    fn build_procedure(&mut self, proc: ProcId) -> Result<(), IrError> {
        let pending = match self.bodies.get(&proc) {
            Some(&pending) => pending,
            None => return Ok(()),
        };
        odin_log::trace!("building `{}`", self.module.procedure(proc).name);

        self.proc = proc;
        self.stmt_flags = StmtStateFlags::empty();
        if pending.tags.contains(ProcTags::BOUNDS_CHECK) {
            self.stmt_flags |= StmtStateFlags::BOUNDS_CHECK;
        }
        if pending.tags.contains(ProcTags::NO_BOUNDS_CHECK) {
            self.stmt_flags |= StmtStateFlags::NO_BOUNDS_CHECK;
        }

        self.module.begin_body(proc);
        if self.module.procedure(proc).flags.contains(ProcFlags::ENTRY_POINT) {
            let void = self.void();
            self.emit(InstrKind::StartupRuntime, void);
        }
        self.add_params()?;

        self.module.open_scope(proc);
        match &pending.body.kind {
            StmtKind::Block(stmts) => self.build_stmt_list(stmts)?,
            _ => self.build_stmt(pending.body)?,
        }

        if self.module.is_reachable(proc) {
            if self.result_types().is_empty() {
                self.emit_return(None)?;
            } else {
                self.module.emit_unreachable(proc);
            }
        }
        // Body-level defers have been run by every return.
        self.module.procedure_mut(proc).defer_stmts.clear();
        self.module.pop_scope(proc);
        self.module.end_body(proc);

        Ok(())
    }

    /// Parameters arrive as values and are copied into locals, which is
    /// what the body's identifiers refer to.
    fn add_params(&mut self) -> Result<(), IrError> {
        let ty = self.module.procedure(self.proc).ty;
        let params = match self.types().proc_type(ty) {
            Some(pt) => self.types().tuple(pt.params).map(<[_]>::to_vec).unwrap_or_default(),
            None => return Ok(()),
        };

        for field in params {
            let param = self.module.add_param(self.proc, field.entity, field.name.clone(), field.ty);
            if field.entity.is_none() || field.name.is_empty() || field.name == "_" {
                continue;
            }
            let local = self.module.add_local(self.proc, field.entity, field.ty, false);
            self.emit_store(local, param);
        }
        Ok(())
    }

    fn result_types(&self) -> Vec<TypeId> {
        let ty = self.module.procedure(self.proc).ty;
        self.types()
            .proc_type(ty)
            .and_then(|pt| self.types().tuple(pt.results))
            .map(|fields| fields.iter().map(|f| f.ty).collect())
            .unwrap_or_default()
    }

    // Shorthands over the module

    fn types(&self) -> &Types {
        &self.module.types
    }

    fn types_mut(&mut self) -> &mut Types {
        &mut self.module.types
    }

    fn type_str(&self, ty: TypeId) -> String {
        self.types().type_to_string(ty)
    }

    fn void(&self) -> TypeId {
        self.types().empty_tuple()
    }

    fn tv(&self, expr: &Expr) -> Result<&'a TypeAndValue, IrError> {
        let info = self.info;
        info.type_and_value(expr.id).ok_or(IrError::UncheckedExpr(expr.id))
    }

    fn expr_type(&self, expr: &Expr) -> Result<TypeId, IrError> {
        self.tv(expr).map(|tv| tv.ty)
    }

    fn entity_value(&self, e: EntityId) -> Result<ValueId, IrError> {
        self.module
            .entity_values
            .get(&e)
            .copied()
            .ok_or_else(|| IrError::MissingEntityValue(self.info.entity(e).name.clone()))
    }

    fn emit(&mut self, kind: InstrKind, ty: TypeId) -> ValueId {
        self.module.emit(self.proc, kind, ty)
    }

    fn emit_load(&mut self, address: ValueId) -> ValueId {
        self.module.emit_load(self.proc, address)
    }

    fn emit_store(&mut self, address: ValueId, value: ValueId) {
        self.module.emit_store(self.proc, address, value);
    }

    /// A local without an entity, for temporaries.
    fn add_local(&mut self, ty: TypeId, zero_initialized: bool) -> ValueId {
        self.module.add_local(self.proc, None, ty, zero_initialized)
    }

    fn add_block(&mut self, label: &str) -> BlockId {
        self.module.add_block(self.proc, None, label)
    }

    fn add_block_for(&mut self, node: NodeId, label: &str) -> BlockId {
        self.module.add_block(self.proc, Some(node), label)
    }

    fn start_block(&mut self, block: BlockId) {
        self.module.set_curr_block(self.proc, Some(block));
    }

    fn emit_jump(&mut self, block: BlockId) {
        self.module.emit_jump(self.proc, block);
    }

    fn emit_if(&mut self, cond: ValueId, then_block: BlockId, else_block: BlockId) {
        self.module.emit_if(self.proc, cond, then_block, else_block);
    }

    fn source_pos(&self, pos: TokenPos) -> SourcePos {
        SourcePos {
            file: self
                .info
                .program
                .file(pos.file)
                .map_or_else(String::new, |f| f.fullpath.clone()),
            line: pos.line,
            column: pos.column,
        }
    }

    fn bounds_checks_enabled(&self) -> bool {
        !self.stmt_flags.contains(StmtStateFlags::NO_BOUNDS_CHECK)
    }
}

impl From<IrBuilder<'_>> for Module {
    fn from(builder: IrBuilder<'_>) -> Self {
        builder.module
    }
}

fn proc_flags(tags: ProcTags) -> ProcFlags {
    let pairs = [
        (ProcTags::FOREIGN, ProcFlags::FOREIGN),
        (ProcTags::EXPORT, ProcFlags::EXPORT),
        (ProcTags::INLINE, ProcFlags::INLINE),
        (ProcTags::NO_INLINE, ProcFlags::NO_INLINE),
        (ProcTags::BOUNDS_CHECK, ProcFlags::BOUNDS_CHECK),
        (ProcTags::NO_BOUNDS_CHECK, ProcFlags::NO_BOUNDS_CHECK),
    ];

    pairs
        .iter()
        .filter(|(tag, _)| tags.contains(*tag))
        .fold(ProcFlags::empty(), |flags, (_, flag)| flags | *flag)
}
