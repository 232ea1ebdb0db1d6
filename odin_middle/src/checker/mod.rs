//! Name resolution and type checking.
//!
//! [`check_parsed_files`] works in passes over the whole [`Program`]: the
//! top-level entities of every file are collected before anything is
//! checked, so any file may refer to any other. Entities are then checked
//! on demand, each exactly once, and procedure bodies are checked last from
//! a queue that nested procedure literals keep feeding.
//!
//! Everything the checker learns ends up in [`CheckerInfo`], which is what
//! the IR builder consumes.

mod builtin;
mod decl;
mod driver;
pub mod entity;
mod expr;
pub mod operand;
pub mod scope;
mod stmt;
mod type_expr;
mod type_info;
mod universe;

#[cfg(test)]
mod tests;

use indexmap::{IndexMap, IndexSet};
use std::{
    collections::{HashMap, VecDeque},
    fmt,
};
use thiserror::Error;

use odin_types::{BuildContext, EntityId, ExactValue, NodeId, Selection, TypeId, Types};

use crate::{
    ast::{Expr, FileId, ForeignLibraryDecl, Ident, ImportDecl, ProcDecl, ProcTags, Program, Stmt, StmtStateFlags, TokenPos},
    errors::Diagnostics,
};

pub use driver::{check_parsed_files, generate_minimum_dependency_map};
pub use entity::{BuiltinId, Entity, EntityFlags, EntityKind, ImplicitValueId};
pub use operand::{AddressingMode, Operand, TypeAndValue, UntypedInfo};
pub use scope::{Scope, ScopeFlags, ScopeId};

/// Internal invariant violations. Unlike [`Diagnostics`], these abort the
/// compilation.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CompilerError {
    #[error("could not find type declaration for `{0}`; is the runtime support file missing?")]
    MissingPreload(&'static str),
    #[error("`{0}` must be a union, got `{1}`")]
    InvalidPreload(&'static str, String),
    #[error("expression {0} is still in the untyped table with type `{1}`")]
    TypedUntyped(NodeId, String),
    #[error("implicit value `{0}` has no backing variable `{1}`")]
    MissingImplicitBacking(&'static str, &'static str),
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DeclId(u32);

impl DeclId {
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DeclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// Bookkeeping for one declaration. A `a, b := f()` declaration shares a
/// single `DeclInfo` between its entities.
#[derive(Clone, Debug)]
pub struct DeclInfo<'a> {
    pub scope: ScopeId,
    pub file: FileId,
    pub entities: Vec<EntityId>,
    pub type_expr: Option<&'a Expr>,
    pub init_exprs: Vec<&'a Expr>,
    pub proc_decl: Option<&'a ProcDecl>,
    /// Entities the declaration refers to, in first-use order.
    pub deps: IndexSet<EntityId>,
}

impl<'a> DeclInfo<'a> {
    pub fn new(scope: ScopeId, file: FileId) -> Self {
        Self {
            scope,
            file,
            entities: Vec::new(),
            type_expr: None,
            init_exprs: Vec::new(),
            proc_decl: None,
            deps: IndexSet::new(),
        }
    }
}

/// A procedure body waiting to be checked.
#[derive(Clone, Debug)]
pub struct ProcedureInfo<'a> {
    pub file: FileId,
    pub decl: Option<DeclId>,
    /// The scope holding the parameters.
    pub scope: ScopeId,
    pub ty: TypeId,
    pub body: &'a Stmt,
    pub tags: ProcTags,
}

/// Storage for everything the checker creates. Cross references are
/// indices into these vectors.
#[derive(Clone, Debug, Default)]
pub struct Arena<'a> {
    pub types: Types,
    pub scopes: Vec<Scope>,
    pub entities: Vec<Entity>,
    pub decls: Vec<DeclInfo<'a>>,
}

/// The result of checking a program.
#[derive(Debug)]
pub struct CheckerInfo<'a> {
    pub program: &'a Program,
    pub ctx: BuildContext,
    pub arena: Arena<'a>,
    pub diagnostics: Diagnostics,

    /// Every checked expression.
    pub types: HashMap<NodeId, TypeAndValue>,
    /// Identifier to the entity it declares.
    pub definitions: IndexMap<NodeId, EntityId>,
    /// Identifier to the entity it refers to.
    pub uses: HashMap<NodeId, EntityId>,
    /// Scope-introducing node to its scope.
    pub scopes: HashMap<NodeId, ScopeId>,
    pub untyped: IndexMap<NodeId, UntypedInfo>,
    /// Every package-level entity with its declaration, in collection order.
    pub entities: IndexMap<EntityId, DeclId>,
    /// Selector expression to the field path it resolved to.
    pub selections: HashMap<NodeId, Selection>,
    /// `#foreign`, `#export` and `#link_name` procedures by linking name.
    pub foreign_procs: IndexMap<String, EntityId>,
    pub type_info_map: IndexMap<TypeId, usize>,
    pub type_info_count: usize,
    pub implicit_values: IndexMap<ImplicitValueId, EntityId>,
    pub foreign_libraries: Vec<String>,
    /// Bounds checking state of statements that differ from the default.
    pub stmt_flags: HashMap<NodeId, StmtStateFlags>,

    pub universal_scope: ScopeId,
    pub global_scope: ScopeId,
    /// Indexed by [`FileId`].
    pub file_scopes: Vec<ScopeId>,
    pub init_scope: Option<ScopeId>,
    pub entry_point: Option<EntityId>,
    pub min_dep_map: IndexSet<EntityId>,
}

impl<'a> CheckerInfo<'a> {
    fn new(program: &'a Program, ctx: BuildContext) -> Self {
        let paths = program.files.iter().map(|f| f.fullpath.clone()).collect();

        let mut info = Self {
            program,
            ctx,
            arena: Arena::default(),
            diagnostics: Diagnostics::new(paths),
            types: HashMap::new(),
            definitions: IndexMap::new(),
            uses: HashMap::new(),
            scopes: HashMap::new(),
            untyped: IndexMap::new(),
            entities: IndexMap::new(),
            selections: HashMap::new(),
            foreign_procs: IndexMap::new(),
            type_info_map: IndexMap::new(),
            type_info_count: 0,
            implicit_values: IndexMap::new(),
            foreign_libraries: Vec::new(),
            stmt_flags: HashMap::new(),
            universal_scope: ScopeId::new(0),
            global_scope: ScopeId::new(0),
            file_scopes: Vec::new(),
            init_scope: None,
            entry_point: None,
            min_dep_map: IndexSet::new(),
        };

        info.universal_scope = info.make_scope(None, ScopeFlags::empty());
        info.global_scope = info.make_scope(Some(info.universal_scope), ScopeFlags::GLOBAL);
        info
    }

    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.arena.entities[id.index()]
    }

    pub fn entity_mut(&mut self, id: EntityId) -> &mut Entity {
        &mut self.arena.entities[id.index()]
    }

    pub fn add_entity_raw(&mut self, entity: Entity) -> EntityId {
        let id = EntityId::new(self.arena.entities.len());
        self.arena.entities.push(entity);
        id
    }

    pub fn decl(&self, id: DeclId) -> &DeclInfo<'a> {
        &self.arena.decls[id.index()]
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut DeclInfo<'a> {
        &mut self.arena.decls[id.index()]
    }

    pub fn add_decl(&mut self, decl: DeclInfo<'a>) -> DeclId {
        let id = DeclId::new(self.arena.decls.len());
        self.arena.decls.push(decl);
        id
    }

    pub fn type_and_value(&self, node: NodeId) -> Option<&TypeAndValue> {
        self.types.get(&node)
    }

    pub fn type_of_expr(&self, node: NodeId) -> Option<TypeId> {
        self.types.get(&node).map(|tv| tv.ty)
    }

    /// The entity an identifier declares or refers to.
    pub fn entity_of_ident(&self, node: NodeId) -> Option<EntityId> {
        self.definitions
            .get(&node)
            .or_else(|| self.uses.get(&node))
            .copied()
    }

    pub fn decl_of(&self, entity: EntityId) -> Option<DeclId> {
        self.entities.get(&entity).copied()
    }

    pub fn file_scope(&self, file: FileId) -> Option<ScopeId> {
        self.file_scopes.get(file.index()).copied()
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.error_count()
    }
}

/// State that changes as the checker walks into declarations, procedures
/// and statements. Saved and restored around each of them.
#[derive(Clone, Debug)]
struct CheckerContext {
    scope: ScopeId,
    decl: Option<DeclId>,
    file: FileId,
    /// Type of the procedure whose body is being checked.
    proc_ty: Option<TypeId>,
    stmt_state_flags: StmtStateFlags,
    in_defer: bool,
    /// The value of `iota` while a constant's initializer is checked.
    iota: Option<ExactValue>,
}

struct DelayedImport<'a> {
    scope: ScopeId,
    pos: TokenPos,
    decl: &'a ImportDecl,
}

struct DelayedLibrary<'a> {
    scope: ScopeId,
    pos: TokenPos,
    file: FileId,
    decl: &'a ForeignLibraryDecl,
}

pub(crate) struct Checker<'a> {
    info: CheckerInfo<'a>,
    context: CheckerContext,
    procs: VecDeque<ProcedureInfo<'a>>,
    delayed_imports: Vec<DelayedImport<'a>>,
    delayed_libraries: Vec<DelayedLibrary<'a>>,
    /// Every expression seen so far, for revisiting untyped operands.
    nodes: HashMap<NodeId, &'a Expr>,
    done_preload: bool,
    /// Set by code too deep to return a `Result`; checked between passes.
    fatal: Option<CompilerError>,
}

impl<'a> Checker<'a> {
    fn new(program: &'a Program, ctx: BuildContext) -> Self {
        let mut info = CheckerInfo::new(program, ctx);
        universe::init_universal_scope(&mut info);

        let context = CheckerContext {
            scope: info.global_scope,
            decl: None,
            file: program.init_file,
            proc_ty: None,
            stmt_state_flags: StmtStateFlags::empty(),
            in_defer: false,
            iota: None,
        };

        Self {
            info,
            context,
            procs: VecDeque::new(),
            delayed_imports: Vec::new(),
            delayed_libraries: Vec::new(),
            nodes: HashMap::new(),
            done_preload: false,
            fatal: None,
        }
    }

    fn types(&self) -> &Types {
        &self.info.arena.types
    }

    fn types_mut(&mut self) -> &mut Types {
        &mut self.info.arena.types
    }

    fn type_str(&self, ty: TypeId) -> String {
        self.types().type_to_string(ty)
    }

    fn entity(&self, id: EntityId) -> &Entity {
        self.info.entity(id)
    }

    fn entity_mut(&mut self, id: EntityId) -> &mut Entity {
        self.info.entity_mut(id)
    }

    fn error(&mut self, pos: TokenPos, message: impl ToString) {
        self.info.diagnostics.error(pos, message);
    }

    fn warning(&mut self, pos: TokenPos, message: impl ToString) {
        self.info.diagnostics.warning(pos, message);
    }

    fn set_fatal(&mut self, err: CompilerError) {
        odin_log::error!("{}", err);
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
    }

    fn take_fatal(&mut self) -> Result<(), CompilerError> {
        match self.fatal.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Inserts `entity` into `scope`, reporting a redeclaration unless the
    /// name is `_`. The identifier is recorded as defining the entity
    /// either way.
    fn add_entity(&mut self, scope: ScopeId, ident: Option<&Ident>, entity: EntityId) -> bool {
        let mut inserted = true;

        if !self.entity(entity).is_blank() {
            // Importing the same file twice finds the entity itself.
            if let Some(prior) = self.info.insert_entity(scope, entity).filter(|&prior| prior != entity) {
                let name = self.entity(entity).name.clone();
                let pos = self.entity(entity).pos;
                let prior = self.entity(prior).clone();

                match prior.using_parent {
                    Some(parent) => {
                        let parent_pos = self.entity(parent).pos;
                        self.info.diagnostics.error_with_note(
                            pos,
                            format!("Redeclaration of `{}` in this scope through `using`", name),
                            parent_pos,
                            "using declaration",
                        );
                    },
                    None => self.info.diagnostics.error_with_note(
                        pos,
                        format!("Redeclaration of `{}` in this scope", name),
                        prior.pos,
                        "other declaration",
                    ),
                }
                inserted = false;
            }
        }

        if let Some(ident) = ident {
            self.info.definitions.insert(ident.id, entity);
        }
        inserted
    }

    fn add_entity_and_decl_info(&mut self, ident: &Ident, entity: EntityId, decl: DeclId) {
        let scope = self.info.decl(decl).scope;
        self.add_entity(scope, Some(ident), entity);
        self.info.entities.insert(entity, decl);
    }

    /// Records that `node` refers to `entity` and makes the current
    /// declaration depend on it.
    fn add_entity_use(&mut self, node: NodeId, entity: EntityId) {
        self.info.uses.insert(node, entity);
        self.entity_mut(entity).flags |= EntityFlags::USED;
        self.add_declaration_dependency(entity);
    }

    fn add_declaration_dependency(&mut self, entity: EntityId) {
        let decl = match self.context.decl {
            Some(decl) => decl,
            None => return,
        };

        if self.info.entities.contains_key(&entity) {
            self.info.decl_mut(decl).deps.insert(entity);
        }
    }

    fn add_type_and_value(&mut self, node: NodeId, mode: AddressingMode, ty: TypeId, value: ExactValue) {
        if mode == AddressingMode::Invalid {
            return;
        }

        self.info.types.insert(node, TypeAndValue { mode, ty, value });
    }

    fn add_untyped(&mut self, node: NodeId, is_lhs: bool, mode: AddressingMode, ty: TypeId, value: ExactValue) {
        self.info.untyped.insert(
            node,
            UntypedInfo {
                is_lhs,
                mode,
                ty,
                value,
            },
        );
    }

    fn open_scope(&mut self, node: NodeId, flags: ScopeFlags) -> ScopeId {
        let scope = self.info.make_scope(Some(self.context.scope), flags);
        self.info.scopes.insert(node, scope);
        self.context.scope = scope;
        scope
    }

    fn close_scope(&mut self) {
        if let Some(parent) = self.info.scope(self.context.scope).parent {
            self.context.scope = parent;
        }
    }

    fn check_procedure_later(&mut self, proc_info: ProcedureInfo<'a>) {
        self.procs.push_back(proc_info);
    }
}
