//! Declarations: collecting them, resolving imports and checking each
//! entity's declaration on demand.

use odin_types::{EntityId, ExactValue, TypeId};

use super::{
    entity::{Entity, EntityFlags, EntityKind},
    DeclId, DeclInfo, DelayedImport, DelayedLibrary, Checker, Operand, ProcedureInfo, ScopeId,
};
use crate::ast::{file_stem, Decl, Expr, FileId, Ident, ProcTags, Stmt, StmtKind, TokenPos};

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}

impl<'a> Checker<'a> {
    /// Checks the declaration of a package-level entity unless it already
    /// has a type.
    pub(super) fn check_entity_decl(&mut self, e: EntityId) {
        if self.entity(e).ty.is_some() {
            return;
        }

        match self.info.decl_of(e) {
            Some(decl) => self.check_entity_decl_in(e, decl),
            None => self.entity_mut(e).ty = Some(TypeId::INVALID),
        }
    }

    /// Checks `e` against `decl`. Local declarations come through here
    /// directly since they are not in the entity table.
    pub(super) fn check_entity_decl_in(&mut self, e: EntityId, decl: DeclId) {
        if self.entity(e).ty.is_some() {
            return;
        }

        if self.entity(e).flags.contains(EntityFlags::VISITED) {
            let entity = self.entity(e);
            let msg = format!("Illegal declaration cycle of `{}`", entity.name);
            let pos = entity.pos;
            self.error(pos, msg);
            self.entity_mut(e).ty = Some(TypeId::INVALID);
            return;
        }
        self.entity_mut(e).flags |= EntityFlags::VISITED;

        let prev = self.context.clone();
        let d = self.info.decl(decl);
        self.context.scope = d.scope;
        self.context.file = d.file;
        self.context.proc_ty = None;
        self.context.in_defer = false;
        self.context.iota = None;
        // Local declarations keep recording dependencies on the enclosing
        // package-level declaration.
        if self.info.entities.contains_key(&e) {
            self.context.decl = Some(decl);
        }

        match self.entity(e).kind {
            EntityKind::Constant(_) => self.check_const_decl(e, decl),
            EntityKind::Variable { .. } => self.check_var_decl(e, decl),
            EntityKind::TypeName => self.check_type_decl(e, decl),
            EntityKind::Procedure { .. } => self.check_proc_decl(e, decl),
            _ => {
                odin_log::warning!("no declaration check for {} `{}`", self.entity(e).kind.name(), self.entity(e).name);
                self.entity_mut(e).ty = Some(TypeId::INVALID);
            },
        }

        self.context = prev;
    }

    fn check_const_decl(&mut self, e: EntityId, decl: DeclId) {
        // Collection leaves the name's index in the value; it becomes
        // `iota` for the initializer.
        let iota = match &mut self.entity_mut(e).kind {
            EntityKind::Constant(value) => std::mem::replace(value, ExactValue::Invalid),
            _ => ExactValue::Invalid,
        };

        let d = self.info.decl(decl);
        let (type_expr, init) = (d.type_expr, d.init_exprs.first().copied());

        if let Some(type_expr) = type_expr {
            let ty = self.check_type(type_expr);
            if !self.types().is_constant_type(ty) {
                if !self.types().is_invalid(ty) {
                    let msg = format!("Invalid constant type `{}`", self.type_str(ty));
                    self.error(type_expr.pos, msg);
                }
                self.entity_mut(e).ty = Some(TypeId::INVALID);
                return;
            }
            self.entity_mut(e).ty = Some(ty);
        }

        let prev_iota = self.context.iota.replace(iota);
        let o = match init {
            Some(init) => self.check_expr(init),
            None => Operand::invalid(),
        };
        self.context.iota = prev_iota;

        self.check_init_constant(e, o);
    }

    pub(super) fn check_init_constant(&mut self, e: EntityId, mut o: Operand) {
        let ety = self.entity(e).ty;
        if o.is_invalid() || o.ty == TypeId::INVALID || ety == Some(TypeId::INVALID) {
            self.entity_mut(e).ty.get_or_insert(TypeId::INVALID);
            return;
        }

        if !o.is_constant() {
            let msg = format!("`{}` is not a constant", self.expr_str(&o));
            let pos = self.operand_pos(&o);
            self.error(pos, msg);
            self.entity_mut(e).ty.get_or_insert(TypeId::INVALID);
            return;
        }

        if !self.types().is_constant_type(o.ty) {
            let msg = format!("Invalid constant type: `{}`", self.type_str(o.ty));
            let pos = self.operand_pos(&o);
            self.error(pos, msg);
            self.entity_mut(e).ty.get_or_insert(TypeId::INVALID);
            return;
        }

        let ty = *self.entity_mut(e).ty.get_or_insert(o.ty);
        self.check_assignment(&mut o, Some(ty), "constant declaration");
        if o.is_invalid() {
            return;
        }

        self.entity_mut(e).kind = EntityKind::Constant(o.value);
    }

    fn check_var_decl(&mut self, e: EntityId, decl: DeclId) {
        let d = self.info.decl(decl);
        let type_expr = d.type_expr;
        let inits = d.init_exprs.clone();
        let entities = if d.entities.is_empty() { vec![e] } else { d.entities.clone() };

        for &entity in &entities {
            self.entity_mut(entity).flags |= EntityFlags::VISITED;
        }

        if let Some(type_expr) = type_expr {
            let ty = self.check_type(type_expr);
            for &entity in &entities {
                self.entity_mut(entity).ty = Some(ty);
            }
        }

        if inits.is_empty() {
            self.entity_mut(e).ty.get_or_insert(TypeId::INVALID);
            return;
        }

        if entities.len() == 1 && inits.len() == 1 {
            let mut o = self.check_expr(inits[0]);
            self.check_init_variable(e, &mut o, "variable declaration");
            return;
        }

        self.check_init_variables(&entities, &inits, "variable declaration");
    }

    /// Gives `e` the type of `o` if it has none yet, then checks the
    /// assignment.
    pub(super) fn check_init_variable(&mut self, e: EntityId, o: &mut Operand, context: &str) -> Option<TypeId> {
        let ety = self.entity(e).ty;
        if o.is_invalid() || o.ty == TypeId::INVALID || ety == Some(TypeId::INVALID) {
            self.entity_mut(e).ty.get_or_insert(TypeId::INVALID);
            return None;
        }

        let ty = match ety {
            Some(ty) => ty,
            None => {
                if self.types().is_untyped_nil(o.ty) {
                    let pos = self.entity(e).pos;
                    self.error(pos, format!("Use of untyped nil in {}", context));
                    self.entity_mut(e).ty = Some(TypeId::INVALID);
                    return None;
                }
                let ty = self.types().default_type(o.ty);
                self.entity_mut(e).ty = Some(ty);
                ty
            },
        };

        self.check_assignment(o, Some(ty), context);
        if o.is_invalid() {
            None
        } else {
            Some(ty)
        }
    }

    /// `a, b := x, y` and `a, b := f()`.
    pub(super) fn check_init_variables(&mut self, lhs: &[EntityId], inits: &[&'a Expr], context: &str) {
        if lhs.is_empty() && inits.is_empty() {
            return;
        }

        let mut operands = self.check_unpacked_exprs(inits);

        let rhs_count = operands.iter().filter(|o| !o.is_invalid()).count();
        for (&e, o) in lhs.iter().zip(operands.iter_mut()) {
            self.check_init_variable(e, o, context);
        }

        if rhs_count > 0 && lhs.len() != rhs_count {
            let pos = self.entity(lhs[0]).pos;
            self.error(pos, format!("Assignment count mismatch `{}` := `{}`", lhs.len(), rhs_count));
        }

        for &e in lhs {
            self.entity_mut(e).ty.get_or_insert(TypeId::INVALID);
        }
    }

    fn check_type_decl(&mut self, e: EntityId, decl: DeclId) {
        let type_expr = self.info.decl(decl).type_expr;
        let name = self.entity(e).name.clone();

        // Set before the right hand side is checked so the type can refer
        // to itself through an indirection.
        let named = self.types_mut().make_named(name, None, Some(e));
        self.entity_mut(e).ty = Some(named);

        let base = match type_expr {
            Some(type_expr) => self.check_type_named(type_expr, Some(named)),
            None => TypeId::INVALID,
        };
        self.types_mut().set_named_base(named, base);
    }

    fn check_proc_decl(&mut self, e: EntityId, decl: DeclId) {
        let d = self.info.decl(decl);
        let decl_scope = d.scope;
        let pd = match d.proc_decl {
            Some(pd) => pd,
            None => {
                self.entity_mut(e).ty = Some(TypeId::INVALID);
                return;
            },
        };

        let ty = self.check_type(&pd.ty);
        self.entity_mut(e).ty = Some(ty);

        let scope = match self.info.scopes.get(&pd.ty.unparen().id) {
            Some(&scope) => scope,
            None => return,
        };

        let tags = pd.tags;
        let is_foreign = tags.contains(ProcTags::FOREIGN);
        let is_export = tags.contains(ProcTags::EXPORT);
        let is_link_name = tags.contains(ProcTags::LINK_NAME);

        let owner = self.info.scope(decl_scope);
        if (owner.is_file() || owner.is_global()) && pd.name.name == "main" {
            let types = self.types();
            let is_empty_sig = types.proc_type(ty).map_or(true, |pt| {
                types.tuple(pt.params).map_or(true, <[_]>::is_empty) && types.tuple(pt.results).map_or(true, <[_]>::is_empty)
            });
            if !is_empty_sig {
                let msg = format!("Procedure type of `main` was expected to be `proc()`, got {}", self.type_str(ty));
                self.error(pd.name.pos, msg);
            }
        }

        let exclusive = [
            (ProcTags::INLINE, ProcTags::NO_INLINE, "inline", "no_inline"),
            (ProcTags::BOUNDS_CHECK, ProcTags::NO_BOUNDS_CHECK, "bounds_check", "no_bounds_check"),
        ];
        for &(a, b, a_name, b_name) in &exclusive {
            if tags.contains(a | b) {
                let msg = format!("You cannot apply both `{}` and `{}` to a procedure", a_name, b_name);
                self.error(pd.ty.pos, msg);
            }
        }
        if is_foreign && is_link_name {
            self.error(pd.ty.pos, "You cannot apply both `foreign` and `link_name` to a procedure");
        } else if is_foreign && is_export {
            self.error(pd.ty.pos, "You cannot apply both `foreign` and `export` to a procedure");
        }

        match &pd.body {
            Some(body) => {
                if is_foreign {
                    self.error(body.pos, "A procedure tagged as `#foreign` cannot have a body");
                }

                self.check_procedure_later(ProcedureInfo {
                    file: self.context.file,
                    decl: self.context.decl,
                    scope,
                    ty,
                    body: &**body,
                    tags,
                });
            },
            None if !is_foreign => {
                self.error(pd.name.pos, "Only a procedure tagged as `#foreign` can have no body");
            },
            None => {},
        }

        if is_foreign {
            let name = pd.foreign_name.clone().unwrap_or_else(|| pd.name.name.clone());
            let library = pd.foreign_library.as_ref().and_then(|lib| self.resolve_foreign_library(lib));

            if let EntityKind::Procedure {
                foreign_library,
                foreign_name,
                ..
            } = &mut self.entity_mut(e).kind
            {
                *foreign_library = library;
                *foreign_name = Some(name.clone());
            }

            match self.info.foreign_procs.get(&name) {
                Some(&other) => {
                    let other_ty = self.entity(other).ty.unwrap_or(TypeId::INVALID);
                    if !self.are_signatures_similar_enough(ty, other_ty) {
                        let other_pos = self.entity(other).pos;
                        self.info.diagnostics.error_with_note(
                            pd.name.pos,
                            format!("Redeclaration of #foreign procedure `{}` with different type signatures", name),
                            other_pos,
                            "other declaration",
                        );
                    }
                },
                None => {
                    self.info.foreign_procs.insert(name, e);
                },
            }
        } else if is_link_name || is_export {
            let name = match (&pd.link_name, is_link_name) {
                (Some(link_name), true) => link_name.clone(),
                _ => pd.name.name.clone(),
            };

            if let EntityKind::Procedure { link_name, .. } = &mut self.entity_mut(e).kind {
                *link_name = Some(name.clone());
            }

            match self.info.foreign_procs.get(&name) {
                Some(&other) => {
                    let other_pos = self.entity(other).pos;
                    self.info.diagnostics.error_with_note(
                        pd.name.pos,
                        format!("Non unique linking name for procedure `{}`", name),
                        other_pos,
                        "other declaration",
                    );
                },
                None => {
                    self.info.foreign_procs.insert(name, e);
                },
            }
        }
    }

    fn resolve_foreign_library(&mut self, lib: &'a Ident) -> Option<EntityId> {
        let found = match self.info.lookup_entity(self.context.scope, &lib.name) {
            Some(found) => found,
            None => {
                self.error(lib.pos, format!("Undeclared name: {}", lib.name));
                return None;
            },
        };

        if let EntityKind::LibraryName { used, .. } = &mut self.entity_mut(found).kind {
            *used = true;
        } else {
            self.error(lib.pos, format!("`{}` is not a library name", lib.name));
            return None;
        }

        self.add_entity_use(lib.id, found);
        Some(found)
    }

    /// Foreign declarations of the same symbol may disagree on pointer
    /// types.
    fn are_signatures_similar_enough(&self, a: TypeId, b: TypeId) -> bool {
        let types = self.types();
        let (a, b) = match (types.proc_type(a), types.proc_type(b)) {
            (Some(a), Some(b)) => (a, b),
            _ => return false,
        };

        let similar = |x: TypeId, y: TypeId| {
            let (x, y) = (types.tuple(x).unwrap_or(&[]), types.tuple(y).unwrap_or(&[]));
            x.len() == y.len()
                && x.iter().zip(y).all(|(fx, fy)| {
                    let (tx, ty) = (types.base_type(fx.ty), types.base_type(fy.ty));
                    (types.is_pointer(tx) && types.is_pointer(ty)) || types.are_types_identical(tx, ty)
                })
        };

        similar(a.params, b.params) && similar(a.results, b.results)
    }

    /// Reports declarations whose names and values do not line up. A
    /// single value may initialize several variables when it is a call.
    pub(super) fn check_arity_match(&mut self, pos: TokenPos, names: &[Ident], ty: Option<&Expr>, values: &[Expr], is_var: bool) {
        let (lhs, rhs) = (names.len(), values.len());

        if rhs == 0 {
            if ty.is_none() {
                self.error(pos, "Missing type or initial expression");
            }
        } else if lhs < rhs {
            self.error(values[lhs].pos, "Extra initial expression");
        } else if lhs > rhs && (rhs != 1 || !is_var) {
            let name = &names[rhs];
            self.error(name.pos, format!("Missing expression for `{}`", name.name));
        }
    }

    // Collection

    /// Creates entities for the top-level declarations of one file without
    /// checking anything. Imports and foreign libraries wait until every
    /// file has been collected.
    pub(super) fn collect_entities(&mut self, scope: ScopeId, file: FileId, stmts: &'a [Stmt]) {
        for stmt in stmts {
            let decl = match &stmt.kind {
                StmtKind::Decl(decl) => decl,
                StmtKind::Empty => continue,
                _ => {
                    self.error(stmt.pos, "Only declarations are allowed at file scope");
                    continue;
                },
            };

            match decl {
                Decl::Import(import) => self.delayed_imports.push(DelayedImport {
                    scope,
                    pos: stmt.pos,
                    decl: import,
                }),

                Decl::ForeignLibrary(library) => self.delayed_libraries.push(DelayedLibrary {
                    scope,
                    pos: stmt.pos,
                    file,
                    decl: library,
                }),

                Decl::Const { names, ty, values } => {
                    for (i, name) in names.iter().enumerate() {
                        let kind = EntityKind::Constant(ExactValue::Integer(i as i128));
                        let e = Entity::new(kind, &name.name, name.pos, Some(scope), None).with_identifier(name.id);
                        let e = self.info.add_entity_raw(e);

                        let mut d = DeclInfo::new(scope, file);
                        d.entities.push(e);
                        d.type_expr = ty.as_ref();
                        d.init_exprs.extend(values.get(i));
                        let d = self.info.add_decl(d);
                        self.add_entity_and_decl_info(name, e, d);
                    }

                    self.check_arity_match(stmt.pos, names, ty.as_ref(), values, false);
                },

                Decl::Var {
                    names,
                    ty,
                    values,
                    is_using,
                } => {
                    if *is_using {
                        self.error(stmt.pos, "`using` is not allowed on a variable at file scope");
                    }

                    let entities: Vec<EntityId> = names
                        .iter()
                        .map(|name| {
                            let e = Entity::variable(&name.name, name.pos, Some(scope), None).with_identifier(name.id);
                            self.info.add_entity_raw(e)
                        })
                        .collect();

                    // With values, the names share one declaration so that
                    // `a, b := f()` is checked once.
                    let shared = if values.is_empty() {
                        None
                    } else {
                        let mut d = DeclInfo::new(scope, file);
                        d.entities = entities.clone();
                        d.type_expr = ty.as_ref();
                        d.init_exprs = values.iter().collect();
                        Some(self.info.add_decl(d))
                    };

                    for (name, &e) in names.iter().zip(&entities) {
                        let d = match shared {
                            Some(d) => d,
                            None => {
                                let mut d = DeclInfo::new(scope, file);
                                d.entities.push(e);
                                d.type_expr = ty.as_ref();
                                self.info.add_decl(d)
                            },
                        };
                        self.add_entity_and_decl_info(name, e, d);
                    }

                    self.check_arity_match(stmt.pos, names, ty.as_ref(), values, true);
                },

                Decl::Type { name, ty } => {
                    let e = Entity::new(EntityKind::TypeName, &name.name, name.pos, Some(scope), None)
                        .with_identifier(name.id);
                    let e = self.info.add_entity_raw(e);

                    let mut d = DeclInfo::new(scope, file);
                    d.entities.push(e);
                    d.type_expr = Some(ty);
                    let d = self.info.add_decl(d);
                    self.add_entity_and_decl_info(name, e, d);
                },

                Decl::Proc(pd) => {
                    let kind = EntityKind::Procedure {
                        tags: pd.tags,
                        foreign_library: None,
                        foreign_name: None,
                        link_name: None,
                    };
                    let e = Entity::new(kind, &pd.name.name, pd.name.pos, Some(scope), None)
                        .with_identifier(pd.name.id);
                    let e = self.info.add_entity_raw(e);

                    let mut d = DeclInfo::new(scope, file);
                    d.entities.push(e);
                    d.proc_decl = Some(pd);
                    let d = self.info.add_decl(d);
                    self.add_entity_and_decl_info(&pd.name, e, d);
                },
            }
        }
    }

    /// Evaluates an optional `when` condition in `scope`. `false` skips the
    /// declaration.
    fn check_when_condition(&mut self, scope: ScopeId, cond: Option<&'a Expr>) -> bool {
        let cond = match cond {
            Some(cond) => cond,
            None => return true,
        };

        let prev = self.context.clone();
        self.context.scope = scope;
        self.context.decl = None;
        if let Some(file) = self.info.scope(scope).file {
            self.context.file = file;
        }
        let o = self.check_expr(cond);
        self.context = prev;

        if o.is_invalid() {
            return false;
        }
        if !o.is_constant() || !self.types().is_boolean(o.ty) {
            self.error(cond.pos, "Non-constant boolean `when` condition");
            return false;
        }

        o.value.as_bool().unwrap_or(false)
    }

    pub(super) fn resolve_imports(&mut self) {
        let program = self.info.program;

        for import in std::mem::take(&mut self.delayed_imports) {
            let DelayedImport { scope: parent, pos, decl } = import;

            let target = program
                .files
                .iter()
                .find(|f| f.fullpath == decl.fullpath)
                .and_then(|f| self.info.file_scope(f.id));
            let target = match target {
                Some(target) => target,
                None => {
                    self.error(pos, format!("Unable to find the file `{}` to import", decl.fullpath));
                    continue;
                },
            };

            if self.info.scope(target).is_global() {
                self.error(pos, "Importing a #shared_global_scope is disallowed and unnecessary");
                continue;
            }

            if !self.check_when_condition(parent, decl.cond.as_ref()) {
                continue;
            }

            if self.info.scope(parent).imported.contains(&target) {
                self.warning(pos, "Multiple #import of the same file within this scope");
            } else {
                self.info.scope_mut(parent).imported.push(target);
            }

            odin_log::trace!("import `{}` into {}", decl.fullpath, parent);

            if decl.is_dot() || decl.is_load {
                let sc = self.info.scope(target);
                let exported: Vec<(String, EntityId)> = sc
                    .elements
                    .iter()
                    .filter(|(name, e)| sc.implicit.get(*name) != Some(*e))
                    .map(|(name, &e)| (name.clone(), e))
                    .collect();

                for (name, e) in exported {
                    if self.entity(e).scope == Some(parent) {
                        continue;
                    }

                    self.add_entity(parent, None, e);
                    // `#import .` entities are not re-exported; `#load`
                    // ones are.
                    if !decl.is_load {
                        self.info.scope_mut(parent).implicit.insert(name, e);
                    }
                }
                continue;
            }

            let (name, name_pos, ident) = match &decl.name {
                Some(ident) => (ident.name.clone(), ident.pos, Some(ident)),
                None => {
                    let stem = file_stem(&decl.fullpath);
                    if !is_identifier(stem) {
                        let msg = format!(
                            "File name, {}, cannot be used as an import name as it is not a valid identifier",
                            stem
                        );
                        self.error(pos, msg);
                        continue;
                    }
                    (stem.to_owned(), pos, None)
                },
            };

            let kind = EntityKind::ImportName {
                path: decl.fullpath.clone(),
                name: name.clone(),
                scope: target,
                used: false,
            };
            let mut entity = Entity::new(kind, name, name_pos, Some(parent), Some(TypeId::INVALID));
            if let Some(ident) = ident {
                entity = entity.with_identifier(ident.id);
            }
            let e = self.info.add_entity_raw(entity);
            self.add_entity(parent, ident, e);
        }
    }

    pub(super) fn resolve_foreign_libraries(&mut self) {
        let program = self.info.program;

        for library in std::mem::take(&mut self.delayed_libraries) {
            let DelayedLibrary {
                scope: parent,
                pos,
                file,
                decl,
            } = library;

            if !self.check_when_condition(parent, decl.cond.as_ref()) {
                continue;
            }

            let is_absolute = decl.path.starts_with('/') || decl.path.contains(':');
            let path = match program.file(file) {
                Some(f) if !decl.is_system && !is_absolute => format!("{}{}", f.dir(), decl.path),
                _ => decl.path.clone(),
            };

            let (name, name_pos, ident) = match &decl.name {
                Some(ident) => (ident.name.clone(), ident.pos, Some(ident)),
                None => (file_stem(&decl.path).to_owned(), pos, None),
            };
            if ident.is_none() && !is_identifier(&name) {
                let msg = format!(
                    "File name, {}, cannot be used as a library name as it is not a valid identifier",
                    name
                );
                self.error(pos, msg);
                continue;
            }

            odin_log::trace!("foreign library `{}` as `{}`", path, name);

            let kind = EntityKind::LibraryName {
                path,
                name: name.clone(),
                used: false,
            };
            let mut entity = Entity::new(kind, name, name_pos, Some(parent), Some(TypeId::INVALID));
            if let Some(ident) = ident {
                entity = entity.with_identifier(ident.id);
            }
            let e = self.info.add_entity_raw(entity);
            self.add_entity(parent, ident, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::is_identifier;

    #[test]
    fn identifiers() {
        assert!(is_identifier("fmt"));
        assert!(is_identifier("_os2"));
        assert!(!is_identifier("2d"));
        assert!(!is_identifier("my-lib"));
        assert!(!is_identifier(""));
    }
}
