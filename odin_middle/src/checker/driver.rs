//! The passes over a whole program.

use indexmap::IndexSet;
use std::collections::HashSet;

use odin_types::{BasicKind, BuildContext, EntityId, LayoutError, TypeId};

use super::{
    entity::{Entity, EntityKind, ImplicitValueId},
    Checker, CheckerInfo, CompilerError, ScopeFlags,
};
use crate::ast::{Program, TokenPos};

/// Checks every file of `program`.
///
/// Problems in the program end up in [`CheckerInfo::diagnostics`]; an
/// `Err` means the runtime support declarations are missing or malformed,
/// or the checker broke one of its own invariants.
pub fn check_parsed_files(program: &Program, ctx: BuildContext) -> Result<CheckerInfo<'_>, CompilerError> {
    let mut c = Checker::new(program, ctx);

    c.create_file_scopes(program);
    for file in &program.files {
        if let Some(scope) = c.info.file_scope(file.id) {
            c.collect_entities(scope, file.id, &file.decls);
        }
    }
    odin_log::trace!("collected {} package-level entities", c.info.entities.len());

    c.resolve_imports();
    c.resolve_foreign_libraries();

    c.check_all_global_entities();
    c.init_preload();
    c.take_fatal()?;

    c.check_proc_bodies();
    c.take_fatal()?;

    c.finish_untyped()?;

    for kind in BasicKind::iter() {
        let ty = TypeId::basic(kind);
        if c.types().size_of(&c.info.ctx, ty) > 0 {
            c.add_type_info_type(ty);
        }
    }
    let expr_types: Vec<TypeId> = c.info.types.values().map(|tv| tv.ty).collect();
    for ty in expr_types {
        c.add_type_info_type(ty);
    }

    c.check_type_cycles();
    c.find_entry_point(program);

    c.info.min_dep_map = generate_minimum_dependency_map(&c.info, c.info.entry_point);
    odin_log::trace!("minimum dependency set has {} entities", c.info.min_dep_map.len());
    c.collect_foreign_libraries();

    Ok(c.info)
}

impl<'a> Checker<'a> {
    fn create_file_scopes(&mut self, program: &Program) {
        let global = self.info.global_scope;

        for file in &program.files {
            let mut flags = ScopeFlags::FILE;
            if file.id == program.init_file {
                flags |= ScopeFlags::INIT;
            }
            if file.is_shared_global_scope {
                flags |= ScopeFlags::GLOBAL;
            }

            let scope = self.info.make_scope(Some(global), flags);
            self.info.scope_mut(scope).file = Some(file.id);
            if file.is_shared_global_scope {
                self.info.scope_mut(global).shared.push(scope);
            }
            if file.id == program.init_file {
                self.info.init_scope = Some(scope);
            }
            self.info.file_scopes.push(scope);
        }
    }

    fn check_all_global_entities(&mut self) {
        let entries: Vec<_> = self.info.entities.iter().map(|(&e, &d)| (e, d)).collect();

        for (e, d) in entries {
            let decl_scope = self.info.decl(d).scope;
            let entity = self.entity(e);
            // Entities brought in by `import .` are checked from their own
            // file.
            if entity.scope != Some(decl_scope) {
                continue;
            }

            let scope = self.info.scope(decl_scope);
            let is_init = scope.is_init();
            let reserved = entity.name == "main"
                && ((is_init && !entity.is_procedure()) || (scope.is_global() && !is_init));
            if reserved {
                let pos = entity.pos;
                self.error(pos, "`main` is reserved as the entry point procedure in the initial scope");
                continue;
            }

            self.check_entity_decl(e);

            if is_init && !self.done_preload {
                self.init_preload();
            }
        }
    }

    /// Looks up a type the runtime support file must declare.
    fn find_core_type(&mut self, name: &'static str) -> Option<TypeId> {
        let global = self.info.global_scope;
        let e = match self.info.current_scope_lookup_entity(global, name) {
            Some(e) if self.entity(e).is_type_name() => e,
            _ => {
                self.set_fatal(CompilerError::MissingPreload(name));
                return None;
            },
        };

        self.check_entity_decl(e);
        self.entity(e).ty
    }

    /// Finds `Type_Info`, `Allocator` and `Context`, then declares the
    /// implicit `context` value. Runs once, as soon as any of them is
    /// needed.
    pub(super) fn init_preload(&mut self) {
        if self.done_preload {
            return;
        }
        self.done_preload = true;

        if let Some(type_info) = self.find_core_type("Type_Info") {
            if !self.types().is_union(type_info) {
                let got = self.type_str(type_info);
                self.set_fatal(CompilerError::InvalidPreload("Type_Info", got));
                return;
            }
            self.types_mut().well_known.type_info = Some(type_info);
        }
        let member = self.find_core_type("Type_Info_Member");
        self.types_mut().well_known.type_info_member = member;
        let allocator = self.find_core_type("Allocator");
        self.types_mut().well_known.allocator = allocator;
        let context = self.find_core_type("Context");
        self.types_mut().well_known.context = context;

        let id = ImplicitValueId::Context;
        let global = self.info.global_scope;
        let backing = match self.info.current_scope_lookup_entity(global, id.backing_name()) {
            Some(backing) if self.entity(backing).is_variable() => backing,
            _ => {
                self.set_fatal(CompilerError::MissingImplicitBacking(id.name(), id.backing_name()));
                return;
            },
        };

        let kind = EntityKind::ImplicitValue {
            id,
            backing: Some(backing),
        };
        let universal = self.info.universal_scope;
        let value = Entity::new(kind, id.name(), TokenPos::default(), Some(universal), context);
        let value = self.info.add_entity_raw(value);
        self.info.insert_entity(universal, value);
        self.info.implicit_values.insert(id, value);
    }

    /// Checks queued procedure bodies. Bodies of nested procedure literals
    /// join the queue while it drains.
    fn check_proc_bodies(&mut self) {
        let mut count = 0;
        while let Some(pi) = self.procs.pop_front() {
            self.check_proc_body(&pi);
            count += 1;
        }
        odin_log::trace!("checked {} procedure bodies", count);
    }

    /// Records the final type of every expression that stayed untyped.
    fn finish_untyped(&mut self) -> Result<(), CompilerError> {
        let untyped = std::mem::take(&mut self.info.untyped);

        for (node, info) in untyped {
            if self.types().is_typed(info.ty) {
                return Err(CompilerError::TypedUntyped(node, self.type_str(info.ty)));
            }

            let ty = self.types().default_type(info.ty);
            self.add_type_and_value(node, info.mode, ty, info.value);
        }

        Ok(())
    }

    fn check_type_cycles(&mut self) {
        let type_names: Vec<(EntityId, TypeId)> = self
            .info
            .entities
            .keys()
            .filter(|&&e| self.entity(e).is_type_name())
            .filter_map(|&e| self.entity(e).ty.map(|ty| (e, ty)))
            .collect();
        let mut reported = HashSet::new();

        for (e, ty) in type_names {
            let cycle = match self.types().check_layout(&self.info.ctx, ty) {
                Ok(()) => continue,
                Err(LayoutError::Cycle(cycle)) => cycle,
            };
            if cycle.iter().any(|t| reported.contains(t)) {
                continue;
            }
            reported.extend(cycle.iter().copied());

            let name_of = |t: TypeId| self.types().type_to_string(t);
            let pos_of = |t: TypeId| {
                self.types()
                    .named_entity(t)
                    .map_or_else(|| self.entity(e).pos, |n| self.entity(n).pos)
            };

            let first = cycle.first().copied().unwrap_or(ty);
            let msg = format!("Illegal declaration cycle of `{}`", name_of(first));
            let notes = cycle
                .windows(2)
                .map(|edge| (pos_of(edge[0]), format!("`{}` refers to `{}`", name_of(edge[0]), name_of(edge[1]))))
                .collect();
            let pos = pos_of(first);
            self.info.diagnostics.error_with_notes(pos, msg, notes);
        }
    }

    fn find_entry_point(&mut self, program: &Program) {
        let main = self
            .info
            .init_scope
            .and_then(|init| self.info.scope(init).elements.get("main").copied())
            .filter(|&e| self.entity(e).is_procedure());

        match main {
            Some(main) => self.info.entry_point = Some(main),
            None => {
                let pos = TokenPos::new(program.init_file, 1, 1, 0);
                self.error(pos, "Undefined entry point procedure `main`");
            },
        }
    }

    fn collect_foreign_libraries(&mut self) {
        let libraries: Vec<EntityId> = self
            .info
            .min_dep_map
            .iter()
            .filter_map(|&e| match self.entity(e).kind {
                EntityKind::Procedure {
                    foreign_library: Some(lib),
                    ..
                } => Some(lib),
                _ => None,
            })
            .collect();

        for lib in libraries {
            if let EntityKind::LibraryName { path, .. } = &self.entity(lib).kind {
                if !self.info.foreign_libraries.contains(path) {
                    let path = path.clone();
                    self.info.foreign_libraries.push(path);
                }
            }
        }
    }
}

/// Depth-first, in declaration order of each entity's dependencies.
fn add_dependency_to_map(info: &CheckerInfo<'_>, map: &mut IndexSet<EntityId>, e: EntityId) {
    let mut stack = vec![e];
    while let Some(e) = stack.pop() {
        if !map.insert(e) {
            continue;
        }
        if let Some(decl) = info.decl_of(e) {
            let deps = &info.decl(decl).deps;
            stack.extend(deps.iter().rev().filter(|dep| !map.contains(*dep)));
        }
    }
}

/// Every entity reachable from `start` and from the entities of shared
/// global files, whose initializers always run.
pub fn generate_minimum_dependency_map(info: &CheckerInfo<'_>, start: Option<EntityId>) -> IndexSet<EntityId> {
    let mut map = IndexSet::new();

    let globals = info
        .entities
        .keys()
        .copied()
        .filter(|&e| info.entity(e).scope.map_or(false, |s| info.scope(s).is_global()));
    for e in globals.chain(start) {
        add_dependency_to_map(info, &mut map, e);
    }

    map
}
