use bitflags::bitflags;
use indexmap::IndexMap;
use std::fmt;

use odin_types::EntityId;

use super::{entity::Entity, entity::EntityKind, CheckerInfo};
use crate::ast::FileId;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ScopeId(u32);

impl ScopeId {
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

bitflags! {
    pub struct ScopeFlags: u8 {
        const PROC = 1 << 0;
        const GLOBAL = 1 << 1;
        const FILE = 1 << 2;
        const INIT = 1 << 3;
    }
}

#[derive(Clone, Debug, Default)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    pub elements: IndexMap<String, EntityId>,
    /// Entities brought in by `import .`; they are not re-exported.
    pub implicit: IndexMap<String, EntityId>,
    /// Scopes searched, without their parents, after this one.
    pub shared: Vec<ScopeId>,
    pub imported: Vec<ScopeId>,
    pub flags: ScopeFlags,
    pub file: Option<FileId>,
}

impl Default for ScopeFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl Scope {
    pub fn is_proc(&self) -> bool {
        self.flags.contains(ScopeFlags::PROC)
    }

    pub fn is_file(&self) -> bool {
        self.flags.contains(ScopeFlags::FILE)
    }

    pub fn is_global(&self) -> bool {
        self.flags.contains(ScopeFlags::GLOBAL)
    }

    pub fn is_init(&self) -> bool {
        self.flags.contains(ScopeFlags::INIT)
    }
}

impl<'a> CheckerInfo<'a> {
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.arena.scopes[id.index()]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.arena.scopes[id.index()]
    }

    pub fn make_scope(&mut self, parent: Option<ScopeId>, flags: ScopeFlags) -> ScopeId {
        let id = ScopeId::new(self.arena.scopes.len());
        let file = parent.and_then(|p| self.scope(p).file);
        self.arena.scopes.push(Scope {
            parent,
            flags,
            file,
            ..Scope::default()
        });

        if let Some(parent) = parent {
            self.scope_mut(parent).children.push(id);
        }
        id
    }

    /// Locals of an enclosing procedure are invisible once the walk has
    /// left a procedure scope; file and global variables stay visible.
    fn hidden_by_proc(&self, entity: &Entity) -> bool {
        if !entity.is_variable() {
            return false;
        }

        match entity.scope {
            Some(owner) => {
                let owner = self.scope(owner);
                !owner.is_file() && !owner.is_global()
            },
            None => true,
        }
    }

    /// Walks from `scope` outwards looking for `name`.
    pub fn lookup_parent_entity(&self, scope: ScopeId, name: &str) -> Option<(ScopeId, EntityId)> {
        let mut gone_thru_proc = false;
        let mut gone_thru_file = false;
        let mut curr = Some(scope);

        while let Some(s) = curr {
            let sc = self.scope(s);

            if let Some(&found) = sc.elements.get(name) {
                if !(gone_thru_proc && self.hidden_by_proc(self.entity(found))) {
                    return Some((s, found));
                }
            }

            if sc.is_proc() {
                gone_thru_proc = true;
            } else {
                for &shared in &sc.shared {
                    let found = match self.scope(shared).elements.get(name) {
                        Some(&found) => found,
                        None => continue,
                    };
                    let e = self.entity(found);

                    if self.hidden_by_proc(e) {
                        continue;
                    }
                    // Only entities the shared scope owns; no re-exports.
                    if e.scope != Some(shared) {
                        continue;
                    }
                    if matches!(e.kind, EntityKind::ImportName { .. }) && gone_thru_file {
                        continue;
                    }

                    return Some((shared, found));
                }
            }

            if sc.is_file() {
                gone_thru_file = true;
            }
            curr = sc.parent;
        }

        None
    }

    pub fn lookup_entity(&self, scope: ScopeId, name: &str) -> Option<EntityId> {
        self.lookup_parent_entity(scope, name).map(|(_, e)| e)
    }

    /// Looks in `scope` and its shared scopes only.
    pub fn current_scope_lookup_entity(&self, scope: ScopeId, name: &str) -> Option<EntityId> {
        let sc = self.scope(scope);
        if let Some(&found) = sc.elements.get(name) {
            return Some(found);
        }

        sc.shared
            .iter()
            .find_map(|&shared| self.scope(shared).elements.get(name).copied())
    }

    /// Inserts `entity` under its name unless the name is taken, in which
    /// case the entity already there is returned and nothing changes.
    pub fn insert_entity(&mut self, scope: ScopeId, entity: EntityId) -> Option<EntityId> {
        let name = self.entity(entity).name.clone();
        if let Some(&prior) = self.scope(scope).elements.get(&name) {
            return Some(prior);
        }

        self.scope_mut(scope).elements.insert(name, entity);
        let e = self.entity_mut(entity);
        if e.scope.is_none() {
            e.scope = Some(scope);
        }
        None
    }

    /// The procedure scope enclosing `scope`, if any.
    pub fn enclosing_proc_scope(&self, scope: ScopeId) -> Option<ScopeId> {
        let mut curr = Some(scope);
        while let Some(s) = curr {
            if self.scope(s).is_proc() {
                return Some(s);
            }
            curr = self.scope(s).parent;
        }
        None
    }
}
