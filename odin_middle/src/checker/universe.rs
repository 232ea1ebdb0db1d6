//! The scope every other scope descends from.

use odin_types::{basic::BASIC_ALIASES, BasicKind, ExactValue, TypeId};

use super::{
    entity::{BuiltinId, Entity, EntityKind},
    CheckerInfo,
};
use crate::ast::TokenPos;

/// Declared in the universal scope; only meaningful inside a constant
/// declaration.
pub(super) const IOTA: &str = "iota";

fn add_global_entity(info: &mut CheckerInfo<'_>, entity: Entity) {
    let scope = info.universal_scope;
    let id = info.add_entity_raw(entity);
    if info.insert_entity(scope, id).is_some() {
        odin_log::warning!("universal scope already declares `{}`", info.entity(id).name);
    }
}

fn add_global_constant(info: &mut CheckerInfo<'_>, name: &str, ty: TypeId, value: ExactValue) {
    let e = Entity::new(EntityKind::Constant(value), name, TokenPos::default(), None, Some(ty));
    add_global_entity(info, e);
}

pub(super) fn init_universal_scope(info: &mut CheckerInfo<'_>) {
    for kind in BasicKind::iter() {
        if kind == BasicKind::Invalid || kind.is_untyped() {
            continue;
        }

        let e = Entity::new(EntityKind::TypeName, kind.name(), TokenPos::default(), None, Some(TypeId::basic(kind)));
        add_global_entity(info, e);
    }

    for &(alias, kind) in BASIC_ALIASES.iter() {
        let e = Entity::new(EntityKind::TypeName, alias, TokenPos::default(), None, Some(TypeId::basic(kind)));
        add_global_entity(info, e);
    }

    add_global_constant(info, "true", TypeId::UNTYPED_BOOL, ExactValue::Bool(true));
    add_global_constant(info, "false", TypeId::UNTYPED_BOOL, ExactValue::Bool(false));
    add_global_entity(
        info,
        Entity::new(EntityKind::Nil, "nil", TokenPos::default(), None, Some(TypeId::UNTYPED_NIL)),
    );

    let target = [
        ("ODIN_OS", info.ctx.os.clone()),
        ("ODIN_ARCH", info.ctx.arch.clone()),
        ("ODIN_VENDOR", info.ctx.vendor.clone()),
        ("ODIN_VERSION", info.ctx.version.clone()),
        ("ODIN_ROOT", info.ctx.root.clone()),
    ];
    for (name, value) in target.iter() {
        add_global_constant(info, name, TypeId::UNTYPED_STRING, ExactValue::String(value.clone()));
    }

    // Its value comes from the enclosing constant declaration.
    add_global_constant(info, IOTA, TypeId::UNTYPED_INTEGER, ExactValue::Integer(0));

    for id in BuiltinId::iter() {
        let e = Entity::new(EntityKind::Builtin(id), id.name(), TokenPos::default(), None, Some(TypeId::INVALID));
        add_global_entity(info, e);
    }

    odin_log::trace!(
        "universal scope has {} entities",
        info.scope(info.universal_scope).elements.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::AstBuilder;
    use odin_types::BuildContext;

    #[test]
    fn universe_contents() {
        let b = AstBuilder::new();
        let program = b.single_file(vec![]);
        let mut info = CheckerInfo::new(&program, BuildContext::default());
        init_universal_scope(&mut info);

        let u = info.universal_scope;
        let lookup = |name: &str| info.current_scope_lookup_entity(u, name).map(|e| info.entity(e));

        assert_eq!(lookup("byte").and_then(|e| e.ty), Some(TypeId::U8));
        assert_eq!(lookup("rune").and_then(|e| e.ty), Some(TypeId::I32));
        assert_eq!(lookup("int").and_then(|e| e.ty), Some(TypeId::INT));
        assert!(lookup("invalid").is_none());
        assert_eq!(
            lookup("true").and_then(Entity::constant_value),
            Some(&ExactValue::Bool(true))
        );
        assert_eq!(
            lookup("ODIN_OS").and_then(Entity::constant_value),
            Some(&ExactValue::String("linux".to_owned()))
        );
        assert!(matches!(lookup("nil").map(|e| &e.kind), Some(EntityKind::Nil)));
        assert!(matches!(
            lookup("swizzle").map(|e| &e.kind),
            Some(EntityKind::Builtin(BuiltinId::Swizzle))
        ));
    }
}
