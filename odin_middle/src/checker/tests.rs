use proptest::prelude::*;

use odin_types::{BinaryOp, ExactValue, TypeId};

use super::{Entity, EntityId};
use crate::{
    ast::{build::AstBuilder, BranchKind, CastKind, ProcTags, StmtStateFlags},
    checker::CheckerInfo,
    test_support::{check, error_messages, main_proc, program_with, runtime_prelude, warning_messages},
};

fn entity_named<'i>(info: &'i CheckerInfo<'_>, name: &str) -> &'i Entity {
    info.definitions
        .values()
        .map(|&e| info.entity(e))
        .find(|e| e.name == name)
        .unwrap_or_else(|| panic!("no entity named `{}`", name))
}

fn init_entity(info: &CheckerInfo<'_>, name: &str) -> Option<EntityId> {
    let init = info.init_scope?;
    info.scope(init).elements.get(name).copied()
}

fn assert_error(info: &CheckerInfo<'_>, needle: &str) {
    let errors = error_messages(info);
    assert!(
        errors.iter().any(|e| e.contains(needle)),
        "expected an error containing {:?}, got {:#?}",
        needle,
        errors
    );
}

fn assert_no_errors(info: &CheckerInfo<'_>) {
    let errors = error_messages(info);
    assert!(errors.is_empty(), "unexpected errors: {:#?}", errors);
}

#[test]
fn prelude_alone_checks() {
    let program = program_with(|b| vec![main_proc(b, vec![])]);
    let info = check(&program);

    assert_no_errors(&info);
    assert!(info.entry_point.is_some());
    assert!(info.arena.types.well_known.type_info.is_some());
    assert!(info.arena.types.well_known.context.is_some());
    assert_eq!(info.implicit_values.len(), 1);
}

#[test]
fn typed_and_defaulted_locals() {
    let program = program_with(|b| {
        vec![main_proc(
            b,
            vec![
                b.var(&["x"], Some(b.ident("int")), vec![b.int(5)]),
                b.var(&["y"], None, vec![b.binary(BinaryOp::Add, b.ident("x"), b.int(2))]),
                b.assign(vec![b.ident("_")], vec![b.ident("y")]),
            ],
        )]
    });
    let info = check(&program);

    assert_no_errors(&info);
    assert_eq!(entity_named(&info, "x").ty, Some(TypeId::INT));
    assert_eq!(entity_named(&info, "y").ty, Some(TypeId::INT));
}

#[test]
fn constant_index_past_the_end_still_checks() {
    let program = program_with(|b| {
        vec![main_proc(
            b,
            vec![
                b.var(&["a"], Some(b.array_type(b.int(5), b.ident("int"))), vec![]),
                b.var(&["e"], None, vec![b.index(b.ident("a"), b.int(10))]),
                b.assign(vec![b.ident("_")], vec![b.ident("e")]),
            ],
        )]
    });
    let info = check(&program);

    assert_no_errors(&info);
    assert_eq!(entity_named(&info, "e").ty, Some(TypeId::INT));
}

#[test]
fn same_shape_different_names() {
    let b = AstBuilder::new();
    let runtime = b.shared_file("core/runtime.odin");
    let prelude = runtime_prelude(&b);
    b.set_decls(runtime, prelude);

    let shapes = b.shared_file("shapes.odin");
    let decls = vec![b.type_decl("B", b.struct_type(vec![b.field(&["x"], b.ident("int"))]))];
    b.set_decls(shapes, decls);

    let main = b.file("main.odin");
    let decls = vec![
        b.type_decl("A", b.struct_type(vec![b.field(&["x"], b.ident("int"))])),
        main_proc(
            &b,
            vec![
                b.assign(vec![b.ident("_")], vec![b.call(b.ident("type_info"), vec![b.ident("A")])]),
                b.assign(vec![b.ident("_")], vec![b.call(b.ident("type_info"), vec![b.ident("B")])]),
            ],
        ),
    ];
    b.set_decls(main, decls);
    let program = b.finish(main);
    let info = check(&program);

    assert_no_errors(&info);
    let a = entity_named(&info, "A").ty.unwrap_or(TypeId::INVALID);
    let bt = entity_named(&info, "B").ty.unwrap_or(TypeId::INVALID);
    let types = &info.arena.types;
    assert!(types.are_types_identical(a, a));
    assert!(!types.are_types_identical(a, bt));

    let a_slot = info.type_info_index(a);
    let b_slot = info.type_info_index(bt);
    assert!(a_slot.is_some() && b_slot.is_some());
    assert_ne!(a_slot, b_slot);
}

#[test]
fn identical_anonymous_types_share_a_slot() {
    let mut ids = Vec::new();
    let program = program_with(|b| {
        let first = b.struct_type(vec![b.field(&["x"], b.ident("int"))]);
        let second = b.struct_type(vec![b.field(&["x"], b.ident("int"))]);
        ids.push(first.id);
        ids.push(second.id);
        vec![main_proc(
            b,
            vec![
                b.assign(vec![b.ident("_")], vec![b.call(b.ident("type_info"), vec![first])]),
                b.assign(vec![b.ident("_")], vec![b.call(b.ident("type_info"), vec![second])]),
            ],
        )]
    });
    let info = check(&program);
    assert_no_errors(&info);

    let first = info.type_of_expr(ids[0]).unwrap_or(TypeId::INVALID);
    let second = info.type_of_expr(ids[1]).unwrap_or(TypeId::INVALID);
    assert_ne!(first, second);
    assert_eq!(info.type_info_index(first), info.type_info_index(second));
    assert!(info.type_info_index(first).is_some());
}

#[test]
fn untyped_nil_variable() {
    let program = program_with(|b| vec![main_proc(b, vec![b.var(&["x"], None, vec![b.ident("nil")])])]);
    let info = check(&program);

    assert_error(&info, "untyped nil");
    assert_eq!(entity_named(&info, "x").ty, Some(TypeId::INVALID));
}

#[test]
fn constants_must_fit_their_type() {
    let program = program_with(|b| {
        vec![main_proc(
            b,
            vec![
                b.var(&["small"], Some(b.ident("u8")), vec![b.int(300)]),
                b.var(&["fine"], Some(b.ident("f64")), vec![b.int(2)]),
            ],
        )]
    });
    let info = check(&program);

    assert_error(&info, "overflows `u8`");
    assert_eq!(error_messages(&info).len(), 1);
}

#[test]
fn repeated_dot_import() {
    let b = AstBuilder::new();
    let runtime = b.shared_file("core/runtime.odin");
    let prelude = runtime_prelude(&b);
    b.set_decls(runtime, prelude);

    let foo = b.file("foo.odin");
    let decls = vec![b.constant(&["foo_value"], None, vec![b.int(7)])];
    b.set_decls(foo, decls);

    let main = b.file("main.odin");
    let decls = vec![
        b.import("foo.odin", Some(".")),
        b.import("foo.odin", Some(".")),
        main_proc(
            &b,
            vec![b.assign(vec![b.ident("_")], vec![b.ident("foo_value")])],
        ),
    ];
    b.set_decls(main, decls);
    let program = b.finish(main);
    let info = check(&program);

    assert_no_errors(&info);
    assert!(warning_messages(&info)
        .iter()
        .any(|w| w.contains("Multiple #import of the same file")));
}

#[test]
fn locals_do_not_leak_into_nested_procedures() {
    let program = program_with(|b| {
        vec![
            b.var(&["global_count"], Some(b.ident("int")), vec![]),
            main_proc(
                b,
                vec![
                    b.var(&["local"], None, vec![b.int(1)]),
                    b.var(
                        &["f"],
                        None,
                        vec![b.proc_lit(
                            b.proc_type(vec![], vec![]),
                            vec![
                                b.assign(vec![b.ident("local")], vec![b.int(2)]),
                                b.assign(vec![b.ident("global_count")], vec![b.int(3)]),
                            ],
                        )],
                    ),
                    b.expr_stmt(b.call(b.ident("f"), vec![])),
                    b.assign(vec![b.ident("_")], vec![b.ident("local")]),
                ],
            ),
        ]
    });
    let info = check(&program);

    assert_eq!(error_messages(&info), vec!["Undeclared name: local".to_owned()]);
}

#[test]
fn declaration_cycle() {
    let program = program_with(|b| {
        vec![
            b.type_decl("A", b.struct_type(vec![b.field(&["b"], b.ident("B"))])),
            b.type_decl("B", b.struct_type(vec![b.field(&["a"], b.ident("A"))])),
            main_proc(b, vec![]),
        ]
    });
    let info = check(&program);

    let cycle = info
        .diagnostics
        .errors()
        .find(|d| d.message.starts_with("Illegal declaration cycle of"))
        .unwrap_or_else(|| panic!("no cycle error in {:#?}", error_messages(&info)));
    assert_eq!(cycle.notes.len(), 2);
    assert!(cycle.notes[0].message.contains("refers to"));
}

#[test]
fn pointer_indirection_breaks_cycles() {
    let program = program_with(|b| {
        vec![
            b.type_decl(
                "Node",
                b.struct_type(vec![
                    b.field(&["value"], b.ident("int")),
                    b.field(&["next"], b.pointer_type(b.ident("Node"))),
                ]),
            ),
            main_proc(b, vec![b.var(&["n"], Some(b.ident("Node")), vec![]), b.assign(vec![b.ident("_")], vec![b.ident("n")])]),
        ]
    });
    let info = check(&program);

    assert_no_errors(&info);
}

#[test]
fn entry_point() {
    let program = program_with(|b| vec![b.var(&["main"], Some(b.ident("int")), vec![])]);
    let info = check(&program);

    assert_error(&info, "`main` is reserved as the entry point procedure in the initial scope");
    assert_error(&info, "Undefined entry point procedure `main`");
    assert!(info.entry_point.is_none());
}

#[test]
fn branch_legality() {
    let program = program_with(|b| {
        vec![main_proc(
            b,
            vec![
                b.branch(BranchKind::Break),
                b.match_stmt(
                    Some(b.int(1)),
                    vec![
                        b.case(vec![b.int(1)], vec![b.branch(BranchKind::Continue)]),
                        b.case(vec![b.int(2)], vec![b.branch(BranchKind::Fallthrough)]),
                    ],
                ),
                b.for_stmt(
                    None,
                    None,
                    None,
                    vec![b.branch(BranchKind::Continue), b.branch(BranchKind::Break)],
                ),
            ],
        )]
    });
    let info = check(&program);

    assert_eq!(
        error_messages(&info),
        vec![
            "`break` only allowed in `for` or `match` statements".to_owned(),
            "`continue` only allowed in `for` statements".to_owned(),
            "`fallthrough` statement in illegal position".to_owned(),
        ]
    );
}

#[test]
fn fallthrough_into_next_clause() {
    let program = program_with(|b| {
        vec![main_proc(
            b,
            vec![b.match_stmt(
                Some(b.int(1)),
                vec![
                    b.case(vec![b.int(1)], vec![b.branch(BranchKind::Fallthrough)]),
                    b.case(vec![], vec![]),
                ],
            )],
        )]
    });
    let info = check(&program);

    assert_no_errors(&info);
}

#[test]
fn match_clauses() {
    let program = program_with(|b| {
        vec![main_proc(
            b,
            vec![
                b.var(&["x"], None, vec![b.int(3)]),
                b.match_stmt(
                    Some(b.ident("x")),
                    vec![
                        b.case(vec![b.int(1)], vec![]),
                        b.case(vec![b.int(1)], vec![]),
                        b.case(vec![], vec![]),
                        b.case(vec![], vec![]),
                    ],
                ),
            ],
        )]
    });
    let info = check(&program);

    assert_error(&info, "Duplicate case `1`");
    assert_error(&info, "Multiple `default` clauses");
}

#[test]
fn type_match_clauses() {
    let program = program_with(|b| {
        vec![
            b.type_decl("Circle", b.struct_type(vec![b.field(&["r"], b.ident("f64"))])),
            b.type_decl("Square", b.struct_type(vec![b.field(&["side"], b.ident("f64"))])),
            b.type_decl(
                "Shape",
                b.union_type(vec![
                    b.field(&["Circle"], b.ident("Circle")),
                    b.field(&["Square"], b.ident("Square")),
                ]),
            ),
            main_proc(
                b,
                vec![
                    b.var(&["s"], Some(b.ident("Shape")), vec![]),
                    b.type_match(
                        "v",
                        b.ident("s"),
                        vec![
                            b.case(
                                vec![b.ident("Circle")],
                                vec![b.assign(vec![b.ident("_")], vec![b.selector(b.ident("v"), "r")])],
                            ),
                            b.case(vec![b.ident("int")], vec![]),
                        ],
                    ),
                    b.var(&["n"], None, vec![b.int(1)]),
                    b.type_match("w", b.ident("n"), vec![]),
                ],
            ),
        ]
    });
    let info = check(&program);

    assert_error(&info, "Unknown tag type, got `int`");
    assert_error(&info, "Invalid type for this type match expression, got `int`");

    let circle = info
        .entities
        .keys()
        .map(|&e| info.entity(e))
        .find(|e| e.name == "Circle")
        .and_then(|e| e.ty);
    assert_eq!(entity_named(&info, "v").ty, circle);
}

#[test]
fn pointer_type_match_binds_pointers() {
    let program = program_with(|b| {
        vec![
            b.type_decl("Shape", b.union_type(vec![b.field(&["Int"], b.ident("int"))])),
            main_proc(
                b,
                vec![
                    b.var(&["s"], Some(b.ident("Shape")), vec![]),
                    b.type_match(
                        "v",
                        b.address_of(b.ident("s")),
                        vec![b.case(
                            vec![b.ident("int")],
                            vec![b.assign(vec![b.deref(b.ident("v"))], vec![b.int(4)])],
                        )],
                    ),
                ],
            ),
        ]
    });
    let info = check(&program);

    assert_no_errors(&info);
    let v = entity_named(&info, "v").ty.unwrap_or(TypeId::INVALID);
    assert!(info.arena.types.is_pointer(v));
}

#[test]
fn returns() {
    let program = program_with(|b| {
        let int = || b.ident("int");
        vec![
            b.proc_decl("missing", b.proc_type(vec![], vec![b.result(int())]), vec![]),
            b.proc_decl(
                "extra",
                b.proc_type(vec![], vec![]),
                vec![b.return_stmt(vec![b.int(1)])],
            ),
            b.proc_decl(
                "short",
                b.proc_type(vec![], vec![b.result(int()), b.result(int())]),
                vec![b.return_stmt(vec![b.int(1)])],
            ),
            b.proc_decl(
                "panics",
                b.proc_type(vec![], vec![b.result(int())]),
                vec![b.expr_stmt(b.call(b.ident("panic"), vec![b.string("no")]))],
            ),
            b.proc_decl(
                "loops",
                b.proc_type(vec![], vec![b.result(int())]),
                vec![b.for_stmt(None, None, None, vec![])],
            ),
            b.proc_decl(
                "both_branches",
                b.proc_type(vec![b.field(&["c"], b.ident("bool"))], vec![b.result(int())]),
                vec![b.if_stmt(
                    b.ident("c"),
                    vec![b.return_stmt(vec![b.int(1)])],
                    Some(b.block(vec![b.return_stmt(vec![b.int(2)])])),
                )],
            ),
            main_proc(b, vec![b.defer(b.return_stmt(vec![]))]),
        ]
    });
    let info = check(&program);

    assert_eq!(
        error_messages(&info),
        vec![
            "Missing return statement at the end of the procedure".to_owned(),
            "Expected no return values".to_owned(),
            "Expected 2 return values, got 1".to_owned(),
            "You cannot `return` within a defer statement".to_owned(),
        ]
    );
}

#[test]
fn only_unconditional_loops_terminate() {
    let program = program_with(|b| {
        let int = || b.ident("int");
        let n = || vec![b.field(&["n"], b.ident("int"))];
        vec![
            b.proc_decl(
                "while_small",
                b.proc_type(n(), vec![b.result(int())]),
                vec![b.for_stmt(
                    None,
                    Some(b.binary(BinaryOp::Lt, b.ident("n"), b.int(10))),
                    None,
                    vec![b.return_stmt(vec![b.int(1)])],
                )],
            ),
            b.proc_decl(
                "breaks_out",
                b.proc_type(vec![], vec![b.result(int())]),
                vec![b.for_stmt(None, None, None, vec![b.branch(BranchKind::Break)])],
            ),
            b.proc_decl(
                "forever",
                b.proc_type(vec![], vec![b.result(int())]),
                vec![b.for_stmt(None, None, None, vec![b.return_stmt(vec![b.int(1)])])],
            ),
            main_proc(b, vec![]),
        ]
    });
    let info = check(&program);

    let missing = "Missing return statement at the end of the procedure".to_owned();
    assert_eq!(error_messages(&info), vec![missing.clone(), missing]);
}

#[test]
fn assignments() {
    let program = program_with(|b| {
        vec![
            b.constant(&["LIMIT"], None, vec![b.int(10)]),
            main_proc(
                b,
                vec![
                    b.var(&["a"], Some(b.ident("int")), vec![]),
                    b.var(&["f"], Some(b.ident("f32")), vec![]),
                    b.assign(vec![b.ident("LIMIT")], vec![b.int(2)]),
                    b.op_assign(BinaryOp::Add, b.ident("a"), b.ident("f")),
                    b.op_assign(BinaryOp::Mul, b.ident("a"), b.int(3)),
                    b.assign(vec![b.ident("a"), b.ident("f")], vec![b.int(1)]),
                    b.inc(b.ident("a")),
                    b.expr_stmt(b.binary(BinaryOp::Add, b.ident("a"), b.int(1))),
                ],
            ),
        ]
    });
    let info = check(&program);

    assert_error(&info, "Cannot assign to `LIMIT`");
    assert_error(&info, "Mismatched types in assignment operation");
    assert_error(&info, "Assignment count mismatch `2` = `1`");
    assert_error(&info, "Expression is not used");
    assert_eq!(info.diagnostics.error_count(), 4);
}

#[test]
fn conditions_must_be_boolean() {
    let program = program_with(|b| {
        vec![main_proc(
            b,
            vec![
                b.if_stmt(b.int(1), vec![], None),
                b.for_stmt(None, Some(b.string("forever")), None, vec![]),
            ],
        )]
    });
    let info = check(&program);

    assert_error(&info, "Non-boolean condition in `if` statement");
    assert_error(&info, "Non-boolean condition in `for` statement");
}

#[test]
fn using_struct_variable() {
    let program = program_with(|b| {
        vec![
            b.type_decl("Vec2", b.struct_type(vec![b.field(&["x", "y"], b.ident("f32"))])),
            main_proc(
                b,
                vec![
                    b.using_var("v", b.ident("Vec2")),
                    b.assign(vec![b.ident("x")], vec![b.float(1.0)]),
                    b.var(&["n"], None, vec![b.int(1)]),
                    b.using(vec![b.ident("n")]),
                ],
            ),
        ]
    });
    let info = check(&program);

    assert_eq!(
        error_messages(&info),
        vec!["`using` can only be applied to variables of type struct or raw_union".to_owned()]
    );
    let x = info
        .uses
        .values()
        .map(|&e| info.entity(e))
        .find(|e| e.name == "x")
        .unwrap_or_else(|| panic!("`x` was not resolved"));
    assert!(x.using_parent.is_some());
}

#[test]
fn using_enum_type() {
    let program = program_with(|b| {
        vec![
            b.type_decl("Color", b.enum_type(None, vec![("Red", None), ("Green", None)])),
            main_proc(
                b,
                vec![
                    b.using(vec![b.ident("Color")]),
                    b.var(&["c"], Some(b.ident("Color")), vec![b.ident("Green")]),
                    b.assign(vec![b.ident("_")], vec![b.ident("c")]),
                ],
            ),
        ]
    });
    let info = check(&program);

    assert_no_errors(&info);
}

#[test]
fn local_redeclaration_and_unused() {
    let program = program_with(|b| {
        vec![main_proc(
            b,
            vec![
                b.var(&["x"], None, vec![b.int(1)]),
                b.var(&["x"], None, vec![b.int(2)]),
                b.var(&["unused"], None, vec![b.int(3)]),
            ],
        )]
    });
    let info = check(&program);

    assert_eq!(error_messages(&info), vec!["Redeclaration of `x` in this scope".to_owned()]);
    assert!(warning_messages(&info).contains(&"Unused variable `unused`".to_owned()));
}

#[test]
fn local_constants_and_types() {
    let program = program_with(|b| {
        vec![main_proc(
            b,
            vec![
                b.constant(&["A", "B"], None, vec![b.ident("iota"), b.ident("iota")]),
                b.type_decl("Pair", b.struct_type(vec![b.field(&["a", "b"], b.ident("int"))])),
                b.var(&["p"], Some(b.ident("Pair")), vec![]),
                b.assign(vec![b.selector(b.ident("p"), "b")], vec![b.ident("B")]),
            ],
        )]
    });
    let info = check(&program);

    assert_no_errors(&info);
    let b_const = entity_named(&info, "B");
    assert_eq!(b_const.constant_value(), Some(&ExactValue::Integer(1)));
}

#[test]
fn push_context_and_allocator() {
    let program = program_with(|b| {
        vec![main_proc(
            b,
            vec![
                b.var(&["c"], Some(b.ident("Context")), vec![]),
                b.push_context(b.ident("c"), vec![]),
                b.push_allocator(b.selector(b.ident("context"), "allocator"), vec![]),
                b.var(&["n"], None, vec![b.int(1)]),
                b.push_allocator(b.ident("n"), vec![]),
            ],
        )]
    });
    let info = check(&program);

    assert_eq!(info.diagnostics.error_count(), 1);
    assert_error(&info, "Cannot assign value `n` of type `int` to `Allocator` in argument to push_allocator");
}

#[test]
fn casts_in_statements() {
    let program = program_with(|b| {
        vec![main_proc(
            b,
            vec![
                b.var(&["f"], None, vec![b.cast(CastKind::Cast, b.ident("f64"), b.int(3))]),
                b.assign(vec![b.ident("_")], vec![b.ident("f")]),
            ],
        )]
    });
    let info = check(&program);

    assert_no_errors(&info);
    assert_eq!(entity_named(&info, "f").ty, Some(TypeId::F64));
}

#[test]
fn no_bounds_check_procedures() {
    let program = program_with(|b| {
        vec![
            b.proc_decl_tagged(
                "main",
                b.proc_type(vec![], vec![]),
                Some(vec![
                    b.var(&["a"], Some(b.array_type(b.int(2), b.ident("int"))), vec![]),
                    b.with_flags(b.assign(vec![b.ident("_")], vec![b.ident("a")]), StmtStateFlags::BOUNDS_CHECK),
                ]),
                ProcTags::NO_BOUNDS_CHECK,
            ),
        ]
    });
    let info = check(&program);

    assert_no_errors(&info);
    let mut flags: Vec<_> = info.stmt_flags.values().copied().collect();
    flags.sort_by_key(|f| f.bits());
    assert_eq!(flags, vec![StmtStateFlags::BOUNDS_CHECK, StmtStateFlags::NO_BOUNDS_CHECK]);
}

#[test]
fn unreachable_procedures_are_not_live() {
    let program = program_with(|b| {
        let unit = || b.proc_type(vec![], vec![]);
        vec![
            b.proc_decl("used", unit(), vec![]),
            b.proc_decl("unused", unit(), vec![]),
            main_proc(b, vec![b.expr_stmt(b.call(b.ident("used"), vec![]))]),
        ]
    });
    let info = check(&program);
    assert_no_errors(&info);

    let used = init_entity(&info, "used").unwrap_or_else(|| panic!("no `used`"));
    let unused = init_entity(&info, "unused").unwrap_or_else(|| panic!("no `unused`"));
    assert!(info.min_dep_map.contains(&used));
    assert!(!info.min_dep_map.contains(&unused));

    // The runtime is shared into the global scope and always live.
    let alloc = info
        .min_dep_map
        .iter()
        .any(|&e| info.entity(e).name == "alloc_align");
    assert!(alloc);
}

#[test]
fn long_call_chains_are_live_in_call_order() {
    const CHAIN: usize = 300;
    let program = program_with(|b| {
        let call = |i: usize| b.expr_stmt(b.call(b.ident(&format!("c{}", i)), vec![]));
        let mut decls: Vec<_> = (0..CHAIN)
            .map(|i| {
                let body = if i + 1 < CHAIN { vec![call(i + 1)] } else { vec![] };
                b.proc_decl(&format!("c{}", i), b.proc_type(vec![], vec![]), body)
            })
            .collect();
        decls.push(main_proc(b, vec![call(0)]));
        decls
    });
    let info = check(&program);
    assert_no_errors(&info);

    let positions: Vec<usize> = (0..CHAIN)
        .map(|i| {
            let e = init_entity(&info, &format!("c{}", i)).unwrap_or_else(|| panic!("no `c{}`", i));
            info.min_dep_map
                .get_index_of(&e)
                .unwrap_or_else(|| panic!("`c{}` is not live", i))
        })
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

const PROC_COUNT: usize = 6;

proptest! {
    #[test]
    fn dependency_closure(
        calls in prop::collection::vec(prop::collection::vec(0..PROC_COUNT, 0..3), PROC_COUNT),
        roots in prop::collection::vec(0..PROC_COUNT, 0..3),
    ) {
        let program = program_with(|b| {
            let call = |i: usize| b.expr_stmt(b.call(b.ident(&format!("p{}", i)), vec![]));
            let mut decls: Vec<_> = calls
                .iter()
                .enumerate()
                .map(|(i, callees)| {
                    let body = callees.iter().map(|&j| call(j)).collect();
                    b.proc_decl(&format!("p{}", i), b.proc_type(vec![], vec![]), body)
                })
                .collect();
            decls.push(main_proc(b, roots.iter().map(|&j| call(j)).collect()));
            decls
        });
        let info = check(&program);
        prop_assert_eq!(info.diagnostics.error_count(), 0);

        let mut reachable = [false; PROC_COUNT];
        let mut stack = roots.clone();
        while let Some(i) = stack.pop() {
            if !reachable[i] {
                reachable[i] = true;
                stack.extend(calls[i].iter().copied());
            }
        }

        for (i, &live) in reachable.iter().enumerate() {
            let e = init_entity(&info, &format!("p{}", i));
            prop_assert!(e.is_some());
            prop_assert_eq!(e.map(|e| info.min_dep_map.contains(&e)), Some(live));
        }
    }
}
