use proptest::prelude::*;

use odin_ir::{
    InstrKind, Module, Value, ValueId, STARTUP_RUNTIME_PROC_NAME, TYPE_INFO_DATA_MEMBER_NAME, TYPE_INFO_DATA_NAME,
};
use odin_types::{BinaryOp, ExactValue};

use super::{generate_ir, IrError};
use crate::{
    ast::{build::AstBuilder, BranchKind, CastKind, Program, ProcTags, Stmt},
    test_support::{check, main_proc, program_with},
};

fn build(program: &Program) -> Module {
    let info = check(program);
    generate_ir(&info).unwrap_or_else(|err| panic!("IR generation failed: {:#}", err))
}

fn instrs<'m>(module: &'m Module, name: &str) -> Vec<&'m InstrKind> {
    let proc = module
        .member_proc(name)
        .unwrap_or_else(|_| panic!("no procedure named `{}`", name));
    module
        .procedure(proc)
        .blocks
        .iter()
        .flat_map(|&b| module.block(b).instrs.iter())
        .filter_map(|&v| module.instr(v))
        .map(|instr| &instr.kind)
        .collect()
}

fn block_labels(module: &Module, name: &str) -> Vec<String> {
    let proc = module
        .member_proc(name)
        .unwrap_or_else(|_| panic!("no procedure named `{}`", name));
    module
        .procedure(proc)
        .blocks
        .iter()
        .map(|&b| module.block(b).label.clone())
        .collect()
}

/// Names of the procedures `name` calls, in emission order.
fn callees(module: &Module, name: &str) -> Vec<String> {
    instrs(module, name)
        .into_iter()
        .filter_map(|kind| match kind {
            InstrKind::Call { callee, .. } => match module.value(*callee) {
                Value::Proc(proc) => Some(module.procedure(*proc).name.clone()),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

fn empty_proc(b: &AstBuilder, name: &str) -> Stmt {
    b.proc_decl(name, b.proc_type(vec![], vec![]), vec![])
}

fn is_global(module: &Module, value: ValueId, name: &str) -> bool {
    matches!(module.value(value), Value::Global(global) if global.name == name)
}

fn kind_of(module: &Module, value: ValueId) -> Option<&InstrKind> {
    module.instr(value).map(|instr| &instr.kind)
}

fn int_constant(module: &Module, value: ValueId) -> Option<i128> {
    match module.value(value) {
        Value::Constant { value, .. } => value.as_integer(),
        _ => None,
    }
}

fn jump_targets(module: &Module, name: &str) -> Vec<String> {
    instrs(module, name)
        .into_iter()
        .filter_map(|kind| match kind {
            InstrKind::Jump { block } => Some(module.block(*block).label.clone()),
            _ => None,
        })
        .collect()
}

/// `(low, high, max, is_substring)` of every slice bounds check, with
/// non-constant operands as `None`.
fn slice_checks(module: &Module, name: &str) -> Vec<(Option<i128>, Option<i128>, Option<i128>, bool)> {
    instrs(module, name)
        .into_iter()
        .filter_map(|kind| match kind {
            InstrKind::SliceBoundsCheck {
                low,
                high,
                max,
                is_substring,
                ..
            } => Some((
                int_constant(module, *low),
                int_constant(module, *high),
                max.and_then(|m| int_constant(module, m)),
                *is_substring,
            )),
            _ => None,
        })
        .collect()
}

#[test]
fn programs_with_errors_are_refused() {
    let program = program_with(|b| vec![main_proc(b, vec![b.expr_stmt(b.ident("nowhere"))])]);
    let info = check(&program);

    let err = generate_ir(&info).err().expect("generation should fail");
    assert!(matches!(
        err.downcast_ref::<IrError>(),
        Some(IrError::ProgramHasErrors(n)) if *n > 0
    ));
}

#[test]
fn locals_and_arithmetic() {
    let program = program_with(|b| {
        vec![main_proc(
            b,
            vec![
                b.var(&["x"], Some(b.ident("int")), vec![b.int(5)]),
                b.var(&["y"], None, vec![b.binary(BinaryOp::Add, b.ident("x"), b.int(2))]),
            ],
        )]
    });
    let module = build(&program);
    let main = instrs(&module, "main");

    let locals = main.iter().filter(|k| matches!(k, InstrKind::Local { .. })).count();
    assert!(locals >= 2, "expected locals for `x` and `y`");
    assert!(main.iter().any(|k| matches!(k, InstrKind::Load { .. })));
    assert!(main
        .iter()
        .any(|k| matches!(k, InstrKind::BinaryOp { op: BinaryOp::Add, .. })));
    assert!(matches!(main.last(), Some(InstrKind::Return { value: None })));
}

#[test]
fn constant_expressions_fold() {
    let program = program_with(|b| {
        vec![main_proc(
            b,
            vec![b.var(&["x"], None, vec![b.binary(BinaryOp::Mul, b.int(6), b.int(7))])],
        )]
    });
    let module = build(&program);
    let main = instrs(&module, "main");

    assert!(!main.iter().any(|k| matches!(k, InstrKind::BinaryOp { .. })));
    let stored = main.iter().find_map(|k| match k {
        InstrKind::Store { value, .. } => match module.value(*value) {
            Value::Constant { value, .. } => Some(value.clone()),
            _ => None,
        },
        _ => None,
    });
    assert_eq!(stored, Some(ExactValue::Integer(42)));
}

#[test]
fn indexing_is_bounds_checked_unless_disabled() {
    let body = |b: &AstBuilder| {
        vec![
            b.var(&["a"], Some(b.array_type(b.int(5), b.ident("int"))), vec![]),
            b.var(&["x"], None, vec![b.index(b.ident("a"), b.int(10))]),
        ]
    };

    let checked = build(&program_with(|b| vec![main_proc(b, body(b))]));
    let check = instrs(&checked, "main").into_iter().find_map(|k| match k {
        InstrKind::BoundsCheck { index, len, .. } => Some((*index, *len)),
        _ => None,
    });
    let (index, len) = check.expect("no bounds check emitted");
    let constant = |v| match checked.value(v) {
        Value::Constant { value, .. } => value.clone(),
        other => panic!("expected a constant, got {:?}", other),
    };
    assert_eq!(constant(index), ExactValue::Integer(10));
    assert_eq!(constant(len), ExactValue::Integer(5));

    let unchecked = build(&program_with(|b| {
        vec![b.proc_decl_tagged(
            "main",
            b.proc_type(vec![], vec![]),
            Some(body(b)),
            ProcTags::NO_BOUNDS_CHECK,
        )]
    }));
    assert!(!instrs(&unchecked, "main")
        .iter()
        .any(|k| matches!(k, InstrKind::BoundsCheck { .. })));
}

#[test]
fn defers_run_in_reverse_at_return() {
    let program = program_with(|b| {
        let call = |name: &str| b.expr_stmt(b.call(b.ident(name), vec![]));
        vec![
            empty_proc(b, "g"),
            empty_proc(b, "h"),
            main_proc(b, vec![b.defer(call("g")), b.defer(call("h"))]),
        ]
    });
    let module = build(&program);

    assert_eq!(callees(&module, "main"), ["h", "g"]);
    assert!(block_labels(&module, "main").iter().any(|l| l == "defer"));
}

#[test]
fn nested_scopes_run_their_own_defers() {
    let program = program_with(|b| {
        let call = |name: &str| b.expr_stmt(b.call(b.ident(name), vec![]));
        vec![
            empty_proc(b, "outer"),
            empty_proc(b, "inner"),
            empty_proc(b, "after"),
            main_proc(
                b,
                vec![
                    b.defer(call("outer")),
                    b.block(vec![b.defer(call("inner"))]),
                    call("after"),
                ],
            ),
        ]
    });
    let module = build(&program);

    assert_eq!(callees(&module, "main"), ["inner", "after", "outer"]);
}

#[test]
fn break_and_continue_unwind_the_loop_body() {
    let program = program_with(|b| {
        let call = |name: &str| b.expr_stmt(b.call(b.ident(name), vec![]));
        vec![
            empty_proc(b, "outer"),
            empty_proc(b, "body"),
            main_proc(
                b,
                vec![
                    b.var(&["flag"], Some(b.ident("bool")), vec![]),
                    b.defer(call("outer")),
                    b.for_stmt(
                        None,
                        None,
                        None,
                        vec![
                            b.defer(call("body")),
                            b.if_stmt(b.ident("flag"), vec![b.branch(BranchKind::Continue)], None),
                            b.branch(BranchKind::Break),
                        ],
                    ),
                ],
            ),
        ]
    });
    let module = build(&program);

    // `continue` and `break` each run the body's defer but not the
    // procedure's, which only the final return runs.
    assert_eq!(callees(&module, "main"), ["body", "body", "outer"]);
    let targets = jump_targets(&module, "main");
    assert!(targets.iter().filter(|t| *t == "for.body").count() >= 2, "{:?}", targets);
    assert!(targets.iter().any(|t| t == "for.done"), "{:?}", targets);
}

#[test]
fn return_from_nested_loops_runs_every_defer_once() {
    let program = program_with(|b| {
        let call = |name: &str| b.expr_stmt(b.call(b.ident(name), vec![]));
        vec![
            empty_proc(b, "a"),
            empty_proc(b, "b"),
            empty_proc(b, "c"),
            main_proc(
                b,
                vec![
                    b.defer(call("a")),
                    b.for_stmt(
                        None,
                        None,
                        None,
                        vec![
                            b.defer(call("b")),
                            b.for_stmt(None, None, None, vec![b.defer(call("c")), b.return_stmt(vec![])]),
                        ],
                    ),
                ],
            ),
        ]
    });
    let module = build(&program);

    // Neither loop ever finishes, so nothing may run after the return's
    // own defers.
    assert_eq!(callees(&module, "main"), ["c", "b", "a"]);
}

#[test]
fn unions_are_tagged_from_one() {
    let program = program_with(|b| {
        vec![
            b.type_decl(
                "Shape",
                b.union_type(vec![
                    b.field(&["Int"], b.ident("int")),
                    b.field(&["Real"], b.ident("f64")),
                ]),
            ),
            main_proc(
                b,
                vec![
                    b.var(&["n"], None, vec![b.int(5)]),
                    b.var(&["s"], Some(b.ident("Shape")), vec![b.ident("n")]),
                    b.var(&["r"], None, vec![b.float(2.5)]),
                    b.assign(vec![b.ident("s")], vec![b.ident("r")]),
                    b.var(
                        &["v", "ok"],
                        None,
                        vec![b.cast(CastKind::UnionCast, b.ident("f64"), b.ident("s"))],
                    ),
                ],
            ),
        ]
    });
    let module = build(&program);
    let main = instrs(&module, "main");

    let stored_tags: Vec<i128> = main
        .iter()
        .filter_map(|k| match k {
            InstrKind::Store { address, value }
                if matches!(kind_of(&module, *address), Some(InstrKind::UnionTagPtr { .. })) =>
            {
                int_constant(&module, *value)
            },
            _ => None,
        })
        .collect();
    assert_eq!(stored_tags, [1, 2]);

    let compared = main.iter().find_map(|k| match k {
        InstrKind::BinaryOp {
            op: BinaryOp::CmpEq,
            right,
            ..
        } => int_constant(&module, *right),
        _ => None,
    });
    assert_eq!(compared, Some(2));

    assert!(block_labels(&module, "main").iter().any(|l| l == "union_cast.ok"));
    assert!(main.iter().any(|k| matches!(
        k,
        InstrKind::Store { value, .. }
            if matches!(module.value(*value), Value::Constant { value: ExactValue::Bool(true), .. })
    )));
}

#[test]
fn allocating_builtins_call_the_runtime() {
    let program = program_with(|b| {
        let int = || b.ident("int");
        let builtin = |name: &str, args| b.call(b.ident(name), args);
        vec![main_proc(
            b,
            vec![
                b.var(&["p"], None, vec![builtin("new", vec![int()])]),
                b.var(&["s"], None, vec![builtin("new_slice", vec![int(), b.int(4)])]),
                b.var(&["t"], None, vec![builtin("new_slice", vec![int(), b.int(2), b.int(8)])]),
                b.var(&["n"], None, vec![builtin("copy", vec![b.ident("s"), b.ident("t")])]),
                b.var(&["d"], Some(b.dynamic_array_type(int())), vec![]),
                b.assign(
                    vec![b.ident("_")],
                    vec![builtin("append", vec![b.address_of(b.ident("d")), b.int(1), b.int(2)])],
                ),
            ],
        )]
    });
    let module = build(&program);

    assert_eq!(
        callees(&module, "main"),
        ["alloc_align", "alloc_align", "alloc_align", "__mem_copy", "__dynamic_array_append"]
    );
    assert_eq!(
        slice_checks(&module, "main"),
        [(Some(0), Some(4), None, false), (Some(0), Some(2), Some(8), false)]
    );

    let item_count = instrs(&module, "main").into_iter().find_map(|k| match k {
        InstrKind::Call { callee, args } => match module.value(*callee) {
            Value::Proc(proc) if module.procedure(*proc).name == "__dynamic_array_append" => {
                args.last().and_then(|&count| int_constant(&module, count))
            },
            _ => None,
        },
        _ => None,
    });
    assert_eq!(item_count, Some(2));
}

#[test]
fn min_max_clamp_and_abs_select() {
    let program = program_with(|b| {
        let x = || b.ident("x");
        let builtin = |name: &str, args| b.call(b.ident(name), args);
        vec![main_proc(
            b,
            vec![
                b.var(&["x"], None, vec![b.int(3)]),
                b.var(&["lo"], None, vec![builtin("min", vec![x(), b.int(10)])]),
                b.var(&["hi"], None, vec![builtin("max", vec![x(), b.int(0)])]),
                b.var(&["c"], None, vec![builtin("clamp", vec![x(), b.int(1), b.int(5)])]),
                b.var(&["a"], None, vec![builtin("abs", vec![x()])]),
            ],
        )]
    });
    let module = build(&program);
    let main = instrs(&module, "main");

    let ops: Vec<BinaryOp> = main
        .iter()
        .filter_map(|k| match k {
            InstrKind::BinaryOp { op, .. } => Some(*op),
            _ => None,
        })
        .collect();
    assert_eq!(
        ops,
        [
            BinaryOp::Lt,
            BinaryOp::Gt,
            BinaryOp::Lt,
            BinaryOp::Gt,
            BinaryOp::Shr,
            BinaryOp::Add,
            BinaryOp::Xor
        ]
    );
    let selects = main.iter().filter(|k| matches!(k, InstrKind::Select { .. })).count();
    assert_eq!(selects, 4);
}

#[test]
fn swizzle_shuffles_and_slice_ptr_checks_its_bounds() {
    let program = program_with(|b| {
        vec![main_proc(
            b,
            vec![
                b.var(&["v"], Some(b.vector_type(b.int(4), b.ident("f64"))), vec![]),
                b.var(
                    &["w"],
                    None,
                    vec![b.call(b.ident("swizzle"), vec![b.ident("v"), b.int(3), b.int(0)])],
                ),
                b.var(&["p"], None, vec![b.call(b.ident("new"), vec![b.ident("int")])]),
                b.var(
                    &["s"],
                    None,
                    vec![b.call(b.ident("slice_ptr"), vec![b.ident("p"), b.int(2), b.int(4)])],
                ),
            ],
        )]
    });
    let module = build(&program);

    let shuffle = instrs(&module, "main").into_iter().find_map(|k| match k {
        InstrKind::VectorShuffle { indices, .. } => Some(indices.clone()),
        _ => None,
    });
    assert_eq!(shuffle, Some(vec![3, 0]));
    assert_eq!(slice_checks(&module, "main"), [(Some(0), Some(2), Some(4), false)]);
}

#[test]
fn slice_expressions_check_their_bounds() {
    let program = program_with(|b| {
        vec![main_proc(
            b,
            vec![
                b.var(&["a"], Some(b.array_type(b.int(8), b.ident("int"))), vec![]),
                b.var(&["s"], None, vec![b.slice(b.ident("a"), Some(b.int(2)), Some(b.int(5)), None)]),
                b.var(&["text"], None, vec![b.string("hello")]),
                b.var(&["t"], None, vec![b.slice(b.ident("text"), Some(b.int(1)), Some(b.int(3)), None)]),
            ],
        )]
    });
    let module = build(&program);
    let checks = slice_checks(&module, "main");

    assert_eq!(checks.len(), 2);
    assert_eq!(checks[0], (Some(2), Some(5), Some(8), false));
    let (low, high, _, is_substring) = checks[1];
    assert_eq!((low, high, is_substring), (Some(1), Some(3), true));
}

#[test]
fn pushed_contexts_are_restored() {
    let program = program_with(|b| {
        let call = |name: &str| b.expr_stmt(b.call(b.ident(name), vec![]));
        vec![
            empty_proc(b, "with_context"),
            empty_proc(b, "with_allocator"),
            main_proc(
                b,
                vec![
                    b.var(&["c"], Some(b.ident("Context")), vec![]),
                    b.push_context(b.ident("c"), vec![call("with_context")]),
                    b.push_allocator(b.selector(b.ident("c"), "allocator"), vec![call("with_allocator")]),
                ],
            ),
        ]
    });
    let module = build(&program);
    let is_context = |v: ValueId| is_global(&module, v, "__context");

    let events: Vec<String> = instrs(&module, "main")
        .into_iter()
        .filter_map(|k| match k {
            InstrKind::Store { address, value } if is_context(*address) => {
                let restores = matches!(
                    kind_of(&module, *value),
                    Some(InstrKind::Load { address }) if is_context(*address)
                );
                let event = if restores { "restore" } else { "set" };
                Some(event.to_owned())
            },
            InstrKind::Store { address, .. } => match kind_of(&module, *address) {
                Some(InstrKind::StructElementPtr { address, .. }) if is_context(*address) => {
                    Some("set allocator".to_owned())
                },
                _ => None,
            },
            InstrKind::Call { callee, .. } => match module.value(*callee) {
                Value::Proc(proc) => Some(module.procedure(*proc).name.clone()),
                _ => None,
            },
            _ => None,
        })
        .collect();

    assert_eq!(
        events,
        ["set", "with_context", "restore", "set allocator", "with_allocator", "restore"]
    );
}

#[test]
fn match_clauses_fall_through_to_the_next_body() {
    let program = program_with(|b| {
        let call = |name: &str| b.expr_stmt(b.call(b.ident(name), vec![]));
        vec![
            empty_proc(b, "one"),
            empty_proc(b, "two"),
            empty_proc(b, "other"),
            main_proc(
                b,
                vec![
                    b.var(&["x"], None, vec![b.int(1)]),
                    b.match_stmt(
                        Some(b.ident("x")),
                        vec![
                            b.case(vec![b.int(1)], vec![call("one"), b.branch(BranchKind::Fallthrough)]),
                            b.case(vec![b.int(2)], vec![call("two")]),
                            b.case(vec![], vec![call("other")]),
                        ],
                    ),
                ],
            ),
        ]
    });
    let module = build(&program);

    assert_eq!(callees(&module, "main"), ["one", "two", "other"]);

    let proc = module
        .member_proc("main")
        .unwrap_or_else(|_| panic!("no procedure named `main`"));
    let case_bodies: Vec<_> = module
        .procedure(proc)
        .blocks
        .iter()
        .copied()
        .filter(|&b| module.block(b).label == "match.case.body")
        .collect();
    assert_eq!(case_bodies.len(), 2);

    let last = module
        .block(case_bodies[0])
        .instrs
        .last()
        .and_then(|&v| kind_of(&module, v));
    assert!(matches!(last, Some(InstrKind::Jump { block }) if *block == case_bodies[1]));

    let comparisons = instrs(&module, "main")
        .into_iter()
        .filter(|k| matches!(k, InstrKind::BinaryOp { op: BinaryOp::CmpEq, .. }))
        .count();
    assert_eq!(comparisons, 2);
}

#[test]
fn loops_and_ifs_make_their_blocks() {
    let program = program_with(|b| {
        vec![main_proc(
            b,
            vec![
                b.var(&["n"], None, vec![b.int(0)]),
                b.for_stmt(
                    None,
                    Some(b.binary(BinaryOp::Lt, b.ident("n"), b.int(10))),
                    Some(b.inc(b.ident("n"))),
                    vec![b.if_stmt(
                        b.binary(BinaryOp::CmpEq, b.ident("n"), b.int(5)),
                        vec![b.branch(BranchKind::Break)],
                        None,
                    )],
                ),
            ],
        )]
    });
    let module = build(&program);
    let labels = block_labels(&module, "main");

    for label in ["for.loop", "for.body", "for.post", "for.done", "if.then", "if.done"] {
        assert!(labels.iter().any(|l| l == label), "no `{}` block in {:?}", label, labels);
    }
}

#[test]
fn entry_point_calls_startup_first() {
    let program = program_with(|b| vec![main_proc(b, vec![])]);
    let module = build(&program);

    assert!(module.member(STARTUP_RUNTIME_PROC_NAME).is_ok());
    let main = instrs(&module, "main");
    let first = main
        .iter()
        .find(|k| !matches!(k, InstrKind::Local { .. } | InstrKind::Jump { .. }));
    assert!(matches!(first, Some(InstrKind::StartupRuntime)));
}

#[test]
fn startup_runs_global_initializers() {
    let program = program_with(|b| {
        vec![
            b.proc_decl(
                "next",
                b.proc_type(vec![], vec![b.result(b.ident("int"))]),
                vec![b.return_stmt(vec![b.int(1)])],
            ),
            b.var(&["counter"], None, vec![b.call(b.ident("next"), vec![])]),
            b.var(&["limit"], None, vec![b.int(3)]),
            main_proc(b, vec![b.assign(vec![b.ident("counter")], vec![b.ident("limit")])]),
        ]
    });
    let module = build(&program);

    assert_eq!(callees(&module, STARTUP_RUNTIME_PROC_NAME), ["next"]);
    let startup = instrs(&module, STARTUP_RUNTIME_PROC_NAME);
    let store_to = |name: &str| {
        startup
            .iter()
            .position(|k| matches!(k, InstrKind::Store { address, .. } if is_global(&module, *address, name)))
            .unwrap_or_else(|| panic!("`{}` is never stored", name))
    };
    assert!(store_to("limit") < store_to("counter"), "constants are stored first");
}

#[test]
fn type_info_table_is_filled_at_startup() {
    let program = program_with(|b| vec![main_proc(b, vec![])]);
    let info = check(&program);
    let module = generate_ir(&info).unwrap_or_else(|err| panic!("{:#}", err));

    assert!(module.member(TYPE_INFO_DATA_NAME).is_ok());
    assert!(module.member(TYPE_INFO_DATA_MEMBER_NAME).is_ok());

    let tags = instrs(&module, STARTUP_RUNTIME_PROC_NAME)
        .into_iter()
        .filter(|k| matches!(k, InstrKind::UnionTagPtr { .. }))
        .count();
    assert_eq!(tags, info.type_info_count);
}

#[test]
fn any_values_point_into_the_type_info_table() {
    let program = program_with(|b| {
        vec![main_proc(b, vec![b.var(&["a"], Some(b.ident("any")), vec![b.int(5)])])]
    });
    let module = build(&program);

    assert!(instrs(&module, "main").iter().any(|k| matches!(
        k,
        InstrKind::ArrayElementPtr { address, .. } if is_global(&module, *address, TYPE_INFO_DATA_NAME)
    )));
}

#[test]
fn printed_module_names_its_procedures() {
    let program = program_with(|b| vec![empty_proc(b, "helper"), main_proc(b, vec![])]);
    let module = build(&program);
    let text = module.to_string();

    assert!(text.contains("main"));
    assert!(text.contains(STARTUP_RUNTIME_PROC_NAME));
}

const DEFER_PROCS: usize = 4;

proptest! {
    #[test]
    fn defers_unwind_last_first(order in prop::collection::vec(0..DEFER_PROCS, 0..6)) {
        let program = program_with(|b| {
            let mut decls: Vec<_> = (0..DEFER_PROCS).map(|i| empty_proc(b, &format!("d{}", i))).collect();
            let body = order
                .iter()
                .map(|&i| b.defer(b.expr_stmt(b.call(b.ident(&format!("d{}", i)), vec![]))))
                .collect();
            decls.push(main_proc(b, body));
            decls
        });
        let module = build(&program);

        let expected: Vec<String> = order.iter().rev().map(|i| format!("d{}", i)).collect();
        prop_assert_eq!(callees(&module, "main"), expected);
    }
}
