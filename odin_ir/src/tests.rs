use proptest::prelude::*;

use odin_types::{BinaryOp, BuildContext, CallingConvention, NodeId, TypeId, Types};

use crate::{plan_defers, DeferExit, DeferKind, InstrKind, Module, ProcId};

fn new_module() -> (Module, ProcId) {
    let mut module = Module::new(Types::new(), BuildContext::default());
    let ty = module.types.make_proc(vec![], vec![], false, CallingConvention::Odin);
    let proc = module.add_procedure("f", None, ty, None);
    module.begin_body(proc);
    (module, proc)
}

#[derive(Clone, Copy, Debug)]
enum Op {
    Add,
    Comment,
    Store,
    Return,
    Unreachable,
    Jump,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Add),
        Just(Op::Comment),
        Just(Op::Store),
        Just(Op::Return),
        Just(Op::Unreachable),
        Just(Op::Jump),
    ]
}

fn apply(module: &mut Module, proc: ProcId, op: Op) {
    match op {
        Op::Add => {
            let a = module.const_int(1);
            let b = module.const_int(2);
            module.emit(proc, InstrKind::BinaryOp { op: BinaryOp::Add, left: a, right: b }, TypeId::INT);
        },
        Op::Comment => module.emit_comment(proc, "x"),
        Op::Store => {
            let local = module.add_local(proc, None, TypeId::INT, false);
            let v = module.const_int(3);
            module.emit_store(proc, local, v);
        },
        Op::Return => module.emit_return(proc, None),
        Op::Unreachable => module.emit_unreachable(proc),
        Op::Jump => {
            // Keep the block current so later emits would land in it if
            // the terminator rule did not hold.
            let curr = module.curr_block(proc);
            let target = module.add_block(proc, None, "target");
            module.emit_jump(proc, target);
            module.set_curr_block(proc, curr);
        },
    }
}

proptest! {
    #[test]
    fn nothing_lands_after_a_terminator(before in prop::collection::vec(op(), 0..8), after in prop::collection::vec(op(), 1..16)) {
        let (mut module, proc) = new_module();
        for op in before {
            apply(&mut module, proc, op);
        }
        let entry = module.curr_block(proc).unwrap();
        module.emit_return(proc, None);

        let snapshot = module.block(entry).instrs.clone();
        for op in after {
            apply(&mut module, proc, op);
        }
        prop_assert_eq!(&module.block(entry).instrs, &snapshot);
        prop_assert!(module.is_terminated(entry));
    }

    #[test]
    fn return_unwinds_every_scope_innermost_first(depth in 1usize..12) {
        let (mut module, proc) = new_module();
        for i in 0..depth {
            module.open_scope(proc);
            module.push_defer(proc, DeferKind::Node(NodeId::new(i)));
        }

        let p = module.procedure(proc);
        let plan = plan_defers(&p.defer_stmts, DeferExit::Return, p.scope_index);
        let expected: Vec<usize> = (0..depth).rev().collect();
        prop_assert_eq!(plan.emit, expected);
    }

    #[test]
    fn branch_skips_defers_outside_the_target(outer in 1usize..6, inner in 1usize..6) {
        let (mut module, proc) = new_module();
        for i in 0..outer {
            module.open_scope(proc);
            module.push_defer(proc, DeferKind::Node(NodeId::new(i)));
        }

        // The loop's `done` block belongs to the scope the loop sits in.
        let done = module.add_block(proc, None, "for.done");
        let target_scope = module.block(done).scope_index;

        for i in 0..inner {
            module.open_scope(proc);
            module.push_defer(proc, DeferKind::Node(NodeId::new(outer + i)));
        }

        let p = module.procedure(proc);
        let plan = plan_defers(&p.defer_stmts, DeferExit::Branch { target_scope_index: target_scope }, p.scope_index);
        let expected: Vec<usize> = (outer..outer + inner).rev().collect();
        prop_assert_eq!(plan.emit, expected);
        prop_assert_eq!(plan.pop, 0);
    }
}

#[test]
fn target_lists_shadow_and_restore() {
    let (mut module, proc) = new_module();
    let outer_done = module.add_block(proc, None, "for.done");
    let outer_post = module.add_block(proc, None, "for.post");
    module.push_target_list(proc, Some(outer_done), Some(outer_post), None);

    let match_done = module.add_block(proc, None, "match.done");
    let fall = module.add_block(proc, None, "match.case.body");
    module.push_target_list(proc, Some(match_done), None, Some(fall));

    let p = module.procedure(proc);
    assert_eq!(p.break_target(), Some(match_done));
    assert_eq!(p.continue_target(), Some(outer_post));
    assert_eq!(p.fallthrough_target(), Some(fall));

    module.pop_target_list(proc);
    let p = module.procedure(proc);
    assert_eq!(p.break_target(), Some(outer_done));
    assert_eq!(p.fallthrough_target(), None);
}

#[test]
fn dump_format() {
    let (mut module, proc) = new_module();
    let x = module.add_local(proc, None, TypeId::INT, false);
    let five = module.const_int(5);
    module.emit_store(proc, x, five);
    let load = module.emit_load(proc, x);
    let two = module.const_int(2);
    module.emit(proc, InstrKind::BinaryOp { op: BinaryOp::Add, left: load, right: two }, TypeId::INT);
    module.emit_return(proc, None);
    module.end_body(proc);

    let dump = module.to_string();
    assert!(dump.contains("proc @f : proc() {"), "{}", dump);
    assert!(dump.contains("decls.0:"), "{}", dump);
    assert!(dump.contains("entry.1:"), "{}", dump);
    assert!(dump.contains(&format!("{} = local int : ^int", x)), "{}", dump);
    assert!(dump.contains(&format!("store {}, int 5", x)), "{}", dump);
    assert!(dump.contains(&format!("= binary_op + {}, int 2 : int", load)), "{}", dump);
    assert!(dump.contains("jump entry.1"), "{}", dump);
}
