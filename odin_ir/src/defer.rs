//! Deferred statements and which of them an exit runs.
//!
//! A `defer` records its statement (or, for `push_context` and
//! `push_allocator`, an instruction template) together with the scope
//! depth it was registered at. Nothing is emitted at the defer site. Each
//! way of leaving a scope selects a different part of the stack:
//!
//! * falling off the end of a scope runs and pops the defers of that scope;
//! * `return` runs every defer on the stack;
//! * `break`, `continue` and `fallthrough` run the defers of the scopes
//!   nested inside the target block's scope.
//!
//! Defers always run innermost first.

use odin_types::NodeId;

use crate::{BlockId, Instr};

#[derive(Clone, Debug, PartialEq)]
pub enum DeferKind {
    Node(NodeId),
    /// Copied each time it is emitted.
    Instr(Instr),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Defer {
    pub kind: DeferKind,
    pub scope_index: i32,
    pub block: Option<BlockId>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeferExit {
    Default,
    Return,
    Branch { target_scope_index: i32 },
}

/// What an exit does to the defer stack.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeferPlan {
    /// Indices into the stack of the defers to emit, in emission order.
    pub emit: Vec<usize>,
    /// Number of entries to pop off the top afterwards.
    pub pop: usize,
}

/// Selects the defers `exit` runs when leaving a scope at depth
/// `scope_index`.
///
/// `Return` and `Branch` exits leave the stack untouched: the scopes they
/// jump out of are still open for every other path through them, and are
/// unwound by their own `Default` exit when closed.
pub fn plan_defers(stack: &[Defer], exit: DeferExit, scope_index: i32) -> DeferPlan {
    let mut plan = DeferPlan::default();

    for (i, defer) in stack.iter().enumerate().rev() {
        match exit {
            DeferExit::Default => {
                if defer.scope_index != scope_index {
                    break;
                }
                plan.emit.push(i);
                plan.pop += 1;
            },
            DeferExit::Return => plan.emit.push(i),
            DeferExit::Branch { target_scope_index } => {
                if defer.scope_index > target_scope_index {
                    plan.emit.push(i);
                }
            },
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(scopes: &[i32]) -> Vec<Defer> {
        scopes
            .iter()
            .enumerate()
            .map(|(i, &scope_index)| Defer {
                kind: DeferKind::Node(NodeId::new(i)),
                scope_index,
                block: None,
            })
            .collect()
    }

    #[test]
    fn default_stops_at_outer_scope() {
        let stack = stack(&[1, 2, 2]);
        let plan = plan_defers(&stack, DeferExit::Default, 2);
        assert_eq!(plan.emit, vec![2, 1]);
        assert_eq!(plan.pop, 2);

        let plan = plan_defers(&stack, DeferExit::Default, 3);
        assert!(plan.emit.is_empty());
        assert_eq!(plan.pop, 0);
    }

    #[test]
    fn return_runs_everything() {
        let stack = stack(&[1, 2, 3]);
        let plan = plan_defers(&stack, DeferExit::Return, 3);
        assert_eq!(plan.emit, vec![2, 1, 0]);
        assert_eq!(plan.pop, 0);
    }

    #[test]
    fn branch_keeps_outer_defers() {
        let stack = stack(&[1, 2, 3, 3]);
        let plan = plan_defers(&stack, DeferExit::Branch { target_scope_index: 2 }, 3);
        assert_eq!(plan.emit, vec![3, 2]);
        assert_eq!(plan.pop, 0);
    }
}
