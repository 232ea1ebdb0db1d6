use indexmap::IndexMap;
use std::collections::HashMap;
use thiserror::Error;

use odin_types::{BuildContext, EntityId, ExactValue, NodeId, TypeId, Types};

use crate::{
    Block, BlockId, Defer, DeferKind, Global, GlobalFlags, Instr, InstrKind, ProcId, Procedure, TargetList, Value,
    ValueId,
};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ModuleError {
    #[error("no module member named `{0}`")]
    MissingMember(String),
    #[error("module member `{0}` is not a procedure")]
    NotAProcedure(String),
}

/// One compilation's worth of IR.
#[derive(Clone, Debug)]
pub struct Module {
    pub types: Types,
    pub ctx: BuildContext,

    values: Vec<Value>,
    blocks: Vec<Block>,
    procs: Vec<Procedure>,

    /// Top-level values by (mangled) name, in the order they were added.
    pub members: IndexMap<String, ValueId>,
    pub entity_values: HashMap<EntityId, ValueId>,
    /// Procedures whose bodies still have to be built.
    pub procs_to_generate: Vec<ProcId>,
    pub foreign_library_paths: Vec<String>,
    pub entry_point: Option<EntityId>,

    global_string_index: usize,
    global_array_index: usize,
}

impl Module {
    pub fn new(types: Types, ctx: BuildContext) -> Self {
        Self {
            types,
            ctx,
            values: Vec::new(),
            blocks: Vec::new(),
            procs: Vec::new(),
            members: IndexMap::new(),
            entity_values: HashMap::new(),
            procs_to_generate: Vec::new(),
            foreign_library_paths: Vec::new(),
            entry_point: None,
            global_string_index: 0,
            global_array_index: 0,
        }
    }

    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.index()]
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut Value {
        &mut self.values[id.index()]
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn instr(&self, id: ValueId) -> Option<&Instr> {
        self.value(id).as_instr()
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn procedure(&self, id: ProcId) -> &Procedure {
        &self.procs[id.index()]
    }

    pub fn procedure_mut(&mut self, id: ProcId) -> &mut Procedure {
        &mut self.procs[id.index()]
    }

    pub fn procedures(&self) -> impl Iterator<Item = (ProcId, &Procedure)> {
        self.procs.iter().enumerate().map(|(i, p)| (ProcId::new(i), p))
    }

    pub fn globals(&self) -> impl Iterator<Item = (ValueId, &Global)> {
        self.members.values().filter_map(move |&v| match self.value(v) {
            Value::Global(global) => Some((v, global)),
            _ => None,
        })
    }

    pub fn member(&self, name: &str) -> Result<ValueId, ModuleError> {
        self.members
            .get(name)
            .copied()
            .ok_or_else(|| ModuleError::MissingMember(name.to_owned()))
    }

    pub fn member_proc(&self, name: &str) -> Result<ProcId, ModuleError> {
        match self.value(self.member(name)?) {
            Value::Proc(proc) => Ok(*proc),
            _ => Err(ModuleError::NotAProcedure(name.to_owned())),
        }
    }

    pub fn add_value(&mut self, value: Value) -> ValueId {
        let id = ValueId::new(self.values.len());
        self.values.push(value);
        id
    }

    pub fn type_of(&self, value: ValueId) -> TypeId {
        match self.value(value) {
            Value::Constant { ty, .. }
            | Value::ConstantSlice { ty, .. }
            | Value::Nil(ty)
            | Value::TypeName { ty, .. }
            | Value::Param { ty, .. } => *ty,
            Value::Global(global) => global.ty,
            Value::Proc(proc) => self.procedure(*proc).ty,
            Value::Block(_) => self.types.empty_tuple(),
            Value::Instr(instr) => instr.ty,
        }
    }

    // Constants

    pub fn constant(&mut self, ty: TypeId, value: ExactValue) -> ValueId {
        self.add_value(Value::Constant { ty, value })
    }

    pub fn const_int(&mut self, i: i64) -> ValueId {
        self.constant(TypeId::INT, ExactValue::Integer(i as i128))
    }

    pub fn const_i32(&mut self, i: i32) -> ValueId {
        self.constant(TypeId::I32, ExactValue::Integer(i as i128))
    }

    pub fn const_bool(&mut self, b: bool) -> ValueId {
        self.constant(TypeId::BOOL, ExactValue::Bool(b))
    }

    pub fn const_string(&mut self, s: impl Into<String>) -> ValueId {
        self.constant(TypeId::STRING, ExactValue::String(s.into()))
    }

    pub fn nil(&mut self, ty: TypeId) -> ValueId {
        self.add_value(Value::Nil(ty))
    }

    /// A private constant global holding `value`, named like
    /// `__str$3` or `__csba$0`.
    pub fn add_anonymous_global(&mut self, prefix: &str, value: ValueId) -> ValueId {
        let counter = if prefix == "__str" {
            &mut self.global_string_index
        } else {
            &mut self.global_array_index
        };
        let name = format!("{}${}", prefix, counter);
        *counter += 1;

        let value_ty = self.type_of(value);
        let global = self.add_global(name, None, value_ty, Some(value));
        if let Value::Global(g) = self.value_mut(global) {
            g.flags |= GlobalFlags::CONSTANT | GlobalFlags::PRIVATE | GlobalFlags::UNNAMED_ADDR;
        }
        global
    }

    // Members

    pub fn add_global(
        &mut self,
        name: impl Into<String>,
        entity: Option<EntityId>,
        value_ty: TypeId,
        init: Option<ValueId>,
    ) -> ValueId {
        let name = name.into();
        let ty = self.types.make_pointer(value_ty);
        let global = self.add_value(Value::Global(Global {
            name: name.clone(),
            entity,
            ty,
            value: init,
            referrers: Vec::new(),
            flags: GlobalFlags::empty(),
        }));

        self.members.insert(name, global);
        if let Some(entity) = entity {
            self.entity_values.insert(entity, global);
        }
        global
    }

    pub fn add_type_name(&mut self, name: impl Into<String>, entity: Option<EntityId>, ty: TypeId) -> ValueId {
        let name = name.into();
        let value = self.add_value(Value::TypeName { ty, name: name.clone() });
        self.members.insert(name, value);
        if let Some(entity) = entity {
            self.entity_values.insert(entity, value);
        }
        value
    }

    /// Creates a procedure and its value. Registering it as a member is
    /// left to the caller, since nested procedures get mangled names.
    pub fn add_procedure(
        &mut self,
        name: impl Into<String>,
        entity: Option<EntityId>,
        ty: TypeId,
        parent: Option<ProcId>,
    ) -> ProcId {
        let id = ProcId::new(self.procs.len());
        let value = self.add_value(Value::Proc(id));
        let mut proc = Procedure::new(name, entity, ty, value);
        proc.parent = parent;
        self.procs.push(proc);

        if let Some(parent) = parent {
            self.procedure_mut(parent).children.push(id);
        }
        if let Some(entity) = entity {
            self.entity_values.insert(entity, value);
        }
        id
    }

    pub fn add_param(&mut self, proc: ProcId, entity: Option<EntityId>, name: impl Into<String>, ty: TypeId) -> ValueId {
        let param = self.add_value(Value::Param {
            parent: proc,
            entity,
            name: name.into(),
            ty,
        });
        self.procedure_mut(proc).params.push(param);
        param
    }

    // Blocks

    pub fn add_block(&mut self, proc: ProcId, node: Option<NodeId>, label: &str) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        let p = self.procedure_mut(proc);
        let block = Block::new(proc, p.blocks.len(), label, node, p.scope_index);
        p.blocks.push(id);
        self.blocks.push(block);
        id
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.block_mut(from).succs.push(to);
        self.block_mut(to).preds.push(from);
    }

    pub fn is_terminated(&self, block: BlockId) -> bool {
        self.block(block)
            .last_instr()
            .and_then(|v| self.instr(v))
            .map_or(false, Instr::is_terminator)
    }

    pub fn curr_block(&self, proc: ProcId) -> Option<BlockId> {
        self.procedure(proc).curr_block
    }

    pub fn set_curr_block(&mut self, proc: ProcId, block: Option<BlockId>) {
        self.procedure_mut(proc).curr_block = block;
    }

    /// Whether something emitted now would actually land in a block.
    pub fn is_reachable(&self, proc: ProcId) -> bool {
        self.curr_block(proc).map_or(false, |b| !self.is_terminated(b))
    }

    /// Like `is_reachable`, but also false in a block nothing jumps to.
    /// Blocks get their predecessors before they are started, except the
    /// entry block, whose edge from `decls` comes at `end_body`.
    pub fn is_live(&self, proc: ProcId) -> bool {
        let block = match self.curr_block(proc) {
            Some(block) if !self.is_terminated(block) => block,
            _ => return false,
        };
        self.procedure(proc).entry_block == Some(block) || !self.block(block).preds.is_empty()
    }

    // Instructions

    /// Allocates an instruction without placing it in any block.
    pub fn make_instr(&mut self, kind: InstrKind, ty: TypeId) -> ValueId {
        self.add_value(Value::Instr(Instr::new(kind, ty)))
    }

    /// Appends a new instruction to the current block of `proc`. The
    /// instruction is dropped if there is no current block or the block
    /// already ends in a terminator; its value is returned either way.
    pub fn emit(&mut self, proc: ProcId, kind: InstrKind, ty: TypeId) -> ValueId {
        let value = self.make_instr(kind, ty);
        self.append(proc, value);
        value
    }

    /// Emits a copy of an instruction template.
    pub fn emit_instr(&mut self, proc: ProcId, instr: &Instr) -> ValueId {
        self.emit(proc, instr.kind.clone(), instr.ty)
    }

    fn append(&mut self, proc: ProcId, value: ValueId) -> bool {
        let block = match self.curr_block(proc) {
            Some(block) if !self.is_terminated(block) => block,
            _ => return false,
        };

        let operands = match self.value_mut(value) {
            Value::Instr(instr) => {
                instr.parent = Some(block);
                instr.kind.operands()
            },
            _ => return false,
        };

        self.block_mut(block).instrs.push(value);
        self.procedure_mut(proc).instr_count += 1;

        for op in operands {
            match self.value_mut(op) {
                Value::Global(global) => global.referrers.push(value),
                Value::Proc(callee) => {
                    let callee = *callee;
                    self.procedure_mut(callee).referrers.push(value);
                },
                _ => {},
            }
        }

        true
    }

    pub fn emit_comment(&mut self, proc: ProcId, text: impl Into<String>) {
        let ty = self.types.empty_tuple();
        self.emit(proc, InstrKind::Comment(text.into()), ty);
    }

    pub fn emit_store(&mut self, proc: ProcId, address: ValueId, value: ValueId) -> ValueId {
        let ty = self.types.empty_tuple();
        self.emit(proc, InstrKind::Store { address, value }, ty)
    }

    pub fn emit_load(&mut self, proc: ProcId, address: ValueId) -> ValueId {
        let ty = self.types.deref(self.type_of(address));
        self.emit(proc, InstrKind::Load { address }, ty)
    }

    pub fn emit_zero_init(&mut self, proc: ProcId, address: ValueId) {
        let ty = self.types.empty_tuple();
        self.emit(proc, InstrKind::ZeroInit { address }, ty);
    }

    /// Unconditional jump. Leaves `proc` without a current block.
    pub fn emit_jump(&mut self, proc: ProcId, target: BlockId) {
        let ty = self.types.empty_tuple();
        let from = self.curr_block(proc);
        let jump = self.make_instr(InstrKind::Jump { block: target }, ty);
        if let (true, Some(from)) = (self.append(proc, jump), from) {
            self.add_edge(from, target);
        }
        self.set_curr_block(proc, None);
    }

    /// Conditional branch. Leaves `proc` without a current block.
    pub fn emit_if(&mut self, proc: ProcId, cond: ValueId, then_block: BlockId, else_block: BlockId) {
        let ty = self.types.empty_tuple();
        let from = self.curr_block(proc);
        let instr = self.make_instr(
            InstrKind::If {
                cond,
                then_block,
                else_block,
            },
            ty,
        );
        if let (true, Some(from)) = (self.append(proc, instr), from) {
            self.add_edge(from, then_block);
            self.add_edge(from, else_block);
        }
        self.set_curr_block(proc, None);
    }

    pub fn emit_return(&mut self, proc: ProcId, value: Option<ValueId>) {
        let ty = self.types.empty_tuple();
        self.emit(proc, InstrKind::Return { value }, ty);
    }

    pub fn emit_unreachable(&mut self, proc: ProcId) {
        let ty = self.types.empty_tuple();
        self.emit(proc, InstrKind::Unreachable, ty);
    }

    // Procedure bodies

    /// Sets up the `decls` and `entry` blocks.
    pub fn begin_body(&mut self, proc: ProcId) {
        let decls = self.add_block(proc, None, "decls");
        let entry = self.add_block(proc, None, "entry");
        let p = self.procedure_mut(proc);
        p.decl_block = Some(decls);
        p.entry_block = Some(entry);
        p.curr_block = Some(entry);
    }

    /// Closes `decls` with a jump to `entry`.
    pub fn end_body(&mut self, proc: ProcId) {
        let (decls, entry) = {
            let p = self.procedure(proc);
            (p.decl_block, p.entry_block)
        };

        if let (Some(decls), Some(entry)) = (decls, entry) {
            self.set_curr_block(proc, Some(decls));
            self.emit_jump(proc, entry);
        }
        self.set_curr_block(proc, None);
    }

    /// A stack slot for a value of type `ty`, placed in the `decls` block.
    /// Zeroing, if asked for, happens at the current position.
    pub fn add_local(&mut self, proc: ProcId, entity: Option<EntityId>, ty: TypeId, zero_initialized: bool) -> ValueId {
        let ptr = self.types.make_pointer(ty);
        let local = self.make_instr(
            InstrKind::Local {
                entity,
                ty,
                zero_initialized,
            },
            ptr,
        );

        let decls = match self.procedure(proc).decl_block {
            Some(decls) => decls,
            None => {
                odin_log::warning!("local added to {} before its body was begun", self.procedure(proc).name);
                return local;
            },
        };

        if let Value::Instr(instr) = self.value_mut(local) {
            instr.parent = Some(decls);
        }
        let block = self.block_mut(decls);
        block.instrs.push(local);
        block.locals.push(local);
        self.procedure_mut(proc).local_count += 1;

        if zero_initialized {
            self.emit_zero_init(proc, local);
        }
        if let Some(entity) = entity {
            self.entity_values.insert(entity, local);
        }
        local
    }

    // Scopes, defers and branch targets

    pub fn open_scope(&mut self, proc: ProcId) {
        self.procedure_mut(proc).scope_index += 1;
    }

    pub fn pop_scope(&mut self, proc: ProcId) {
        let p = self.procedure_mut(proc);
        p.scope_index = (p.scope_index - 1).max(0);
    }

    pub fn push_defer(&mut self, proc: ProcId, kind: DeferKind) {
        let p = self.procedure_mut(proc);
        let defer = Defer {
            kind,
            scope_index: p.scope_index,
            block: p.curr_block,
        };
        p.defer_stmts.push(defer);
    }

    pub fn push_target_list(
        &mut self,
        proc: ProcId,
        break_block: Option<BlockId>,
        continue_block: Option<BlockId>,
        fallthrough_block: Option<BlockId>,
    ) {
        self.procedure_mut(proc).target_lists.push(TargetList {
            break_block,
            continue_block,
            fallthrough_block,
        });
    }

    pub fn pop_target_list(&mut self, proc: ProcId) {
        self.procedure_mut(proc).target_lists.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_with_proc() -> (Module, ProcId) {
        let mut module = Module::new(Types::new(), BuildContext::default());
        let ty = module.types.make_proc(vec![], vec![], false, Default::default());
        let proc = module.add_procedure("main", None, ty, None);
        module.begin_body(proc);
        (module, proc)
    }

    #[test]
    fn jump_records_edges_and_clears_block() {
        let (mut module, proc) = module_with_proc();
        let entry = module.curr_block(proc).unwrap();
        let next = module.add_block(proc, None, "next");
        module.emit_jump(proc, next);

        assert_eq!(module.curr_block(proc), None);
        assert_eq!(module.block(entry).succs, vec![next]);
        assert_eq!(module.block(next).preds, vec![entry]);
    }

    #[test]
    fn blocks_without_predecessors_are_dead() {
        let (mut module, proc) = module_with_proc();
        assert!(module.is_live(proc));

        let orphan = module.add_block(proc, None, "orphan");
        let next = module.add_block(proc, None, "next");
        module.emit_jump(proc, next);
        module.set_curr_block(proc, Some(orphan));
        assert!(module.is_reachable(proc));
        assert!(!module.is_live(proc));

        module.set_curr_block(proc, Some(next));
        assert!(module.is_live(proc));
        module.emit_return(proc, None);
        assert!(!module.is_live(proc));
    }

    #[test]
    fn locals_live_in_decls() {
        let (mut module, proc) = module_with_proc();
        let local = module.add_local(proc, None, TypeId::INT, true);
        let p = module.procedure(proc);
        let decls = module.block(p.decl_block.unwrap());
        let entry = module.block(p.entry_block.unwrap());
        assert_eq!(decls.locals, vec![local]);
        assert!(matches!(
            module.instr(entry.instrs[0]).unwrap().kind,
            InstrKind::ZeroInit { address } if address == local
        ));
        assert!(module.types.is_pointer(module.type_of(local)));
    }

    #[test]
    fn globals_track_referrers() {
        let (mut module, proc) = module_with_proc();
        let global = module.add_global("counter", None, TypeId::INT, None);
        let load = module.emit_load(proc, global);
        match module.value(global) {
            Value::Global(g) => assert_eq!(g.referrers, vec![load]),
            other => panic!("expected a global, got {:?}", other),
        }
        assert_eq!(module.type_of(load), TypeId::INT);
        assert_eq!(module.member("counter"), Ok(global));
        assert!(module.member("missing").is_err());
    }

    #[test]
    fn anonymous_globals_are_numbered() {
        let (mut module, _) = module_with_proc();
        let a = module.const_string("a");
        let b = module.const_string("b");
        module.add_anonymous_global("__str", a);
        module.add_anonymous_global("__str", b);
        assert!(module.members.contains_key("__str$0"));
        assert!(module.members.contains_key("__str$1"));
    }
}
