use std::fmt::{self, Write as _};

use crate::{BlockId, Instr, InstrKind, Module, ProcId, Value, ValueId};

impl Module {
    fn block_label(&self, block: BlockId) -> String {
        let b = self.block(block);
        format!("{}.{}", b.label, b.index)
    }

    fn operand(&self, value: ValueId) -> String {
        match self.value(value) {
            Value::Constant { value, ty } => format!("{} {}", self.types.type_to_string(*ty), value),
            Value::ConstantSlice { backing, count, .. } => format!("slice({}, {})", self.operand(*backing), count),
            Value::Nil(_) => "nil".to_owned(),
            Value::TypeName { name, .. } => name.clone(),
            Value::Global(global) => format!("@{}", global.name),
            Value::Param { name, .. } => format!("%{}", name),
            Value::Proc(proc) => format!("@{}", self.procedure(*proc).name),
            Value::Block(block) => self.block_label(*block),
            Value::Instr(_) => value.to_string(),
        }
    }

    fn operands(&self, values: &[ValueId]) -> String {
        values
            .iter()
            .map(|&v| self.operand(v))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn write_instr(&self, out: &mut String, id: ValueId, instr: &Instr) -> fmt::Result {
        let ty = |t| self.types.type_to_string(t);

        let body = match &instr.kind {
            InstrKind::Comment(text) => return writeln!(out, "    ; {}", text),
            InstrKind::Local { ty: local_ty, .. } => format!("local {}", ty(*local_ty)),
            InstrKind::StructElementPtr { address, index } | InstrKind::StructExtractValue { value: address, index } => {
                format!("{} {}, {}", instr.kind.name(), self.operand(*address), index)
            },
            InstrKind::Conv { kind, value, from, to } => {
                format!("conv {} {}, {} -> {}", kind, self.operand(*value), ty(*from), ty(*to))
            },
            InstrKind::Jump { block } => format!("jump {}", self.block_label(*block)),
            InstrKind::If {
                cond,
                then_block,
                else_block,
            } => format!(
                "if {}, {}, {}",
                self.operand(*cond),
                self.block_label(*then_block),
                self.block_label(*else_block)
            ),
            InstrKind::Phi { edges } => format!("phi [{}]", self.operands(edges)),
            InstrKind::UnaryOp { op, expr } => format!("unary_op {} {}", op, self.operand(*expr)),
            InstrKind::BinaryOp { op, left, right } => {
                format!("binary_op {} {}, {}", op, self.operand(*left), self.operand(*right))
            },
            InstrKind::Call { callee, args } => format!("call {}({})", self.operand(*callee), self.operands(args)),
            InstrKind::VectorShuffle { vector, indices } => {
                format!("vector_shuffle {}, {:?}", self.operand(*vector), indices)
            },
            InstrKind::BoundsCheck { pos, .. } | InstrKind::SliceBoundsCheck { pos, .. } => format!(
                "{} {}({}:{}) {}",
                instr.kind.name(),
                pos.file,
                pos.line,
                pos.column,
                self.operands(&instr.kind.operands())
            ),
            other => {
                let operands = other.operands();
                if operands.is_empty() {
                    other.name().to_owned()
                } else {
                    format!("{} {}", other.name(), self.operands(&operands))
                }
            },
        };

        if instr.kind.is_void() || instr.ty == self.types.empty_tuple() {
            writeln!(out, "    {}", body)
        } else {
            writeln!(out, "    {} = {} : {}", id, body, ty(instr.ty))
        }
    }

    fn write_procedure(&self, out: &mut String, id: ProcId) -> fmt::Result {
        let proc = self.procedure(id);
        let ty = self.types.type_to_string(proc.ty);

        if proc.blocks.is_empty() {
            return writeln!(out, "proc @{} : {} #foreign", proc.name, ty);
        }

        writeln!(out, "proc @{} : {} {{", proc.name, ty)?;
        for &block in &proc.blocks {
            writeln!(out, "{}:", self.block_label(block))?;
            for &v in &self.block(block).instrs {
                if let Some(instr) = self.instr(v) {
                    self.write_instr(out, v, instr)?;
                }
            }
        }
        writeln!(out, "}}")
    }
}

/// A stable textual dump: globals and type names first, then every
/// procedure in creation order.
impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();

        for &member in self.members.values() {
            match self.value(member) {
                Value::Global(global) => {
                    write!(out, "global @{} : {}", global.name, self.types.type_to_string(global.ty))?;
                    if let Some(init) = global.value {
                        write!(out, " = {}", self.operand(init))?;
                    }
                    out.push('\n');
                },
                Value::TypeName { ty, name } => {
                    let base = self.types.base_type(*ty);
                    writeln!(out, "type {} = {}", name, self.types.type_to_string(base))?;
                },
                _ => {},
            }
        }

        for (id, _) in self.procedures() {
            out.push('\n');
            self.write_procedure(&mut out, id)?;
        }

        f.write_str(&out)
    }
}
