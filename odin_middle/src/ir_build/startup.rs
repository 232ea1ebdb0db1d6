//! The startup procedure, which the entry point calls before anything
//! else.

use odin_ir::{Value, ValueId};

use super::{Addr, GlobalInit, IrBuilder, IrError};
use crate::ast::StmtStateFlags;

impl<'a> IrBuilder<'a> {
    /// Stores every global's initial value, constants first, then fills in
    /// the `type_info` table.
    pub(super) fn build_startup_runtime(&mut self) -> Result<(), IrError> {
        self.proc = self.startup;
        self.stmt_flags = StmtStateFlags::empty();
        self.module.begin_body(self.startup);

        let inits = std::mem::take(&mut self.global_inits);
        for init in &inits {
            self.store_constant_inits(init)?;
        }
        for init in &inits {
            self.build_global_init(init)?;
        }
        self.global_inits = inits;

        self.build_type_info_table()?;
        self.emit_return(None)?;
        self.module.end_body(self.startup);

        odin_log::trace!("built the startup procedure");
        Ok(())
    }

    fn constant_init(&self, global: ValueId) -> Option<ValueId> {
        match self.module.value(global) {
            Value::Global(global) => global.value,
            _ => None,
        }
    }

    fn store_constant_inits(&mut self, init: &GlobalInit<'a>) -> Result<(), IrError> {
        for &global in &init.globals {
            if let Some(value) = self.constant_init(global) {
                self.addr_store(Addr::Ptr(global), value)?;
            }
        }
        Ok(())
    }

    fn build_global_init(&mut self, init: &GlobalInit<'a>) -> Result<(), IrError> {
        if init.globals.iter().all(|&g| self.constant_init(g).is_some()) {
            return Ok(());
        }

        let values = match init.exprs.as_slice() {
            [expr] if init.globals.len() > 1 => {
                let tuple = self.build_expr(expr)?;
                (0..init.globals.len())
                    .map(|i| self.emit_struct_ev(tuple, i))
                    .collect::<Result<Vec<_>, _>>()?
            },
            exprs => exprs
                .iter()
                .map(|expr| self.build_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        };

        for (&global, value) in init.globals.iter().zip(values) {
            if self.constant_init(global).is_some() {
                continue;
            }
            let ty = self.types().deref(self.module.type_of(global));
            let value = self.emit_conv(value, ty)?;
            self.addr_store(Addr::Ptr(global), value)?;
        }
        Ok(())
    }
}
