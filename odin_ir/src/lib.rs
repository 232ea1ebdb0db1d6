//! The middle end's intermediate representation.
//!
//! A [`Module`] owns every value, block and procedure of a compilation in
//! flat arenas addressed by [`ValueId`], [`BlockId`] and [`ProcId`].
//! Instructions are appended to blocks through [`Module::emit`], which
//! drops anything emitted after a terminator.

#![allow(clippy::comparison_chain)]
#![warn(unused_imports)]
#![warn(unused_must_use)]

pub mod block;
pub mod defer;
pub mod instr;
pub mod module;
mod print;
pub mod procedure;
pub mod value;

#[cfg(test)]
mod tests;

pub use block::{Block, BlockId, DomNode};
pub use defer::{plan_defers, Defer, DeferExit, DeferKind, DeferPlan};
pub use instr::{ConvKind, Instr, InstrKind, SourcePos};
pub use module::{Module, ModuleError};
pub use procedure::{ProcFlags, ProcId, Procedure, TargetList};
pub use value::{Global, GlobalFlags, Value, ValueId};

pub const STARTUP_RUNTIME_PROC_NAME: &str = "__$startup_runtime";
pub const TYPE_INFO_DATA_NAME: &str = "__$type_info_data";
pub const TYPE_INFO_DATA_MEMBER_NAME: &str = "__$type_info_data_member";
