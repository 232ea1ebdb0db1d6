//! Semantic analysis and IR generation.
//!
//! [`check_parsed_files`] resolves and type-checks a parsed [`Program`],
//! producing a [`CheckerInfo`]. [`generate_ir`] lowers a checked program
//! to an [`odin_ir::Module`]; it refuses to run on a program with errors.

#![allow(clippy::comparison_chain)]
#![warn(unused_imports)]
#![warn(unused_must_use)]

pub mod ast;
pub mod checker;
pub mod errors;
pub mod ir_build;

#[cfg(test)]
mod test_support;

pub use ast::Program;
pub use checker::{check_parsed_files, CheckerInfo, CompilerError};
pub use ir_build::{generate_ir, IrError};
