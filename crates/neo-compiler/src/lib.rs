//! # Neo Compiler
//!
//! Lowers a typed, slot-resolved call graph to a NeoVM script and wraps it
//! in a NEF container.
//!
//! ## Pipeline
//!
//! 1. Walk each function body and emit instructions with symbolic labels
//! 2. Splice instruction templates for builtins without a single opcode
//! 3. Lay out all functions, growing short jumps until offsets are stable
//! 4. Hash the script and serialize the container

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod builtins;
pub mod codegen;
pub mod compiler;
pub mod config;
pub mod error;
pub mod ir;
#[cfg(test)]
mod interp;
pub mod layout;
pub mod scope;
pub mod templates;

pub use builtins::{Builtin, BuiltinTable, Lowering};
pub use compiler::{CompiledProgram, Compiler, INITIALIZE};
pub use config::CompilerConfig;
pub use error::{CompileError, CompileResult};
pub use ir::Program;

/// Compile a program with the standard builtin table
pub fn compile(program: &Program, config: CompilerConfig) -> CompileResult<CompiledProgram> {
    let builtins = BuiltinTable::standard();
    Compiler::new(config, &builtins).compile(program)
}
