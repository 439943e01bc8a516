//! Bytecode compilation backend.
//!
//! Turns a syntax tree into an executable [`CodeObject`] in three stages:
//! code generation emits label-addressed pseudo-instructions, the
//! control-flow graph is built and optimized, and the assembler encodes
//! the final bytecode with its exception and location tables.
//!
//! # Module map
//!
//! - [`opcode`] - the instruction set and its classification queries
//! - [`instruction`] - pseudo-instructions and the label-addressable
//!   sequence
//! - [`metadata`] - per-unit constant and name tables
//! - [`ast`] - the arena-allocated input tree
//! - [`codegen`] - lowering from the tree to instruction sequences
//! - [`cfg`] - basic-block graph construction and linearization
//! - [`optimize`] - graph rewrites and stack-depth validation
//! - [`assemble`] - final encoding into a code object
//! - [`code`] - the finished artifact
//!
//! The stages are also exposed individually ([`generate_instructions`],
//! [`optimize_cfg`], [`assemble()`](assemble::assemble)) so tooling can
//! inspect the intermediate forms; [`compile`] runs all of them.

pub mod assemble;
pub mod ast;
pub mod cfg;
pub mod code;
pub mod codegen;
pub mod instruction;
pub mod metadata;
pub mod opcode;
pub mod optimize;

pub use assemble::assemble;
pub use cfg::{BasicBlock, BlockId, ControlFlowGraph};
pub use code::{CodeObject, ExceptionTableEntry, LocationEntry};
pub use codegen::{Compiler, MAX_NESTING};
pub use instruction::{
    ExceptHandlerInfo, Instruction, InstructionSequence, Label, MAX_TABLE_LEN, ResolvedSequence,
};
pub use metadata::{CodeUnitMetadata, Constant, TABLE_LIMIT};
pub use opcode::{CmpOp, Opcode, is_valid_opcode};
pub use optimize::{MAX_STACK_DEPTH, optimize_code_unit, stackdepth};

use flint_core::{CompileError, FeatureFlags};

use crate::ast::Module;

/// Compile a module to its code object.
///
/// `optimize` level 0 applies only the rewrites later stages rely on;
/// level 1 and above enables the jump simplifications and branch
/// dead-code elimination.
pub fn compile(
    module: &Module<'_>,
    filename: &str,
    flags: FeatureFlags,
    optimize: u8,
) -> Result<CodeObject, CompileError> {
    Compiler::new(filename, optimize, flags).compile_module(module)
}

/// Run code generation only, returning the open instruction sequence and
/// the unit metadata of the module scope.
///
/// Nested function bodies are still compiled in full; their finished code
/// objects sit in the returned metadata's constant pool.
pub fn generate_instructions(
    module: &Module<'_>,
    filename: &str,
    flags: FeatureFlags,
    optimize: u8,
) -> Result<(InstructionSequence, CodeUnitMetadata), CompileError> {
    Compiler::new(filename, optimize, flags).generate_module(module)
}

/// Finalize a generated sequence, optimize its control-flow graph, and
/// return the relinearized result, ready for [`assemble()`](assemble::assemble).
pub fn optimize_cfg(
    seq: InstructionSequence,
    consts: &[Constant],
    nlocals: u32,
    level: u8,
) -> Result<ResolvedSequence, CompileError> {
    let resolved = seq.finalize()?;
    let mut graph = ControlFlowGraph::from_sequence(&resolved)?;
    optimize_code_unit(&mut graph, consts, nlocals, level)?;
    graph.to_sequence()
}
