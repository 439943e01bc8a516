//! Flint: a bytecode compiler backend.
//!
//! The crate turns an arena-allocated syntax tree into an executable
//! [`CodeObject`]: code generation lowers the tree to label-addressed
//! pseudo-instructions, the control-flow graph is built and optimized,
//! and the assembler encodes fixed-width bytecode together with the
//! exception and source-location tables.
//!
//! The staged entry points ([`generate_instructions`], [`optimize_cfg`],
//! [`assemble()`](fn@assemble)) expose the intermediate forms; [`compile`]
//! runs the whole pipeline.
//!
//! ```
//! use bumpalo::Bump;
//! use flint::ast::{Expr, Literal, Module, Stmt};
//! use flint::{FeatureFlags, SrcLocation, compile};
//!
//! let arena = Bump::new();
//! let mut module = Module::new(&arena);
//! module.body.push(Stmt::Expr {
//!     value: Expr::Literal {
//!         value: Literal::Int(42),
//!         location: SrcLocation::line(1, 0),
//!     },
//! });
//!
//! let code = compile(&module, "<example>", FeatureFlags::empty(), 1).unwrap();
//! assert!(code.num_units() > 0);
//! ```

pub use flint_core::{
    CodeFlags, CompileError, FeatureFlags, InternalError, NO_LOCATION, SrcLocation,
};

pub use flint_compiler::{
    BasicBlock, BlockId, CmpOp, CodeObject, CodeUnitMetadata, Compiler, Constant,
    ControlFlowGraph, ExceptHandlerInfo, ExceptionTableEntry, Instruction, InstructionSequence,
    Label, LocationEntry, MAX_NESTING, MAX_STACK_DEPTH, MAX_TABLE_LEN, Opcode, ResolvedSequence,
    TABLE_LIMIT, assemble, compile, generate_instructions, is_valid_opcode, optimize_cfg,
    optimize_code_unit, stackdepth,
};

pub use flint_compiler::ast;
