//! Bytecode operation codes.
//!
//! This module defines the instruction set for the Flint VM together with
//! the classification queries the rest of the pipeline (and external
//! tooling) relies on: which opcodes take an operand, what kind of operand
//! it is, and how each opcode moves the value stack.
//!
//! Encoding is fixed-width: every instruction is one two-byte unit holding
//! the opcode and the low byte of its operand. Operands wider than one byte
//! are carried by [`Opcode::ExtendedArg`] prefix units.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Bytecode operation codes.
///
/// The VM is a stack-based machine. Most operations pop operands from the
/// stack and push results back. The two pseudo-opcodes at the end of the
/// table exist only between code generation and CFG construction; they
/// carry exception-handler metadata and never reach the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    /// Do nothing.
    Nop = 0,
    /// Pop top of stack.
    PopTop,
    /// Swap top of stack with the value N slots down.
    /// Operand: slot distance
    Swap,

    // =========================================================================
    // Unary / binary operations
    // =========================================================================
    /// Arithmetic negation of top of stack.
    UnaryNegative,
    /// Logical negation of top of stack.
    UnaryNot,
    /// Pop two values, push their sum.
    BinaryAdd,
    /// Pop two values, push their difference.
    BinarySubtract,
    /// Pop two values, push their product.
    BinaryMultiply,
    /// Pop two values, push their quotient.
    BinaryDivide,
    /// Pop two values, push the remainder.
    BinaryModulo,
    /// Pop two values, push a comparison result.
    /// Operand: comparison id (see [`CmpOp`])
    CompareOp,

    // =========================================================================
    // Loads and stores
    // =========================================================================
    /// Push a constant from the pool.
    /// Operand: constant index
    LoadConst,
    /// Load by name lookup.
    /// Operand: name index
    LoadName,
    /// Store by name.
    /// Operand: name index
    StoreName,
    /// Load from the global scope.
    /// Operand: name index
    LoadGlobal,
    /// Store into the global scope.
    /// Operand: name index
    StoreGlobal,
    /// Load a local by frame slot.
    /// Operand: local slot
    LoadFast,
    /// Store a local by frame slot.
    /// Operand: local slot
    StoreFast,
    /// Load a cell or free variable.
    /// Operand: cell/free slot
    LoadDeref,
    /// Store a cell or free variable.
    /// Operand: cell/free slot
    StoreDeref,

    // =========================================================================
    // Functions and control transfer
    // =========================================================================
    /// Pop a code object, push a function made from it.
    MakeFunction,
    /// Call the function below N arguments.
    /// Operand: argument count
    CallFunction,
    /// Return the top of stack from the unit.
    ReturnValue,
    /// Suspend the unit, yielding top of stack.
    YieldValue,
    /// Raise with N operands popped from the stack.
    /// Operand: operand count
    RaiseVarargs,
    /// Pop the current exception after a handled raise.
    PopExcept,
    /// Re-raise the exception on top of stack.
    Reraise,

    // =========================================================================
    // Jumps
    // =========================================================================
    /// Unconditional jump.
    /// Operand: label id while open, target instruction offset once resolved
    Jump,
    /// Pop top of stack, jump if false.
    /// Operand: as for [`Opcode::Jump`]
    PopJumpIfFalse,
    /// Pop top of stack, jump if true.
    /// Operand: as for [`Opcode::Jump`]
    PopJumpIfTrue,
    /// Prefix unit carrying the next instruction's high operand bits.
    /// Operand: high-order operand byte
    ExtendedArg,

    // =========================================================================
    // Pseudo-instructions (removed during CFG construction)
    // =========================================================================
    /// Begin a protected region; carries the handler's label, expected
    /// entry depth, and lasti-preservation flag as handler metadata.
    SetupHandler,
    /// End the innermost protected region.
    PopHandler,
}

/// Comparison ids carried by [`Opcode::CompareOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CmpOp {
    Eq = 0,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Opcode {
    /// Whether this opcode takes an operand.
    pub fn has_arg(self) -> bool {
        matches!(
            self,
            Opcode::Swap
                | Opcode::CompareOp
                | Opcode::LoadConst
                | Opcode::LoadName
                | Opcode::StoreName
                | Opcode::LoadGlobal
                | Opcode::StoreGlobal
                | Opcode::LoadFast
                | Opcode::StoreFast
                | Opcode::LoadDeref
                | Opcode::StoreDeref
                | Opcode::CallFunction
                | Opcode::RaiseVarargs
                | Opcode::Jump
                | Opcode::PopJumpIfFalse
                | Opcode::PopJumpIfTrue
                | Opcode::ExtendedArg
                | Opcode::SetupHandler
        )
    }

    /// Whether the operand is a constant-pool index.
    pub fn has_const(self) -> bool {
        matches!(self, Opcode::LoadConst)
    }

    /// Whether the operand is a name-table index.
    pub fn has_name(self) -> bool {
        matches!(
            self,
            Opcode::LoadName | Opcode::StoreName | Opcode::LoadGlobal | Opcode::StoreGlobal
        )
    }

    /// Whether the operand is a jump target.
    pub fn has_jump(self) -> bool {
        matches!(
            self,
            Opcode::Jump | Opcode::PopJumpIfFalse | Opcode::PopJumpIfTrue | Opcode::SetupHandler
        )
    }

    /// Whether the operand is a local frame slot.
    pub fn has_local(self) -> bool {
        matches!(self, Opcode::LoadFast | Opcode::StoreFast)
    }

    /// Whether the operand is a cell/free variable slot.
    pub fn has_free(self) -> bool {
        matches!(self, Opcode::LoadDeref | Opcode::StoreDeref)
    }

    /// Whether this opcode pushes an exception-handler region.
    pub fn has_exc(self) -> bool {
        matches!(self, Opcode::SetupHandler)
    }

    /// Whether this opcode exists only before CFG construction.
    pub fn is_pseudo(self) -> bool {
        matches!(self, Opcode::SetupHandler | Opcode::PopHandler)
    }

    /// Whether control never falls through to the following instruction.
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Jump | Opcode::ReturnValue | Opcode::RaiseVarargs | Opcode::Reraise
        )
    }

    /// Whether this opcode ends a basic block.
    ///
    /// Conditional jumps end a block but still fall through on the other
    /// arm; terminators end a block with no fallthrough.
    pub fn ends_block(self) -> bool {
        self.is_terminator() || matches!(self, Opcode::PopJumpIfFalse | Opcode::PopJumpIfTrue)
    }

    /// Net effect of this instruction on the value stack.
    pub fn stack_effect(self, oparg: u32) -> i32 {
        match self {
            Opcode::Nop | Opcode::Swap | Opcode::ExtendedArg => 0,
            Opcode::UnaryNegative | Opcode::UnaryNot => 0,
            Opcode::PopTop => -1,
            Opcode::BinaryAdd
            | Opcode::BinarySubtract
            | Opcode::BinaryMultiply
            | Opcode::BinaryDivide
            | Opcode::BinaryModulo
            | Opcode::CompareOp => -1,
            Opcode::LoadConst
            | Opcode::LoadName
            | Opcode::LoadGlobal
            | Opcode::LoadFast
            | Opcode::LoadDeref => 1,
            Opcode::StoreName | Opcode::StoreGlobal | Opcode::StoreFast | Opcode::StoreDeref => -1,
            // code object in, function out
            Opcode::MakeFunction => 0,
            // callee plus args in, result out
            Opcode::CallFunction => -(oparg as i32),
            Opcode::ReturnValue => -1,
            // value yielded, sent value pushed on resume
            Opcode::YieldValue => 0,
            Opcode::RaiseVarargs => -(oparg as i32),
            Opcode::PopExcept | Opcode::Reraise => -1,
            Opcode::Jump => 0,
            Opcode::PopJumpIfFalse | Opcode::PopJumpIfTrue => -1,
            Opcode::SetupHandler | Opcode::PopHandler => 0,
        }
    }

    /// Get the name of this opcode for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::PopTop => "POP_TOP",
            Opcode::Swap => "SWAP",
            Opcode::UnaryNegative => "UNARY_NEGATIVE",
            Opcode::UnaryNot => "UNARY_NOT",
            Opcode::BinaryAdd => "BINARY_ADD",
            Opcode::BinarySubtract => "BINARY_SUBTRACT",
            Opcode::BinaryMultiply => "BINARY_MULTIPLY",
            Opcode::BinaryDivide => "BINARY_DIVIDE",
            Opcode::BinaryModulo => "BINARY_MODULO",
            Opcode::CompareOp => "COMPARE_OP",
            Opcode::LoadConst => "LOAD_CONST",
            Opcode::LoadName => "LOAD_NAME",
            Opcode::StoreName => "STORE_NAME",
            Opcode::LoadGlobal => "LOAD_GLOBAL",
            Opcode::StoreGlobal => "STORE_GLOBAL",
            Opcode::LoadFast => "LOAD_FAST",
            Opcode::StoreFast => "STORE_FAST",
            Opcode::LoadDeref => "LOAD_DEREF",
            Opcode::StoreDeref => "STORE_DEREF",
            Opcode::MakeFunction => "MAKE_FUNCTION",
            Opcode::CallFunction => "CALL_FUNCTION",
            Opcode::ReturnValue => "RETURN_VALUE",
            Opcode::YieldValue => "YIELD_VALUE",
            Opcode::RaiseVarargs => "RAISE_VARARGS",
            Opcode::PopExcept => "POP_EXCEPT",
            Opcode::Reraise => "RERAISE",
            Opcode::Jump => "JUMP",
            Opcode::PopJumpIfFalse => "POP_JUMP_IF_FALSE",
            Opcode::PopJumpIfTrue => "POP_JUMP_IF_TRUE",
            Opcode::ExtendedArg => "EXTENDED_ARG",
            Opcode::SetupHandler => "SETUP_HANDLER",
            Opcode::PopHandler => "POP_HANDLER",
        }
    }
}

/// Whether a raw byte names a valid opcode.
pub fn is_valid_opcode(byte: u8) -> bool {
    Opcode::try_from(byte).is_ok()
}
