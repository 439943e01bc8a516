//! The final compilation artifact.
//!
//! A [`CodeObject`] is immutable once built: the interpreter executes it
//! without re-validation, so every table in it must already be consistent
//! with the bytecode when the assembler hands it over.

use flint_core::{CodeFlags, SrcLocation};

use crate::metadata::Constant;

/// One row of the compact exception table.
///
/// Covers the instructions whose first code-unit offsets fall in
/// `start..=end` and routes their unwinds to `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    /// First covered code-unit offset.
    pub start: u32,
    /// Last covered code-unit offset (inclusive).
    pub end: u32,
    /// Code-unit offset of the handler.
    pub target: u32,
    /// Stack depth the handler expects beneath the pushed exception.
    pub depth: u32,
    /// Preserve the last-executed-instruction offset across the unwind.
    pub preserve_lasti: bool,
}

/// One run of the source-location table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationEntry {
    /// The shared location.
    pub location: SrcLocation,
    /// How many consecutive instructions carry it.
    pub count: u32,
}

/// The executable artifact for one compilation unit.
///
/// Owned solely by the caller once returned; the sequence, CFG, and
/// metadata that produced it are already gone.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeObject {
    /// Flat bytecode, two bytes per code unit.
    pub code: Vec<u8>,
    /// Constant pool in assigned-index order.
    pub consts: Vec<Constant>,
    /// Name table in assigned-index order.
    pub names: Vec<String>,
    /// Local variable table in slot order.
    pub varnames: Vec<String>,
    /// Cell variable table in slot order.
    pub cellvars: Vec<String>,
    /// Free variable table in slot order.
    pub freevars: Vec<String>,
    /// Compact exception table.
    pub exception_table: Vec<ExceptionTableEntry>,
    /// Run-length compressed per-instruction source locations.
    pub locations: Vec<LocationEntry>,
    /// Maximum value-stack depth the unit can reach.
    pub stacksize: u32,
    /// Combined local + cell + free slot count.
    pub nlocalsplus: u32,
    /// Total argument count.
    pub argcount: u32,
    /// Positional-only argument count.
    pub posonlyargcount: u32,
    /// Keyword-only argument count.
    pub kwonlyargcount: u32,
    /// Properties the interpreter inspects before execution.
    pub flags: CodeFlags,
    /// Source file the unit came from.
    pub filename: String,
    /// Unqualified unit name.
    pub name: String,
    /// Dot-separated qualified name.
    pub qualname: String,
    /// First source line of the unit.
    pub firstlineno: i32,
}

impl CodeObject {
    /// Number of code units in the bytecode.
    pub fn num_units(&self) -> usize {
        self.code.len() / 2
    }

    /// Decode the unit at a code-unit offset as (opcode byte, arg byte).
    pub fn unit_at(&self, offset: usize) -> Option<(u8, u8)> {
        let byte = offset * 2;
        Some((*self.code.get(byte)?, *self.code.get(byte + 1)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_access() {
        let code = CodeObject {
            code: vec![9, 0, 23, 1],
            consts: Vec::new(),
            names: Vec::new(),
            varnames: Vec::new(),
            cellvars: Vec::new(),
            freevars: Vec::new(),
            exception_table: Vec::new(),
            locations: Vec::new(),
            stacksize: 0,
            nlocalsplus: 0,
            argcount: 0,
            posonlyargcount: 0,
            kwonlyargcount: 0,
            flags: CodeFlags::empty(),
            filename: "<test>".into(),
            name: "<module>".into(),
            qualname: "<module>".into(),
            firstlineno: 1,
        };
        assert_eq!(code.num_units(), 2);
        assert_eq!(code.unit_at(1), Some((23, 1)));
        assert_eq!(code.unit_at(2), None);
    }
}
