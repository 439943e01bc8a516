//! Pseudo-instructions and the label-addressable instruction sequence.
//!
//! Code generation appends instructions whose jump operands are symbolic
//! [`Label`] ids. Once a unit is fully generated the sequence is finalized:
//! the label map rewrites every jump operand to a resolved instruction
//! offset, and the sequence becomes a [`ResolvedSequence`] — the only form
//! the CFG builder accepts. Unresolved operands past that point are a type
//! error, not a runtime check.

use flint_core::{CompileError, InternalError, SrcLocation};

use crate::opcode::Opcode;

/// A symbolic jump target, resolved to an instruction offset at finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

/// Ceiling for every growable table in the pipeline.
pub const MAX_TABLE_LEN: usize = 1 << 24;

const DEFAULT_INSTR_CAPACITY: usize = 32;
const DEFAULT_LABEL_CAPACITY: usize = 8;

/// Label id not yet bound to an offset.
const UNBOUND: i32 = -1;

/// Grow a table so that `idx` is addressable, doubling from `default_alloc`.
///
/// Backs every growable table in the pipeline: instructions, the label map,
/// and the locals-plus slot table. Fails once the ceiling is reached.
pub(crate) fn ensure_table_capacity<T>(
    idx: usize,
    table: &mut Vec<T>,
    default_alloc: usize,
) -> Result<(), InternalError> {
    if idx >= MAX_TABLE_LEN {
        return Err(InternalError::TableOverflow(MAX_TABLE_LEN));
    }
    if idx >= table.capacity() {
        let mut new_cap = table.capacity().max(default_alloc);
        while new_cap <= idx {
            new_cap *= 2;
        }
        table.reserve(new_cap - table.len());
    }
    Ok(())
}

/// Exception-handler metadata attached to an instruction.
///
/// Instructions inside a protected region record the handler they unwind
/// to, the stack depth the handler expects underneath the pushed exception,
/// and whether the offset of the last executed instruction must be kept for
/// traceback accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptHandlerInfo {
    /// Symbolic label of the handler's first instruction.
    pub target: Label,
    /// Stack depth at entry to the protected region.
    pub start_depth: u32,
    /// Preserve the last-executed-instruction offset across the unwind.
    pub preserve_lasti: bool,
    /// Resolved handler address. Instruction offset after finalize, block
    /// id inside the CFG; `target` stays symbolic so re-resolution is a
    /// no-op.
    pub(crate) resolved: u32,
}

impl ExceptHandlerInfo {
    /// Handler metadata with an unresolved target.
    pub fn new(target: Label, start_depth: u32, preserve_lasti: bool) -> Self {
        Self {
            target,
            start_depth,
            preserve_lasti,
            resolved: 0,
        }
    }

    /// Whether two infos describe the same handler row.
    pub(crate) fn same_handler(&self, other: &Self) -> bool {
        self.resolved == other.resolved
            && self.start_depth == other.start_depth
            && self.preserve_lasti == other.preserve_lasti
    }
}

/// A single pseudo-instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// The operation code.
    pub opcode: Opcode,
    /// Integer operand; for jumps, a label id while the sequence is open
    /// and an instruction offset once resolved.
    pub oparg: u32,
    /// Source range this instruction was generated from.
    pub location: SrcLocation,
    /// Active handler metadata, if any.
    pub except_handler: Option<ExceptHandlerInfo>,
    /// Symbolic jump target; source of truth for operand resolution.
    pub(crate) target: Option<Label>,
    /// Code-unit offset, populated by the assembler.
    pub(crate) offset: u32,
}

impl Instruction {
    fn new(opcode: Opcode, oparg: u32, location: SrcLocation) -> Self {
        Self {
            opcode,
            oparg,
            location,
            except_handler: None,
            target: None,
            offset: 0,
        }
    }
}

/// An open, growable, label-addressable instruction buffer.
///
/// The code generator's output format. Labels are declared with
/// [`new_label`](Self::new_label), bound with [`use_label`](Self::use_label)
/// and consumed by [`finalize`](Self::finalize).
#[derive(Debug, Clone, Default)]
pub struct InstructionSequence {
    instrs: Vec<Instruction>,
    /// label id -> instruction offset, UNBOUND until `use_label`.
    labelmap: Vec<i32>,
    next_label: u32,
}

impl InstructionSequence {
    /// Create an empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instructions appended so far.
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    /// Whether no instruction has been appended.
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// The instructions appended so far.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instrs
    }

    /// Declare a fresh label.
    pub fn new_label(&mut self) -> Result<Label, CompileError> {
        let id = self.next_label;
        ensure_table_capacity(id as usize, &mut self.labelmap, DEFAULT_LABEL_CAPACITY)?;
        self.labelmap.push(UNBOUND);
        self.next_label += 1;
        Ok(Label(id))
    }

    /// Bind a label to the current position.
    ///
    /// Fails if the label was never declared or is already bound.
    pub fn use_label(&mut self, label: Label) -> Result<(), CompileError> {
        let slot = self
            .labelmap
            .get_mut(label.0 as usize)
            .ok_or(InternalError::UnboundLabel(label.0))?;
        if *slot != UNBOUND {
            return Err(InternalError::LabelRebound(label.0).into());
        }
        *slot = self.instrs.len() as i32;
        Ok(())
    }

    /// Append a non-jump instruction.
    pub fn add_op(
        &mut self,
        opcode: Opcode,
        oparg: u32,
        location: SrcLocation,
    ) -> Result<(), CompileError> {
        debug_assert!(!opcode.has_jump(), "jumps must be appended with add_jump");
        self.push(Instruction::new(opcode, oparg, location))
    }

    /// Append an instruction from a raw opcode byte, validating it against
    /// the operation-code table.
    pub fn add_op_raw(
        &mut self,
        opcode: u8,
        oparg: u32,
        location: SrcLocation,
    ) -> Result<(), CompileError> {
        let opcode = Opcode::try_from(opcode).map_err(|_| InternalError::InvalidOpcode(opcode))?;
        self.push(Instruction::new(opcode, oparg, location))
    }

    /// Append a jump to a declared label.
    pub fn add_jump(
        &mut self,
        opcode: Opcode,
        target: Label,
        location: SrcLocation,
    ) -> Result<(), CompileError> {
        debug_assert!(opcode.has_jump() && !opcode.is_pseudo());
        let mut instr = Instruction::new(opcode, target.0, location);
        instr.target = Some(target);
        self.push(instr)
    }

    /// Append a handler-push pseudo-instruction carrying the handler's
    /// label, expected entry depth, and lasti-preservation flag.
    pub fn add_setup_handler(
        &mut self,
        handler: Label,
        start_depth: u32,
        preserve_lasti: bool,
        location: SrcLocation,
    ) -> Result<(), CompileError> {
        let mut instr = Instruction::new(Opcode::SetupHandler, handler.0, location);
        instr.target = Some(handler);
        instr.except_handler = Some(ExceptHandlerInfo::new(handler, start_depth, preserve_lasti));
        self.push(instr)
    }

    /// Append a handler-pop pseudo-instruction.
    pub fn add_pop_handler(&mut self, location: SrcLocation) -> Result<(), CompileError> {
        self.push(Instruction::new(Opcode::PopHandler, 0, location))
    }

    /// Append an already-formed instruction; used when relinearizing the
    /// CFG, where handler metadata and jump labels are carried over.
    pub(crate) fn add_instruction(&mut self, instr: Instruction) -> Result<(), CompileError> {
        self.push(instr)
    }

    fn push(&mut self, instr: Instruction) -> Result<(), CompileError> {
        ensure_table_capacity(self.instrs.len(), &mut self.instrs, DEFAULT_INSTR_CAPACITY)?;
        self.instrs.push(instr);
        Ok(())
    }

    /// Rewrite every jump operand from symbolic label id to the bound
    /// instruction offset.
    ///
    /// Resolution always reads the symbolic target, so re-applying the map
    /// produces identical offsets. A referenced label that was never bound
    /// is a fatal internal error, never offset 0.
    pub fn apply_label_map(&mut self) -> Result<(), CompileError> {
        for instr in &mut self.instrs {
            if let Some(label) = instr.target {
                instr.oparg = Self::lookup(&self.labelmap, label)?;
            }
            if let Some(info) = &mut instr.except_handler {
                info.resolved = Self::lookup(&self.labelmap, info.target)?;
            }
        }
        Ok(())
    }

    fn lookup(labelmap: &[i32], label: Label) -> Result<u32, CompileError> {
        match labelmap.get(label.0 as usize) {
            Some(&offset) if offset != UNBOUND => Ok(offset as u32),
            _ => Err(InternalError::UnboundLabel(label.0).into()),
        }
    }

    /// Apply the label map and seal the sequence.
    pub fn finalize(mut self) -> Result<ResolvedSequence, CompileError> {
        self.apply_label_map()?;
        Ok(ResolvedSequence {
            instrs: self.instrs,
        })
    }
}

/// A finalized sequence whose jump operands are instruction offsets.
///
/// This is the only input the CFG builder accepts; an open sequence cannot
/// reach it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedSequence {
    pub(crate) instrs: Vec<Instruction>,
}

impl ResolvedSequence {
    /// The resolved instructions.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instrs
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    /// Whether the sequence holds no instructions.
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flint_core::NO_LOCATION;

    fn loc() -> SrcLocation {
        SrcLocation::line(1, 0)
    }

    #[test]
    fn append_and_read_back() {
        let mut seq = InstructionSequence::new();
        seq.add_op(Opcode::LoadConst, 0, loc()).unwrap();
        seq.add_op(Opcode::ReturnValue, 0, NO_LOCATION).unwrap();

        assert_eq!(seq.len(), 2);
        assert_eq!(seq.instructions()[0].opcode, Opcode::LoadConst);
        assert_eq!(seq.instructions()[1].location, NO_LOCATION);
    }

    #[test]
    fn raw_append_validates_opcode() {
        let mut seq = InstructionSequence::new();
        assert!(seq.add_op_raw(u8::from(Opcode::Nop), 0, loc()).is_ok());
        let err = seq.add_op_raw(250, 0, loc()).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn labels_resolve_to_offsets() {
        let mut seq = InstructionSequence::new();
        let target = seq.new_label().unwrap();
        seq.add_jump(Opcode::Jump, target, loc()).unwrap();
        seq.add_op(Opcode::Nop, 0, loc()).unwrap();
        seq.use_label(target).unwrap();
        seq.add_op(Opcode::ReturnValue, 0, loc()).unwrap();

        let resolved = seq.finalize().unwrap();
        assert_eq!(resolved.instructions()[0].oparg, 2);
    }

    #[test]
    fn apply_label_map_is_idempotent() {
        let mut seq = InstructionSequence::new();
        let target = seq.new_label().unwrap();
        seq.add_op(Opcode::Nop, 0, loc()).unwrap();
        seq.add_jump(Opcode::PopJumpIfFalse, target, loc()).unwrap();
        seq.use_label(target).unwrap();
        seq.add_op(Opcode::ReturnValue, 0, loc()).unwrap();

        let mut once = seq.clone();
        once.apply_label_map().unwrap();
        let mut twice = seq;
        twice.apply_label_map().unwrap();
        twice.apply_label_map().unwrap();

        assert_eq!(once.instructions(), twice.instructions());
    }

    #[test]
    fn unbound_label_is_fatal_not_offset_zero() {
        let mut seq = InstructionSequence::new();
        let dangling = seq.new_label().unwrap();
        seq.add_jump(Opcode::Jump, dangling, loc()).unwrap();

        let err = seq.finalize().unwrap_err();
        assert_eq!(
            err,
            CompileError::Internal(InternalError::UnboundLabel(dangling.0))
        );
    }

    #[test]
    fn rebinding_a_label_fails() {
        let mut seq = InstructionSequence::new();
        let label = seq.new_label().unwrap();
        seq.use_label(label).unwrap();
        seq.add_op(Opcode::Nop, 0, loc()).unwrap();
        let err = seq.use_label(label).unwrap_err();
        assert_eq!(err, CompileError::Internal(InternalError::LabelRebound(0)));
    }

    #[test]
    fn handler_labels_resolve_too() {
        let mut seq = InstructionSequence::new();
        let handler = seq.new_label().unwrap();
        seq.add_setup_handler(handler, 0, false, loc()).unwrap();
        seq.add_op(Opcode::Nop, 0, loc()).unwrap();
        seq.add_pop_handler(loc()).unwrap();
        seq.use_label(handler).unwrap();
        seq.add_op(Opcode::PopTop, 0, loc()).unwrap();
        seq.add_op(Opcode::ReturnValue, 0, loc()).unwrap();

        let resolved = seq.finalize().unwrap();
        let info = resolved.instructions()[0].except_handler.unwrap();
        assert_eq!(info.resolved, 3);
    }

    #[test]
    fn growth_helper_enforces_ceiling() {
        let mut table: Vec<u8> = Vec::new();
        assert!(ensure_table_capacity(0, &mut table, 4).is_ok());
        assert!(table.capacity() >= 4);
        let err = ensure_table_capacity(MAX_TABLE_LEN, &mut table, 4).unwrap_err();
        assert_eq!(err, InternalError::TableOverflow(MAX_TABLE_LEN));
    }
}
