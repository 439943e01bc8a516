//! Final assembly of a linearized sequence into a [`CodeObject`].
//!
//! Every instruction becomes one two-byte code unit, preceded by
//! [`Opcode::ExtendedArg`] prefix units when its operand exceeds one byte.
//! Jump operands become absolute code-unit offsets; since widening one
//! operand can move every later offset, offset assignment iterates until
//! no width changes. The exception table and the run-length location
//! table are derived from the same final offsets.
//!
//! Assembly is deterministic: the same sequence and metadata always
//! produce byte-identical output.

use flint_core::{CodeFlags, CompileError, InternalError, SrcLocation};

use crate::cfg::ControlFlowGraph;
use crate::code::{CodeObject, ExceptionTableEntry, LocationEntry};
use crate::instruction::{Instruction, ResolvedSequence};
use crate::metadata::CodeUnitMetadata;
use crate::opcode::Opcode;
use crate::optimize::{exception_ranges, stackdepth};

/// Number of `ExtendedArg` prefix units an operand needs.
fn extended_args(arg: u32) -> u32 {
    match arg {
        0..=0xFF => 0,
        0x100..=0xFFFF => 1,
        0x1_0000..=0xFF_FFFF => 2,
        _ => 3,
    }
}

/// The final encoded operand of instruction `i`: the target's code-unit
/// offset for jumps, the stored operand otherwise.
fn operand_value(instrs: &[Instruction], i: usize) -> u32 {
    let instr = &instrs[i];
    if instr.opcode.has_jump() {
        instrs[instr.oparg as usize].offset
    } else {
        instr.oparg
    }
}

/// Append one code unit, extending the current location run or opening a
/// new one.
fn push_unit(
    code: &mut Vec<u8>,
    locations: &mut Vec<LocationEntry>,
    opcode: u8,
    arg: u8,
    location: SrcLocation,
) {
    code.push(opcode);
    code.push(arg);
    match locations.last_mut() {
        Some(run) if run.location == location => run.count += 1,
        _ => locations.push(LocationEntry { location, count: 1 }),
    }
}

/// Properties the interpreter inspects before executing the unit.
fn compute_code_flags(metadata: &CodeUnitMetadata, instrs: &[Instruction]) -> CodeFlags {
    let mut flags = CodeFlags::empty();
    if metadata.is_function {
        flags |= CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS;
    }
    if metadata.has_varargs {
        flags |= CodeFlags::VARARGS;
    }
    if metadata.has_varkeywords {
        flags |= CodeFlags::VARKEYWORDS;
    }
    if metadata.qualname().contains('.') {
        flags |= CodeFlags::NESTED;
    }
    if instrs.iter().any(|i| i.opcode == Opcode::YieldValue) {
        flags |= CodeFlags::GENERATOR;
    }
    flags
}

/// Check every index operand against the table it addresses.
///
/// A bad index here means code generation and the metadata disagree; the
/// interpreter indexes these tables unchecked, so the defect must be
/// caught now.
fn validate_operands(
    instrs: &[Instruction],
    metadata: &CodeUnitMetadata,
) -> Result<(), CompileError> {
    let nfree = (metadata.cellvars().len() + metadata.freevars().len()) as u32;
    for instr in instrs {
        let (table, limit) = if instr.opcode.has_const() {
            ("consts", metadata.consts().len() as u32)
        } else if instr.opcode.has_name() {
            ("names", metadata.names().len() as u32)
        } else if instr.opcode.has_local() {
            ("locals", metadata.varnames().len() as u32)
        } else if instr.opcode.has_free() {
            ("cells and frees", nfree)
        } else {
            continue;
        };
        if instr.oparg >= limit {
            return Err(InternalError::IndexOutOfRange {
                table,
                index: instr.oparg,
            }
            .into());
        }
    }
    Ok(())
}

/// Assign each instruction its code-unit offset, iterating until the
/// `ExtendedArg` widths stop changing.
///
/// Widening a jump operand can push later instructions to larger offsets,
/// which can widen further operands; widths only ever grow, so the loop
/// terminates.
fn assign_offsets(instrs: &mut [Instruction]) {
    loop {
        let mut changed = false;
        let mut offset: u32 = 0;
        for i in 0..instrs.len() {
            if instrs[i].offset != offset {
                instrs[i].offset = offset;
                changed = true;
            }
            let arg = operand_value(instrs, i);
            offset += 1 + extended_args(arg);
        }
        if !changed {
            break;
        }
    }
}

/// Assemble a finalized, pseudo-free sequence into a code object.
///
/// The sequence must be the linearization of an optimized graph: jump
/// operands are instruction offsets and handler metadata sits on the
/// covered instructions themselves.
pub fn assemble(
    metadata: &CodeUnitMetadata,
    filename: &str,
    seq: &ResolvedSequence,
) -> Result<CodeObject, CompileError> {
    let mut instrs: Vec<Instruction> = seq.instructions().to_vec();
    let n = instrs.len();
    for instr in &instrs {
        if instr.opcode.is_pseudo() {
            return Err(InternalError::PseudoInstruction.into());
        }
        if instr.opcode.has_jump() && instr.oparg as usize >= n {
            return Err(InternalError::MisalignedJumpTarget(instr.oparg).into());
        }
        if let Some(info) = instr.except_handler
            && info.resolved as usize >= n
        {
            return Err(InternalError::MisalignedJumpTarget(info.resolved).into());
        }
    }
    validate_operands(&instrs, metadata)?;

    let mut graph = ControlFlowGraph::from_sequence(seq)?;
    let stacksize = stackdepth(&mut graph)? as u32;

    assign_offsets(&mut instrs);

    let mut code = Vec::with_capacity(n * 2);
    let mut locations = Vec::new();
    for i in 0..n {
        let instr = instrs[i];
        let arg = operand_value(&instrs, i);
        for shift in (1..=extended_args(arg)).rev() {
            push_unit(
                &mut code,
                &mut locations,
                Opcode::ExtendedArg.into(),
                (arg >> (8 * shift)) as u8,
                instr.location,
            );
        }
        push_unit(
            &mut code,
            &mut locations,
            instr.opcode.into(),
            arg as u8,
            instr.location,
        );
    }

    let exception_table = exception_ranges(&instrs)
        .into_iter()
        .map(|(start, end, info)| ExceptionTableEntry {
            start: instrs[start as usize].offset,
            end: instrs[end as usize].offset,
            target: instrs[info.resolved as usize].offset,
            depth: info.start_depth,
            preserve_lasti: info.preserve_lasti,
        })
        .collect();

    let flags = compute_code_flags(metadata, &instrs);
    Ok(CodeObject {
        code,
        consts: metadata.consts().to_vec(),
        names: metadata.names().to_vec(),
        varnames: metadata.varnames().to_vec(),
        cellvars: metadata.cellvars().to_vec(),
        freevars: metadata.freevars().to_vec(),
        exception_table,
        locations,
        stacksize,
        nlocalsplus: metadata.nlocalsplus(),
        argcount: metadata.argcount,
        posonlyargcount: metadata.posonlyargcount,
        kwonlyargcount: metadata.kwonlyargcount,
        flags,
        filename: filename.to_owned(),
        name: metadata.name.clone(),
        qualname: metadata.qualname().to_owned(),
        firstlineno: metadata.firstlineno,
    })
}
