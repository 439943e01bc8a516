//! CFG optimization passes.
//!
//! The passes run in a fixed order to a fixpoint: unreachable-block
//! elimination can re-expose jump simplifications and vice versa, so the
//! loop repeats until no pass reports a change. Stack-depth validation and
//! the locals check run once afterwards; they rewrite nothing.
//!
//! Exception-range compaction also lives here but operates on the
//! relinearized instruction order, so the assembler invokes it after
//! layout.

use flint_core::{CompileError, InternalError};

use crate::cfg::{BlockId, ControlFlowGraph};
use crate::instruction::{ExceptHandlerInfo, Instruction};
use crate::metadata::Constant;
use crate::opcode::Opcode;

/// The interpreter's representable stack depth limit.
pub const MAX_STACK_DEPTH: i32 = 1 << 16;

/// Rewrite budget per jump site, against pathological jump cycles.
const SIMPLIFY_FUEL: usize = 64;

/// Run the optimizer over a unit's graph.
///
/// `level` 0 keeps only the passes later stages depend on for
/// correctness; level 1 and above adds the jump rewrites and
/// branch-outcome dead-code elimination. Returns the validated maximum
/// stack depth.
pub fn optimize_code_unit(
    graph: &mut ControlFlowGraph,
    consts: &[Constant],
    nlocals: u32,
    level: u8,
) -> Result<i32, CompileError> {
    loop {
        let mut changed = eliminate_unreachable(graph);
        if level >= 1 {
            changed |= fold_constant_branches(graph, consts)?;
            changed |= simplify_jumps(graph);
        }
        if !changed {
            break;
        }
    }
    validate_locals(graph, nlocals)?;
    stackdepth(graph)
}

/// Prune blocks unreachable from the entry block.
///
/// A full reachability walk handles chains: pruning one block removes the
/// edges that kept its successors alive in the same sweep.
pub fn eliminate_unreachable(graph: &mut ControlFlowGraph) -> bool {
    let mut reachable = Vec::new();
    let mut stack = vec![graph.entry()];
    while let Some(id) = stack.pop() {
        if reachable.contains(&id) {
            continue;
        }
        reachable.push(id);
        stack.extend(graph.successors(id));
    }

    let dead: Vec<BlockId> = graph
        .live_blocks()
        .filter(|id| !reachable.contains(id))
        .collect();
    for id in &dead {
        graph.kill(*id);
    }
    !dead.is_empty()
}

/// Simplify the jump ending each block.
///
/// Three rewrites apply: threading a jump whose target is itself an
/// unconditional jump, removing a jump to the immediately following
/// block, and inverting a conditional jump that hops over a lone
/// unconditional jump. When more than one applies at a site, the rewrite
/// removing the most instructions wins; threading (which removes none)
/// runs last.
pub fn simplify_jumps(graph: &mut ControlFlowGraph) -> bool {
    let mut changed = false;
    let ids: Vec<BlockId> = graph.live_blocks().collect();
    for id in ids {
        for _ in 0..SIMPLIFY_FUEL {
            let Some(last) = graph.block(id).instrs.last().copied() else {
                break;
            };
            if !last.opcode.has_jump() {
                break;
            }
            let target = graph.block(id).jump.expect("jump without edge");

            if last.opcode == Opcode::Jump {
                // Removing the jump beats retargeting it.
                if graph.next_live(id) == Some(target) {
                    let block = graph.block_mut(id);
                    block.instrs.pop();
                    block.jump = None;
                    block.fallthrough = Some(target);
                    changed = true;
                    break;
                }
                if let Some(retarget) = thread_target(graph, target) {
                    graph.block_mut(id).jump = Some(retarget);
                    changed = true;
                    continue;
                }
                break;
            }

            // Conditional exit: invert over a lone trampoline jump first,
            // then thread.
            let fall = graph.block(id).fallthrough.expect("conditional without fallthrough");
            let fall_block = graph.block(fall);
            let lone_jump = fall_block.instrs.len() == 1
                && fall_block.instrs[0].opcode == Opcode::Jump;
            if lone_jump && graph.next_live(fall) == Some(target) {
                let around = graph.block(fall).jump.expect("jump without edge");
                let block = graph.block_mut(id);
                let last = block.instrs.last_mut().expect("conditional exit");
                last.opcode = match last.opcode {
                    Opcode::PopJumpIfFalse => Opcode::PopJumpIfTrue,
                    Opcode::PopJumpIfTrue => Opcode::PopJumpIfFalse,
                    other => other,
                };
                block.jump = Some(around);
                block.fallthrough = Some(target);
                changed = true;
                continue;
            }
            if let Some(retarget) = thread_target(graph, target) {
                graph.block_mut(id).jump = Some(retarget);
                changed = true;
                continue;
            }
            break;
        }
    }
    changed
}

/// Where a jump to `target` really lands: through empty blocks and
/// blocks holding a single unconditional jump.
fn thread_target(graph: &ControlFlowGraph, target: BlockId) -> Option<BlockId> {
    let block = graph.block(target);
    if block.instrs.is_empty() {
        let fall = block.fallthrough?;
        if fall != target {
            return Some(fall);
        }
    } else if block.instrs[0].opcode == Opcode::Jump {
        let next = block.jump?;
        if next != target {
            return Some(next);
        }
    }
    None
}

/// Remove conditional branches whose outcome is statically known.
///
/// A conditional jump immediately preceded by a constant load came from
/// upstream constant analysis; the branch is always or never taken, and
/// the unreachable arm's block is left for the reachability pass to
/// prune.
pub fn fold_constant_branches(
    graph: &mut ControlFlowGraph,
    consts: &[Constant],
) -> Result<bool, CompileError> {
    let mut changed = false;
    let ids: Vec<BlockId> = graph.live_blocks().collect();
    for id in ids {
        let block = graph.block(id);
        let n = block.instrs.len();
        if n < 2 {
            continue;
        }
        let last = block.instrs[n - 1];
        let prev = block.instrs[n - 2];
        let conditional = matches!(
            last.opcode,
            Opcode::PopJumpIfFalse | Opcode::PopJumpIfTrue
        );
        if !conditional || prev.opcode != Opcode::LoadConst {
            continue;
        }
        let value = consts
            .get(prev.oparg as usize)
            .ok_or(InternalError::IndexOutOfRange {
                table: "consts",
                index: prev.oparg,
            })?;
        let taken = value.is_truthy() == (last.opcode == Opcode::PopJumpIfTrue);

        let block = graph.block_mut(id);
        block.instrs.truncate(n - 2);
        if taken {
            block.instrs.push(Instruction {
                opcode: Opcode::Jump,
                oparg: 0,
                location: last.location,
                except_handler: last.except_handler,
                target: None,
                offset: 0,
            });
            block.fallthrough = None;
        } else {
            block.jump = None;
        }
        changed = true;
    }
    Ok(changed)
}

/// Check that every local-slot operand addresses a real slot.
pub fn validate_locals(graph: &ControlFlowGraph, nlocals: u32) -> Result<(), CompileError> {
    for id in graph.live_blocks() {
        for instr in &graph.block(id).instrs {
            if instr.opcode.has_local() && instr.oparg >= nlocals {
                return Err(InternalError::IndexOutOfRange {
                    table: "locals",
                    index: instr.oparg,
                }
                .into());
            }
        }
    }
    Ok(())
}

/// Forward data-flow pass computing per-block entry depths.
///
/// Fails fatally when two predecessors disagree on a block's entry depth
/// or the depth leaves the interpreter's representable range; both mean
/// code generation produced an inconsistent stream. Returns the maximum
/// depth reached.
pub fn stackdepth(graph: &mut ControlFlowGraph) -> Result<i32, CompileError> {
    let ids: Vec<BlockId> = graph.live_blocks().collect();
    for id in &ids {
        graph.block_mut(*id).startdepth = None;
    }

    let mut maxdepth = 0;
    let mut work = vec![(graph.entry(), 0)];
    while let Some((id, depth)) = work.pop() {
        if let Some(seen) = graph.block(id).entry_depth() {
            if seen != depth {
                return Err(InternalError::StackDepthMismatch {
                    block: id.0,
                    expected: seen,
                    found: depth,
                }
                .into());
            }
            continue;
        }
        graph.block_mut(id).startdepth = Some(depth);
        // The entry depth itself counts toward the maximum: on an
        // exception edge the unwinder materializes these values at
        // runtime without any instruction pushing them.
        if depth > MAX_STACK_DEPTH {
            return Err(InternalError::StackDepthOverflow(depth).into());
        }
        maxdepth = maxdepth.max(depth);

        let block = graph.block(id).clone();
        let mut d = depth;
        for instr in &block.instrs {
            if let Some(info) = instr.except_handler {
                let entry = info.start_depth as i32 + 1 + i32::from(info.preserve_lasti);
                work.push((BlockId(info.resolved), entry));
            }
            d += instr.opcode.stack_effect(instr.oparg);
            if d < 0 {
                return Err(InternalError::StackUnderflow(id.0).into());
            }
            if d > MAX_STACK_DEPTH {
                return Err(InternalError::StackDepthOverflow(d).into());
            }
            maxdepth = maxdepth.max(d);
        }
        if let Some(jump) = block.jump {
            work.push((jump, d));
        }
        if block.falls_through()
            && let Some(fall) = block.fallthrough
        {
            work.push((fall, d));
        }
    }
    Ok(maxdepth)
}

/// Derive compact exception ranges over a linearized instruction stream.
///
/// Consecutive instructions with identical active-handler metadata form
/// one row `(first index, last index, handler info)`; adjacent ranges
/// with identical metadata are merged by construction.
pub(crate) fn exception_ranges(
    instrs: &[Instruction],
) -> Vec<(u32, u32, ExceptHandlerInfo)> {
    let mut rows: Vec<(u32, u32, ExceptHandlerInfo)> = Vec::new();
    for (i, instr) in instrs.iter().enumerate() {
        let Some(info) = instr.except_handler else {
            continue;
        };
        match rows.last_mut() {
            Some((_, end, open)) if *end + 1 == i as u32 && open.same_handler(&info) => {
                *end = i as u32;
            }
            _ => rows.push((i as u32, i as u32, info)),
        }
    }
    rows
}
