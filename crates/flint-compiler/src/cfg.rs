//! Control-flow graph construction.
//!
//! Partitions a [`ResolvedSequence`] into basic blocks: maximal
//! straight-line runs split at the sequence head, at every jump or handler
//! target, and after every control-transferring instruction. Blocks live in
//! an id-addressed arena and refer to one another by [`BlockId`], so
//! optimization passes can add and remove blocks without dangling
//! references.
//!
//! Handler push/pop pseudo-instructions are consumed here: instructions
//! between a push and its matching pop carry the handler's metadata, and
//! the pseudo-ops themselves never enter a block.

use flint_core::{CompileError, InternalError, NO_LOCATION};

use crate::instruction::{Instruction, InstructionSequence, Label, ResolvedSequence};
use crate::opcode::Opcode;

/// Stable handle to a block in the graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

/// A maximal straight-line instruction run with one set of successor edges.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    /// This block's arena handle.
    pub id: BlockId,
    /// The block's instructions, in order. Handler metadata on each
    /// instruction holds a block id in its `resolved` slot while the graph
    /// exists.
    pub instrs: Vec<Instruction>,
    /// Fallthrough successor, if control can run off the end.
    pub fallthrough: Option<BlockId>,
    /// Explicit target of the final jump instruction, if any.
    pub jump: Option<BlockId>,
    /// Entry stack depth, once the depth pass has run.
    pub(crate) startdepth: Option<i32>,
    /// Cleared when the block is pruned; dead blocks stay in the arena so
    /// ids remain stable.
    pub(crate) alive: bool,
}

impl BasicBlock {
    fn new(id: BlockId) -> Self {
        Self {
            id,
            instrs: Vec::new(),
            fallthrough: None,
            jump: None,
            startdepth: None,
            alive: true,
        }
    }

    /// Whether control can fall off the end of this block.
    pub fn falls_through(&self) -> bool {
        self.instrs
            .last()
            .is_none_or(|instr| !instr.opcode.is_terminator())
    }

    /// Entry stack depth computed by the depth pass.
    pub fn entry_depth(&self) -> Option<i32> {
        self.startdepth
    }

    /// Exit stack depth: entry depth plus the net effect of the block.
    pub fn exit_depth(&self) -> Option<i32> {
        let mut depth = self.startdepth?;
        for instr in &self.instrs {
            depth += instr.opcode.stack_effect(instr.oparg);
        }
        Some(depth)
    }
}

/// The set of basic blocks for one unit, plus their control edges.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlFlowGraph {
    blocks: Vec<BasicBlock>,
    entry: BlockId,
}

impl ControlFlowGraph {
    /// Partition a finalized sequence into blocks.
    ///
    /// Fails fatally if a jump operand does not land on a block boundary
    /// or if handler pseudo-instructions do not nest.
    pub fn from_sequence(seq: &ResolvedSequence) -> Result<Self, CompileError> {
        let instrs = seq.instructions();
        let n = instrs.len();

        // Pass 1: block boundaries at the head, at every jump/handler
        // target, and after every control transfer.
        let mut boundary = vec![false; n + 1];
        boundary[0] = true;
        for (i, instr) in instrs.iter().enumerate() {
            if instr.opcode.has_jump() {
                let target = instr.oparg as usize;
                if target >= n {
                    return Err(InternalError::MisalignedJumpTarget(instr.oparg).into());
                }
                boundary[target] = true;
            }
            if let Some(info) = instr.except_handler {
                let target = info.resolved as usize;
                if target >= n {
                    return Err(InternalError::MisalignedJumpTarget(info.resolved).into());
                }
                boundary[target] = true;
            }
            if instr.opcode.ends_block() {
                boundary[i + 1] = true;
            }
        }

        // Pass 2: walk the stream, opening a block at each boundary and
        // folding handler pseudo-ops into per-instruction metadata.
        let mut graph = ControlFlowGraph {
            blocks: Vec::new(),
            entry: BlockId(0),
        };
        let mut block_at = vec![u32::MAX; n.max(1)];
        let mut handlers = Vec::new();
        let mut cur = graph.add_block();
        block_at[0] = cur.0;

        for (i, instr) in instrs.iter().enumerate() {
            if i > 0 && boundary[i] {
                let next = graph.add_block();
                let falls = graph.block(cur).falls_through();
                if falls {
                    graph.block_mut(cur).fallthrough = Some(next);
                }
                cur = next;
                block_at[i] = cur.0;
            }
            match instr.opcode {
                Opcode::SetupHandler => {
                    let info = instr
                        .except_handler
                        .ok_or(InternalError::UnbalancedHandler)?;
                    handlers.push(info);
                }
                Opcode::PopHandler => {
                    handlers.pop().ok_or(InternalError::UnbalancedHandler)?;
                }
                _ => {
                    let mut instr = *instr;
                    // Metadata from an enclosing pseudo-op wins; a stream
                    // that already carries per-instruction metadata (a
                    // relinearized one) keeps it.
                    instr.except_handler = handlers.last().copied().or(instr.except_handler);
                    graph.block_mut(cur).instrs.push(instr);
                }
            }
        }
        if !handlers.is_empty() {
            return Err(InternalError::UnbalancedHandler.into());
        }

        // Pass 3: rewrite jump and handler offsets to block ids.
        let lookup = |offset: u32| -> Result<BlockId, CompileError> {
            let id = block_at
                .get(offset as usize)
                .copied()
                .filter(|&id| id != u32::MAX)
                .ok_or(InternalError::MisalignedJumpTarget(offset))?;
            Ok(BlockId(id))
        };
        for block_idx in 0..graph.blocks.len() {
            if let Some(last) = graph.blocks[block_idx].instrs.last()
                && last.opcode.has_jump()
            {
                let target = lookup(last.oparg)?;
                graph.blocks[block_idx].jump = Some(target);
            }
            for instr in &mut graph.blocks[block_idx].instrs {
                if let Some(info) = &mut instr.except_handler {
                    let target = block_at
                        .get(info.resolved as usize)
                        .copied()
                        .filter(|&id| id != u32::MAX)
                        .ok_or(InternalError::MisalignedJumpTarget(info.resolved))?;
                    info.resolved = target;
                }
            }
        }
        Ok(graph)
    }

    fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id));
        id
    }

    /// The entry block's handle.
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    /// A block by handle.
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0 as usize]
    }

    /// Handles of all live blocks, in original relative order.
    pub fn live_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.iter().filter(|b| b.alive).map(|b| b.id)
    }

    /// Number of live blocks.
    pub fn num_live(&self) -> usize {
        self.blocks.iter().filter(|b| b.alive).count()
    }

    pub(crate) fn kill(&mut self, id: BlockId) {
        let block = self.block_mut(id);
        block.alive = false;
        block.instrs.clear();
        block.fallthrough = None;
        block.jump = None;
    }

    /// All successor edges of a block: explicit jump, fallthrough, and the
    /// exception edge of every covered instruction.
    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        let block = self.block(id);
        let mut succ = Vec::new();
        if let Some(jump) = block.jump {
            succ.push(jump);
        }
        if block.falls_through()
            && let Some(fall) = block.fallthrough
        {
            succ.push(fall);
        }
        for instr in &block.instrs {
            if let Some(info) = instr.except_handler {
                let handler = BlockId(info.resolved);
                if !succ.contains(&handler) {
                    succ.push(handler);
                }
            }
        }
        succ
    }

    /// The next live block after `id` in layout order.
    pub(crate) fn next_live(&self, id: BlockId) -> Option<BlockId> {
        self.blocks[id.0 as usize + 1..]
            .iter()
            .find(|b| b.alive)
            .map(|b| b.id)
    }

    /// Linearize the graph back into a finalized sequence.
    ///
    /// Entry block first, then the remaining live blocks in original
    /// relative order, which keeps assembly deterministic and the location
    /// table compact. Jump operands are re-resolved through a fresh label
    /// per block.
    pub fn to_sequence(&self) -> Result<ResolvedSequence, CompileError> {
        let mut seq = InstructionSequence::new();
        let mut labels = vec![None; self.blocks.len()];
        for id in self.live_blocks() {
            labels[id.0 as usize] = Some(seq.new_label()?);
        }
        let label_of = |labels: &[Option<Label>], id: BlockId| -> Label {
            labels[id.0 as usize].expect("edge into a pruned block")
        };

        for id in self.live_blocks() {
            let block = self.block(id);
            seq.use_label(label_of(&labels, id))?;
            for (i, instr) in block.instrs.iter().enumerate() {
                let mut instr = *instr;
                if let Some(info) = &mut instr.except_handler {
                    let handler = label_of(&labels, BlockId(info.resolved));
                    info.target = handler;
                    info.resolved = 0;
                }
                if instr.opcode.has_jump() {
                    debug_assert_eq!(i + 1, block.instrs.len());
                    let target = label_of(&labels, block.jump.expect("jump without edge"));
                    instr.target = Some(target);
                    instr.oparg = target.0;
                }
                seq.add_instruction(instr)?;
            }
            // Layout normally keeps fallthrough adjacency; if a rewrite
            // broke it, make the edge explicit.
            if block.falls_through()
                && let Some(fall) = block.fallthrough
                && self.next_live(id) != Some(fall)
            {
                seq.add_jump(Opcode::Jump, label_of(&labels, fall), NO_LOCATION)?;
            }
        }
        seq.finalize()
    }
}
