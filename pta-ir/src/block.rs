//! Represents a 'basic block' of [`Instruction`]s in a control flow graph.
//!
//! [`Block`]s contain zero or more _non-terminating_ instructions and at most one _terminating_
//! instruction or _terminator_.  Terminators are either branches or a return instruction and are
//! the last instruction in the block.
//!
//! Every [`Function`] with a body has at least one block, the first of which is usually labeled
//! `entry`.

use crate::{
    context::Context,
    function::Function,
    instruction::{InstOp, Instruction, InstructionInserter},
    value::Value,
    FxIndexSet,
};

/// A wrapper around an [ECS](https://github.com/orlp/slotmap) handle into the
/// [`Context`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Block(pub slotmap::DefaultKey);

#[doc(hidden)]
pub struct BlockContent {
    /// Block label, useful for printing.
    pub label: Label,
    /// The function containing this block.
    pub function: Function,
    /// List of instructions in the block.
    pub(crate) instructions: Vec<Value>,
    /// CFG predecessors
    pub preds: FxIndexSet<Block>,
}

/// Each block may be explicitly named.  A [`Label`] is a simple `String` synonym.
pub type Label = String;

impl Block {
    /// Return a new block handle.
    ///
    /// Creates a new Block belonging to `function` in the context and returns its handle.  `label`
    /// is optional and is used only when printing the IR.
    pub fn new(context: &mut Context, function: Function, label: Option<String>) -> Block {
        let label = function.get_unique_label(context, label);
        let content = BlockContent {
            label,
            function,
            instructions: vec![],
            preds: FxIndexSet::default(),
        };
        Block(context.blocks.insert(content))
    }

    /// Get the parent function for this block.
    pub fn get_function(&self, context: &Context) -> Function {
        context.blocks[self.0].function
    }

    /// Create a new [`InstructionInserter`] to more easily append instructions to this block.
    pub fn append<'a>(&self, context: &'a mut Context) -> InstructionInserter<'a> {
        InstructionInserter::new(context, *self)
    }

    /// Get the label of this block.  If it wasn't given one upon creation it will be a generated
    /// label.
    pub fn get_label(&self, context: &Context) -> String {
        context.blocks[self.0].label.clone()
    }

    /// Get the number of instructions in this block.
    pub fn num_instructions(&self, context: &Context) -> usize {
        context.blocks[self.0].instructions.len()
    }

    /// Get instruction at position `pos`.
    ///
    /// Returns `None` if the position is out of range.
    pub fn get_instruction_at(&self, context: &Context, pos: usize) -> Option<Value> {
        context.blocks[self.0].instructions.get(pos).cloned()
    }

    /// Return an iterator over the instructions of this block, in program order.
    pub fn instruction_iter<'a>(
        &self,
        context: &'a Context,
    ) -> impl DoubleEndedIterator<Item = Value> + 'a {
        context.blocks[self.0].instructions.iter().copied()
    }

    /// Get a reference to the block terminator.
    ///
    /// Returns `None` if block is empty or its last instruction isn't a terminator.
    pub fn get_terminator<'a>(&self, context: &'a Context) -> Option<&'a Instruction> {
        context.blocks[self.0]
            .instructions
            .last()
            .and_then(|val| val.get_instruction(context))
            .filter(|ins| ins.op.is_terminator())
    }

    /// Get the CFG successors of this block.
    pub fn successors(&self, context: &Context) -> Vec<Block> {
        match self.get_terminator(context).map(|ins| &ins.op) {
            Some(InstOp::ConditionalBranch {
                true_block,
                false_block,
                ..
            }) => {
                if true_block == false_block {
                    vec![*true_block]
                } else {
                    vec![*true_block, *false_block]
                }
            }
            Some(InstOp::Branch(block)) => vec![*block],
            _otherwise => Vec::new(),
        }
    }

    /// Get the number of successor blocks.
    pub fn num_successors(&self, context: &Context) -> usize {
        self.successors(context).len()
    }

    /// Get an iterator over this block's predecessor blocks.
    pub fn pred_iter<'a>(&self, context: &'a Context) -> impl Iterator<Item = &'a Block> {
        context.blocks[self.0].preds.iter()
    }

    /// Add `from_block` to the set of predecessors of this block.
    pub fn add_pred(&self, context: &mut Context, from_block: &Block) {
        context.blocks[self.0].preds.insert(*from_block);
    }

    /// Return whether `other` is a predecessor of this block.
    pub fn has_pred(&self, context: &Context, other: &Block) -> bool {
        context.blocks[self.0].preds.contains(other)
    }
}

/// An iterator over each block in a [`Function`].
pub struct BlockIterator {
    blocks: Vec<slotmap::DefaultKey>,
    next: usize,
}

impl BlockIterator {
    /// Return a new iterator for each block in `function`.
    pub fn new(context: &Context, function: &Function) -> Self {
        // Copy all the current block indices, so they may be modified in the context during
        // iteration.
        BlockIterator {
            blocks: context.functions[function.0]
                .blocks
                .iter()
                .map(|block| block.0)
                .collect(),
            next: 0,
        }
    }
}

impl Iterator for BlockIterator {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        if self.next < self.blocks.len() {
            let idx = self.next;
            self.next += 1;
            Some(Block(self.blocks[idx]))
        } else {
            None
        }
    }
}
