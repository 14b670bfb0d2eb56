//! Code to validate the IR in a [`Context`].
//!
//! The parser verifies everything it builds, so the analyses may assume well formed blocks:
//! exactly one terminator at the end, phis first, and branches which stay inside the function.

use crate::{
    block::{Block, BlockContent},
    context::Context,
    error::IrError,
    function::{Function, FunctionContent},
    instruction::{Callee, InstOp},
    module::ModuleContent,
    value::{Value, ValueDatum},
};

impl Context {
    /// Verify the contents of this [`Context`] is valid.
    pub fn verify(self) -> Result<Self, IrError> {
        for (_, module) in &self.modules {
            self.verify_module(module)?;
        }
        Ok(self)
    }

    fn verify_module(&self, module: &ModuleContent) -> Result<(), IrError> {
        for function in &module.functions {
            self.verify_function(module, *function)?;
        }
        Ok(())
    }

    fn verify_function(&self, cur_module: &ModuleContent, function: Function) -> Result<(), IrError> {
        let cur_function = &self.functions[function.0];
        if let Some(entry_block) = cur_function.blocks.first() {
            let entry_content = &self.blocks[entry_block.0];
            if !entry_content.preds.is_empty() {
                return Err(IrError::VerifyEntryBlockHasPredecessors(
                    cur_function.name.clone(),
                    entry_content
                        .preds
                        .iter()
                        .map(|block| block.get_label(self))
                        .collect(),
                ));
            }
        }
        for block in &cur_function.blocks {
            self.verify_block(cur_module, cur_function, *block)?;
        }
        Ok(())
    }

    fn verify_block(
        &self,
        cur_module: &ModuleContent,
        cur_function: &FunctionContent,
        block: Block,
    ) -> Result<(), IrError> {
        let block_content = &self.blocks[block.0];
        if block_content.instructions.is_empty() && block_content.preds.is_empty() {
            // Empty unreferenced blocks are a harmless artefact.
            return Ok(());
        }

        InstructionVerifier {
            context: self,
            cur_module,
            cur_function,
            cur_block: block,
            cur_block_content: block_content,
        }
        .verify_instructions()?;

        let (last_is_term, num_terms) =
            block_content
                .instructions
                .iter()
                .fold((false, 0), |(_, n), ins| {
                    if ins.is_terminator(self) {
                        (true, n + 1)
                    } else {
                        (false, n)
                    }
                });
        if !last_is_term {
            Err(IrError::MissingTerminator(block_content.label.clone()))
        } else if num_terms != 1 {
            Err(IrError::MisplacedTerminator(block_content.label.clone()))
        } else {
            Ok(())
        }
    }
}

struct InstructionVerifier<'a> {
    context: &'a Context,
    cur_module: &'a ModuleContent,
    cur_function: &'a FunctionContent,
    cur_block: Block,
    cur_block_content: &'a BlockContent,
}

impl InstructionVerifier<'_> {
    fn verify_instructions(&self) -> Result<(), IrError> {
        let mut seen_non_phi = false;
        for ins in &self.cur_block_content.instructions {
            let value_content = &self.context.values[ins.0];
            let ValueDatum::Instruction(instruction) = &value_content.value else {
                panic!("Verify called on a block containing a non-instruction value.");
            };
            match &instruction.op {
                InstOp::Branch(block) => self.verify_br(block)?,
                InstOp::Call { callee, args } => self.verify_call(callee, args)?,
                InstOp::ConditionalBranch {
                    true_block,
                    false_block,
                    ..
                } => {
                    self.verify_br(true_block)?;
                    self.verify_br(false_block)?;
                }
                InstOp::Phi(incoming) => {
                    if seen_non_phi {
                        return Err(IrError::VerifyPhiNotAtBlockStart(
                            self.cur_block_content.label.clone(),
                        ));
                    }
                    self.verify_phi(incoming)?;
                }
                InstOp::Alloca
                | InstOp::BinaryOp { .. }
                | InstOp::Cast(_)
                | InstOp::Cmp(..)
                | InstOp::GetElemPtr { .. }
                | InstOp::Load(_)
                | InstOp::MemCopy { .. }
                | InstOp::Nop
                | InstOp::Ret(_)
                | InstOp::Store { .. } => (),
            }
            seen_non_phi |= !matches!(instruction.op, InstOp::Phi(_));
        }
        Ok(())
    }

    fn verify_br(&self, dest_block: &Block) -> Result<(), IrError> {
        if !self.cur_function.blocks.contains(dest_block) {
            Err(IrError::VerifyBranchToMissingBlock(
                self.context.blocks[dest_block.0].label.clone(),
            ))
        } else {
            Ok(())
        }
    }

    fn verify_call(&self, callee: &Callee, args: &[Value]) -> Result<(), IrError> {
        let Callee::Direct(callee) = callee else {
            // Anything may be called through a pointer.
            return Ok(());
        };
        let callee_content = &self.context.functions[callee.0];
        if !self.cur_module.functions.contains(callee) {
            return Err(IrError::VerifyCallToMissingFunction(
                callee_content.name.clone(),
            ));
        }
        let num_params = callee_content.arguments.len();
        let arg_count_ok = if callee_content.is_variadic {
            args.len() >= num_params
        } else {
            args.len() == num_params
        };
        if !arg_count_ok {
            return Err(IrError::VerifyCallArgCountMismatch(
                callee_content.name.clone(),
                num_params,
                args.len(),
            ));
        }
        Ok(())
    }

    fn verify_phi(&self, incoming: &[(Block, Value)]) -> Result<(), IrError> {
        for (from_block, _) in incoming {
            if !self.cur_block.has_pred(self.context, from_block) {
                return Err(IrError::VerifyPhiFromNonPredecessor(
                    self.cur_block_content.label.clone(),
                    from_block.get_label(self.context),
                ));
            }
        }
        Ok(())
    }
}
