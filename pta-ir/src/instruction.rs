//! Instructions for memory access, calls and control flow.
//!
//! The set of instruction kinds is closed: analyses dispatch over [`InstOp`] with an exhaustive
//! `match`, so adding a kind here forces every analysis to decide how to treat it.

use crate::{block::Block, context::Context, function::Function, value::Value};

#[derive(Debug, Clone)]
pub struct Instruction {
    /// The block this instruction lives in.
    pub parent: Block,
    pub op: InstOp,
    /// The source line this instruction was generated from, if known.
    pub line: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum InstOp {
    /// Reserve a fresh stack slot and return its address.
    Alloca,
    /// Binary arithmetic operations.
    BinaryOp {
        op: BinaryOpKind,
        arg1: Value,
        arg2: Value,
    },
    /// An unconditional jump.
    Branch(Block),
    /// A function call with a list of arguments.
    Call { callee: Callee, args: Vec<Value> },
    /// Reinterpret a value as a different (pointer) type.  The bits are unchanged.
    Cast(Value),
    /// Comparison between two values using various comparators and returning a boolean.
    Cmp(Predicate, Value, Value),
    /// A conditional jump with the boolean condition value and true or false destinations.
    ConditionalBranch {
        cond_value: Value,
        true_block: Block,
        false_block: Block,
    },
    /// Compute the address of an element or field within an aggregate pointed to by `base`.
    GetElemPtr { base: Value, indices: Vec<Value> },
    /// Read a value from a memory pointer.
    Load(Value),
    /// Copy a block of memory from one pointer to another, e.g., `memcpy`.
    MemCopy {
        dst_val_ptr: Value,
        src_val_ptr: Value,
    },
    /// No-op, handy as a placeholder instruction.
    Nop,
    /// Select a value depending on which predecessor block control arrived from.
    Phi(Vec<(Block, Value)>),
    /// Return from a function, optionally with a value.
    Ret(Option<Value>),
    /// Write a value to a memory pointer.
    Store {
        dst_val_ptr: Value,
        stored_val: Value,
    },
}

/// The target of a [`InstOp::Call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callee {
    /// The callee is statically known.
    Direct(Function),
    /// The callee is whatever function the value points to at runtime.
    Indirect(Value),
}

/// Comparison operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOpKind {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
}

impl InstOp {
    /// Return whether this is a branch or return.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstOp::Branch(_) | InstOp::ConditionalBranch { .. } | InstOp::Ret(_)
        )
    }

    /// Return the values this instruction reads, in operand order.
    ///
    /// Blocks and statically known callees are not values and aren't included.
    pub fn get_operands(&self) -> Vec<Value> {
        match self {
            InstOp::Alloca | InstOp::Branch(_) | InstOp::Nop => vec![],
            InstOp::BinaryOp { arg1, arg2, .. } => vec![*arg1, *arg2],
            InstOp::Call { callee, args } => match callee {
                Callee::Direct(_) => args.clone(),
                Callee::Indirect(fn_ptr) => std::iter::once(*fn_ptr)
                    .chain(args.iter().copied())
                    .collect(),
            },
            InstOp::Cast(val) | InstOp::Load(val) => vec![*val],
            InstOp::Cmp(_, lhs, rhs) => vec![*lhs, *rhs],
            InstOp::ConditionalBranch { cond_value, .. } => vec![*cond_value],
            InstOp::GetElemPtr { base, indices } => std::iter::once(*base)
                .chain(indices.iter().copied())
                .collect(),
            InstOp::MemCopy {
                dst_val_ptr,
                src_val_ptr,
            } => vec![*dst_val_ptr, *src_val_ptr],
            InstOp::Phi(incoming) => incoming.iter().map(|(_, val)| *val).collect(),
            InstOp::Ret(ret_val) => ret_val.iter().copied().collect(),
            InstOp::Store {
                dst_val_ptr,
                stored_val,
            } => vec![*dst_val_ptr, *stored_val],
        }
    }
}

impl Instruction {
    /// The function containing this instruction.
    pub fn get_function(&self, context: &Context) -> Function {
        self.parent.get_function(context)
    }
}

/// Provide a context for appending new [`Instruction`]s to a [`Block`].
pub struct InstructionInserter<'a> {
    context: &'a mut Context,
    block: Block,
}

macro_rules! make_instruction {
    ($self: ident, $op: expr) => {{
        let instruction_val = Value::new_instruction(
            $self.context,
            Instruction {
                parent: $self.block,
                op: $op,
                line: None,
            },
        );
        $self.context.blocks[$self.block.0]
            .instructions
            .push(instruction_val);
        instruction_val
    }};
}

impl<'a> InstructionInserter<'a> {
    /// Return a new [`InstructionInserter`] context for `block`.
    pub fn new(context: &'a mut Context, block: Block) -> InstructionInserter<'a> {
        InstructionInserter { context, block }
    }

    pub fn alloca(self) -> Value {
        make_instruction!(self, InstOp::Alloca)
    }

    pub fn binary_op(self, op: BinaryOpKind, arg1: Value, arg2: Value) -> Value {
        make_instruction!(self, InstOp::BinaryOp { op, arg1, arg2 })
    }

    pub fn branch(self, to_block: Block) -> Value {
        to_block.add_pred(self.context, &self.block);
        make_instruction!(self, InstOp::Branch(to_block))
    }

    pub fn call(self, function: Function, args: &[Value]) -> Value {
        make_instruction!(
            self,
            InstOp::Call {
                callee: Callee::Direct(function),
                args: args.to_vec(),
            }
        )
    }

    pub fn call_indirect(self, fn_ptr: Value, args: &[Value]) -> Value {
        make_instruction!(
            self,
            InstOp::Call {
                callee: Callee::Indirect(fn_ptr),
                args: args.to_vec(),
            }
        )
    }

    pub fn cast(self, value: Value) -> Value {
        make_instruction!(self, InstOp::Cast(value))
    }

    pub fn cmp(self, pred: Predicate, lhs_value: Value, rhs_value: Value) -> Value {
        make_instruction!(self, InstOp::Cmp(pred, lhs_value, rhs_value))
    }

    pub fn conditional_branch(
        self,
        cond_value: Value,
        true_block: Block,
        false_block: Block,
    ) -> Value {
        true_block.add_pred(self.context, &self.block);
        false_block.add_pred(self.context, &self.block);
        make_instruction!(
            self,
            InstOp::ConditionalBranch {
                cond_value,
                true_block,
                false_block,
            }
        )
    }

    pub fn get_elem_ptr(self, base: Value, indices: Vec<Value>) -> Value {
        make_instruction!(self, InstOp::GetElemPtr { base, indices })
    }

    pub fn load(self, src_val: Value) -> Value {
        make_instruction!(self, InstOp::Load(src_val))
    }

    pub fn mem_copy(self, dst_val_ptr: Value, src_val_ptr: Value) -> Value {
        make_instruction!(
            self,
            InstOp::MemCopy {
                dst_val_ptr,
                src_val_ptr,
            }
        )
    }

    pub fn nop(self) -> Value {
        make_instruction!(self, InstOp::Nop)
    }

    pub fn phi(self, incoming: Vec<(Block, Value)>) -> Value {
        make_instruction!(self, InstOp::Phi(incoming))
    }

    pub fn ret(self, value: Option<Value>) -> Value {
        make_instruction!(self, InstOp::Ret(value))
    }

    pub fn store(self, dst_val_ptr: Value, stored_val: Value) -> Value {
        make_instruction!(
            self,
            InstOp::Store {
                dst_val_ptr,
                stored_val,
            }
        )
    }
}

impl Value {
    /// Attach a source line to this instruction value, returning the same value for chaining.
    ///
    /// Non-instruction values have no location and are returned untouched.
    pub fn add_line(self, context: &mut Context, line: Option<u32>) -> Value {
        if let (Some(line), Some(ins)) = (line, self.get_instruction_mut(context)) {
            ins.line = Some(line);
        }
        self
    }

    /// Append an incoming `(block, value)` pair to a phi instruction.
    pub fn add_phi_incoming(self, context: &mut Context, block: Block, value: Value) {
        match self.get_instruction_mut(context) {
            Some(Instruction {
                op: InstOp::Phi(incoming),
                ..
            }) => incoming.push((block, value)),
            _ => panic!("Adding an incoming value to a non-phi instruction."),
        }
    }
}
