//! The base descriptor for various values within the IR.
//!
//! [`Value`]s can be function arguments, references to functions, constants and instructions.
//! [`Instruction`]s generally refer to each other and to constants via the [`Value`] wrapper.
//!
//! Like most IR data structures they are `Copy` and cheap to pass around by value.  Their
//! identity is their handle: two values are the same program value iff their handles are equal.

use crate::{block::Block, context::Context, function::Function, instruction::Instruction};

/// A wrapper around an [ECS](https://github.com/orlp/slotmap) handle into the
/// [`Context`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Value(pub slotmap::DefaultKey);

#[doc(hidden)]
#[derive(Debug, Clone)]
pub struct ValueContent {
    pub value: ValueDatum,
    pub name: Option<String>,
}

#[doc(hidden)]
#[derive(Debug, Clone)]
pub enum ValueDatum {
    Argument(FunctionArgument),
    Constant(Constant),
    Function(Function),
    Instruction(Instruction),
}

/// A formal parameter of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionArgument {
    /// The function which declares this parameter.
    pub function: Function,
    /// idx'th parameter of the function.
    pub idx: usize,
}

/// Constants are opaque to the pointer analyses; none of them point anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constant {
    Bool(bool),
    Int(i64),
    Null,
    Undef,
}

impl Value {
    /// Return a new function argument [`Value`].
    pub fn new_argument(context: &mut Context, arg: FunctionArgument, name: Option<String>) -> Value {
        let content = ValueContent {
            value: ValueDatum::Argument(arg),
            name,
        };
        Value(context.values.insert(content))
    }

    /// Return a new constant [`Value`].
    pub fn new_constant(context: &mut Context, constant: Constant) -> Value {
        let content = ValueContent {
            value: ValueDatum::Constant(constant),
            name: None,
        };
        Value(context.values.insert(content))
    }

    /// Return a new [`Value`] referring to `function`.
    ///
    /// Every function has exactly one such value, see [`Function::get_value`].
    pub(crate) fn new_function_ref(context: &mut Context, function: Function) -> Value {
        let content = ValueContent {
            value: ValueDatum::Function(function),
            name: None,
        };
        Value(context.values.insert(content))
    }

    /// Return a new instruction [`Value`].
    pub fn new_instruction(context: &mut Context, instruction: Instruction) -> Value {
        let content = ValueContent {
            value: ValueDatum::Instruction(instruction),
            name: None,
        };
        Value(context.values.insert(content))
    }

    /// Get the human readable name of this value, if it has one.
    ///
    /// Function references are named after their function.
    pub fn get_name<'a>(&self, context: &'a Context) -> Option<&'a str> {
        let content = &context.values[self.0];
        match &content.value {
            ValueDatum::Function(func) => Some(func.get_name(context)),
            _ => content.name.as_deref(),
        }
    }

    /// Set (or clear) the human readable name of this value.
    pub fn set_name(&self, context: &mut Context, name: Option<String>) {
        context.values[self.0].name = name;
    }

    /// Return whether this is a constant value.
    pub fn is_constant(&self, context: &Context) -> bool {
        matches!(context.values[self.0].value, ValueDatum::Constant(_))
    }

    /// Get the constant if this value is one.
    pub fn get_constant<'a>(&self, context: &'a Context) -> Option<&'a Constant> {
        if let ValueDatum::Constant(c) = &context.values[self.0].value {
            Some(c)
        } else {
            None
        }
    }

    /// Get the formal parameter descriptor if this value is a function argument.
    pub fn get_argument(&self, context: &Context) -> Option<FunctionArgument> {
        if let ValueDatum::Argument(arg) = &context.values[self.0].value {
            Some(*arg)
        } else {
            None
        }
    }

    /// Get the referenced function if this value names one.
    pub fn get_function(&self, context: &Context) -> Option<Function> {
        if let ValueDatum::Function(func) = &context.values[self.0].value {
            Some(*func)
        } else {
            None
        }
    }

    /// Return whether this value is an instruction.
    pub fn is_instruction(&self, context: &Context) -> bool {
        matches!(context.values[self.0].value, ValueDatum::Instruction(_))
    }

    /// Get a reference to the [`Instruction`] behind this value, if it is one.
    pub fn get_instruction<'a>(&self, context: &'a Context) -> Option<&'a Instruction> {
        if let ValueDatum::Instruction(ins) = &context.values[self.0].value {
            Some(ins)
        } else {
            None
        }
    }

    /// Get a mutable reference to the [`Instruction`] behind this value, if it is one.
    pub fn get_instruction_mut<'a>(&self, context: &'a mut Context) -> Option<&'a mut Instruction> {
        if let ValueDatum::Instruction(ins) = &mut context.values[self.0].value {
            Some(ins)
        } else {
            None
        }
    }

    /// Return whether this value is an instruction, and specifically a 'terminator'.
    ///
    /// A terminator is always the last instruction in a block (and may not appear anywhere else)
    /// and is either a branch or return.
    pub fn is_terminator(&self, context: &Context) -> bool {
        self.get_instruction(context)
            .map(|ins| ins.op.is_terminator())
            .unwrap_or(false)
    }

    /// The block containing this value, if it is an instruction.
    pub fn get_parent_block(&self, context: &Context) -> Option<Block> {
        self.get_instruction(context).map(|ins| ins.parent)
    }

    /// The source line attached to this value, if it is an instruction and has one.
    pub fn get_line(&self, context: &Context) -> Option<u32> {
        self.get_instruction(context).and_then(|ins| ins.line)
    }
}
