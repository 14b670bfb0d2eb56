//! A typical function data type.
//!
//! [`Function`] is named, takes zero or more arguments and has a body made of [`Block`]s.  A
//! function without a body is a declaration, an external symbol such as `malloc` which may still
//! be called and referenced.

use slotmap::Key;

use crate::{
    block::{Block, BlockIterator, Label},
    context::Context,
    module::Module,
    value::{FunctionArgument, Value},
};

/// A wrapper around an [ECS](https://github.com/orlp/slotmap) handle into the
/// [`Context`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Function(pub slotmap::DefaultKey);

#[doc(hidden)]
pub struct FunctionContent {
    pub name: String,
    pub module: Module,
    pub arguments: Vec<(String, Value)>,
    pub blocks: Vec<Block>,
    pub is_declaration: bool,
    pub is_variadic: bool,
    /// The value used when this function is an operand, e.g., stored into a function pointer.
    pub value: Value,

    next_label_idx: u64,
}

/// Names starting with this prefix are compiler intrinsics rather than real functions.
pub const INTRINSIC_PREFIX: &str = "llvm.";

impl Function {
    /// Return a new [`Function`] handle.
    ///
    /// Creates a [`Function`] in the `context` within `module` and returns a handle.
    ///
    /// `args` are the names of the formal parameters.  Unless `is_declaration` is set an entry
    /// block is created immediately.
    pub fn new(
        context: &mut Context,
        module: Module,
        name: String,
        args: Vec<String>,
        is_declaration: bool,
        is_variadic: bool,
    ) -> Function {
        // We need a function handle before the arguments and the function value can be created,
        // so start with a null value and patch it in below.
        let content = FunctionContent {
            name,
            module,
            arguments: Vec::new(),
            blocks: Vec::new(),
            is_declaration,
            is_variadic,
            value: Value(slotmap::DefaultKey::null()),
            next_label_idx: 0,
        };
        let func = Function(context.functions.insert(content));

        let arguments = args
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let arg = Value::new_argument(
                    context,
                    FunctionArgument {
                        function: func,
                        idx,
                    },
                    Some(name.clone()),
                );
                (name, arg)
            })
            .collect();
        let value = Value::new_function_ref(context, func);
        {
            let content = &mut context.functions[func.0];
            content.arguments = arguments;
            content.value = value;
        }

        context.modules[module.0].functions.push(func);

        if !is_declaration {
            let entry_block = Block::new(context, func, Some("entry".to_owned()));
            context.functions[func.0].blocks.push(entry_block);
        }

        func
    }

    /// Create and append a new [`Block`] to this function.
    pub fn create_block(&self, context: &mut Context, label: Option<Label>) -> Block {
        let block = Block::new(context, *self, label);
        let func = &mut context.functions[self.0];
        func.blocks.push(block);
        func.is_declaration = false;
        block
    }

    /// Return a label which is unique within this function, based on `hint` if given.
    pub fn get_unique_label(&self, context: &mut Context, hint: Option<String>) -> String {
        match hint {
            Some(hint) => {
                if context.functions[self.0]
                    .blocks
                    .iter()
                    .any(|block| context.blocks[block.0].label == hint)
                {
                    let idx = self.get_next_label_idx(context);
                    self.get_unique_label(context, Some(format!("{hint}{idx}")))
                } else {
                    hint
                }
            }
            None => {
                let idx = self.get_next_label_idx(context);
                self.get_unique_label(context, Some(format!("block{idx}")))
            }
        }
    }

    fn get_next_label_idx(&self, context: &mut Context) -> u64 {
        let func = &mut context.functions[self.0];
        let idx = func.next_label_idx;
        func.next_label_idx += 1;
        idx
    }

    /// Return the function name.
    pub fn get_name<'a>(&self, context: &'a Context) -> &'a str {
        &context.functions[self.0].name
    }

    /// Return the module that this function belongs to.
    pub fn get_module(&self, context: &Context) -> Module {
        context.functions[self.0].module
    }

    /// The value which refers to this function when it is used as an operand.
    pub fn get_value(&self, context: &Context) -> Value {
        context.functions[self.0].value
    }

    /// Whether this function has no body.
    pub fn is_declaration(&self, context: &Context) -> bool {
        context.functions[self.0].is_declaration
    }

    /// Whether this function accepts more arguments than it declares.
    pub fn is_variadic(&self, context: &Context) -> bool {
        context.functions[self.0].is_variadic
    }

    /// Whether this is a compiler intrinsic, which is never a real call target.
    pub fn is_intrinsic(&self, context: &Context) -> bool {
        self.get_name(context).starts_with(INTRINSIC_PREFIX)
    }

    /// Return the entry block of this function.
    ///
    /// Declarations have no blocks, calling this on one is a bug.
    pub fn get_entry_block(&self, context: &Context) -> Block {
        match context.functions[self.0].blocks.first() {
            Some(block) => *block,
            None => panic!(
                "Function '{}' is a declaration and has no entry block.",
                self.get_name(context)
            ),
        }
    }

    /// Return the blocks of this function which have no successors, usually a single return
    /// block.
    pub fn get_exit_blocks(&self, context: &Context) -> Vec<Block> {
        self.block_iter(context)
            .filter(|block| block.num_successors(context) == 0)
            .collect()
    }

    /// Return the number of blocks in this function.
    pub fn num_blocks(&self, context: &Context) -> usize {
        context.functions[self.0].blocks.len()
    }

    /// Return the number of instructions in this function.
    pub fn num_instructions(&self, context: &Context) -> usize {
        self.block_iter(context)
            .map(|block| block.num_instructions(context))
            .sum()
    }

    /// Return the number of formal parameters.
    pub fn num_args(&self, context: &Context) -> usize {
        context.functions[self.0].arguments.len()
    }

    /// Get the idx'th formal parameter.
    pub fn get_arg_at(&self, context: &Context, idx: usize) -> Option<Value> {
        context.functions[self.0]
            .arguments
            .get(idx)
            .map(|(_, val)| *val)
    }

    /// Get a formal parameter by name.
    pub fn get_arg(&self, context: &Context, name: &str) -> Option<Value> {
        context.functions[self.0]
            .arguments
            .iter()
            .find_map(|(arg_name, val)| if arg_name == name { Some(val) } else { None })
            .copied()
    }

    /// Return an iterator over the `(name, value)` pairs of the formal parameters.
    pub fn args_iter<'a>(&self, context: &'a Context) -> impl Iterator<Item = &'a (String, Value)> {
        context.functions[self.0].arguments.iter()
    }

    /// Return an iterator over each block in this function.
    pub fn block_iter(&self, context: &Context) -> BlockIterator {
        BlockIterator::new(context, self)
    }

    /// Return an iterator over each instruction in each block in this function.
    ///
    /// This is a convenience method for when all instructions in a function need to be inspected.
    /// The instruction value is returned from the iterator along with the block it belongs to.
    pub fn instruction_iter<'a>(
        &self,
        context: &'a Context,
    ) -> impl Iterator<Item = (Block, Value)> + 'a {
        context.functions[self.0]
            .blocks
            .iter()
            .flat_map(move |block| {
                block
                    .instruction_iter(context)
                    .map(move |ins_val| (*block, ins_val))
            })
    }

    /// Find a block by its label.
    pub fn get_block_by_label(&self, context: &Context, label: &str) -> Option<Block> {
        self.block_iter(context)
            .find(|block| block.get_label(context) == label)
    }
}

/// An iterator over each [`Function`] in a [`Module`].
pub struct FunctionIterator {
    functions: Vec<slotmap::DefaultKey>,
    next: usize,
}

impl FunctionIterator {
    /// Return a new iterator for the functions in `module`.
    pub fn new(context: &Context, module: &Module) -> FunctionIterator {
        // Copy all the current modules indices, so they may be modified in the context during
        // iteration.
        FunctionIterator {
            functions: context.modules[module.0]
                .functions
                .iter()
                .map(|func| func.0)
                .collect(),
            next: 0,
        }
    }
}

impl Iterator for FunctionIterator {
    type Item = Function;

    fn next(&mut self) -> Option<Function> {
        if self.next < self.functions.len() {
            let idx = self.next;
            self.next += 1;
            Some(Function(self.functions[idx]))
        } else {
            None
        }
    }
}
