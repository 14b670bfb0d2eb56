//! A scope containing a collection of [`Function`]s.

use crate::{
    context::Context,
    function::{Function, FunctionIterator},
};

/// A wrapper around an [ECS](https://github.com/orlp/slotmap) handle into the
/// [`Context`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Module(pub slotmap::DefaultKey);

#[doc(hidden)]
pub struct ModuleContent {
    pub name: String,
    pub functions: Vec<Function>,
}

impl Module {
    /// Return a new named module.
    pub fn new(context: &mut Context, name: &str) -> Module {
        let content = ModuleContent {
            name: name.to_owned(),
            functions: Vec::new(),
        };
        Module(context.modules.insert(content))
    }

    /// Get this module's name.
    pub fn get_name<'a>(&self, context: &'a Context) -> &'a str {
        &context.modules[self.0].name
    }

    /// Return an iterator over each of the [`Function`]s in this module.
    pub fn function_iter(&self, context: &Context) -> FunctionIterator {
        FunctionIterator::new(context, self)
    }

    /// Find a function by name.
    pub fn get_function(&self, context: &Context, name: &str) -> Option<Function> {
        context.modules[self.0]
            .functions
            .iter()
            .find(|func| func.get_name(context) == name)
            .copied()
    }

    /// The number of functions in this module, including declarations.
    pub fn num_functions(&self, context: &Context) -> usize {
        context.modules[self.0].functions.len()
    }
}

/// An iterator over [`Module`]s within a [`Context`].
pub struct ModuleIterator {
    modules: Vec<slotmap::DefaultKey>,
    next: usize,
}

impl ModuleIterator {
    /// Return a new [`Module`] iterator.
    pub fn new(context: &Context) -> ModuleIterator {
        // Copy all the current modules indices, so they may be modified in the context during
        // iteration.
        ModuleIterator {
            modules: context.modules.iter().map(|pair| pair.0).collect(),
            next: 0,
        }
    }
}

impl Iterator for ModuleIterator {
    type Item = Module;

    fn next(&mut self) -> Option<Module> {
        if self.next < self.modules.len() {
            let idx = self.next;
            self.next += 1;
            Some(Module(self.modules[idx]))
        } else {
            None
        }
    }
}
