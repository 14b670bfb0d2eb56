//! A worklist based solver for dataflow equations over a function's CFG.
//!
//! The solver is generic over the lattice value `T` and over the transfer function, which is
//! supplied by a [`DataflowVisitor`].  Per block `(in, out)` values live in a
//! [`DataflowResults`] table keyed by function, so a visitor may re-enter the solver for another
//! function (e.g., a callee) while the current one is still being solved.

pub mod live_variables;

use std::fmt::Write;

use pta_ir::{printer::Namer, Block, Context, FxIndexMap, FxIndexSet, Function, Value};
use tracing::trace;

/// A lattice value the solver can iterate over.
pub trait DataflowValue: Clone + PartialEq {
    /// Join `src` into `self`, returning whether `self` changed.
    fn merge(&mut self, src: &Self) -> bool;

    /// Render the value, naming IR values through `namer`.
    fn display(&self, context: &Context, namer: &mut Namer) -> String;
}

/// The transfer function of an analysis.
pub trait DataflowVisitor<T: DataflowValue> {
    /// Update `dfval` with the effect of the instruction `inst`.
    fn compute_instruction(
        &mut self,
        context: &Context,
        inst: Value,
        dfval: &mut T,
        env: &mut DataflowEnv<'_, T>,
    );
}

/// The solver state a visitor may use to re-enter the solver from within a transfer function.
pub struct DataflowEnv<'a, T> {
    pub results: &'a mut DataflowResults<T>,
    pub initval: &'a T,
    /// Functions which must be solved again, e.g., because their entry state has grown.
    pub func_worklist: &'a mut FxIndexSet<Function>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DataflowBlock<T> {
    pub input: T,
    pub output: T,
}

/// The `(in, out)` values for every block of a single function.
#[derive(Clone, Debug, PartialEq)]
pub struct DataflowResult<T> {
    blocks: FxIndexMap<Block, DataflowBlock<T>>,
}

impl<T> Default for DataflowResult<T> {
    fn default() -> Self {
        DataflowResult {
            blocks: FxIndexMap::default(),
        }
    }
}

impl<T: DataflowValue> DataflowResult<T> {
    /// Add `initval` for every block of `function` not seen before.  Existing values are kept.
    fn init(&mut self, context: &Context, function: Function, initval: &T) {
        for block in function.block_iter(context) {
            self.blocks.entry(block).or_insert_with(|| DataflowBlock {
                input: initval.clone(),
                output: initval.clone(),
            });
        }
    }

    pub fn get(&self, block: &Block) -> Option<&DataflowBlock<T>> {
        self.blocks.get(block)
    }

    pub fn get_mut(&mut self, block: &Block) -> Option<&mut DataflowBlock<T>> {
        self.blocks.get_mut(block)
    }

    pub fn input(&self, block: &Block) -> &T {
        &self.block(block).input
    }

    pub fn output(&self, block: &Block) -> &T {
        &self.block(block).output
    }

    pub fn input_mut(&mut self, block: &Block) -> &mut T {
        &mut self.block_mut(block).input
    }

    pub fn output_mut(&mut self, block: &Block) -> &mut T {
        &mut self.block_mut(block).output
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Block, &DataflowBlock<T>)> {
        self.blocks.iter()
    }

    fn block(&self, block: &Block) -> &DataflowBlock<T> {
        self.blocks
            .get(block)
            .unwrap_or_else(|| panic!("No dataflow values for block {block:?}."))
    }

    fn block_mut(&mut self, block: &Block) -> &mut DataflowBlock<T> {
        self.blocks
            .get_mut(block)
            .unwrap_or_else(|| panic!("No dataflow values for block {block:?}."))
    }

    /// Print the `in` and `out` value of every block, in block order.
    pub fn to_string(&self, context: &Context, function: Function) -> String {
        let mut namer = Namer::new(function);
        let mut out = format!("fn {} {{\n", function.get_name(context));
        for block in function.block_iter(context) {
            let Some(values) = self.blocks.get(&block) else {
                continue;
            };
            let _ = writeln!(out, "    {}:", block.get_label(context));
            let _ = writeln!(
                out,
                "        in : {}",
                values.input.display(context, &mut namer)
            );
            let _ = writeln!(
                out,
                "        out : {}",
                values.output.display(context, &mut namer)
            );
        }
        out.push_str("}\n");
        out
    }
}

/// Per function dataflow results.
#[derive(Clone, Debug, PartialEq)]
pub struct DataflowResults<T> {
    functions: FxIndexMap<Function, DataflowResult<T>>,
}

impl<T> Default for DataflowResults<T> {
    fn default() -> Self {
        DataflowResults {
            functions: FxIndexMap::default(),
        }
    }
}

impl<T: DataflowValue> DataflowResults<T> {
    pub fn get(&self, function: &Function) -> Option<&DataflowResult<T>> {
        self.functions.get(function)
    }

    pub fn get_mut(&mut self, function: &Function) -> Option<&mut DataflowResult<T>> {
        self.functions.get_mut(function)
    }

    /// The results for `function`, with every block initialised to `initval` if unseen.
    pub fn init_function(
        &mut self,
        context: &Context,
        function: Function,
        initval: &T,
    ) -> &mut DataflowResult<T> {
        let result = self.functions.entry(function).or_default();
        result.init(context, function, initval);
        result
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Function, &DataflowResult<T>)> {
        self.functions.iter()
    }

    pub fn into_function(mut self, function: &Function) -> Option<DataflowResult<T>> {
        self.functions.swap_remove(function)
    }

    pub fn to_string(&self, context: &Context) -> String {
        self.functions
            .iter()
            .map(|(function, result)| result.to_string(context, *function))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Solve `function` forwards.
///
/// Every block is visited at least once.  A block's `in` is its stored `in` joined with the `out`
/// of each predecessor and its `out` is the transfer of its instructions over `in`, in program
/// order.  Successors are revisited whenever an `out` changes.
///
/// Returns whether any block's `out` changed.
pub fn compute_forward<T, V>(
    context: &Context,
    function: Function,
    visitor: &mut V,
    results: &mut DataflowResults<T>,
    initval: &T,
    func_worklist: &mut FxIndexSet<Function>,
) -> bool
where
    T: DataflowValue,
    V: DataflowVisitor<T>,
{
    results.init_function(context, function, initval);

    let mut changed = false;
    let mut worklist: FxIndexSet<Block> = function.block_iter(context).collect();
    while let Some(block) = worklist.shift_remove_index(0) {
        trace!(
            "{}: visiting block {}",
            function.get_name(context),
            block.get_label(context)
        );

        let result = results.init_function(context, function, initval);
        let mut input = result.input(&block).clone();
        for pred in block.pred_iter(context) {
            input.merge(result.output(pred));
        }
        *result.input_mut(&block) = input.clone();

        let mut dfval = input;
        let mut env = DataflowEnv {
            results: &mut *results,
            initval,
            func_worklist: &mut *func_worklist,
        };
        for inst in block.instruction_iter(context) {
            visitor.compute_instruction(context, inst, &mut dfval, &mut env);
        }

        let result = results.init_function(context, function, initval);
        if dfval != *result.output(&block) {
            trace!(
                "{}: output of block {} changed",
                function.get_name(context),
                block.get_label(context)
            );
            *result.output_mut(&block) = dfval;
            worklist.extend(block.successors(context));
            changed = true;
        }
    }
    changed
}

/// Solve `function` backwards.
///
/// The mirror image of [`compute_forward`]: a block's `out` joins the `in` of each successor,
/// instructions are visited in reverse and predecessors are revisited whenever an `in` changes.
///
/// Returns whether any block's `in` changed.
pub fn compute_backward<T, V>(
    context: &Context,
    function: Function,
    visitor: &mut V,
    results: &mut DataflowResults<T>,
    initval: &T,
) -> bool
where
    T: DataflowValue,
    V: DataflowVisitor<T>,
{
    results.init_function(context, function, initval);

    // Backward analyses don't reach into other functions, anything queued here is dropped.
    let mut func_worklist = FxIndexSet::default();

    let mut changed = false;
    let mut worklist: FxIndexSet<Block> = function.block_iter(context).collect();
    while let Some(block) = worklist.pop() {
        trace!(
            "{}: visiting block {}",
            function.get_name(context),
            block.get_label(context)
        );

        let result = results.init_function(context, function, initval);
        let mut output = result.output(&block).clone();
        for succ in block.successors(context) {
            output.merge(result.input(&succ));
        }
        *result.output_mut(&block) = output.clone();

        let mut dfval = output;
        let mut env = DataflowEnv {
            results: &mut *results,
            initval,
            func_worklist: &mut func_worklist,
        };
        for inst in block.instruction_iter(context).rev() {
            visitor.compute_instruction(context, inst, &mut dfval, &mut env);
        }

        let result = results.init_function(context, function, initval);
        if dfval != *result.input(&block) {
            trace!(
                "{}: input of block {} changed",
                function.get_name(context),
                block.get_label(context)
            );
            *result.input_mut(&block) = dfval;
            worklist.extend(block.pred_iter(context).copied());
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use pta_ir::{parser::parse, InstOp};
    use std::collections::BTreeSet;

    /// The set of instructions which may have executed.
    #[derive(Clone, Debug, Default, PartialEq)]
    struct Reached(BTreeSet<Value>);

    impl DataflowValue for Reached {
        fn merge(&mut self, src: &Self) -> bool {
            let before = self.0.len();
            self.0.extend(src.0.iter().copied());
            self.0.len() != before
        }

        fn display(&self, context: &Context, namer: &mut Namer) -> String {
            let names: Vec<_> = self.0.iter().map(|v| namer.name(context, v)).collect();
            format!("{{{}}}", names.join(", "))
        }
    }

    struct ReachedVisitor;

    impl DataflowVisitor<Reached> for ReachedVisitor {
        fn compute_instruction(
            &mut self,
            context: &Context,
            inst: Value,
            dfval: &mut Reached,
            _env: &mut DataflowEnv<'_, Reached>,
        ) {
            if !inst.is_terminator(context) {
                dfval.0.insert(inst);
            }
        }
    }

    /// Descends into direct callees and queues them when they are already being solved.
    struct CallVisitor {
        active: Vec<Function>,
    }

    impl DataflowVisitor<Reached> for CallVisitor {
        fn compute_instruction(
            &mut self,
            context: &Context,
            inst: Value,
            dfval: &mut Reached,
            env: &mut DataflowEnv<'_, Reached>,
        ) {
            dfval.0.insert(inst);
            let Some(InstOp::Call {
                callee: pta_ir::Callee::Direct(callee),
                ..
            }) = inst.get_instruction(context).map(|ins| &ins.op)
            else {
                return;
            };
            if self.active.contains(callee) {
                env.func_worklist.insert(*callee);
                return;
            }
            self.active.push(*callee);
            compute_forward(
                context,
                *callee,
                self,
                env.results,
                env.initval,
                env.func_worklist,
            );
            self.active.pop();
        }
    }

    const DIAMOND: &str = r"
        module m {
            fn main(c) {
            entry:
                a = alloca
                cbr c, left, right
            left:
                b = alloca
                br join
            right:
                d = alloca
                br join
            join:
                e = alloca
                ret
            }
        }";

    fn names(context: &Context, function: Function, values: &Reached) -> Vec<String> {
        let mut namer = Namer::new(function);
        values.0.iter().map(|v| namer.name(context, v)).collect()
    }

    #[test]
    fn forward_joins_predecessors() {
        let ctx = parse(DIAMOND).unwrap();
        let main = ctx
            .module_iter()
            .next()
            .unwrap()
            .get_function(&ctx, "main")
            .unwrap();
        let mut results = DataflowResults::default();
        let mut visitor = ReachedVisitor;
        let changed = compute_forward(
            &ctx,
            main,
            &mut visitor,
            &mut results,
            &Reached::default(),
            &mut FxIndexSet::default(),
        );
        assert!(changed);

        let result = results.get(&main).unwrap();
        let join = main.get_block_by_label(&ctx, "join").unwrap();
        assert_eq!(names(&ctx, main, result.input(&join)), ["a", "b", "d"]);
        assert_eq!(names(&ctx, main, result.output(&join)), ["a", "b", "d", "e"]);
    }

    #[test]
    fn solved_function_is_stable() {
        let ctx = parse(DIAMOND).unwrap();
        let main = ctx
            .module_iter()
            .next()
            .unwrap()
            .get_function(&ctx, "main")
            .unwrap();
        let mut results = DataflowResults::default();
        let mut visitor = ReachedVisitor;
        let mut worklist = FxIndexSet::default();
        compute_forward(&ctx, main, &mut visitor, &mut results, &Reached::default(), &mut worklist);
        let before = results.clone();

        let changed = compute_forward(
            &ctx,
            main,
            &mut visitor,
            &mut results,
            &Reached::default(),
            &mut worklist,
        );
        assert!(!changed);
        assert_eq!(before, results);
    }

    #[test]
    fn backward_joins_successors() {
        let ctx = parse(DIAMOND).unwrap();
        let main = ctx
            .module_iter()
            .next()
            .unwrap()
            .get_function(&ctx, "main")
            .unwrap();
        let mut results = DataflowResults::default();
        let mut visitor = ReachedVisitor;
        compute_backward(&ctx, main, &mut visitor, &mut results, &Reached::default());

        let result = results.get(&main).unwrap();
        let entry = main.get_entry_block(&ctx);
        assert_eq!(names(&ctx, main, result.output(&entry)), ["b", "d", "e"]);
        assert_eq!(names(&ctx, main, result.input(&entry)), ["a", "b", "d", "e"]);
    }

    #[test]
    fn reentry_solves_callees() {
        let ctx = parse(
            r"
            module m {
                fn leaf() {
                entry:
                    x = alloca
                    ret
                }
                fn rec() {
                entry:
                    call rec()
                    ret
                }
                fn main() {
                entry:
                    call leaf()
                    call rec()
                    ret
                }
            }",
        )
        .unwrap();
        let module = ctx.module_iter().next().unwrap();
        let main = module.get_function(&ctx, "main").unwrap();
        let leaf = module.get_function(&ctx, "leaf").unwrap();
        let rec = module.get_function(&ctx, "rec").unwrap();

        let mut results = DataflowResults::default();
        let mut worklist = FxIndexSet::default();
        let mut visitor = CallVisitor { active: vec![main] };
        compute_forward(&ctx, main, &mut visitor, &mut results, &Reached::default(), &mut worklist);

        assert!(results.get(&leaf).is_some());
        assert!(results.get(&rec).is_some());
        assert_eq!(worklist.iter().copied().collect::<Vec<_>>(), [rec]);
    }

    #[test]
    fn printed_results_name_blocks() {
        let ctx = parse(DIAMOND).unwrap();
        let main = ctx
            .module_iter()
            .next()
            .unwrap()
            .get_function(&ctx, "main")
            .unwrap();
        let mut results = DataflowResults::default();
        compute_forward(
            &ctx,
            main,
            &mut ReachedVisitor,
            &mut results,
            &Reached::default(),
            &mut FxIndexSet::default(),
        );
        let printed = results.to_string(&ctx);
        assert!(printed.starts_with("fn main {\n    entry:\n        in : {}\n"));
        assert!(printed.contains("        out : {a, b, d, e}\n"));
    }
}
