//! An interprocedural, flow sensitive points-to analysis which builds the call graph as it goes.
//!
//! Resolving an indirect call needs to know what the called pointer points to, while propagating
//! points-to facts across calls needs the call graph.  Both are computed together: each function
//! is solved with the dataflow engine, calls descend into their callees and returns flow back into
//! every known call site.  The driver repeats until a full sweep over the module changes nothing.

pub mod alloc;
pub mod call_graph;
pub mod state;
pub mod visitor;

pub use call_graph::{CallGraph, CallerIndex};
pub use state::{AllocSite, Location, LocationSet, PointsToState};
pub use visitor::PointsToVisitor;

use pta_ir::{
    printer::Namer, AnalysisResultT, Context, FxIndexMap, FxIndexSet, Function, Module,
};
use tracing::{debug, info};

use crate::{
    config::AnalysisConfig,
    dataflow::{DataflowResults, DataflowValue},
    error::AnalysisError,
};

/// The outcome of [`analyse_module`].
pub struct PointsToResult {
    pub call_graph: CallGraph,
    /// The joined exit state of each analysed function.
    pub summaries: FxIndexMap<Function, PointsToState>,
    /// Per block states of each analysed function.
    pub dataflow: DataflowResults<PointsToState>,
    pub num_alloc_sites: usize,
    /// How many times a function was solved from the top.
    pub passes: usize,
}

impl AnalysisResultT for PointsToResult {}

impl PointsToResult {
    pub fn summary(&self, function: &Function) -> Option<&PointsToState> {
        self.summaries.get(function)
    }

    /// Print the summaries of `functions`, skipping any which were never analysed.
    pub fn summaries_to_string(&self, context: &Context, functions: &[Function]) -> String {
        functions
            .iter()
            .filter_map(|function| Some((function, self.summary(function)?)))
            .map(|(function, state)| {
                format!(
                    "{} : {}\n",
                    function.get_name(context),
                    state.display(context, &mut Namer::new(*function))
                )
            })
            .collect()
    }
}

/// Analyse every function with a body in `module`.
pub fn analyse_module(
    context: &Context,
    module: Module,
    config: &AnalysisConfig,
) -> PointsToResult {
    let functions: Vec<Function> = module
        .function_iter(context)
        .filter(|function| !function.is_intrinsic(context) && !function.is_declaration(context))
        .collect();

    let mut visitor = PointsToVisitor::new(&config.points_to);
    let mut results = DataflowResults::default();
    let passes = solve(context, &functions, &mut visitor, &mut results);

    let summaries = functions
        .iter()
        .map(|function| {
            let mut summary = PointsToState::default();
            if let Some(result) = results.get(function) {
                for exit in visitor.exits.exit_blocks(context, *function) {
                    summary.merge(result.output(exit));
                }
            }
            (*function, summary)
        })
        .collect();

    info!(
        "points-to analysis of `{}` converged after {passes} passes: {} call sites, {} call edges, {} allocation sites",
        module.get_name(context),
        visitor.call_graph.num_call_sites(),
        visitor.call_graph.num_edges(),
        visitor.allocs.len(),
    );

    PointsToResult {
        call_graph: visitor.call_graph,
        summaries,
        dataflow: results,
        num_alloc_sites: visitor.allocs.len(),
        passes,
    }
}

/// Sweep over `functions` until a whole sweep changes nothing.  Returns the number of times a
/// function was solved from the top.
pub(crate) fn solve(
    context: &Context,
    functions: &[Function],
    visitor: &mut PointsToVisitor<'_>,
    results: &mut DataflowResults<PointsToState>,
) -> usize {
    let initval = PointsToState::default();
    let mut func_worklist = FxIndexSet::default();
    let mut passes = 0;
    let mut round = 0;
    loop {
        round += 1;
        let num_edges = visitor.call_graph.num_edges();
        func_worklist.extend(functions.iter().copied());

        let mut changed = false;
        while let Some(function) = func_worklist.shift_remove_index(0) {
            passes += 1;
            debug!(
                "pass {passes} (round {round}): analysing {}",
                function.get_name(context)
            );
            changed |=
                visitor.analyse_function(context, function, results, &initval, &mut func_worklist);
        }
        changed |= visitor.take_changed();
        changed |= visitor.call_graph.num_edges() != num_edges;
        if !changed {
            return passes;
        }
    }
}

/// Analyse the first module in `context`.
pub fn analyse_context(
    context: &Context,
    config: &AnalysisConfig,
) -> Result<PointsToResult, AnalysisError> {
    let module = context.module_iter().next().ok_or(AnalysisError::NoModule)?;
    Ok(analyse_module(context, module, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pta_ir::parser::parse;

    fn analyse(input: &str) -> (Context, PointsToResult) {
        let ctx = parse(input).unwrap();
        let result = analyse_context(&ctx, &AnalysisConfig::default()).unwrap();
        (ctx, result)
    }

    fn callees_at(ctx: &Context, result: &PointsToResult, line: u32) -> Vec<String> {
        let mut names: Vec<String> = result
            .call_graph
            .iter()
            .filter(|(call_site, _)| call_site.get_line(ctx) == Some(line))
            .flat_map(|(call_site, _)| result.call_graph.callee_names(ctx, call_site))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    #[test]
    fn store_through_unknown_pointer_is_dropped() {
        let (ctx, result) = analyse(
            r"
            module m {
                fn f() {
                entry:
                    ret
                }
                fn main(p) {
                entry:
                    store f to p
                    g = load p
                    call g(), line 4
                    ret
                }
            }",
        );
        assert!(callees_at(&ctx, &result, 4).is_empty());
    }

    #[test]
    fn summaries_print_exit_states() {
        let (ctx, result) = analyse(
            r"
            module m {
                declare fn ext()
                fn f() {
                entry:
                    ret
                }
                fn main() {
                entry:
                    a = alloca
                    store f to a
                    ret
                }
            }",
        );
        let module = ctx.module_iter().next().unwrap();
        let ext = module.get_function(&ctx, "ext").unwrap();
        let main = module.get_function(&ctx, "main").unwrap();
        assert_eq!(
            result.summaries_to_string(&ctx, &[ext, main]),
            "main : {a -> {alloc.0}, *alloc.0 -> {f}}\n"
        );
    }

    #[test]
    fn strong_update_replaces_contents() {
        let (ctx, result) = analyse(
            r"
            module m {
                fn f() {
                entry:
                    ret
                }
                fn g() {
                entry:
                    ret
                }
                fn main() {
                entry:
                    a = alloca
                    store f to a
                    store g to a
                    x = load a
                    call x(), line 5
                    ret
                }
            }",
        );
        assert_eq!(callees_at(&ctx, &result, 5), ["g"]);
    }

    #[test]
    fn weak_update_through_ambiguous_pointer() {
        let (ctx, result) = analyse(
            r"
            module m {
                fn f() {
                entry:
                    ret
                }
                fn g() {
                entry:
                    ret
                }
                fn main(c) {
                entry:
                    a = alloca
                    b = alloca
                    store f to a
                    cbr c, left, right
                left:
                    br join
                right:
                    br join
                join:
                    p = phi(left: a, right: b)
                    store g to p
                    x = load a
                    call x(), line 12
                    ret
                }
            }",
        );
        assert_eq!(callees_at(&ctx, &result, 12), ["f", "g"]);
    }

    #[test]
    fn allocation_sites_are_stable_across_passes() {
        let (_ctx, result) = analyse(
            r"
            module m {
                declare fn malloc(size)
                fn main(c) {
                entry:
                    br head
                head:
                    p = call malloc(8)
                    q = alloca
                    cbr c, head, exit
                exit:
                    ret
                }
            }",
        );
        assert_eq!(result.num_alloc_sites, 2);
    }

    #[test]
    fn mem_copy_copies_contents() {
        let (ctx, result) = analyse(
            r"
            module m {
                fn h() {
                entry:
                    ret
                }
                fn main() {
                entry:
                    src = alloca
                    dst = alloca
                    store h to src
                    mem_copy dst, src
                    x = load dst
                    call x(), line 6
                    ret
                }
            }",
        );
        assert_eq!(callees_at(&ctx, &result, 6), ["h"]);
    }

    #[test]
    fn recursion_terminates() {
        let (ctx, result) = analyse(
            r"
            module m {
                fn f() {
                entry:
                    ret
                }
                fn rec(p) {
                entry:
                    x = call rec(p), line 3
                    call p(), line 4
                    ret p
                }
                fn main() {
                entry:
                    y = call rec(f), line 8
                    call y(), line 9
                    ret
                }
            }",
        );
        assert_eq!(callees_at(&ctx, &result, 3), ["rec"]);
        assert_eq!(callees_at(&ctx, &result, 4), ["f"]);
        assert_eq!(callees_at(&ctx, &result, 9), ["f"]);
    }

    #[test]
    fn intrinsics_and_ignored_callees_have_no_edges() {
        let ctx = parse(
            r"
            module m {
                declare fn llvm.dbg.value(v)
                declare fn printf(fmt, ...)
                declare fn puts(s)
                fn main() {
                entry:
                    call llvm.dbg.value(0), line 1
                    call printf(0, 1), line 2
                    call puts(0), line 3
                    ret
                }
            }",
        )
        .unwrap();
        let config = AnalysisConfig::from_opts(
            crate::ConfigOptions::from_toml_str("[points_to]\nignored_callees = [\"printf\"]\n")
                .unwrap(),
        );
        let result = analyse_context(&ctx, &config).unwrap();
        assert!(callees_at(&ctx, &result, 1).is_empty());
        assert!(callees_at(&ctx, &result, 2).is_empty());
        assert_eq!(callees_at(&ctx, &result, 3), ["puts"]);
    }

    #[test]
    fn fixed_point_is_stable() {
        let ctx = parse(
            r"
            module m {
                fn f() {
                entry:
                    ret
                }
                fn g() {
                entry:
                    ret
                }
                fn pick(c) {
                entry:
                    cbr c, a, b
                a:
                    br done
                b:
                    br done
                done:
                    r = phi(a: f, b: g)
                    ret r
                }
                fn main(c) {
                entry:
                    fp = call pick(c), line 2
                    call fp(), line 3
                    ret
                }
            }",
        )
        .unwrap();
        let module = ctx.module_iter().next().unwrap();
        let functions: Vec<Function> = module
            .function_iter(&ctx)
            .filter(|function| !function.is_declaration(&ctx))
            .collect();
        let config = AnalysisConfig::default();
        let mut visitor = PointsToVisitor::new(&config.points_to);
        let mut results = DataflowResults::default();
        solve(&ctx, &functions, &mut visitor, &mut results);

        let converged = results.clone();
        let call_graph = visitor.call_graph.clone();
        let mut worklist = FxIndexSet::default();
        let initval = PointsToState::default();
        for function in &functions {
            assert!(!visitor.analyse_function(
                &ctx,
                *function,
                &mut results,
                &initval,
                &mut worklist
            ));
        }
        assert!(!visitor.take_changed());
        assert!(worklist.is_empty());
        assert_eq!(results, converged);
        assert_eq!(visitor.call_graph, call_graph);

        let main = module.get_function(&ctx, "main").unwrap();
        let call = main.get_entry_block(&ctx).get_instruction_at(&ctx, 1).unwrap();
        assert_eq!(call_graph.callee_names(&ctx, &call), ["f", "g"]);
    }

    #[test]
    fn missing_module_is_an_error() {
        let ctx = Context::default();
        assert!(matches!(
            analyse_context(&ctx, &AnalysisConfig::default()),
            Err(AnalysisError::NoModule)
        ));
    }
}
