use pta_ir::{Context, FxIndexMap, FxIndexSet, Function, Value};

/// The functions each call site may invoke.  Edges are only ever added.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallGraph {
    edges: FxIndexMap<Value, FxIndexSet<Function>>,
}

impl CallGraph {
    /// Record that `call_site` may invoke `callee`.  Returns whether the edge is new.
    pub fn add_edge(&mut self, call_site: Value, callee: Function) -> bool {
        self.edges.entry(call_site).or_default().insert(callee)
    }

    pub fn callees(&self, call_site: &Value) -> impl Iterator<Item = Function> + '_ {
        self.edges.get(call_site).into_iter().flatten().copied()
    }

    /// Every call site with at least one callee, in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &FxIndexSet<Function>)> {
        self.edges.iter()
    }

    pub fn num_call_sites(&self) -> usize {
        self.edges.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.values().map(|callees| callees.len()).sum()
    }

    /// The names of the functions `call_site` may invoke, sorted.
    pub fn callee_names(&self, context: &Context, call_site: &Value) -> Vec<String> {
        let mut names: Vec<String> = self
            .callees(call_site)
            .map(|callee| callee.get_name(context).to_owned())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// The inverse of the [`CallGraph`]: the call sites which may invoke each function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallerIndex {
    callers: FxIndexMap<Function, FxIndexSet<Value>>,
}

impl CallerIndex {
    pub fn add_caller(&mut self, callee: Function, call_site: Value) -> bool {
        self.callers.entry(callee).or_default().insert(call_site)
    }

    pub fn callers(&self, callee: &Function) -> impl Iterator<Item = Value> + '_ {
        self.callers.get(callee).into_iter().flatten().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pta_ir::parser::parse;

    #[test]
    fn edges_are_deduplicated() {
        let ctx = parse(
            r"
            module m {
                fn g() {
                entry:
                    ret
                }
                fn f() {
                entry:
                    ret
                }
                fn main() {
                entry:
                    c = call f(), line 2
                    ret
                }
            }",
        )
        .unwrap();
        let module = ctx.module_iter().next().unwrap();
        let f = module.get_function(&ctx, "f").unwrap();
        let g = module.get_function(&ctx, "g").unwrap();
        let main = module.get_function(&ctx, "main").unwrap();
        let call = main.get_entry_block(&ctx).get_instruction_at(&ctx, 0).unwrap();

        let mut call_graph = CallGraph::default();
        assert!(call_graph.add_edge(call, g));
        assert!(call_graph.add_edge(call, f));
        assert!(!call_graph.add_edge(call, g));
        assert_eq!(call_graph.num_call_sites(), 1);
        assert_eq!(call_graph.num_edges(), 2);
        assert_eq!(call_graph.callee_names(&ctx, &call), ["f", "g"]);

        let mut callers = CallerIndex::default();
        assert!(callers.add_caller(f, call));
        assert!(!callers.add_caller(f, call));
        assert_eq!(callers.callers(&f).collect::<Vec<_>>(), [call]);
        assert_eq!(callers.callers(&g).count(), 0);
    }
}
