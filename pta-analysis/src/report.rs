use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use itertools::Itertools;
use pta_ir::{AnalysisResultT, Context};

use crate::{config::Report, points_to::CallGraph};

/// The callees of every call site, grouped by source line.
///
/// Prints one `<line> : name1, name2` row per line, lines ascending and names sorted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallGraphReport {
    lines: BTreeMap<u32, BTreeSet<String>>,
}

impl AnalysisResultT for CallGraphReport {}

impl CallGraphReport {
    pub fn new(context: &Context, call_graph: &CallGraph, config: &Report) -> Self {
        let mut lines: BTreeMap<u32, BTreeSet<String>> = BTreeMap::new();
        for (call_site, callees) in call_graph.iter() {
            let line = match call_site.get_line(context) {
                Some(line) => line,
                None if config.include_unlocated => 0,
                None => continue,
            };
            if callees.is_empty() {
                continue;
            }
            lines
                .entry(line)
                .or_default()
                .extend(callees.iter().map(|callee| callee.get_name(context).to_owned()));
        }
        CallGraphReport { lines }
    }

    pub fn callees_at(&self, line: u32) -> Option<&BTreeSet<String>> {
        self.lines.get(&line)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl fmt::Display for CallGraphReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (line, names) in &self.lines {
            writeln!(f, "{line} : {}", names.iter().join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{analyse_module, AnalysisConfig};
    use pretty_assertions::assert_eq;
    use pta_ir::parser::parse;

    const INPUT: &str = r"
        module m {
            fn g() {
            entry:
                ret
            }
            fn f() {
            entry:
                ret
            }
            fn main(c) {
            entry:
                call g(), line 7
                cbr c, a, b
            a:
                br done
            b:
                br done
            done:
                fp = phi(a: g, b: f)
                call fp(), line 3
                call f(), line 7
                call f()
                ret
            }
        }";

    fn build(config: &AnalysisConfig) -> CallGraphReport {
        let ctx = parse(INPUT).unwrap();
        let module = ctx.module_iter().next().unwrap();
        let result = analyse_module(&ctx, module, config);
        CallGraphReport::new(&ctx, &result.call_graph, &config.report)
    }

    fn report(config: &AnalysisConfig) -> String {
        build(config).to_string()
    }

    #[test]
    fn lines_ascend_and_names_are_sorted() {
        assert_eq!(report(&AnalysisConfig::default()), "3 : f, g\n7 : f, g\n");
    }

    #[test]
    fn unlocated_calls_are_reported_on_request() {
        let mut config = AnalysisConfig::default();
        config.report.include_unlocated = true;
        assert_eq!(report(&config), "0 : f\n3 : f, g\n7 : f, g\n");
    }

    #[test]
    fn calls_on_one_line_share_a_row() {
        let report = build(&AnalysisConfig::default());
        let names: Vec<_> = report.callees_at(7).unwrap().iter().collect();
        assert_eq!(names, ["f", "g"]);
        assert!(report.callees_at(0).is_none());
        assert!(report.callees_at(5).is_none());
    }

    #[test]
    fn empty_call_graph_prints_nothing() {
        let report = CallGraphReport::default();
        assert!(report.is_empty());
        assert_eq!(report.to_string(), "");
    }
}
