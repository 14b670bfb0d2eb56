use std::path::PathBuf;

use pta_analysis::{
    analyse_context, dataflow::live_variables::compute_live_variable, AnalysisConfig,
    CallGraphReport,
};
use pta_ir::Context;

// -------------------------------------------------------------------------------------------------
// Utility for finding test files and running FileCheck.

fn run_tests<F: Fn(&str, &Context) -> String>(sub_dir: &str, output_fn: F) {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let dir: PathBuf = format!("{manifest_dir}/tests/{sub_dir}").into();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();

        let input_bytes = std::fs::read(&path).unwrap();
        let input = String::from_utf8_lossy(&input_bytes);

        let ir = pta_ir::parser::parse(&input).unwrap_or_else(|parse_err| {
            println!("{}: {parse_err}", path.display());
            panic!()
        });

        let first_line = input.split('\n').next().unwrap();
        let output = output_fn(first_line, &ir);

        let chkr = filecheck::CheckerBuilder::new()
            .text(&input)
            .unwrap()
            .finish();
        if chkr.is_empty() {
            println!("{output}");
            panic!("No filecheck directives found in test: {}", path.display());
        }

        match chkr.explain(&output, filecheck::NO_VARIABLES) {
            Ok((success, report)) if !success => {
                println!("--- FILECHECK FAILED FOR {}", path.display());
                println!("{report}");
                panic!()
            }
            Err(e) => {
                panic!("filecheck directive error while checking: {e}");
            }
            _ => (),
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[test]
fn points_to() {
    // The first line may turn on reporting of calls without a source line.
    run_tests("points_to", |first_line, ir: &Context| {
        let mut config = AnalysisConfig::default();
        config.report.include_unlocated = first_line.contains("include_unlocated");

        let result = analyse_context(ir, &config).unwrap();
        CallGraphReport::new(ir, &result.call_graph, &config.report).to_string()
    })
}

#[test]
fn liveness() {
    run_tests("liveness", |_, ir: &Context| {
        ir.module_iter()
            .flat_map(|module| module.function_iter(ir))
            .filter(|function| !function.is_declaration(ir))
            .map(|function| compute_live_variable(ir, function).to_string(ir, function))
            .collect::<Vec<_>>()
            .join("\n")
    })
}
