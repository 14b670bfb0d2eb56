//! Command line driver: parse an IR file, run the points-to analysis and print the call graph.

use anyhow::{Context as _, Result};
use clap::Parser;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{error, info};

use pta_analysis::{
    dataflow::live_variables::LivenessResult,
    register_known_passes, AnalysisConfig, AnalysisError, CallGraphReport, PointsToResult,
    CALL_GRAPH_REPORT_NAME, LIVE_VARIABLE_NAME, MODULE_PRINTER_NAME,
};
use pta_ir::{Context, Function, Module, PassManager, PassManagerConfig};
use pta_tracing::{init_tracing_subscriber, println_yellow_err, TracingSubscriberOptions};

#[derive(Debug, Parser)]
#[command(
    name = "pta",
    about = "Interprocedural points-to analysis. Prints the functions each call may invoke, by source line.",
    version
)]
pub struct App {
    /// The IR file to analyse.
    pub file: PathBuf,
    /// Path to a `pta.toml`.  By default the closest one to FILE is used, if any.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Print the parsed IR before analysing it.
    #[arg(long)]
    pub print_ir: bool,
    /// Print what every pointer may point to when each function returns.
    #[arg(long)]
    pub print_points_to: bool,
    /// Print the live values at the start and end of every block.
    #[arg(long)]
    pub liveness: bool,
    /// Only print points-to and liveness results for this function.
    #[arg(long)]
    pub function: Option<String>,
    /// Use verbose output.  Repeat for more detail.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
    /// Silence all output except the analysis results.
    #[arg(long)]
    pub silent: bool,
}

fn main() {
    let app = App::parse();
    init_tracing_subscriber(TracingSubscriberOptions {
        verbosity: Some(app.verbose),
        silent: Some(app.silent),
        ..Default::default()
    });
    if let Err(err) = run(app) {
        error!("Error: {:?}", err);
        std::process::exit(1);
    }
}

fn run(app: App) -> Result<()> {
    let input = fs::read_to_string(&app.file)
        .with_context(|| format!("failed to read IR from {}", app.file.display()))?;
    let ir = pta_ir::parser::parse(&input)
        .with_context(|| format!("failed to load IR from {}", app.file.display()))?;

    let config = match &app.config {
        Some(path) => AnalysisConfig::from_file(path.clone())?,
        None => {
            let dir = app
                .file
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            AnalysisConfig::from_dir(dir)?
        }
    };

    let mut pm = PassManager::default();
    register_known_passes(&mut pm, &config);
    let mut to_run = Vec::new();
    if app.print_ir {
        to_run.push(MODULE_PRINTER_NAME.to_owned());
    }
    to_run.push(CALL_GRAPH_REPORT_NAME.to_owned());
    if app.liveness {
        to_run.push(LIVE_VARIABLE_NAME.to_owned());
    }
    pm.run(&ir, &PassManagerConfig { to_run })?;

    let module = ir.module_iter().next().ok_or(AnalysisError::NoModule)?;
    let functions = selected_functions(&ir, module, app.function.as_deref())?;

    if app.print_points_to {
        let points_to = pm
            .analyses()
            .get_analysis_result::<PointsToResult, _>(module);
        print!("{}", points_to.summaries_to_string(&ir, &functions));
    }

    if app.liveness {
        for function in &functions {
            let liveness = pm
                .analyses()
                .get_analysis_result::<LivenessResult, _>(*function);
            print!("{}", liveness.0.to_string(&ir, *function));
        }
    }

    let report = pm
        .analyses()
        .get_analysis_result::<CallGraphReport, _>(module);
    if report.is_empty() {
        println_yellow_err("No call with a source line could be resolved.");
    }
    print!("{report}");
    info!(
        "Analysed {} functions of `{}`.",
        module.num_functions(&ir),
        module.get_name(&ir)
    );
    Ok(())
}

/// The functions with a body to print results for.
fn selected_functions(
    ir: &Context,
    module: Module,
    name: Option<&str>,
) -> Result<Vec<Function>, AnalysisError> {
    match name {
        Some(name) => module
            .get_function(ir, name)
            .filter(|function| !function.is_declaration(ir))
            .map(|function| vec![function])
            .ok_or_else(|| AnalysisError::MissingFunction(name.to_owned())),
        None => Ok(module
            .function_iter(ir)
            .filter(|function| !function.is_declaration(ir))
            .collect()),
    }
}
