use pta_ir::{
    printer::create_module_printer_pass, AnalysisResult, AnalysisResults, Context, IrError, Module,
    Pass, PassManager, ScopedPass,
};

use crate::{
    analyse_module, dataflow::live_variables::create_live_variable_pass, AnalysisConfig,
    CallGraphReport, PointsToResult,
};

pub use crate::dataflow::live_variables::LIVE_VARIABLE_NAME;
pub use pta_ir::printer::MODULE_PRINTER_NAME;

pub const POINTS_TO_NAME: &str = "points-to";
pub const CALL_GRAPH_REPORT_NAME: &str = "call-graph";

pub fn create_points_to_pass(config: AnalysisConfig) -> Pass {
    Pass {
        name: POINTS_TO_NAME,
        descr: "Interprocedural points-to analysis and call graph construction",
        deps: vec![],
        runner: ScopedPass::ModulePass(Box::new(
            move |context: &Context,
                  _: &AnalysisResults,
                  module: Module|
                  -> Result<AnalysisResult, IrError> {
                Ok(Box::new(analyse_module(context, module, &config)))
            },
        )),
    }
}

pub fn create_call_graph_report_pass(config: AnalysisConfig) -> Pass {
    Pass {
        name: CALL_GRAPH_REPORT_NAME,
        descr: "Group the resolved callees of each call by source line",
        deps: vec![POINTS_TO_NAME],
        runner: ScopedPass::ModulePass(Box::new(
            move |context: &Context,
                  analyses: &AnalysisResults,
                  module: Module|
                  -> Result<AnalysisResult, IrError> {
                let points_to = analyses.get_analysis_result::<PointsToResult, _>(module);
                Ok(Box::new(CallGraphReport::new(
                    context,
                    &points_to.call_graph,
                    &config.report,
                )))
            },
        )),
    }
}

pub fn register_known_passes(pm: &mut PassManager, config: &AnalysisConfig) {
    pm.register(create_module_printer_pass());
    pm.register(create_points_to_pass(config.clone()));
    pm.register(create_call_graph_report_pass(config.clone()));
    pm.register(create_live_variable_pass());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::live_variables::LivenessResult;
    use pta_ir::{parser::parse, PassManagerConfig};

    #[test]
    fn report_pass_runs_points_to_first() {
        let ctx = parse(
            r"
            module m {
                fn f() {
                entry:
                    ret
                }
                fn main() {
                entry:
                    p = alloca
                    store f to p
                    fp = load p
                    call fp(), line 4
                    ret
                }
            }",
        )
        .unwrap();
        let mut pm = PassManager::default();
        register_known_passes(&mut pm, &AnalysisConfig::default());
        assert!(pm.is_registered(POINTS_TO_NAME));
        pm.run(
            &ctx,
            &PassManagerConfig {
                to_run: vec![
                    CALL_GRAPH_REPORT_NAME.to_owned(),
                    LIVE_VARIABLE_NAME.to_owned(),
                ],
            },
        )
        .unwrap();

        let module = ctx.module_iter().next().unwrap();
        let report = pm
            .analyses()
            .get_analysis_result::<CallGraphReport, _>(module);
        assert_eq!(report.to_string(), "4 : f\n");
        assert!(pm
            .analyses()
            .try_get_analysis_result::<PointsToResult, _>(module)
            .is_some());

        let main = module.get_function(&ctx, "main").unwrap();
        let liveness = pm.analyses().get_analysis_result::<LivenessResult, _>(main);
        assert!(liveness.0.input(&main.get_entry_block(&ctx)).0.is_empty());
    }
}
