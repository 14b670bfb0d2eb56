use std::collections::BTreeSet;

use pta_ir::{
    printer::Namer, AnalysisResult, AnalysisResultT, AnalysisResults, Context, Function, IrError,
    Pass, ScopedPass, Value,
};

use super::{
    compute_backward, DataflowEnv, DataflowResult, DataflowResults, DataflowValue, DataflowVisitor,
};

/// The instructions and arguments whose value may still be used.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LivenessInfo(pub BTreeSet<Value>);

impl DataflowValue for LivenessInfo {
    fn merge(&mut self, src: &Self) -> bool {
        let before = self.0.len();
        self.0.extend(src.0.iter().copied());
        self.0.len() != before
    }

    fn display(&self, context: &Context, namer: &mut Namer) -> String {
        let names: Vec<_> = self
            .0
            .iter()
            .map(|value| namer.name(context, value))
            .collect();
        format!("{{{}}}", names.join(", "))
    }
}

struct LiveVariableVisitor;

impl DataflowVisitor<LivenessInfo> for LiveVariableVisitor {
    fn compute_instruction(
        &mut self,
        context: &Context,
        inst: Value,
        dfval: &mut LivenessInfo,
        _env: &mut DataflowEnv<'_, LivenessInfo>,
    ) {
        let Some(instruction) = inst.get_instruction(context) else {
            panic!("Liveness visited {inst:?} which is not an instruction.");
        };
        dfval.0.remove(&inst);
        dfval.0.extend(
            instruction
                .op
                .get_operands()
                .into_iter()
                .filter(|op| op.is_instruction(context) || op.get_argument(context).is_some()),
        );
    }
}

pub struct LivenessResult(pub DataflowResult<LivenessInfo>);
impl AnalysisResultT for LivenessResult {}

pub fn compute_live_variable_pass(
    context: &Context,
    _: &AnalysisResults,
    function: Function,
) -> Result<AnalysisResult, IrError> {
    Ok(Box::new(LivenessResult(compute_live_variable(
        context, function,
    ))))
}

/// Compute the live values at the start and end of each block of `function`.
pub fn compute_live_variable(
    context: &Context,
    function: Function,
) -> DataflowResult<LivenessInfo> {
    if function.is_declaration(context) {
        return DataflowResult::default();
    }
    let mut results = DataflowResults::default();
    compute_backward(
        context,
        function,
        &mut LiveVariableVisitor,
        &mut results,
        &LivenessInfo::default(),
    );
    results.into_function(&function).unwrap_or_default()
}

pub const LIVE_VARIABLE_NAME: &str = "livevar";

pub fn create_live_variable_pass() -> Pass {
    Pass {
        name: LIVE_VARIABLE_NAME,
        descr: "Live variable analysis",
        deps: vec![],
        runner: ScopedPass::FunctionPass(Box::new(compute_live_variable_pass)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pta_ir::parser::parse;

    fn live_names(context: &Context, function: Function, info: &LivenessInfo) -> Vec<String> {
        let mut namer = Namer::new(function);
        info.0.iter().map(|v| namer.name(context, v)).collect()
    }

    #[test]
    fn values_are_live_until_their_last_use() {
        let ctx = parse(
            r"
            module m {
                fn main(c) {
                entry:
                    p = alloca
                    q = alloca
                    cbr c, use_p, use_q
                use_p:
                    x = load p
                    br done
                use_q:
                    y = load q
                    br done
                done:
                    ret
                }
            }",
        )
        .unwrap();
        let main = ctx
            .module_iter()
            .next()
            .unwrap()
            .get_function(&ctx, "main")
            .unwrap();
        let result = compute_live_variable(&ctx, main);

        let entry = main.get_entry_block(&ctx);
        let use_p = main.get_block_by_label(&ctx, "use_p").unwrap();
        let done = main.get_block_by_label(&ctx, "done").unwrap();
        assert_eq!(live_names(&ctx, main, result.input(&entry)), ["c"]);
        assert_eq!(live_names(&ctx, main, result.output(&entry)), ["p", "q"]);
        assert_eq!(live_names(&ctx, main, result.input(&use_p)), ["p"]);
        assert!(result.input(&done).0.is_empty());
    }

    #[test]
    fn loop_carried_values_stay_live() {
        let ctx = parse(
            r"
            module m {
                fn main() {
                entry:
                    p = alloca
                    br head
                head:
                    c = load p
                    cbr c, head, exit
                exit:
                    ret
                }
            }",
        )
        .unwrap();
        let main = ctx
            .module_iter()
            .next()
            .unwrap()
            .get_function(&ctx, "main")
            .unwrap();
        let result = compute_live_variable(&ctx, main);

        let head = main.get_block_by_label(&ctx, "head").unwrap();
        assert_eq!(live_names(&ctx, main, result.input(&head)), ["p"]);
        assert_eq!(live_names(&ctx, main, result.output(&head)), ["p"]);
    }

    #[test]
    fn declarations_have_no_blocks() {
        let ctx = parse("module m { declare fn ext(a) }").unwrap();
        let ext = ctx
            .module_iter()
            .next()
            .unwrap()
            .get_function(&ctx, "ext")
            .unwrap();
        assert_eq!(compute_live_variable(&ctx, ext).iter().count(), 0);
    }
}
