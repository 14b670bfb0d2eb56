use crate::{Context, FxIndexMap, Function, IrError, Module};
use downcast_rs::{impl_downcast, Downcast};
use rustc_hash::FxHashMap;
use std::any::{type_name, TypeId};

/// Result of an analysis. Specific result must be downcasted to.
pub trait AnalysisResultT: Downcast {}
impl_downcast!(AnalysisResultT);
pub type AnalysisResult = Box<dyn AnalysisResultT>;

/// Program scope over which a pass executes.
pub trait PassScope {
    fn get_arena_idx(&self) -> slotmap::DefaultKey;
}
impl PassScope for Module {
    fn get_arena_idx(&self) -> slotmap::DefaultKey {
        self.0
    }
}
impl PassScope for Function {
    fn get_arena_idx(&self) -> slotmap::DefaultKey {
        self.0
    }
}

/// An analysis over scope `S`.  Analyses never modify the IR.
///
/// Runners are boxed closures so a pass can carry its own configuration.
pub type AnalysisRunner<S> =
    Box<dyn Fn(&Context, &AnalysisResults, S) -> Result<AnalysisResult, IrError>>;

/// A concrete version of [PassScope].
pub enum ScopedPass {
    ModulePass(AnalysisRunner<Module>),
    FunctionPass(AnalysisRunner<Function>),
}

pub struct Pass {
    pub name: &'static str,
    pub descr: &'static str,
    /// Passes which must have run before this one.
    pub deps: Vec<&'static str>,
    pub runner: ScopedPass,
}

#[derive(Default)]
pub struct AnalysisResults {
    // Hash from (AnalysisResultT, (PassScope, Scope Identity)) to an actual result.
    results: FxHashMap<(TypeId, (TypeId, slotmap::DefaultKey)), AnalysisResult>,
}

impl AnalysisResults {
    /// Get the results of an analysis.
    /// Example analyses.get_analysis_result::<LivenessResult>(foo).
    pub fn get_analysis_result<T: AnalysisResultT, S: PassScope + 'static>(&self, scope: S) -> &T {
        let idx = scope.get_arena_idx();
        self.try_get_analysis_result(scope).unwrap_or_else(|| {
            panic!(
                "Internal error. Analysis result {} unavailable for {} with idx {:?}",
                type_name::<T>(),
                type_name::<S>(),
                idx
            )
        })
    }

    /// Get the results of an analysis, if it has run for `scope`.
    pub fn try_get_analysis_result<T: AnalysisResultT, S: PassScope + 'static>(
        &self,
        scope: S,
    ) -> Option<&T> {
        self.results
            .get(&(
                TypeId::of::<T>(),
                (TypeId::of::<S>(), scope.get_arena_idx()),
            ))
            .and_then(|result| result.downcast_ref())
    }

    /// Add a new result.
    pub fn add_result<S: PassScope + 'static>(&mut self, scope: S, result: AnalysisResult) {
        self.results.insert(
            (
                (*result).as_any().type_id(),
                (TypeId::of::<S>(), scope.get_arena_idx()),
            ),
            result,
        );
    }
}

#[derive(Default)]
pub struct PassManager {
    passes: FxIndexMap<&'static str, Pass>,
    analyses: AnalysisResults,
}

impl PassManager {
    /// Register a pass. Should be called only once for each pass.
    pub fn register(&mut self, pass: Pass) -> &'static str {
        let pass_name = pass.name;
        if self.passes.insert(pass.name, pass).is_some() {
            panic!("Trying to register an already registered pass");
        }
        pass_name
    }

    /// Run the passes specified in `config`, along with the passes they depend on.
    ///
    /// Each pass runs at most once per call, dependencies first.
    pub fn run(&mut self, ir: &Context, config: &PassManagerConfig) -> Result<(), IrError> {
        let mut done = Vec::new();
        for pass in &config.to_run {
            self.run_pass(ir, pass, &mut done)?;
        }
        Ok(())
    }

    fn run_pass(
        &mut self,
        ir: &Context,
        pass: &str,
        done: &mut Vec<&'static str>,
    ) -> Result<(), IrError> {
        let pass_t = self
            .passes
            .get(pass)
            .unwrap_or_else(|| panic!("Unregistered pass '{pass}'"));
        if done.contains(&pass_t.name) {
            return Ok(());
        }
        let name = pass_t.name;
        let deps = pass_t.deps.clone();
        for dep in deps {
            self.run_pass(ir, dep, done)?;
        }

        let pass_t = &self.passes[name];
        for m in ir.module_iter() {
            match &pass_t.runner {
                ScopedPass::ModulePass(analysis) => {
                    let result = analysis(ir, &self.analyses, m)?;
                    self.analyses.add_result(m, result);
                }
                ScopedPass::FunctionPass(analysis) => {
                    for f in m.function_iter(ir) {
                        let result = analysis(ir, &self.analyses, f)?;
                        self.analyses.add_result(f, result);
                    }
                }
            }
        }
        done.push(name);
        Ok(())
    }

    /// The results of every pass run so far.
    pub fn analyses(&self) -> &AnalysisResults {
        &self.analyses
    }

    /// Is `name` a registered pass?
    pub fn is_registered(&self, name: &str) -> bool {
        self.passes.contains_key(name)
    }

    pub fn help_text(&self) -> String {
        let summary = self
            .passes
            .iter()
            .map(|(name, pass)| format!("  {name:16} - {}", pass.descr))
            .collect::<Vec<_>>()
            .join("\n");

        format!("Valid pass names are:\n\n{summary}",)
    }
}

/// Configuration for the pass manager to run passes.
pub struct PassManagerConfig {
    pub to_run: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    struct BlockCount(usize);
    impl AnalysisResultT for BlockCount {}

    #[test]
    fn function_pass_results_are_stored_per_function() {
        let ctx = parse(
            r"
            module m {
                declare fn ext()
                fn main() {
                entry:
                    br exit
                exit:
                    ret
                }
            }",
        )
        .unwrap();

        let mut pm = PassManager::default();
        pm.register(Pass {
            name: "count",
            descr: "Count blocks",
            deps: vec![],
            runner: ScopedPass::FunctionPass(Box::new(
                |ctx: &Context,
                 _: &AnalysisResults,
                 f: Function|
                 -> Result<AnalysisResult, IrError> {
                    Ok(Box::new(BlockCount(f.num_blocks(ctx))))
                },
            )),
        });
        pm.run(
            &ctx,
            &PassManagerConfig {
                to_run: vec!["count".to_owned()],
            },
        )
        .unwrap();

        let module = ctx.module_iter().next().unwrap();
        let main = module.get_function(&ctx, "main").unwrap();
        let ext = module.get_function(&ctx, "ext").unwrap();
        assert_eq!(pm.analyses().get_analysis_result::<BlockCount, _>(main).0, 2);
        assert_eq!(pm.analyses().get_analysis_result::<BlockCount, _>(ext).0, 0);
    }
}
