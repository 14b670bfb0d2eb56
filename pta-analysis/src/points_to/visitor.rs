//! Transfer functions of the points-to analysis.

use std::collections::VecDeque;

use pta_ir::{Block, Callee, Context, FxIndexSet, Function, InstOp, Value};
use tracing::trace;

use super::{
    alloc::{AllocationTable, ExitBlockIndex},
    call_graph::{CallGraph, CallerIndex},
    state::{Location, LocationSet, PointsToState},
};
use crate::{
    config::PointsTo,
    dataflow::{compute_forward, DataflowEnv, DataflowResults, DataflowValue, DataflowVisitor},
};

/// Whole program state of one points-to analysis run.
pub struct PointsToVisitor<'a> {
    config: &'a PointsTo,
    pub(crate) call_graph: CallGraph,
    pub(crate) callers: CallerIndex,
    pub(crate) allocs: AllocationTable,
    pub(crate) exits: ExitBlockIndex,
    /// Functions currently being solved, outermost first.
    active: Vec<Function>,
    /// Functions solved at least once.
    analysed: FxIndexSet<Function>,
    /// Set whenever a callee's entry state grows or a nested solve changes anything.
    changed: bool,
}

impl<'a> PointsToVisitor<'a> {
    pub fn new(config: &'a PointsTo) -> Self {
        PointsToVisitor {
            config,
            call_graph: CallGraph::default(),
            callers: CallerIndex::default(),
            allocs: AllocationTable::default(),
            exits: ExitBlockIndex::default(),
            active: Vec::new(),
            analysed: FxIndexSet::default(),
            changed: false,
        }
    }

    /// Solve `function` from the top, returning whether anything changed.
    pub fn analyse_function(
        &mut self,
        context: &Context,
        function: Function,
        results: &mut DataflowResults<PointsToState>,
        initval: &PointsToState,
        func_worklist: &mut FxIndexSet<Function>,
    ) -> bool {
        self.active.push(function);
        let changed = compute_forward(context, function, self, results, initval, func_worklist);
        self.active.pop();
        self.analysed.insert(function);
        changed
    }

    /// Return and reset the changed flag.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    fn copy(&self, context: &Context, dst: Value, src: Value, dfval: &mut PointsToState) {
        let locations = dfval.points_to(context, src);
        dfval.set_points_to(dst, locations);
    }

    fn load(&self, context: &Context, dst: Value, src: Value, dfval: &mut PointsToState) {
        if !dfval.is_tracked(context, src) {
            return;
        }
        let loaded: LocationSet = dfval
            .points_to(context, src)
            .iter()
            .flat_map(|location| dfval.contents(location))
            .collect();
        dfval.set_points_to(dst, loaded);
    }

    fn store(&self, context: &Context, dst: Value, stored: Value, dfval: &mut PointsToState) {
        let targets = dfval.points_to(context, dst);
        let stored = dfval.points_to(context, stored);
        match targets.len() {
            // Storing through an unknown pointer is dropped.
            0 => (),
            1 => {
                if let Some(target) = targets.first() {
                    dfval.set_contents(*target, stored);
                }
            }
            _ => {
                for target in targets {
                    dfval.add_contents(target, &stored);
                }
            }
        }
    }

    fn phi(
        &self,
        context: &Context,
        dst: Value,
        incoming: &[(Block, Value)],
        dfval: &mut PointsToState,
    ) {
        let merged: LocationSet = incoming
            .iter()
            .flat_map(|(_, value)| dfval.points_to(context, *value))
            .collect();
        dfval.set_points_to(dst, merged);
    }

    fn mem_copy(&self, context: &Context, dst: Value, src: Value, dfval: &mut PointsToState) {
        let dst_locations = dfval.points_to(context, dst);
        let src_locations = dfval.points_to(context, src);
        for d in &dst_locations {
            for s in &src_locations {
                let contents = dfval.contents(s);
                dfval.add_contents(*d, &contents);
            }
        }
    }

    /// Add call graph edges for `call_site` and return the functions it may invoke.
    fn resolve_callees(
        &mut self,
        context: &Context,
        call_site: Value,
        callee: &Callee,
        dfval: &PointsToState,
    ) -> Vec<Function> {
        let targets = match callee {
            Callee::Direct(function) => vec![*function],
            Callee::Indirect(fn_ptr) => self.reachable_functions(context, *fn_ptr, dfval),
        };
        let mut resolved = Vec::with_capacity(targets.len());
        for target in targets {
            if target.is_intrinsic(context) || self.config.is_ignored(target.get_name(context)) {
                continue;
            }
            if self.call_graph.add_edge(call_site, target) {
                trace!(
                    "call at line {:?} may invoke {}",
                    call_site.get_line(context),
                    target.get_name(context)
                );
            }
            self.callers.add_caller(target, call_site);
            resolved.push(target);
        }
        resolved
    }

    /// Breadth first walk of the points-to graph from `fn_ptr`, collecting every function found.
    fn reachable_functions(
        &self,
        context: &Context,
        fn_ptr: Value,
        dfval: &PointsToState,
    ) -> Vec<Function> {
        let mut functions = Vec::new();
        let mut visited = FxIndexSet::default();
        let mut queue: VecDeque<Location> = dfval.points_to(context, fn_ptr).into_iter().collect();
        while let Some(location) = queue.pop_front() {
            if !visited.insert(location) {
                continue;
            }
            match location {
                Location::Function(function) => functions.push(function),
                Location::Alloc(_) => queue.extend(dfval.contents(&location)),
            }
        }
        functions
    }

    fn call(
        &mut self,
        context: &Context,
        call_site: Value,
        callee: &Callee,
        args: &[Value],
        dfval: &mut PointsToState,
        env: &mut DataflowEnv<'_, PointsToState>,
    ) {
        for target in self.resolve_callees(context, call_site, callee, dfval) {
            if self.config.is_allocator(target.get_name(context)) {
                let location = self.allocs.location(context, call_site);
                dfval.set_points_to(call_site, LocationSet::from([location]));
            } else if !target.is_declaration(context) {
                self.descend(context, target, args, dfval, env);
            }
        }
    }

    /// Bind `args` into `callee`, solve it if its entry grew and merge its exit state back.
    fn descend(
        &mut self,
        context: &Context,
        callee: Function,
        args: &[Value],
        dfval: &mut PointsToState,
        env: &mut DataflowEnv<'_, PointsToState>,
    ) {
        let mut callee_in = dfval.clone();
        for (idx, arg) in args.iter().enumerate() {
            if let Some(param) = callee.get_arg_at(context, idx) {
                let locations = dfval.points_to(context, *arg);
                callee_in.add_points_to(param, &locations);
            }
        }

        let entry = callee.get_entry_block(context);
        let entry_changed = env
            .results
            .init_function(context, callee, env.initval)
            .input_mut(&entry)
            .merge(&callee_in);
        self.changed |= entry_changed;

        if self.active.contains(&callee) {
            // Recursion.  Use the summary we have and solve the callee again later.
            if entry_changed {
                env.func_worklist.insert(callee);
                if let Some(current) = self.active.last() {
                    env.func_worklist.insert(*current);
                }
            }
        } else if entry_changed || !self.analysed.contains(&callee) {
            self.active.push(callee);
            let callee_changed = compute_forward(
                context,
                callee,
                self,
                env.results,
                env.initval,
                env.func_worklist,
            );
            self.active.pop();
            self.changed |= callee_changed;
            self.analysed.insert(callee);
        }

        let exits = self.exits.exit_blocks(context, callee).to_vec();
        if let Some(result) = env.results.get(&callee) {
            for exit in &exits {
                dfval.merge(result.output(exit));
            }
        }
    }

    /// Flow the returned locations into every call site of the returning function.
    fn ret(
        &mut self,
        context: &Context,
        function: Function,
        value: Value,
        dfval: &mut PointsToState,
        env: &mut DataflowEnv<'_, PointsToState>,
    ) {
        let returned = dfval.points_to(context, value);
        if returned.is_empty() {
            return;
        }
        let call_sites: Vec<Value> = self.callers.callers(&function).collect();
        for call_site in call_sites {
            dfval.add_points_to(call_site, &returned);

            let Some(caller) = call_site
                .get_instruction(context)
                .map(|ins| ins.get_function(context))
            else {
                continue;
            };
            let entry = caller.get_entry_block(context);
            let Some(caller_entry) = env
                .results
                .get_mut(&caller)
                .and_then(|result| result.get_mut(&entry))
            else {
                continue;
            };
            if caller_entry.input.add_points_to(call_site, &returned) {
                env.func_worklist.insert(caller);
                self.changed = true;
            }
        }
    }
}

impl DataflowVisitor<PointsToState> for PointsToVisitor<'_> {
    fn compute_instruction(
        &mut self,
        context: &Context,
        inst: Value,
        dfval: &mut PointsToState,
        env: &mut DataflowEnv<'_, PointsToState>,
    ) {
        let Some(instruction) = inst.get_instruction(context) else {
            panic!("Points-to analysis visited {inst:?} which is not an instruction.");
        };
        match &instruction.op {
            InstOp::Alloca => {
                let location = self.allocs.location(context, inst);
                dfval.set_points_to(inst, LocationSet::from([location]));
            }
            InstOp::Call { callee, args } => self.call(context, inst, callee, args, dfval, env),
            InstOp::Cast(src) => self.copy(context, inst, *src, dfval),
            InstOp::GetElemPtr { base, .. } => self.copy(context, inst, *base, dfval),
            InstOp::Load(src) => self.load(context, inst, *src, dfval),
            InstOp::MemCopy {
                dst_val_ptr,
                src_val_ptr,
            } => self.mem_copy(context, *dst_val_ptr, *src_val_ptr, dfval),
            InstOp::Phi(incoming) => self.phi(context, inst, incoming, dfval),
            InstOp::Ret(Some(value)) => {
                let function = instruction.get_function(context);
                self.ret(context, function, *value, dfval, env)
            }
            InstOp::Store {
                dst_val_ptr,
                stored_val,
            } => self.store(context, *dst_val_ptr, *stored_val, dfval),
            InstOp::BinaryOp { .. }
            | InstOp::Branch(_)
            | InstOp::Cmp(..)
            | InstOp::ConditionalBranch { .. }
            | InstOp::Nop
            | InstOp::Ret(None) => (),
        }
    }
}
