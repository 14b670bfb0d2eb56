use pta_ir::{Block, Context, FxIndexMap, Function, Value};
use tracing::trace;

use super::state::{AllocSite, Location};

/// Maps each allocation instruction to its abstract location.
///
/// Sites are minted on first visit and never change, so revisiting an allocation keeps pointing
/// at the same object.
#[derive(Clone, Debug, Default)]
pub struct AllocationTable {
    sites: FxIndexMap<Value, AllocSite>,
}

impl AllocationTable {
    pub fn location(&mut self, context: &Context, inst: Value) -> Location {
        let next = AllocSite(self.sites.len() as u32);
        let site = *self.sites.entry(inst).or_insert_with(|| {
            trace!(
                "minted {next} for {:?} at line {:?}",
                inst,
                inst.get_line(context)
            );
            next
        });
        Location::Alloc(site)
    }

    pub fn get(&self, inst: &Value) -> Option<AllocSite> {
        self.sites.get(inst).copied()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

/// The blocks of each function without successors.  Their `out` summarises a call.
#[derive(Clone, Debug, Default)]
pub struct ExitBlockIndex {
    exits: FxIndexMap<Function, Vec<Block>>,
}

impl ExitBlockIndex {
    pub fn exit_blocks(&mut self, context: &Context, function: Function) -> &[Block] {
        self.exits
            .entry(function)
            .or_insert_with(|| function.get_exit_blocks(context))
    }
}
