use std::{collections::BTreeSet, fmt};

use itertools::Itertools;
use pta_ir::{printer::Namer, Context, Function, FxIndexMap, Value};

use crate::dataflow::DataflowValue;

/// An abstract memory object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Location {
    /// The code of a function.  A function value always points here.
    Function(Function),
    /// Everything allocated by one stack or heap allocation instruction.
    Alloc(AllocSite),
}

/// The token minted for an allocation instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocSite(pub u32);

impl fmt::Display for AllocSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "alloc.{}", self.0)
    }
}

impl Location {
    fn display(&self, context: &Context) -> String {
        match self {
            Location::Function(function) => function.get_name(context).to_owned(),
            Location::Alloc(site) => site.to_string(),
        }
    }
}

pub type LocationSet = BTreeSet<Location>;

/// What every pointer may point to at a program point.
///
/// Values map to the locations they may hold and locations map to the locations which may be
/// stored in them.  A missing entry is the empty set, so an unknown pointer and a pointer known to
/// point nowhere are treated alike.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PointsToState {
    values: FxIndexMap<Value, LocationSet>,
    memory: FxIndexMap<Location, LocationSet>,
}

impl PointsToState {
    /// Is anything known about `value`?
    pub fn is_tracked(&self, context: &Context, value: Value) -> bool {
        value.get_function(context).is_some() || self.values.contains_key(&value)
    }

    /// The locations `value` may point to.
    pub fn points_to(&self, context: &Context, value: Value) -> LocationSet {
        match value.get_function(context) {
            Some(function) => LocationSet::from([Location::Function(function)]),
            None => self.values.get(&value).cloned().unwrap_or_default(),
        }
    }

    /// Strong update of `value`.
    pub fn set_points_to(&mut self, value: Value, locations: LocationSet) {
        if locations.is_empty() {
            self.values.swap_remove(&value);
        } else {
            self.values.insert(value, locations);
        }
    }

    /// Weak update of `value`, returning whether it grew.
    pub fn add_points_to(&mut self, value: Value, locations: &LocationSet) -> bool {
        if locations.is_empty() {
            return false;
        }
        union_into(self.values.entry(value).or_default(), locations)
    }

    /// The locations which may be stored in `location`.
    pub fn contents(&self, location: &Location) -> LocationSet {
        self.memory.get(location).cloned().unwrap_or_default()
    }

    /// Strong update of the memory at `location`.
    pub fn set_contents(&mut self, location: Location, locations: LocationSet) {
        if locations.is_empty() {
            self.memory.swap_remove(&location);
        } else {
            self.memory.insert(location, locations);
        }
    }

    /// Weak update of the memory at `location`, returning whether it grew.
    pub fn add_contents(&mut self, location: Location, locations: &LocationSet) -> bool {
        if locations.is_empty() {
            return false;
        }
        union_into(self.memory.entry(location).or_default(), locations)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.memory.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = (&Value, &LocationSet)> {
        self.values.iter()
    }

    pub fn memory(&self) -> impl Iterator<Item = (&Location, &LocationSet)> {
        self.memory.iter()
    }
}

fn union_into(dest: &mut LocationSet, src: &LocationSet) -> bool {
    let before = dest.len();
    dest.extend(src.iter().copied());
    dest.len() != before
}

fn set_to_string(context: &Context, set: &LocationSet) -> String {
    format!("{{{}}}", set.iter().map(|loc| loc.display(context)).join(", "))
}

impl DataflowValue for PointsToState {
    fn merge(&mut self, src: &Self) -> bool {
        let mut changed = false;
        for (value, locations) in &src.values {
            changed |= self.add_points_to(*value, locations);
        }
        for (location, locations) in &src.memory {
            changed |= self.add_contents(*location, locations);
        }
        changed
    }

    fn display(&self, context: &Context, namer: &mut Namer) -> String {
        let values = self
            .values
            .iter()
            .map(|(value, set)| (namer.name(context, value), set_to_string(context, set)))
            .sorted()
            .map(|(name, set)| format!("{name} -> {set}"));
        let memory = self
            .memory
            .iter()
            .map(|(location, set)| (location.display(context), set_to_string(context, set)))
            .sorted()
            .map(|(name, set)| format!("*{name} -> {set}"));
        format!("{{{}}}", values.chain(memory).join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pta_ir::parser::parse;

    fn setup() -> (Context, Function, Value, Value) {
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
                    q = alloca
                    ret
                }
            }",
        )
        .unwrap();
        let module = ctx.module_iter().next().unwrap();
        let f = module.get_function(&ctx, "f").unwrap();
        let main = module.get_function(&ctx, "main").unwrap();
        let entry = main.get_entry_block(&ctx);
        let p = entry.get_instruction_at(&ctx, 0).unwrap();
        let q = entry.get_instruction_at(&ctx, 1).unwrap();
        (ctx, f, p, q)
    }

    #[test]
    fn merge_is_idempotent() {
        let (ctx, f, p, q) = setup();
        let mut state = PointsToState::default();
        state.set_points_to(p, LocationSet::from([Location::Alloc(AllocSite(0))]));
        state.set_contents(
            Location::Alloc(AllocSite(0)),
            LocationSet::from([Location::Function(f)]),
        );
        state.set_points_to(q, LocationSet::from([Location::Function(f)]));

        let copy = state.clone();
        assert!(!state.merge(&copy));
        assert_eq!(state, copy);
        assert!(state.is_tracked(&ctx, p));
    }

    #[test]
    fn merge_unions_and_reports_growth() {
        let (_ctx, f, p, _q) = setup();
        let mut dest = PointsToState::default();
        dest.set_points_to(p, LocationSet::from([Location::Alloc(AllocSite(0))]));

        let mut src = PointsToState::default();
        src.set_points_to(p, LocationSet::from([Location::Function(f)]));
        assert!(dest.merge(&src));
        assert_eq!(
            dest.values().next().unwrap().1,
            &LocationSet::from([Location::Function(f), Location::Alloc(AllocSite(0))])
        );
        assert!(!dest.merge(&src));
    }

    #[test]
    fn function_values_point_to_themselves() {
        let (ctx, f, _p, q) = setup();
        let state = PointsToState::default();
        let f_val = f.get_value(&ctx);
        assert!(state.is_tracked(&ctx, f_val));
        assert_eq!(
            state.points_to(&ctx, f_val),
            LocationSet::from([Location::Function(f)])
        );
        assert!(!state.is_tracked(&ctx, q));
        assert!(state.points_to(&ctx, q).is_empty());
    }

    #[test]
    fn empty_strong_update_forgets_the_value() {
        let (ctx, f, p, _q) = setup();
        let mut state = PointsToState::default();
        state.set_points_to(p, LocationSet::from([Location::Function(f)]));
        state.set_points_to(p, LocationSet::new());
        assert!(!state.is_tracked(&ctx, p));
        assert!(state.is_empty());
    }

    #[test]
    fn display_is_sorted() {
        let (ctx, f, p, q) = setup();
        let main = ctx
            .module_iter()
            .next()
            .unwrap()
            .get_function(&ctx, "main")
            .unwrap();
        let mut state = PointsToState::default();
        state.set_points_to(q, LocationSet::from([Location::Function(f)]));
        state.set_points_to(p, LocationSet::from([Location::Alloc(AllocSite(0))]));
        state.set_contents(
            Location::Alloc(AllocSite(0)),
            LocationSet::from([Location::Function(f)]),
        );
        assert_eq!(
            state.display(&ctx, &mut Namer::new(main)),
            "{p -> {alloc.0}, q -> {f}, *alloc.0 -> {f}}"
        );
    }
}
