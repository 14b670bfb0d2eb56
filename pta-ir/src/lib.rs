//! A small SSA intermediate representation, shaped after the LLVM subset that pointer analyses
//! care about.
//!
//! Everything is stored in a [`Context`] and referred to through cheap `Copy` handles.  The IR is
//! usually produced by [`parser::parse`] and consumed read-only by the analyses in `pta-analysis`.

use std::hash::BuildHasherDefault;

use rustc_hash::FxHasher;

pub mod block;
pub use block::*;
pub mod context;
pub use context::*;
pub mod error;
pub use error::*;
pub mod function;
pub use function::*;
pub mod instruction;
pub use instruction::*;
pub mod module;
pub use module::*;
pub mod parser;
pub mod pass_manager;
pub use pass_manager::*;
pub mod printer;
pub mod value;
pub use value::*;
pub mod verify;

pub type FxIndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<FxHasher>>;
pub type FxIndexSet<K> = indexmap::IndexSet<K, BuildHasherDefault<FxHasher>>;
