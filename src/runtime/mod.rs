//! Execution: typed frames, runtime values, the instruction tree and its
//! evaluator, and the reflective memory explorer.

pub mod explorer;
pub mod instruction;
pub mod memory;

pub use explorer::{ExplorerVar, MemoryExplorer};
pub use instruction::{ArgIns, ArgSet, BuiltinMethod, Instruction};
pub use memory::{
    ActionContext, Ctx, ErrorValue, Execution, FuncValue, IterValue, ListValue, MapValue,
    RefValue, SetValue, Val,
};
