//! Step execution: dependency ordering and the run loop.
pub mod graph;
pub mod runner;

pub use runner::{ErrorPolicy, Interrupt, RunResult, Runner, plan};
