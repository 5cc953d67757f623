//! Stage-specific transitions of the [`Orchestrator`](super::Orchestrator).
//!
//! Each submodule adds one transition. All of them follow the same shape:
//! take the product lock, authorize, load and check the record, do the work,
//! commit once, and undo staged bytes if anything after the first write fails.

pub mod archive;
pub mod fault;
pub mod ingest;
pub mod process;
pub mod recover;
pub mod retrieve;

pub use fault::CORRUPTION_MARKER;
pub use recover::RecoveryReport;
