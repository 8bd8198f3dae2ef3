//! Domain models for reportrun.
//!
//! - `RunDescriptor`: one immutable generation attempt
//! - `RunOutcome`: success or contained failure of one attempt
//! - `RunBatch`: descriptors paired with their outcomes
//! - `CanonicalEntry`: normalised output for evaluation

pub mod entry;
pub mod error;
pub mod run;

pub use entry::{CanonicalEntry, UNKNOWN_MODEL};
pub use error::{OrchestratorError, Result};
pub use run::{Overrides, ReportKind, RunBatch, RunDescriptor, RunOutcome};
