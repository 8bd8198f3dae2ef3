//! Domain-level error taxonomy for reportrun.
//!
//! Only conditions that make scheduling impossible surface here. Failures of
//! individual runs are data (`RunOutcome::Failure`), never errors.

use super::run::ReportKind;

/// Orchestrator errors.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no backend registered for report kind {0}")]
    NoBackend(ReportKind),

    #[error("batch mismatch: {descriptors} descriptors but {outcomes} outcomes")]
    BatchMismatch { descriptors: usize, outcomes: usize },

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
