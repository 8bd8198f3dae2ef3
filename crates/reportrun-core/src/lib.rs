//! reportrun core library
//!
//! Fans a research query out to several concurrent report-generation runs,
//! isolates per-run failures, normalises the heterogeneous results into
//! canonical `(artifact_path, model)` entries, and optionally retries the
//! shortfall until a target count is reached.

pub mod backend;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod normalize;
pub mod obs;
pub mod reporting;
pub mod retry;
pub mod scheduler;
pub mod telemetry;

pub use backend::command::CommandReportGenerator;
pub use backend::http::HttpReportGenerator;
pub use backend::multi_agent::{MultiAgentBackend, MultiAgentOverrides};
pub use backend::research::ResearchReportBackend;
pub use backend::{
    GeneratedArtifact, GenerationRequest, GeneratorError, GeneratorResult, ReportBackend,
    ReportGenerator,
};

pub use config::{GeneratorConfig, OrchestratorConfig};

pub use domain::{
    CanonicalEntry, OrchestratorError, Overrides, ReportKind, Result, RunBatch, RunDescriptor,
    RunOutcome, UNKNOWN_MODEL,
};

pub use normalize::{normalize, normalize_raw, RawResult};

pub use reporting::{write_entries_json, EntriesArtifact};

pub use retry::{RetryDriver, RoundSummary, TargetOutcome, TargetRequest};

pub use scheduler::{RunScheduler, ScheduleConfig, CANCELLED_SUMMARY};

/// Crate version, as reported by `reportrun --version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
