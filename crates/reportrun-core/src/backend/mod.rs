//! Report backend adapters.
//!
//! Two seams live here:
//! - [`ReportGenerator`]: the opaque external capability (HTTP service or a
//!   launched generator program) that writes a report and returns a reference
//!   to it.
//! - [`ReportBackend`]: the adapter the scheduler talks to. It turns a
//!   [`RunDescriptor`] into a [`GenerationRequest`], applies the per-run
//!   timeout, and converts every generator error into `RunOutcome::Failure`.
//!
//! # Module layout
//!
//! - [`research`]: `ResearchReportBackend`
//! - [`multi_agent`]: `MultiAgentBackend`, `MultiAgentOverrides`
//! - [`http`]: `HttpReportGenerator`
//! - [`command`]: `CommandReportGenerator`

pub mod command;
pub mod http;
pub mod multi_agent;
pub mod research;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{Overrides, ReportKind, RunDescriptor, RunOutcome};

/// Failure summary recorded when a run exceeds its timeout.
pub const TIMEOUT_SUMMARY: &str = "timeout";

/// Errors raised by an external report generator.
///
/// These never leave the adapter; they become `RunOutcome::Failure`.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("generator returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("generator process exited with code {exit_code}: {stderr}")]
    Process { exit_code: i32, stderr: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("invalid overrides: {0}")]
    InvalidOverrides(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GeneratorError {
    /// The transport gave up waiting (connect or read timeout).
    pub fn is_timeout(&self) -> bool {
        matches!(self, GeneratorError::Request(e) if e.is_timeout())
    }
}

/// Result type for generator calls.
pub type GeneratorResult<T> = std::result::Result<T, GeneratorError>;

/// Payload forwarded to an external generator for one run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerationRequest {
    pub query: String,
    pub report_type: String,
    #[serde(skip_serializing_if = "Overrides::is_empty")]
    pub overrides: Overrides,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub run_index: usize,
}

/// Reference to an artifact written by a generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedArtifact {
    /// Only the artifact path is known.
    Path(String),
    /// Artifact path plus the model that produced it.
    WithModel { path: String, model: String },
}

const PATH_KEYS: [&str; 3] = ["path", "artifact_path", "output_path"];

impl GeneratedArtifact {
    /// Build from a path and an optional model; a blank model counts as absent.
    pub fn new(path: impl Into<String>, model: Option<String>) -> Self {
        let path = path.into();
        match model {
            Some(model) if !model.trim().is_empty() => GeneratedArtifact::WithModel { path, model },
            _ => GeneratedArtifact::Path(path),
        }
    }

    /// Interpret a generator response.
    ///
    /// Accepted shapes: `"path"`, `["path", "model"]`, `["path", null]`,
    /// and `{"path" | "artifact_path" | "output_path": ..., "model": ...}`.
    pub fn from_value(value: &Value) -> GeneratorResult<Self> {
        let (path, model) = match value {
            Value::String(path) => (path.as_str(), None),
            Value::Array(items) => match items.as_slice() {
                [Value::String(path)] | [Value::String(path), Value::Null] => (path.as_str(), None),
                [Value::String(path), Value::String(model)] => (path.as_str(), Some(model)),
                _ => return Err(malformed(value)),
            },
            Value::Object(map) => {
                let path = PATH_KEYS
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str))
                    .ok_or_else(|| malformed(value))?;
                let model = match map.get("model") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(model)) => Some(model),
                    Some(_) => return Err(malformed(value)),
                };
                (path, model)
            }
            _ => return Err(malformed(value)),
        };

        if path.trim().is_empty() {
            return Err(GeneratorError::MalformedResponse(
                "artifact path is empty".to_string(),
            ));
        }
        Ok(Self::new(path, model.cloned()))
    }

    pub fn path(&self) -> &str {
        match self {
            GeneratedArtifact::Path(path) | GeneratedArtifact::WithModel { path, .. } => path,
        }
    }

    pub fn into_outcome(self) -> RunOutcome {
        match self {
            GeneratedArtifact::Path(path) => RunOutcome::success(path, None),
            GeneratedArtifact::WithModel { path, model } => RunOutcome::success(path, Some(model)),
        }
    }
}

fn malformed(value: &Value) -> GeneratorError {
    let mut rendered = value.to_string();
    if rendered.len() > 200 {
        let cut = (0..=200).rev().find(|i| rendered.is_char_boundary(*i)).unwrap_or(0);
        rendered.truncate(cut);
        rendered.push_str("...");
    }
    GeneratorError::MalformedResponse(rendered)
}

/// External report-generation capability.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    /// Produce one report; the artifact is written by the generator itself.
    async fn generate(&self, request: &GenerationRequest) -> GeneratorResult<GeneratedArtifact>;
}

/// Adapter between the scheduler and one external capability.
///
/// Implementations must never panic or return early without an outcome:
/// every failure is reported as `RunOutcome::Failure`.
#[async_trait]
pub trait ReportBackend: Send + Sync {
    /// The report kind this backend serves.
    fn kind(&self) -> ReportKind;

    /// Run one generation attempt.
    async fn generate(&self, descriptor: &RunDescriptor) -> RunOutcome;
}

/// Await a generator call under an optional timeout and fold the result into an outcome.
pub(crate) async fn contain<F>(
    descriptor: &RunDescriptor,
    timeout: Option<Duration>,
    call: F,
) -> RunOutcome
where
    F: Future<Output = GeneratorResult<GeneratedArtifact>>,
{
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_elapsed) => {
                warn!(
                    kind = %descriptor.report_kind(),
                    index = descriptor.index(),
                    timeout_ms = limit.as_millis() as u64,
                    "report generation timed out"
                );
                return RunOutcome::failure(TIMEOUT_SUMMARY);
            }
        },
        None => call.await,
    };

    match result {
        Ok(artifact) => {
            debug!(
                kind = %descriptor.report_kind(),
                index = descriptor.index(),
                path = %artifact.path(),
                "report generated"
            );
            artifact.into_outcome()
        }
        Err(e) if e.is_timeout() => {
            warn!(
                kind = %descriptor.report_kind(),
                index = descriptor.index(),
                error = %e,
                "report generation timed out in transport"
            );
            RunOutcome::failure(TIMEOUT_SUMMARY)
        }
        Err(e) => {
            warn!(
                kind = %descriptor.report_kind(),
                index = descriptor.index(),
                error = %e,
                "report generation failed"
            );
            RunOutcome::failure(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_artifact_from_bare_string() {
        let artifact = GeneratedArtifact::from_value(&json!("outputs/report.md")).unwrap();
        assert_eq!(artifact, GeneratedArtifact::Path("outputs/report.md".into()));
    }

    #[test]
    fn test_artifact_from_pair() {
        let artifact = GeneratedArtifact::from_value(&json!(["r.md", "gpt-4o"])).unwrap();
        assert_eq!(
            artifact,
            GeneratedArtifact::WithModel {
                path: "r.md".into(),
                model: "gpt-4o".into()
            }
        );

        let artifact = GeneratedArtifact::from_value(&json!(["r.md", null])).unwrap();
        assert_eq!(artifact, GeneratedArtifact::Path("r.md".into()));
    }

    #[test]
    fn test_artifact_from_object_keys() {
        let artifact =
            GeneratedArtifact::from_value(&json!({"output_path": "x.pdf", "model": "o1"})).unwrap();
        assert_eq!(artifact.path(), "x.pdf");
        assert!(matches!(artifact, GeneratedArtifact::WithModel { .. }));

        let artifact = GeneratedArtifact::from_value(&json!({"artifact_path": "y.md"})).unwrap();
        assert_eq!(artifact, GeneratedArtifact::Path("y.md".into()));
    }

    #[test]
    fn test_artifact_rejects_other_shapes() {
        for value in [
            json!(42),
            json!(null),
            json!([1, 2]),
            json!(["a", "b", "c"]),
            json!({"report": "x"}),
            json!({"path": "x", "model": 3}),
            json!("   "),
        ] {
            let err = GeneratedArtifact::from_value(&value).unwrap_err();
            assert!(
                matches!(err, GeneratorError::MalformedResponse(_)),
                "expected malformed for {value}"
            );
        }
    }

    #[test]
    fn test_blank_model_is_dropped() {
        let artifact = GeneratedArtifact::new("r.md", Some("  ".into()));
        assert_eq!(artifact.into_outcome(), RunOutcome::success("r.md", None));
    }

    #[test]
    fn test_request_serializes_without_empty_fields() {
        let request = GenerationRequest {
            query: "q".into(),
            report_type: "research_report".into(),
            overrides: Overrides::new(),
            model: None,
            run_index: 2,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"query": "q", "report_type": "research_report", "run_index": 2})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_contain_turns_timeout_into_failure() {
        let descriptor = RunDescriptor::new("q", ReportKind::ResearchReport, Overrides::new(), 0);
        let outcome = contain(&descriptor, Some(Duration::from_secs(5)), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(GeneratedArtifact::Path("late.md".into()))
        })
        .await;
        assert_eq!(outcome, RunOutcome::failure(TIMEOUT_SUMMARY));
    }

    #[tokio::test]
    async fn test_contain_turns_error_into_failure() {
        let descriptor = RunDescriptor::new("q", ReportKind::MultiAgent, Overrides::new(), 1);
        let outcome = contain(&descriptor, None, async {
            Err(GeneratorError::MalformedResponse("nope".into()))
        })
        .await;
        assert_eq!(outcome.error_summary(), Some("malformed response: nope"));
    }
}
