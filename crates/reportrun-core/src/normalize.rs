//! Result normalisation.
//!
//! Collapses heterogeneous run results (bare paths, path/model pairs, failure
//! markers) into canonical `(artifact_path, model)` entries. The pass is a
//! stable filter: output order is input order restricted to usable successes.
//! Nothing here returns an error; unusable items are logged and skipped.

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{CanonicalEntry, ReportKind, RunBatch, RunOutcome};
use crate::metrics::METRICS;
use crate::obs::{self, BatchSpan};

/// The closed set of result shapes the normaliser understands.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResult {
    /// A bare artifact path; the model is unknown.
    Path(String),
    /// An artifact path with the model that produced it.
    Tagged { path: String, model: String },
    /// A run that failed.
    Failed { error: String },
    /// Anything else.
    Unrecognized(Value),
}

impl RawResult {
    /// Classify a loosely typed JSON result.
    ///
    /// Strings are bare paths, `[path, model]` and `[path, null]` are pairs,
    /// objects may carry `artifact_path`/`path` plus `model`, and an object with
    /// an `error` (or `error_summary`) field is a failure marker.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(path) => RawResult::Path(path),
            Value::Array(items) => match items.as_slice() {
                [Value::String(path)] | [Value::String(path), Value::Null] => {
                    RawResult::Path(path.clone())
                }
                [Value::String(path), Value::String(model)] => RawResult::Tagged {
                    path: path.clone(),
                    model: model.clone(),
                },
                _ => RawResult::Unrecognized(Value::Array(items.clone())),
            },
            Value::Object(map) => {
                let error = ["error", "error_summary"]
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str));
                if let Some(error) = error {
                    return RawResult::Failed {
                        error: error.to_string(),
                    };
                }

                let path = ["artifact_path", "path"]
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str));
                match (path, map.get("model")) {
                    (Some(path), None | Some(Value::Null)) => RawResult::Path(path.to_string()),
                    (Some(path), Some(Value::String(model))) => RawResult::Tagged {
                        path: path.to_string(),
                        model: model.clone(),
                    },
                    _ => RawResult::Unrecognized(Value::Object(map.clone())),
                }
            }
            other => RawResult::Unrecognized(other),
        }
    }
}

impl From<&RunOutcome> for RawResult {
    fn from(outcome: &RunOutcome) -> Self {
        match outcome {
            RunOutcome::Success {
                artifact_path,
                model: Some(model),
            } => RawResult::Tagged {
                path: artifact_path.clone(),
                model: model.clone(),
            },
            RunOutcome::Success {
                artifact_path,
                model: None,
            } => RawResult::Path(artifact_path.clone()),
            RunOutcome::Failure { error_summary } => RawResult::Failed {
                error: error_summary.clone(),
            },
        }
    }
}

impl From<CanonicalEntry> for RawResult {
    fn from(entry: CanonicalEntry) -> Self {
        RawResult::Tagged {
            path: entry.artifact_path,
            model: entry.model,
        }
    }
}

enum Skip {
    Failed(String),
    Malformed(String),
}

fn normalize_one(raw: RawResult) -> Result<CanonicalEntry, Skip> {
    match raw {
        RawResult::Path(path) if !path.trim().is_empty() => Ok(CanonicalEntry::unknown_model(path)),
        RawResult::Tagged { path, model } if !path.trim().is_empty() => {
            if model.trim().is_empty() {
                Ok(CanonicalEntry::unknown_model(path))
            } else {
                Ok(CanonicalEntry::new(path, model))
            }
        }
        RawResult::Path(_) | RawResult::Tagged { .. } => {
            Err(Skip::Malformed("empty artifact path".to_string()))
        }
        RawResult::Failed { error } => Err(Skip::Failed(error)),
        RawResult::Unrecognized(value) => {
            Err(Skip::Malformed(format!("unrecognized shape: {value}")))
        }
    }
}

/// Normalise any sequence of raw results, preserving order.
pub fn normalize_raw<I>(results: I) -> Vec<CanonicalEntry>
where
    I: IntoIterator<Item = RawResult>,
{
    let mut entries = Vec::new();
    for (position, raw) in results.into_iter().enumerate() {
        match normalize_one(raw) {
            Ok(entry) => entries.push(entry),
            Err(Skip::Failed(error)) => {
                debug!(position, error = %error, "skipping failed run");
            }
            Err(Skip::Malformed(reason)) => {
                METRICS.inc_dropped();
                warn!(position, reason = %reason, "skipping malformed result");
            }
        }
    }
    entries
}

/// Normalise a dispatched batch in descriptor order.
pub fn normalize(batch: &RunBatch) -> Vec<CanonicalEntry> {
    let kind = batch
        .descriptors()
        .first()
        .map(|d| d.report_kind())
        .unwrap_or(ReportKind::ResearchReport);
    let _span = BatchSpan::enter(batch.batch_id(), kind);

    let entries = normalize_raw(batch.outcomes().iter().map(RawResult::from));
    obs::emit_batch_normalized(batch.batch_id(), entries.len(), batch.len() - entries.len());
    entries
}
