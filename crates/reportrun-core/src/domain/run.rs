//! Run descriptors, outcomes, and batches.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::{OrchestratorError, Result};

/// Which external report capability a run targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// Single-agent research report (GPT-Researcher style).
    ResearchReport,
    /// Multi-agent report generator.
    MultiAgent,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::ResearchReport => "research_report",
            ReportKind::MultiAgent => "multi_agent",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "research_report" | "research-report" | "research" => Ok(ReportKind::ResearchReport),
            "multi_agent" | "multi-agent" | "ma" => Ok(ReportKind::MultiAgent),
            other => Err(format!("unknown report kind: {other}")),
        }
    }
}

/// Per-run configuration overrides, keyed by option name.
///
/// Values stay loosely typed here; each backend interprets the keys it knows.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Overrides(BTreeMap<String, Value>);

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Layer `self` on top of `defaults`; keys present in `self` win.
    pub fn merged_over(&self, defaults: &Overrides) -> Overrides {
        let mut merged = defaults.0.clone();
        for (key, value) in &self.0 {
            merged.insert(key.clone(), value.clone());
        }
        Overrides(merged)
    }
}

impl From<BTreeMap<String, Value>> for Overrides {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

/// One generation attempt. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunDescriptor {
    query: String,
    report_kind: ReportKind,
    overrides: Overrides,
    index: usize,
}

impl RunDescriptor {
    pub fn new(
        query: impl Into<String>,
        report_kind: ReportKind,
        overrides: Overrides,
        index: usize,
    ) -> Self {
        Self {
            query: query.into(),
            report_kind,
            overrides,
            index,
        }
    }

    /// Build `count` descriptors sharing query, kind, and overrides, indexed `0..count`.
    pub fn batch(
        query: &str,
        report_kind: ReportKind,
        overrides: &Overrides,
        count: usize,
    ) -> Vec<RunDescriptor> {
        (0..count)
            .map(|index| RunDescriptor::new(query, report_kind, overrides.clone(), index))
            .collect()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn report_kind(&self) -> ReportKind {
        self.report_kind
    }

    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    /// Intended position in the batch.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Result of one run. Produced exactly once per descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Success {
        artifact_path: String,
        model: Option<String>,
    },
    Failure {
        error_summary: String,
    },
}

impl RunOutcome {
    pub fn success(artifact_path: impl Into<String>, model: Option<String>) -> Self {
        RunOutcome::Success {
            artifact_path: artifact_path.into(),
            model,
        }
    }

    pub fn failure(error_summary: impl Into<String>) -> Self {
        RunOutcome::Failure {
            error_summary: error_summary.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }

    pub fn error_summary(&self) -> Option<&str> {
        match self {
            RunOutcome::Failure { error_summary } => Some(error_summary),
            RunOutcome::Success { .. } => None,
        }
    }
}

/// Descriptors and their outcomes for one dispatch round.
///
/// `outcomes[i]` always belongs to `descriptors[i]`.
#[derive(Debug, Clone, Serialize)]
pub struct RunBatch {
    batch_id: Uuid,
    descriptors: Vec<RunDescriptor>,
    outcomes: Vec<RunOutcome>,
}

impl RunBatch {
    /// Pair descriptors with outcomes.
    ///
    /// Rejects length mismatches and descriptors whose index differs from
    /// their position.
    pub fn from_parts(descriptors: Vec<RunDescriptor>, outcomes: Vec<RunOutcome>) -> Result<Self> {
        Self::with_id(Uuid::new_v4(), descriptors, outcomes)
    }

    /// Descriptor `i` must carry index `i`.
    pub(crate) fn check_indices(descriptors: &[RunDescriptor]) -> Result<()> {
        match descriptors
            .iter()
            .enumerate()
            .find(|(position, descriptor)| descriptor.index() != *position)
        {
            Some((position, descriptor)) => Err(OrchestratorError::InvalidArgument(format!(
                "descriptor at position {position} has index {}",
                descriptor.index()
            ))),
            None => Ok(()),
        }
    }

    pub(crate) fn with_id(
        batch_id: Uuid,
        descriptors: Vec<RunDescriptor>,
        outcomes: Vec<RunOutcome>,
    ) -> Result<Self> {
        if descriptors.len() != outcomes.len() {
            return Err(OrchestratorError::BatchMismatch {
                descriptors: descriptors.len(),
                outcomes: outcomes.len(),
            });
        }
        Self::check_indices(&descriptors)?;
        Ok(Self {
            batch_id,
            descriptors,
            outcomes,
        })
    }

    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    pub fn descriptors(&self) -> &[RunDescriptor] {
        &self.descriptors
    }

    pub fn outcomes(&self) -> &[RunOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Iterate `(descriptor, outcome)` pairs in descriptor order.
    pub fn iter(&self) -> impl Iterator<Item = (&RunDescriptor, &RunOutcome)> {
        self.descriptors.iter().zip(self.outcomes.iter())
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_kind_parses_aliases() {
        assert_eq!(
            "research-report".parse::<ReportKind>().unwrap(),
            ReportKind::ResearchReport
        );
        assert_eq!("MA".parse::<ReportKind>().unwrap(), ReportKind::MultiAgent);
        assert!("detailed".parse::<ReportKind>().is_err());
    }

    #[test]
    fn test_report_kind_serde_snake_case() {
        let json = serde_json::to_string(&ReportKind::MultiAgent).unwrap();
        assert_eq!(json, "\"multi_agent\"");
    }

    #[test]
    fn test_batch_descriptors_are_contiguous() {
        let overrides = Overrides::new().with("max_sections", 2);
        let descriptors = RunDescriptor::batch("q", ReportKind::MultiAgent, &overrides, 4);

        let indices: Vec<usize> = descriptors.iter().map(|d| d.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(descriptors.iter().all(|d| d.overrides() == &overrides));
        assert!(descriptors.iter().all(|d| d.query() == "q"));
    }

    #[test]
    fn test_overrides_merge_prefers_caller() {
        let defaults = Overrides::new()
            .with("max_sections", 5)
            .with("publish_formats", json!({"markdown": true}));
        let caller = Overrides::new().with("max_sections", 1);

        let merged = caller.merged_over(&defaults);
        assert_eq!(merged.get("max_sections"), Some(&json!(1)));
        assert_eq!(
            merged.get("publish_formats"),
            Some(&json!({"markdown": true}))
        );
    }

    #[test]
    fn test_batch_rejects_length_mismatch() {
        let descriptors =
            RunDescriptor::batch("q", ReportKind::ResearchReport, &Overrides::new(), 2);
        let err = RunBatch::from_parts(descriptors, vec![RunOutcome::failure("x")]).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::BatchMismatch {
                descriptors: 2,
                outcomes: 1
            }
        ));
    }

    #[test]
    fn test_batch_rejects_misindexed_descriptors() {
        let duplicated = vec![
            RunDescriptor::new("q", ReportKind::ResearchReport, Overrides::new(), 7),
            RunDescriptor::new("q", ReportKind::ResearchReport, Overrides::new(), 7),
        ];
        let outcomes = vec![RunOutcome::failure("a"), RunOutcome::failure("b")];
        assert!(matches!(
            RunBatch::from_parts(duplicated, outcomes.clone()),
            Err(OrchestratorError::InvalidArgument(_))
        ));

        let swapped = vec![
            RunDescriptor::new("q", ReportKind::ResearchReport, Overrides::new(), 1),
            RunDescriptor::new("q", ReportKind::ResearchReport, Overrides::new(), 0),
        ];
        assert!(RunBatch::from_parts(swapped, outcomes).is_err());
    }

    #[test]
    fn test_batch_counts() {
        let descriptors =
            RunDescriptor::batch("q", ReportKind::ResearchReport, &Overrides::new(), 3);
        let batch = RunBatch::from_parts(
            descriptors,
            vec![
                RunOutcome::success("a.md", None),
                RunOutcome::failure("boom"),
                RunOutcome::success("c.md", Some("gpt-4o".into())),
            ],
        )
        .unwrap();

        assert_eq!(batch.success_count(), 2);
        assert_eq!(batch.failure_count(), 1);
        assert_eq!(batch.outcomes()[1].error_summary(), Some("boom"));
    }

    #[test]
    fn test_outcome_serde_tagged() {
        let value = serde_json::to_value(RunOutcome::failure("timeout")).unwrap();
        assert_eq!(value, json!({"status": "failure", "error_summary": "timeout"}));
    }
}
