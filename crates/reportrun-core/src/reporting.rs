use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::domain::{CanonicalEntry, ReportKind};
use crate::normalize::RawResult;

pub const ENTRIES_SCHEMA_VERSION: &str = "1.0";

/// Persisted result of one orchestrated query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntriesArtifact {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub query: String,
    pub report_kind: ReportKind,
    /// Entries the caller asked for.
    pub requested: usize,
    pub entries: Vec<CanonicalEntry>,
}

impl EntriesArtifact {
    pub fn new(
        query: impl Into<String>,
        report_kind: ReportKind,
        requested: usize,
        entries: Vec<CanonicalEntry>,
    ) -> Self {
        Self {
            schema_version: ENTRIES_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            query: query.into(),
            report_kind,
            requested,
            entries,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.entries.len() >= self.requested
    }
}

/// Write the entries artifact in pretty JSON format.
pub fn write_entries_json(path: &Path, artifact: &EntriesArtifact) -> Result<()> {
    let content = serde_json::to_string_pretty(artifact).context("serialize entries artifact")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Read a JSON array of loosely shaped run results.
pub fn read_raw_results(path: &Path) -> Result<Vec<RawResult>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    let value: Value =
        serde_json::from_str(&content).with_context(|| format!("parse {:?}", path))?;
    match value {
        Value::Array(items) => Ok(items.into_iter().map(RawResult::from_value).collect()),
        other => anyhow::bail!(
            "expected a JSON array of results in {:?}, found {}",
            path,
            kind_of(&other)
        ),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Render a markdown table of entries.
pub fn render_entries_md(artifact: &EntriesArtifact) -> String {
    let mut out = String::new();
    out.push_str("# Report Runs\n\n");
    out.push_str(&format!(
        "- query: {}\n- kind: {}\n- entries: {}/{}\n\n",
        artifact.query,
        artifact.report_kind,
        artifact.entries.len(),
        artifact.requested
    ));

    if artifact.entries.is_empty() {
        out.push_str("No runs produced an artifact.\n");
        return out;
    }

    out.push_str("| # | artifact | model |\n|---|---|---|\n");
    for (i, entry) in artifact.entries.iter().enumerate() {
        out.push_str(&format!("| {} | `{}` | {} |\n", i, entry.artifact_path, entry.model));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> EntriesArtifact {
        EntriesArtifact::new(
            "state of fusion power",
            ReportKind::MultiAgent,
            3,
            vec![
                CanonicalEntry::new("out/a.md", "gpt-4o"),
                CanonicalEntry::unknown_model("out/b.md"),
            ],
        )
    }

    #[test]
    fn test_write_entries_json_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("entries.json");
        let artifact = sample();

        write_entries_json(&path, &artifact).unwrap();
        let parsed: EntriesArtifact =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, artifact);
        assert!(!parsed.is_complete());
    }

    #[test]
    fn test_read_raw_results_mixed_shapes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.json");
        std::fs::write(
            &path,
            r#"["a.md", ["b.md", "o1"], {"error": "timeout"}, {"artifact_path": "c.md"}]"#,
        )
        .unwrap();

        let raw = read_raw_results(&path).unwrap();
        assert_eq!(raw.len(), 4);
        assert_eq!(raw[0], RawResult::Path("a.md".into()));
        assert!(matches!(raw[2], RawResult::Failed { .. }));
    }

    #[test]
    fn test_read_raw_results_rejects_non_array() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.json");
        std::fs::write(&path, r#"{"artifact_path": "a.md"}"#).unwrap();
        let err = read_raw_results(&path).unwrap_err();
        assert!(err.to_string().contains("an object"));
    }

    #[test]
    fn test_render_entries_md() {
        let md = render_entries_md(&sample());
        assert!(md.contains("- entries: 2/3"));
        assert!(md.contains("| 1 | `out/b.md` | unknown |"));
    }
}
