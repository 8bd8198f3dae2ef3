//! Canonical `(artifact_path, model)` entries handed to evaluation.

use serde::{Deserialize, Serialize};

/// Model identifier used when a generator did not report one.
pub const UNKNOWN_MODEL: &str = "unknown";

/// One successful run, normalised.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalEntry {
    pub artifact_path: String,
    pub model: String,
}

impl CanonicalEntry {
    pub fn new(artifact_path: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            model: model.into(),
        }
    }

    /// Entry for a bare path whose model is not known.
    pub fn unknown_model(artifact_path: impl Into<String>) -> Self {
        Self::new(artifact_path, UNKNOWN_MODEL)
    }

    pub fn has_known_model(&self) -> bool {
        self.model != UNKNOWN_MODEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_sentinel() {
        let entry = CanonicalEntry::unknown_model("out/report.md");
        assert_eq!(entry.model, "unknown");
        assert!(!entry.has_known_model());
        assert!(CanonicalEntry::new("a.md", "gpt-4o").has_known_model());
    }
}
