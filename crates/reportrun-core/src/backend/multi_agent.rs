//! Multi-agent report backend.
//!
//! The multi-agent generator takes a task document: the query plus options
//! such as the number of sections to research and which output formats to
//! publish. Caller overrides are layered on top of configured defaults and the
//! keys this backend knows are validated before the call.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    contain, GenerationRequest, GeneratorError, GeneratorResult, ReportBackend, ReportGenerator,
};
use crate::domain::{Overrides, ReportKind, RunDescriptor, RunOutcome};

pub const MAX_SECTIONS_KEY: &str = "max_sections";
pub const PUBLISH_FORMATS_KEY: &str = "publish_formats";

/// Typed view of the overrides the multi-agent generator recognises.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiAgentOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sections: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_formats: Option<BTreeMap<String, bool>>,
}

impl MultiAgentOverrides {
    /// Extract and validate the recognised keys.
    pub fn from_overrides(overrides: &Overrides) -> GeneratorResult<Self> {
        let max_sections = match overrides.get(MAX_SECTIONS_KEY) {
            None | Some(Value::Null) => None,
            Some(value) => {
                let sections = value
                    .as_u64()
                    .filter(|n| *n >= 1)
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| {
                        GeneratorError::InvalidOverrides(format!(
                            "{MAX_SECTIONS_KEY} must be a positive integer, got {value}"
                        ))
                    })?;
                Some(sections)
            }
        };

        let publish_formats = match overrides.get(PUBLISH_FORMATS_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => {
                let mut formats = BTreeMap::new();
                for (format, enabled) in map {
                    let enabled = enabled.as_bool().ok_or_else(|| {
                        GeneratorError::InvalidOverrides(format!(
                            "{PUBLISH_FORMATS_KEY}.{format} must be a boolean, got {enabled}"
                        ))
                    })?;
                    formats.insert(format.clone(), enabled);
                }
                Some(formats)
            }
            Some(other) => {
                return Err(GeneratorError::InvalidOverrides(format!(
                    "{PUBLISH_FORMATS_KEY} must be a mapping of format to boolean, got {other}"
                )))
            }
        };

        Ok(Self {
            max_sections,
            publish_formats,
        })
    }

    /// Render back into loosely typed overrides.
    pub fn to_overrides(&self) -> Overrides {
        let mut overrides = Overrides::new();
        if let Some(sections) = self.max_sections {
            overrides.insert(MAX_SECTIONS_KEY, sections);
        }
        if let Some(formats) = &self.publish_formats {
            let map: serde_json::Map<String, Value> = formats
                .iter()
                .map(|(format, enabled)| (format.clone(), Value::Bool(*enabled)))
                .collect();
            overrides.insert(PUBLISH_FORMATS_KEY, Value::Object(map));
        }
        overrides
    }
}

/// Forwards the query and validated overrides to a multi-agent generator.
pub struct MultiAgentBackend {
    generator: Arc<dyn ReportGenerator>,
    defaults: Overrides,
    model: Option<String>,
    timeout: Option<Duration>,
}

impl MultiAgentBackend {
    pub fn new(generator: Arc<dyn ReportGenerator>) -> Self {
        Self {
            generator,
            defaults: Overrides::new(),
            model: None,
            timeout: None,
        }
    }

    /// Overrides applied to every run unless the caller sets the same key.
    pub fn with_defaults(mut self, defaults: Overrides) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Per-run time limit; `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn request_for(&self, descriptor: &RunDescriptor) -> GeneratorResult<GenerationRequest> {
        let merged = descriptor.overrides().merged_over(&self.defaults);
        let typed = MultiAgentOverrides::from_overrides(&merged)?;
        // Unrecognised keys pass through untouched.
        let overrides = typed.to_overrides().merged_over(&merged);

        Ok(GenerationRequest {
            query: descriptor.query().to_string(),
            report_type: ReportKind::MultiAgent.as_str().to_string(),
            overrides,
            model: self.model.clone(),
            run_index: descriptor.index(),
        })
    }
}

#[async_trait]
impl ReportBackend for MultiAgentBackend {
    fn kind(&self) -> ReportKind {
        ReportKind::MultiAgent
    }

    async fn generate(&self, descriptor: &RunDescriptor) -> RunOutcome {
        let generator = Arc::clone(&self.generator);
        let request = self.request_for(descriptor);
        contain(descriptor, self.timeout, async move {
            let request = request?;
            generator.generate(&request).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GeneratedArtifact;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingGenerator {
        seen: Mutex<Vec<GenerationRequest>>,
    }

    #[async_trait]
    impl ReportGenerator for RecordingGenerator {
        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> GeneratorResult<GeneratedArtifact> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(GeneratedArtifact::WithModel {
                path: format!("outputs/ma-{}.md", request.run_index),
                model: "gpt-4o".into(),
            })
        }
    }

    #[test]
    fn test_typed_overrides_validate() {
        let overrides = Overrides::new()
            .with(MAX_SECTIONS_KEY, 3)
            .with(PUBLISH_FORMATS_KEY, json!({"markdown": true, "pdf": false}));
        let typed = MultiAgentOverrides::from_overrides(&overrides).unwrap();
        assert_eq!(typed.max_sections, Some(3));
        assert_eq!(
            typed.publish_formats.unwrap().get("pdf").copied(),
            Some(false)
        );
    }

    #[test]
    fn test_typed_overrides_reject_bad_values() {
        let zero = Overrides::new().with(MAX_SECTIONS_KEY, 0);
        assert!(MultiAgentOverrides::from_overrides(&zero).is_err());

        let text = Overrides::new().with(MAX_SECTIONS_KEY, "three");
        assert!(MultiAgentOverrides::from_overrides(&text).is_err());

        let formats = Overrides::new().with(PUBLISH_FORMATS_KEY, json!({"pdf": "yes"}));
        assert!(MultiAgentOverrides::from_overrides(&formats).is_err());

        let list = Overrides::new().with(PUBLISH_FORMATS_KEY, json!(["pdf"]));
        assert!(MultiAgentOverrides::from_overrides(&list).is_err());
    }

    #[tokio::test]
    async fn test_forwards_merged_overrides() {
        let generator = Arc::new(RecordingGenerator::default());
        let backend = MultiAgentBackend::new(generator.clone()).with_defaults(
            Overrides::new()
                .with(MAX_SECTIONS_KEY, 5)
                .with(PUBLISH_FORMATS_KEY, json!({"markdown": true}))
                .with("follow_guidelines", false),
        );
        let descriptor = RunDescriptor::new(
            "grid-scale batteries",
            ReportKind::MultiAgent,
            Overrides::new().with(MAX_SECTIONS_KEY, 2),
            1,
        );

        let outcome = backend.generate(&descriptor).await;
        assert_eq!(
            outcome,
            RunOutcome::success("outputs/ma-1.md", Some("gpt-4o".into()))
        );

        let seen = generator.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.report_type, "multi_agent");
        assert_eq!(request.overrides.get(MAX_SECTIONS_KEY), Some(&json!(2)));
        assert_eq!(
            request.overrides.get(PUBLISH_FORMATS_KEY),
            Some(&json!({"markdown": true}))
        );
        assert_eq!(request.overrides.get("follow_guidelines"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_invalid_override_is_contained() {
        let generator = Arc::new(RecordingGenerator::default());
        let backend = MultiAgentBackend::new(generator.clone());
        let descriptor = RunDescriptor::new(
            "q",
            ReportKind::MultiAgent,
            Overrides::new().with(MAX_SECTIONS_KEY, -1),
            0,
        );

        let outcome = backend.generate(&descriptor).await;
        assert!(outcome.error_summary().unwrap().contains("invalid overrides"));
        assert!(generator.seen.lock().unwrap().is_empty());
    }
}
