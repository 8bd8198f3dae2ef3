//! Research-report backend (GPT-Researcher style).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{contain, GenerationRequest, ReportBackend, ReportGenerator};
use crate::domain::{Overrides, ReportKind, RunDescriptor, RunOutcome};

/// Report type forwarded when none is configured.
pub const DEFAULT_REPORT_TYPE: &str = "research_report";

/// Forwards the query and report type to a research-report generator.
///
/// Per-run overrides are not forwarded; this generator only understands the
/// report type.
pub struct ResearchReportBackend {
    generator: Arc<dyn ReportGenerator>,
    report_type: String,
    model: Option<String>,
    timeout: Option<Duration>,
}

impl ResearchReportBackend {
    pub fn new(generator: Arc<dyn ReportGenerator>) -> Self {
        Self {
            generator,
            report_type: DEFAULT_REPORT_TYPE.to_string(),
            model: None,
            timeout: None,
        }
    }

    pub fn with_report_type(mut self, report_type: impl Into<String>) -> Self {
        self.report_type = report_type.into();
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

    fn request_for(&self, descriptor: &RunDescriptor) -> GenerationRequest {
        GenerationRequest {
            query: descriptor.query().to_string(),
            report_type: self.report_type.clone(),
            overrides: Overrides::new(),
            model: self.model.clone(),
            run_index: descriptor.index(),
        }
    }
}

#[async_trait]
impl ReportBackend for ResearchReportBackend {
    fn kind(&self) -> ReportKind {
        ReportKind::ResearchReport
    }

    async fn generate(&self, descriptor: &RunDescriptor) -> RunOutcome {
        let request = self.request_for(descriptor);
        contain(descriptor, self.timeout, self.generator.generate(&request)).await
    }
}
