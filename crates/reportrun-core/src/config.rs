//! Orchestrator configuration.
//!
//! Loaded from a TOML file. This is the only place that reads API keys from
//! the process environment; the values are handed explicitly to the generator
//! constructors so backends never consult ambient state.
//!
//! ```toml
//! models = ["gpt-4o"]
//!
//! [schedule]
//! run_timeout_secs = 900
//! max_concurrent = 0
//!
//! [retry]
//! max_attempts = 3
//!
//! [research.generator]
//! type = "http"
//! base_url = "http://localhost:8000"
//! api_key_env = "OPENAI_API_KEY"
//!
//! [multi_agent]
//! max_sections = 3
//! publish_formats = { markdown = true, pdf = false, docx = false }
//!
//! [multi_agent.generator]
//! type = "command"
//! program = "python"
//! args = ["-m", "multi_agents.main"]
//! forward_env = ["OPENAI_API_KEY", "TAVILY_API_KEY"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::command::CommandReportGenerator;
use crate::backend::http::HttpReportGenerator;
use crate::backend::multi_agent::{MultiAgentBackend, MultiAgentOverrides};
use crate::backend::research::ResearchReportBackend;
use crate::backend::ReportGenerator;
use crate::domain::{OrchestratorError, Result};
use crate::scheduler::{RunScheduler, ScheduleConfig};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub schedule: ScheduleSection,
    pub retry: RetrySection,
    pub research: Option<BackendSection>,
    pub multi_agent: Option<BackendSection>,
    /// Model identifiers available to the generators.
    pub models: Vec<String>,
}

/// `[schedule]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScheduleSection {
    /// Per-run time limit in seconds; 0 disables it.
    pub run_timeout_secs: u64,
    /// Maximum runs in flight; 0 means unlimited.
    pub max_concurrent: usize,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            run_timeout_secs: 900,
            max_concurrent: 0,
        }
    }
}

/// `[retry]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 0,
        }
    }
}

/// `[research]` / `[multi_agent]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendSection {
    pub generator: GeneratorConfig,
    /// Model forwarded to the generator.
    #[serde(default)]
    pub model: Option<String>,
    /// Report type forwarded by the research backend.
    #[serde(default)]
    pub report_type: Option<String>,
    /// Overrides the schedule-wide per-run timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Default section cap for multi-agent runs.
    #[serde(default)]
    pub max_sections: Option<u32>,
    /// Default output formats for multi-agent runs.
    #[serde(default)]
    pub publish_formats: Option<BTreeMap<String, bool>>,
}

/// How a backend reaches its external generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeneratorConfig {
    Http {
        base_url: String,
        #[serde(default)]
        route: Option<String>,
        /// Environment variable holding the bearer token.
        #[serde(default)]
        api_key_env: Option<String>,
    },
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        /// Literal environment for the child.
        #[serde(default)]
        env: BTreeMap<String, String>,
        /// Variables copied from this process into the child's environment.
        #[serde(default)]
        forward_env: Vec<String>,
    },
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            schedule: ScheduleSection::default(),
            retry: RetrySection::default(),
            research: Some(BackendSection {
                generator: GeneratorConfig::Http {
                    base_url: "http://localhost:8000".to_string(),
                    route: None,
                    api_key_env: None,
                },
                model: None,
                report_type: None,
                timeout_secs: None,
                max_sections: None,
                publish_formats: None,
            }),
            multi_agent: Some(BackendSection {
                generator: GeneratorConfig::Command {
                    program: "python".to_string(),
                    args: vec!["-m".to_string(), "multi_agents.main".to_string()],
                    env: BTreeMap::new(),
                    forward_env: vec!["OPENAI_API_KEY".to_string(), "TAVILY_API_KEY".to_string()],
                },
                model: None,
                report_type: None,
                timeout_secs: None,
                max_sections: Some(3),
                publish_formats: Some(BTreeMap::from([
                    ("markdown".to_string(), true),
                    ("pdf".to_string(), false),
                    ("docx".to_string(), false),
                ])),
            }),
            models: Vec::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: OrchestratorConfig =
            toml::from_str(text).map_err(|e| OrchestratorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| OrchestratorError::Config(format!("{}: {e}", path.display())))
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            info!(path = %path.display(), "loading config");
            Self::from_file(path)
        } else {
            info!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(OrchestratorError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        for (name, section) in [("research", &self.research), ("multi_agent", &self.multi_agent)] {
            let Some(section) = section else { continue };
            match &section.generator {
                GeneratorConfig::Http { base_url, .. } if base_url.trim().is_empty() => {
                    return Err(OrchestratorError::Config(format!(
                        "{name}.generator.base_url must not be empty"
                    )));
                }
                GeneratorConfig::Command { program, .. } if program.trim().is_empty() => {
                    return Err(OrchestratorError::Config(format!(
                        "{name}.generator.program must not be empty"
                    )));
                }
                _ => {}
            }
            if section.max_sections == Some(0) {
                return Err(OrchestratorError::Config(format!(
                    "{name}.max_sections must be at least 1"
                )));
            }
        }
        Ok(())
    }

    /// Schedule-wide per-run timeout.
    pub fn run_timeout(&self) -> Option<Duration> {
        secs(self.schedule.run_timeout_secs)
    }

    pub fn retry_delay(&self) -> Option<Duration> {
        match self.retry.retry_delay_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn schedule_config(&self) -> ScheduleConfig {
        ScheduleConfig {
            max_concurrent: Some(self.schedule.max_concurrent).filter(|n| *n > 0),
        }
    }

    /// Configured models followed by any backend-specific ones, without duplicates.
    pub fn model_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        let backend_models = [&self.research, &self.multi_agent]
            .into_iter()
            .flatten()
            .filter_map(|section| section.model.clone());
        for id in self.models.iter().cloned().chain(backend_models) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// Wire a scheduler using the process environment for API keys.
    pub fn build_scheduler(&self) -> Result<RunScheduler> {
        self.build_scheduler_with_env(|name| std::env::var(name).ok())
    }

    /// Wire a scheduler, resolving environment variables through `lookup`.
    pub fn build_scheduler_with_env<F>(&self, lookup: F) -> Result<RunScheduler>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut scheduler = RunScheduler::new(self.schedule_config());

        if let Some(section) = &self.research {
            let generator = build_generator(&section.generator, &lookup)?;
            let mut backend = ResearchReportBackend::new(generator)
                .with_model(section.model.clone())
                .with_timeout(self.section_timeout(section));
            if let Some(report_type) = &section.report_type {
                backend = backend.with_report_type(report_type.clone());
            }
            scheduler.register(Arc::new(backend));
        }

        if let Some(section) = &self.multi_agent {
            let generator = build_generator(&section.generator, &lookup)?;
            let defaults = MultiAgentOverrides {
                max_sections: section.max_sections,
                publish_formats: section.publish_formats.clone(),
            }
            .to_overrides();
            let backend = MultiAgentBackend::new(generator)
                .with_defaults(defaults)
                .with_model(section.model.clone())
                .with_timeout(self.section_timeout(section));
            scheduler.register(Arc::new(backend));
        }

        Ok(scheduler)
    }

    fn section_timeout(&self, section: &BackendSection) -> Option<Duration> {
        match section.timeout_secs {
            Some(timeout) => secs(timeout),
            None => self.run_timeout(),
        }
    }
}

fn secs(value: u64) -> Option<Duration> {
    match value {
        0 => None,
        s => Some(Duration::from_secs(s)),
    }
}

/// Connection setup limit for HTTP generators. The per-run limit belongs to
/// the backend so that expiry is always reported as a timeout outcome.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn build_generator<F>(config: &GeneratorConfig, lookup: &F) -> Result<Arc<dyn ReportGenerator>>
where
    F: Fn(&str) -> Option<String>,
{
    match config {
        GeneratorConfig::Http {
            base_url,
            route,
            api_key_env,
        } => {
            let api_key = match api_key_env {
                Some(name) => {
                    let key = lookup(name);
                    if key.is_none() {
                        warn!(
                            var = %name,
                            "API key variable is not set; sending requests without it"
                        );
                    }
                    key
                }
                None => None,
            };
            let generator = HttpReportGenerator::new(
                base_url,
                route.as_deref(),
                api_key,
                Some(HTTP_CONNECT_TIMEOUT),
            )
            .map_err(|e| OrchestratorError::Config(format!("http generator: {e}")))?;
            debug!(endpoint = %generator.endpoint(), "configured http generator");
            Ok(Arc::new(generator))
        }
        GeneratorConfig::Command {
            program,
            args,
            env,
            forward_env,
        } => {
            let mut child_env = env.clone();
            for name in forward_env {
                match lookup(name) {
                    Some(value) => {
                        child_env.insert(name.clone(), value);
                    }
                    None => warn!(var = %name, "forwarded variable is not set"),
                }
            }
            Ok(Arc::new(
                CommandReportGenerator::new(program.clone(), args.clone()).with_env(child_env),
            ))
        }
    }
}
