//! Generator launched as a child process.
//!
//! The request is written to the child's stdin as one JSON document. The last
//! non-empty line of stdout names the artifact, either as JSON (any shape
//! [`GeneratedArtifact::from_value`] accepts) or as a bare path.

use std::collections::BTreeMap;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{GeneratedArtifact, GenerationRequest, GeneratorError, GeneratorResult, ReportGenerator};

const STDERR_TAIL_BYTES: usize = 2048;

/// Runs an external generator program once per request.
#[derive(Debug, Clone)]
pub struct CommandReportGenerator {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl CommandReportGenerator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: BTreeMap::new(),
        }
    }

    /// Environment variables (API keys and the like) handed to the child.
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }
}

/// Interpret the final non-empty stdout line.
pub fn parse_stdout(stdout: &str) -> GeneratorResult<GeneratedArtifact> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| GeneratorError::MalformedResponse("generator printed nothing".to_string()))?;

    match serde_json::from_str::<Value>(line) {
        Ok(value) => GeneratedArtifact::from_value(&value),
        Err(_) => Ok(GeneratedArtifact::Path(line.to_string())),
    }
}

fn tail(text: &str, max_bytes: usize) -> String {
    let text = text.trim();
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let start = (text.len() - max_bytes..text.len())
        .find(|i| text.is_char_boundary(*i))
        .unwrap_or(text.len());
    text[start..].to_string()
}

#[async_trait]
impl ReportGenerator for CommandReportGenerator {
    async fn generate(&self, request: &GenerationRequest) -> GeneratorResult<GeneratedArtifact> {
        let payload = serde_json::to_vec(request)?;

        debug!(program = %self.program, run_index = request.run_index, "launching generator");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            // A generator that ignores its input may close stdin early.
            match stdin.write_all(&payload).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(e.into()),
            }
        }

        let output = child.wait_with_output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(GeneratorError::Process {
                exit_code: output.status.code().unwrap_or(-1),
                stderr: tail(&stderr, STDERR_TAIL_BYTES),
            });
        }

        parse_stdout(&stdout)
    }
}
