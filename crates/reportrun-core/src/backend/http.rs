//! HTTP report generator.
//!
//! Posts a [`GenerationRequest`] as JSON to a report service and reads the
//! artifact reference from the JSON response body.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{
    GeneratedArtifact, GenerationRequest, GeneratorError, GeneratorResult, ReportGenerator,
};

/// Route used when none is configured.
pub const DEFAULT_ROUTE: &str = "/report";

/// Report generator reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpReportGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpReportGenerator {
    /// Build a generator for `base_url` + `route`.
    ///
    /// The API key, if any, is sent as a bearer token. It is passed in
    /// explicitly and never read from the process environment here.
    /// `connect_timeout` bounds connection setup only; the per-run limit is
    /// applied by the backend that owns this generator.
    pub fn new(
        base_url: &str,
        route: Option<&str>,
        api_key: Option<String>,
        connect_timeout: Option<Duration>,
    ) -> GeneratorResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        Ok(Self::with_client(builder.build()?, base_url, route, api_key))
    }

    /// Use a preconfigured client (proxy, TLS, or pool settings).
    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        route: Option<&str>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            endpoint: join_endpoint(base_url, route.unwrap_or(DEFAULT_ROUTE)),
            api_key,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn join_endpoint(base_url: &str, route: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        route.trim_start_matches('/')
    )
}

#[async_trait]
impl ReportGenerator for HttpReportGenerator {
    async fn generate(&self, request: &GenerationRequest) -> GeneratorResult<GeneratedArtifact> {
        debug!(endpoint = %self.endpoint, run_index = request.run_index, "posting report request");

        let mut call = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(GeneratorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = serde_json::from_str(&body)?;
        GeneratedArtifact::from_value(&value)
    }
}
