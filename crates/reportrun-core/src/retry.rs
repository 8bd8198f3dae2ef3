//! Shortfall retry driver.
//!
//! Collects canonical entries for a query until a target count is reached.
//! Each round after the first dispatches only the number of runs still
//! missing; successful entries from earlier rounds are never re-run. The
//! driver works with any report kind the scheduler has a backend for.

use std::time::Duration;

use crate::domain::{CanonicalEntry, OrchestratorError, Overrides, ReportKind, Result};
use crate::metrics::METRICS;
use crate::normalize::normalize;
use crate::obs;
use crate::scheduler::RunScheduler;

/// What to collect and how hard to try.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRequest {
    pub query: String,
    pub desired_count: usize,
    pub report_kind: ReportKind,
    pub overrides: Overrides,
    /// Upper bound on dispatch rounds, including the first.
    pub max_attempts: u32,
}

impl TargetRequest {
    pub fn new(
        query: impl Into<String>,
        desired_count: usize,
        report_kind: ReportKind,
        max_attempts: u32,
    ) -> Self {
        Self {
            query: query.into(),
            desired_count,
            report_kind,
            overrides: Overrides::new(),
            max_attempts,
        }
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }
}

/// Bookkeeping for one dispatch round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundSummary {
    pub requested: usize,
    pub succeeded: usize,
}

/// Entries gathered across rounds, possibly short of the target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetOutcome {
    pub entries: Vec<CanonicalEntry>,
    pub rounds: Vec<RoundSummary>,
}

impl TargetOutcome {
    pub fn is_complete(&self, desired_count: usize) -> bool {
        self.entries.len() >= desired_count
    }
}

/// Drives repeated dispatch rounds against a scheduler.
pub struct RetryDriver<'a> {
    scheduler: &'a RunScheduler,
    retry_delay: Option<Duration>,
}

impl<'a> RetryDriver<'a> {
    pub fn new(scheduler: &'a RunScheduler) -> Self {
        Self {
            scheduler,
            retry_delay: None,
        }
    }

    /// Pause between rounds.
    pub fn with_retry_delay(mut self, delay: Option<Duration>) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Collect up to `desired_count` entries in at most `max_attempts` rounds.
    pub async fn run_with_target_count(
        &self,
        query: &str,
        desired_count: usize,
        report_kind: ReportKind,
        overrides: &Overrides,
        max_attempts: u32,
    ) -> Result<Vec<CanonicalEntry>> {
        let request = TargetRequest {
            query: query.to_string(),
            desired_count,
            report_kind,
            overrides: overrides.clone(),
            max_attempts,
        };
        Ok(self.run_detailed(&request).await?.entries)
    }

    /// Same as [`RetryDriver::run_with_target_count`], with per-round bookkeeping.
    pub async fn run_detailed(&self, request: &TargetRequest) -> Result<TargetOutcome> {
        if request.max_attempts == 0 {
            return Err(OrchestratorError::InvalidArgument(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        let mut outcome = TargetOutcome {
            entries: Vec::with_capacity(request.desired_count),
            rounds: Vec::new(),
        };

        for round in 1..=request.max_attempts {
            let shortfall = request.desired_count.saturating_sub(outcome.entries.len());
            if shortfall == 0 {
                break;
            }
            if round > 1 {
                METRICS.inc_retry_rounds();
                if let Some(delay) = self.retry_delay {
                    tokio::time::sleep(delay).await;
                }
            }

            let batch = self
                .scheduler
                .dispatch(
                    &request.query,
                    shortfall,
                    request.report_kind,
                    &request.overrides,
                )
                .await?;
            let fresh = normalize(&batch);
            let succeeded = fresh.len();

            outcome.rounds.push(RoundSummary {
                requested: shortfall,
                succeeded,
            });
            outcome.entries.extend(fresh);

            obs::emit_retry_round(
                round,
                shortfall,
                succeeded,
                outcome.entries.len(),
                request.desired_count,
            );
        }

        if !outcome.is_complete(request.desired_count) {
            tracing::warn!(
                query = %request.query,
                collected = outcome.entries.len(),
                desired = request.desired_count,
                rounds = outcome.rounds.len(),
                "target count not reached; returning partial entries"
            );
        }

        Ok(outcome)
    }
}
