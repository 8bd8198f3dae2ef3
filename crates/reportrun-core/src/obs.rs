//! Structured lifecycle events for batches and runs.
//!
//! - Batch-scoped tracing spans via the `BatchSpan` RAII guard
//! - Emission functions for dispatch, per-run completion, normalisation, and retry rounds
//!
//! Events are emitted at `info!` level unless noted. For JSON output pass
//! `--json` to the CLI.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::ReportKind;

/// RAII guard that enters a batch-scoped span.
///
/// ```ignore
/// let _span = BatchSpan::enter(batch_id, ReportKind::MultiAgent);
/// // tracing calls now carry batch_id and kind
/// ```
pub struct BatchSpan {
    _span: tracing::span::EnteredSpan,
}

impl BatchSpan {
    pub fn enter(batch_id: Uuid, kind: ReportKind) -> Self {
        Self {
            _span: batch_span(batch_id, kind).entered(),
        }
    }
}

/// Span carried by every run future of a batch.
pub fn batch_span(batch_id: Uuid, kind: ReportKind) -> tracing::Span {
    tracing::info_span!("reportrun.batch", batch_id = %batch_id, kind = %kind)
}

/// Emit event: a batch of runs was handed to a backend.
pub fn emit_batch_dispatched(batch_id: Uuid, kind: ReportKind, num_runs: usize) {
    info!(event = "batch.dispatched", batch_id = %batch_id, kind = %kind, num_runs = num_runs);
}

/// Emit event: one run finished (debug level; one per run).
pub fn emit_run_finished(batch_id: Uuid, index: usize, success: bool, duration_ms: u64) {
    debug!(
        event = "run.finished",
        batch_id = %batch_id,
        index = index,
        success = success,
        duration_ms = duration_ms,
    );
}

/// Emit event: every run in a batch has an outcome.
pub fn emit_batch_completed(batch_id: Uuid, succeeded: usize, failed: usize, duration_ms: u64) {
    if succeeded == 0 && failed > 0 {
        warn!(
            event = "batch.completed",
            batch_id = %batch_id,
            succeeded = succeeded,
            failed = failed,
            duration_ms = duration_ms,
            "every run in the batch failed"
        );
    } else {
        info!(
            event = "batch.completed",
            batch_id = %batch_id,
            succeeded = succeeded,
            failed = failed,
            duration_ms = duration_ms,
        );
    }
}

/// Emit event: a batch was normalised into canonical entries.
pub fn emit_batch_normalized(batch_id: Uuid, entries: usize, skipped: usize) {
    info!(event = "batch.normalized", batch_id = %batch_id, entries = entries, skipped = skipped);
}

/// Emit event: the retry driver finished a round.
pub fn emit_retry_round(
    round: u32,
    requested: usize,
    succeeded: usize,
    accumulated: usize,
    desired: usize,
) {
    info!(
        event = "retry.round",
        round = round,
        requested = requested,
        succeeded = succeeded,
        accumulated = accumulated,
        desired = desired,
    );
}
