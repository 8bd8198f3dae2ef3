//! Concurrent run scheduling.
//!
//! A batch of descriptors is fanned out to the backend registered for each
//! descriptor's report kind. Every run is started before any is awaited, all
//! of them are multiplexed on the calling task, and the batch is only returned
//! once each descriptor has exactly one outcome.
//!
//! Run isolation: backend errors and timeouts are already outcomes, and a
//! panicking backend is caught here and recorded as a failure, so one run can
//! never abort or cancel its siblings. There is no retry inside a dispatch;
//! see [`crate::retry`].

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::{watch, Semaphore};
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::backend::ReportBackend;
use crate::domain::{
    CanonicalEntry, OrchestratorError, Overrides, ReportKind, Result, RunBatch, RunDescriptor,
    RunOutcome,
};
use crate::metrics::METRICS;
use crate::normalize::normalize;
use crate::obs;

/// Failure summary recorded for runs still in flight when a batch is cancelled.
pub const CANCELLED_SUMMARY: &str = "cancelled";

/// Scheduling limits for one scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Maximum runs in flight at once. `None` (or zero) starts every run immediately.
    pub max_concurrent: Option<usize>,
}

/// Fans run descriptors out to report backends.
#[derive(Clone, Default)]
pub struct RunScheduler {
    backends: HashMap<ReportKind, Arc<dyn ReportBackend>>,
    config: ScheduleConfig,
}

impl RunScheduler {
    pub fn new(config: ScheduleConfig) -> Self {
        Self {
            backends: HashMap::new(),
            config,
        }
    }

    /// Register a backend under the kind it reports; replaces any previous one.
    pub fn with_backend(mut self, backend: Arc<dyn ReportBackend>) -> Self {
        self.register(backend);
        self
    }

    pub fn register(&mut self, backend: Arc<dyn ReportBackend>) {
        self.backends.insert(backend.kind(), backend);
    }

    pub fn has_backend(&self, kind: ReportKind) -> bool {
        self.backends.contains_key(&kind)
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Run `num_runs` identical attempts of `query` concurrently.
    pub async fn dispatch(
        &self,
        query: &str,
        num_runs: usize,
        report_kind: ReportKind,
        overrides: &Overrides,
    ) -> Result<RunBatch> {
        let descriptors = RunDescriptor::batch(query, report_kind, overrides, num_runs);
        self.dispatch_descriptors(descriptors, None).await
    }

    /// Like [`RunScheduler::dispatch`], but in-flight runs resolve to
    /// `Failure{"cancelled"}` once `cancel` turns `true`. Outcomes that were
    /// already complete are kept.
    pub async fn dispatch_with_cancel(
        &self,
        query: &str,
        num_runs: usize,
        report_kind: ReportKind,
        overrides: &Overrides,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunBatch> {
        let descriptors = RunDescriptor::batch(query, report_kind, overrides, num_runs);
        self.dispatch_descriptors(descriptors, Some(cancel)).await
    }

    /// Dispatch a prepared batch.
    ///
    /// Descriptor `i` must carry index `i`. Fails before starting any run if
    /// the batch is empty, misindexed, or names a kind with no backend.
    pub async fn dispatch_descriptors(
        &self,
        descriptors: Vec<RunDescriptor>,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<RunBatch> {
        let Some(first) = descriptors.first() else {
            return Err(OrchestratorError::InvalidArgument(
                "num_runs must be at least 1".to_string(),
            ));
        };
        let kind = first.report_kind();

        RunBatch::check_indices(&descriptors)?;

        let mut backends = Vec::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            let backend = self
                .backends
                .get(&descriptor.report_kind())
                .ok_or(OrchestratorError::NoBackend(descriptor.report_kind()))?;
            backends.push(Arc::clone(backend));
        }

        let batch_id = Uuid::new_v4();
        let limiter = self
            .config
            .max_concurrent
            .filter(|n| *n > 0)
            .map(Semaphore::new);

        obs::emit_batch_dispatched(batch_id, kind, descriptors.len());
        METRICS.add_dispatched(descriptors.len() as u64);
        let started = Instant::now();

        let runs = descriptors.iter().zip(backends.iter()).map(|(descriptor, backend)| {
            run_one(
                batch_id,
                backend.as_ref(),
                descriptor,
                limiter.as_ref(),
                cancel.clone(),
            )
        });
        let outcomes = join_all(runs)
            .instrument(obs::batch_span(batch_id, kind))
            .await;

        let batch = RunBatch::with_id(batch_id, descriptors, outcomes)?;
        obs::emit_batch_completed(
            batch_id,
            batch.success_count(),
            batch.failure_count(),
            started.elapsed().as_millis() as u64,
        );
        Ok(batch)
    }

    /// Dispatch and normalise in one call.
    pub async fn run(
        &self,
        query: &str,
        num_runs: usize,
        report_kind: ReportKind,
        overrides: &Overrides,
    ) -> Result<Vec<CanonicalEntry>> {
        let batch = self.dispatch(query, num_runs, report_kind, overrides).await?;
        Ok(normalize(&batch))
    }
}

async fn run_one(
    batch_id: Uuid,
    backend: &dyn ReportBackend,
    descriptor: &RunDescriptor,
    limiter: Option<&Semaphore>,
    cancel: Option<watch::Receiver<bool>>,
) -> RunOutcome {
    let started = Instant::now();

    let attempt = async {
        let _permit = match limiter {
            Some(semaphore) => match semaphore.acquire().await {
                Ok(permit) => Some(permit),
                Err(_) => return RunOutcome::failure("scheduler limiter closed"),
            },
            None => None,
        };
        match AssertUnwindSafe(backend.generate(descriptor)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                RunOutcome::failure(format!("backend panicked: {}", panic_message(&*payload)))
            }
        }
    };

    let outcome = match cancel {
        Some(cancel) => {
            tokio::select! {
                biased;
                outcome = attempt => outcome,
                _ = cancelled(cancel) => RunOutcome::failure(CANCELLED_SUMMARY),
            }
        }
        None => attempt.await,
    };

    METRICS.record_outcome(outcome.is_success());
    obs::emit_run_finished(
        batch_id,
        descriptor.index(),
        outcome.is_success(),
        started.elapsed().as_millis() as u64,
    );
    outcome
}

/// Resolves once the flag is `true`. Pends forever if the sender goes away first.
async fn cancelled(mut cancel: watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoBackend;

    #[async_trait]
    impl ReportBackend for EchoBackend {
        fn kind(&self) -> ReportKind {
            ReportKind::ResearchReport
        }

        async fn generate(&self, descriptor: &RunDescriptor) -> RunOutcome {
            RunOutcome::success(format!("r{}.md", descriptor.index()), None)
        }
    }

    struct PanickingBackend;

    #[async_trait]
    impl ReportBackend for PanickingBackend {
        fn kind(&self) -> ReportKind {
            ReportKind::MultiAgent
        }

        async fn generate(&self, descriptor: &RunDescriptor) -> RunOutcome {
            if descriptor.index() == 1 {
                panic!("generator blew up");
            }
            RunOutcome::success("ok.md", Some("m".into()))
        }
    }

    #[tokio::test]
    async fn test_zero_runs_is_rejected() {
        let scheduler = RunScheduler::default().with_backend(Arc::new(EchoBackend));
        let err = scheduler
            .dispatch("q", 0, ReportKind::ResearchReport, &Overrides::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_missing_backend_is_rejected() {
        let scheduler = RunScheduler::default().with_backend(Arc::new(EchoBackend));
        let err = scheduler
            .dispatch("q", 2, ReportKind::MultiAgent, &Overrides::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::NoBackend(ReportKind::MultiAgent)
        ));
    }

    #[tokio::test]
    async fn test_misindexed_descriptors_are_rejected() {
        let scheduler = RunScheduler::default().with_backend(Arc::new(EchoBackend));
        let descriptors = vec![
            RunDescriptor::new("q", ReportKind::ResearchReport, Overrides::new(), 0),
            RunDescriptor::new("q", ReportKind::ResearchReport, Overrides::new(), 0),
        ];
        let err = scheduler
            .dispatch_descriptors(descriptors, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_panicking_run_is_contained() {
        let scheduler = RunScheduler::default().with_backend(Arc::new(PanickingBackend));
        let batch = scheduler
            .dispatch("q", 3, ReportKind::MultiAgent, &Overrides::new())
            .await
            .unwrap();

        assert_eq!(batch.len(), 3);
        assert!(batch.outcomes()[0].is_success());
        assert_eq!(
            batch.outcomes()[1].error_summary(),
            Some("backend panicked: generator blew up")
        );
        assert!(batch.outcomes()[2].is_success());
    }

    #[tokio::test]
    async fn test_run_normalises() {
        let scheduler = RunScheduler::default().with_backend(Arc::new(EchoBackend));
        let entries = scheduler
            .run("q", 2, ReportKind::ResearchReport, &Overrides::new())
            .await
            .unwrap();
        assert_eq!(
            entries,
            vec![
                CanonicalEntry::unknown_model("r0.md"),
                CanonicalEntry::unknown_model("r1.md"),
            ]
        );
    }
}
