//! BatchRunner - generate and execute across every active enrollment

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::report::BatchReport;
use crate::collab::QuotaProvider;
use crate::config::PacingConfig;
use crate::domain::{LeadId, StepStatus};
use crate::error::{SequenceError, ValidationError};
use crate::sequence::{StepExecutor, StepGenerator};
use crate::store::EnrollmentStore;

/// Runs generate/execute passes one item at a time, with pacing
///
/// Only one batch runs per store at a time. Items are processed in enrollment
/// creation order. A stop request is honored between items. After a
/// rate-limited failure the next pause lasts at least the requested
/// retry-after.
pub struct BatchRunner {
    store: Arc<EnrollmentStore>,
    generator: Arc<StepGenerator>,
    executor: Arc<StepExecutor>,
    quota: Arc<dyn QuotaProvider>,
    pacing: PacingConfig,
    shutdown: watch::Receiver<bool>,
}

impl BatchRunner {
    pub fn new(
        store: Arc<EnrollmentStore>,
        generator: Arc<StepGenerator>,
        executor: Arc<StepExecutor>,
        quota: Arc<dyn QuotaProvider>,
        pacing: PacingConfig,
    ) -> Self {
        // A receiver whose sender is gone always reads `false`
        let (_, shutdown) = watch::channel(false);
        Self {
            store,
            generator,
            executor,
            quota,
            pacing,
            shutdown,
        }
    }

    /// Stop batches between items once `true` is sent on this channel
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    fn cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Wait out the pacing delay; returns false if cancelled meanwhile
    async fn pace(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.cancelled();
        }
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            Ok(_) = shutdown.wait_for(|stop| *stop) => {}
        }
        !self.cancelled()
    }

    /// Draft content for every pending email step of every active enrollment
    pub async fn generate_all_pending(&self) -> BatchReport {
        debug!("BatchRunner::generate_all_pending: called");
        let _gate = self.store.begin_batch().await;
        let mut report = BatchReport::default();

        let mut candidates: Vec<(LeadId, u8)> = Vec::new();
        for (lead, cell) in self.store.handles().await {
            let enrollment = cell.lock().await;
            if !enrollment.is_active() {
                continue;
            }
            candidates.extend(
                enrollment
                    .steps
                    .iter()
                    .filter(|s| s.is_email() && s.status == StepStatus::Pending)
                    .map(|s| (lead.clone(), s.day)),
            );
        }
        info!(count = candidates.len(), "Generating pending steps");

        let mut backoff: Option<Duration> = None;
        for (index, (lead, day)) in candidates.iter().enumerate() {
            let proceed = if index == 0 {
                !self.cancelled()
            } else {
                let delay = self.pacing.generate_delay().max(backoff.take().unwrap_or_default());
                self.pace(delay).await
            };
            if !proceed {
                report.cancelled = candidates.len() - index;
                info!(remaining = report.cancelled, "Generation batch cancelled");
                break;
            }

            match self.generator.generate(lead, *day).await {
                Ok(_) => {
                    report.attempted += 1;
                    report.succeeded += 1;
                }
                Err(SequenceError::Validation(e)) if is_stale(&e) => {
                    debug!(%lead, day, error = %e, "BatchRunner::generate_all_pending: no longer eligible");
                    report.stale += 1;
                }
                Err(e) => {
                    warn!(%lead, day, error = %e, "Generation failed in batch");
                    backoff = retry_after(&e);
                    report.attempted += 1;
                    report.record_error(lead, *day, e.to_string());
                }
            }
        }

        info!(summary = %report.summary(), "Generation batch finished");
        report
    }

    /// Execute each active enrollment's current step, at most `quota` sends
    ///
    /// The effective budget is the smaller of `quota` and what the quota
    /// provider has left today. Skipped call steps do not use the budget.
    pub async fn execute_all_ready(&self, quota: u32) -> BatchReport {
        debug!(quota, "BatchRunner::execute_all_ready: called");
        let _gate = self.store.begin_batch().await;
        let mut report = BatchReport::default();

        let budget = quota.min(self.quota.remaining_today());
        let mut candidates: Vec<(LeadId, u8)> = Vec::new();
        for (lead, cell) in self.store.handles().await {
            let enrollment = cell.lock().await;
            let day = enrollment.current_day;
            if enrollment.check_executable(day).is_ok() {
                candidates.push((lead, day));
            }
        }

        let budget_len = usize::try_from(budget).unwrap_or(usize::MAX);
        if candidates.len() > budget_len {
            debug!(
                candidates = candidates.len(),
                budget, "BatchRunner::execute_all_ready: capping to budget"
            );
            candidates.truncate(budget_len);
            report.quota_exhausted = true;
        }
        info!(count = candidates.len(), budget, "Executing ready steps");

        let mut sends: u32 = 0;
        let mut backoff: Option<Duration> = None;
        for (index, (lead, day)) in candidates.iter().enumerate() {
            let proceed = if index == 0 {
                !self.cancelled()
            } else {
                let delay = self.pacing.execute_delay().max(backoff.take().unwrap_or_default());
                self.pace(delay).await
            };
            if !proceed {
                report.cancelled = candidates.len() - index;
                info!(remaining = report.cancelled, "Execution batch cancelled");
                break;
            }

            if sends >= budget || self.quota.remaining_today() == 0 {
                info!(%lead, "Daily send quota exhausted, stopping batch");
                report.quota_exhausted = true;
                break;
            }

            match self.executor.execute(lead, *day).await {
                Ok(outcome) => {
                    report.attempted += 1;
                    report.succeeded += 1;
                    if outcome.consumes_quota() {
                        sends += 1;
                        self.quota.record_send();
                    } else {
                        report.skipped += 1;
                    }
                }
                Err(SequenceError::Validation(e)) if is_stale(&e) => {
                    debug!(%lead, day, error = %e, "BatchRunner::execute_all_ready: no longer eligible");
                    report.stale += 1;
                }
                Err(e) => {
                    warn!(%lead, day, error = %e, "Execution failed in batch");
                    backoff = retry_after(&e);
                    report.attempted += 1;
                    report.record_error(lead, *day, e.to_string());
                }
            }
        }

        info!(summary = %report.summary(), "Execution batch finished");
        report
    }
}

/// Wait requested by a rate-limited collaborator before the next item
fn retry_after(error: &SequenceError) -> Option<Duration> {
    match error {
        SequenceError::Collaborator(e) => e.retry_after(),
        _ => None,
    }
}

/// The enrollment moved on between collection and processing
fn is_stale(error: &ValidationError) -> bool {
    !matches!(error, ValidationError::EmailNotConfigured(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::fixtures::Fixture;

    fn runner(fx: &Fixture) -> BatchRunner {
        paced_runner(fx, PacingConfig::none())
    }

    fn paced_runner(fx: &Fixture, pacing: PacingConfig) -> BatchRunner {
        BatchRunner::new(
            Arc::clone(&fx.store),
            Arc::new(StepGenerator::new(
                Arc::clone(&fx.store),
                &fx.collaborators,
                Arc::new(crate::prompts::PromptLoader::embedded_only()),
                Default::default(),
            )),
            Arc::new(StepExecutor::new(Arc::clone(&fx.store), &fx.collaborators, Default::default())),
            fx.quota.clone(),
            pacing,
        )
    }

    async fn enroll(fx: &Fixture, leads: &[&str]) {
        for lead in leads {
            fx.store.enroll(LeadId::from(*lead)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_generate_all_pending_covers_email_steps() {
        let fx = Fixture::new();
        enroll(&fx, &["L1", "L2"]).await;
        fx.store.with_enrollment(&LeadId::from("L2"), |e| e.pause()).await.unwrap();

        let report = runner(&fx).generate_all_pending().await;
        assert_eq!(report.attempted, 4);
        assert_eq!(report.succeeded, 4);

        let l1 = fx.store.get(&LeadId::from("L1")).await.unwrap();
        for step in &l1.steps {
            let expected = if step.is_email() { StepStatus::Ready } else { StepStatus::Pending };
            assert_eq!(step.status, expected);
        }
        let l2 = fx.store.get(&LeadId::from("L2")).await.unwrap();
        assert!(l2.steps.iter().all(|s| s.status == StepStatus::Pending));
    }

    #[tokio::test]
    async fn test_generate_failure_does_not_abort_batch() {
        let fx = Fixture::new();
        enroll(&fx, &["L1"]).await;
        fx.writer.fail_next(1);

        let report = runner(&fx).generate_all_pending().await;
        assert_eq!(report.attempted, 4);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors[0].day, 1);

        let l1 = fx.store.get(&LeadId::from("L1")).await.unwrap();
        assert_eq!(l1.step(1).unwrap().status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn test_execute_all_ready_one_step_per_enrollment() {
        let fx = Fixture::new();
        enroll(&fx, &["L1", "L2"]).await;
        let runner = runner(&fx);
        runner.generate_all_pending().await;

        let report = runner.execute_all_ready(10).await;
        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(fx.mailer.sent().len(), 2);
        for lead in ["L1", "L2"] {
            assert_eq!(fx.store.get(&LeadId::from(lead)).await.unwrap().current_day, 2);
        }
        assert_eq!(fx.quota.remaining_today(), 98);
    }

    #[tokio::test]
    async fn test_execute_all_ready_respects_quota() {
        let fx = Fixture::new();
        enroll(&fx, &["L1", "L2"]).await;
        let runner = runner(&fx);
        runner.generate_all_pending().await;

        let report = runner.execute_all_ready(1).await;
        assert_eq!(report.succeeded, 1);
        assert!(report.quota_exhausted);
        assert_eq!(fx.mailer.sent().len(), 1);
        // Creation order: L1 went first
        assert_eq!(fx.store.get(&LeadId::from("L1")).await.unwrap().current_day, 2);
        assert_eq!(fx.store.get(&LeadId::from("L2")).await.unwrap().current_day, 1);
    }

    #[tokio::test]
    async fn test_execute_all_ready_uses_provider_remaining() {
        let fx = Fixture::new();
        enroll(&fx, &["L1", "L2"]).await;
        let runner = runner(&fx);
        runner.generate_all_pending().await;
        for _ in 0..99 {
            fx.quota.record_send();
        }

        let report = runner.execute_all_ready(10).await;
        assert_eq!(report.succeeded, 1);
        assert!(report.quota_exhausted);
        assert_eq!(fx.quota.remaining_today(), 0);
    }

    #[tokio::test]
    async fn test_skipped_call_does_not_use_quota() {
        let fx = Fixture::new();
        enroll(&fx, &["L2"]).await;
        let runner = runner(&fx);
        runner.generate_all_pending().await;
        runner.execute_all_ready(10).await;
        runner.execute_all_ready(10).await;
        let before = fx.quota.remaining_today();

        let report = runner.execute_all_ready(10).await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(fx.quota.remaining_today(), before);
        assert_eq!(fx.store.get(&LeadId::from("L2")).await.unwrap().current_day, 4);
    }

    #[tokio::test]
    async fn test_missing_email_reported_as_failure() {
        let fx = Fixture::new();
        enroll(&fx, &["L3"]).await;
        let runner = runner(&fx);
        runner.generate_all_pending().await;

        let report = runner.execute_all_ready(10).await;
        assert_eq!(report.failed, 1);
        assert!(report.errors[0].message.contains("email not configured"));
        assert_eq!(fx.store.get(&LeadId::from("L3")).await.unwrap().current_day, 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let fx = Fixture::new();
        enroll(&fx, &["L1", "L2"]).await;
        let (tx, rx) = watch::channel(false);
        let runner = runner(&fx).with_shutdown(rx);
        tx.send(true).unwrap();

        let report = runner.generate_all_pending().await;
        assert_eq!(report.attempted, 0);
        assert_eq!(report.cancelled, 8);
        assert_eq!(fx.writer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_pacing_keeps_processed_items() {
        let fx = Fixture::new();
        enroll(&fx, &["L1", "L2", "L3"]).await;
        let (tx, rx) = watch::channel(false);
        let pacing = PacingConfig {
            generate_delay_ms: 100,
            execute_delay_ms: 100,
        };
        let runner = Arc::new(paced_runner(&fx, pacing).with_shutdown(rx));

        let batch = {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move { runner.generate_all_pending().await })
        };
        tokio::time::sleep(Duration::from_millis(150)).await;
        tx.send(true).unwrap();
        let report = tokio::time::timeout(Duration::from_secs(1), batch).await.unwrap().unwrap();

        assert!(report.succeeded >= 1);
        assert!(report.cancelled > 0);
        assert_eq!(report.attempted + report.cancelled, 12);
        assert_eq!(fx.writer.call_count(), report.attempted);

        let mut ready = 0;
        let mut pending = 0;
        for enrollment in fx.store.list(None).await {
            for step in enrollment.steps.iter().filter(|s| s.is_email()) {
                match step.status {
                    StepStatus::Ready => ready += 1,
                    StepStatus::Pending => pending += 1,
                    other => panic!("unexpected step status {}", other),
                }
            }
        }
        assert_eq!(ready, report.succeeded);
        assert_eq!(pending, report.cancelled);

        // Creation order: L1's steps are drafted first
        let l1 = fx.store.get(&LeadId::from("L1")).await.unwrap();
        assert_eq!(l1.step(1).unwrap().status, StepStatus::Ready);
        let l3 = fx.store.get(&LeadId::from("L3")).await.unwrap();
        assert_eq!(l3.step(5).unwrap().status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancel_during_execute_pacing_keeps_sent_steps() {
        let fx = Fixture::new();
        enroll(&fx, &["L1", "L2"]).await;
        runner(&fx).generate_all_pending().await;
        let (tx, rx) = watch::channel(false);
        let pacing = PacingConfig {
            generate_delay_ms: 0,
            execute_delay_ms: 300,
        };
        let runner = Arc::new(paced_runner(&fx, pacing).with_shutdown(rx));

        let batch = {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move { runner.execute_all_ready(10).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        let report = tokio::time::timeout(Duration::from_secs(1), batch).await.unwrap().unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.cancelled, 1);
        assert_eq!(fx.mailer.sent().len(), 1);
        let l1 = fx.store.get(&LeadId::from("L1")).await.unwrap();
        assert_eq!(l1.step(1).unwrap().status, StepStatus::Sent);
        assert_eq!(l1.current_day, 2);
        let l2 = fx.store.get(&LeadId::from("L2")).await.unwrap();
        assert_eq!(l2.step(1).unwrap().status, StepStatus::Ready);
        assert_eq!(l2.current_day, 1);
        assert_eq!(fx.quota.remaining_today(), 99);
    }

    #[tokio::test]
    async fn test_rate_limited_writer_delays_next_item() {
        let fx = Fixture::new();
        enroll(&fx, &["L1"]).await;
        fx.writer.rate_limit_next(Duration::from_millis(200));

        let started = std::time::Instant::now();
        let report = runner(&fx).generate_all_pending().await;

        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(report.attempted, 4);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 1);
        assert!(report.errors[0].message.contains("rate limited"));
        let l1 = fx.store.get(&LeadId::from("L1")).await.unwrap();
        assert_eq!(l1.step(1).unwrap().status, StepStatus::Pending);
        assert_eq!(l1.step(2).unwrap().status, StepStatus::Ready);
    }
}
