//! Signal watcher implementation

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::reconcile::{Transition, apply_signals};
use crate::collab::{SignalSource, call_with_timeout};
use crate::error::Collaborator;
use crate::store::{EnrollmentStore, SequenceEvent};

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Active enrollments whose signals were fetched
    pub checked: usize,
    /// Enrollments whose state changed (status or engagement)
    pub mutated: usize,
    /// Status transitions applied
    pub transitions: Vec<Transition>,
    /// Leads whose signal fetch failed; they are retried next pass
    pub fetch_failures: usize,
}

/// Pulls signals for every active enrollment and applies auto-transitions
pub struct SignalWatcher {
    store: Arc<EnrollmentStore>,
    source: Arc<dyn SignalSource>,
    timeout: Duration,
    poll_interval: Duration,
}

impl SignalWatcher {
    pub fn new(store: Arc<EnrollmentStore>, source: Arc<dyn SignalSource>, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            store,
            source,
            timeout,
            poll_interval,
        }
    }

    /// Run one reconciliation pass over the store
    ///
    /// Signals are fetched without holding the enrollment lock; the lock is
    /// taken only to apply them. A failed fetch leaves that enrollment as is.
    pub async fn reconcile_store(&self) -> ReconcileReport {
        debug!("SignalWatcher::reconcile_store: called");
        let mut report = ReconcileReport::default();

        for (lead, cell) in self.store.handles().await {
            if !cell.lock().await.is_active() {
                continue;
            }
            report.checked += 1;

            let signals = match call_with_timeout(
                Collaborator::SignalSource,
                self.timeout,
                self.source.list_signals_for(&lead),
            )
            .await
            {
                Ok(signals) => signals,
                Err(e) => {
                    warn!(%lead, error = %e, "Signal fetch failed");
                    report.fetch_failures += 1;
                    continue;
                }
            };

            let (from, to, changed) = {
                let mut enrollment = cell.lock().await;
                let from = enrollment.status;
                let changed = apply_signals(&mut enrollment, &signals);
                (from, enrollment.status, changed)
            };

            if changed {
                report.mutated += 1;
            }
            if from != to {
                info!(%lead, %from, %to, "Sequence ended by signal");
                self.store.emit(SequenceEvent::StatusChanged {
                    lead: lead.clone(),
                    from,
                    to,
                });
                report.transitions.push(Transition { lead, from, to });
            }
        }

        debug!(
            checked = report.checked,
            mutated = report.mutated,
            failures = report.fetch_failures,
            "SignalWatcher::reconcile_store: done"
        );
        report
    }

    /// Run the watcher loop until shutdown is signalled
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.poll_interval.as_secs(), "SignalWatcher started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            let report = self.reconcile_store().await;
            if !report.transitions.is_empty() {
                info!(count = report.transitions.len(), "Signal watcher ended sequences");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("SignalWatcher stopped");
    }
}
