//! Lifecycle - enroll, pause, resume, stop and remove

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::{Enrollment, EnrollmentStatus, LeadId};
use crate::error::SequenceResult;
use crate::store::{EnrollmentStore, SequenceEvent};

/// Result of a bulk pause/resume
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkReport {
    /// Enrollments whose status changed
    pub applied: usize,
    /// Enrollments the rule did not apply to
    pub unchanged: usize,
}

/// Operator-facing status transitions
pub struct Lifecycle {
    store: Arc<EnrollmentStore>,
}

impl Lifecycle {
    pub fn new(store: Arc<EnrollmentStore>) -> Self {
        Self { store }
    }

    /// Enroll a lead at day 1 with every step pending
    pub async fn enroll(&self, lead: LeadId) -> SequenceResult<Enrollment> {
        debug!(%lead, "Lifecycle::enroll: called");
        Ok(self.store.enroll(lead).await?)
    }

    /// active -> paused; a no-op for any other status
    pub async fn pause(&self, lead: &LeadId) -> SequenceResult<bool> {
        debug!(%lead, "Lifecycle::pause: called");
        self.transition(lead, Enrollment::pause).await
    }

    /// paused -> active; a no-op for any other status
    pub async fn resume(&self, lead: &LeadId) -> SequenceResult<bool> {
        debug!(%lead, "Lifecycle::resume: called");
        self.transition(lead, Enrollment::resume).await
    }

    /// active or paused -> stopped
    pub async fn stop(&self, lead: &LeadId) -> SequenceResult<bool> {
        debug!(%lead, "Lifecycle::stop: called");
        self.transition(lead, Enrollment::stop).await
    }

    /// Delete an enrollment regardless of status
    pub async fn remove(&self, lead: &LeadId) -> SequenceResult<Enrollment> {
        debug!(%lead, "Lifecycle::remove: called");
        Ok(self.store.remove(lead).await?)
    }

    /// Pause every active enrollment
    pub async fn pause_all(&self) -> BulkReport {
        debug!("Lifecycle::pause_all: called");
        self.transition_all(Enrollment::pause).await
    }

    /// Resume every paused enrollment
    pub async fn resume_all(&self) -> BulkReport {
        debug!("Lifecycle::resume_all: called");
        self.transition_all(Enrollment::resume).await
    }

    async fn transition(&self, lead: &LeadId, apply: fn(&mut Enrollment) -> bool) -> SequenceResult<bool> {
        let (from, to, changed) = self
            .store
            .with_enrollment(lead, |enrollment| {
                let from = enrollment.status;
                let changed = apply(enrollment);
                (from, enrollment.status, changed)
            })
            .await?;

        if changed {
            self.announce(lead, from, to);
        } else {
            debug!(%lead, status = %from, "Lifecycle::transition: not applicable");
        }
        Ok(changed)
    }

    async fn transition_all(&self, apply: fn(&mut Enrollment) -> bool) -> BulkReport {
        let mut report = BulkReport::default();
        for (lead, cell) in self.store.handles().await {
            let (from, to, changed) = {
                let mut enrollment = cell.lock().await;
                let from = enrollment.status;
                let changed = apply(&mut *enrollment);
                (from, enrollment.status, changed)
            };

            if changed {
                report.applied += 1;
                self.announce(&lead, from, to);
            } else {
                report.unchanged += 1;
            }
        }
        info!(applied = report.applied, unchanged = report.unchanged, "Bulk transition finished");
        report
    }

    fn announce(&self, lead: &LeadId, from: EnrollmentStatus, to: EnrollmentStatus) {
        info!(%lead, %from, %to, "Sequence status changed");
        self.store.emit(SequenceEvent::StatusChanged {
            lead: lead.clone(),
            from,
            to,
        });
    }
}
