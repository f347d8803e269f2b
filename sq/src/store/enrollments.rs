//! EnrollmentStore - arena of enrollments keyed by lead

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, broadcast};
use tracing::{debug, info};

use super::events::SequenceEvent;
use crate::domain::{Enrollment, EnrollmentStatus, LeadId};
use crate::error::ValidationError;

/// Shared, lockable enrollment
///
/// Holding the lock is what makes an operation on one enrollment exclusive;
/// it is held across the collaborator call of a generate or execute.
pub type EnrollmentHandle = Arc<Mutex<Enrollment>>;

struct Slot {
    /// Creation order, for deterministic batch processing
    seq: u64,
    cell: EnrollmentHandle,
}

struct StoreInner {
    slots: HashMap<LeadId, Slot>,
    next_seq: u64,
}

/// In-memory enrollment store
pub struct EnrollmentStore {
    inner: Mutex<StoreInner>,
    /// Serializes batch runs against this store
    batch_gate: Mutex<()>,
    event_tx: broadcast::Sender<SequenceEvent>,
}

impl Default for EnrollmentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EnrollmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrollmentStore").finish_non_exhaustive()
    }
}

impl EnrollmentStore {
    pub fn new() -> Self {
        debug!("EnrollmentStore::new: called");
        let (event_tx, _) = broadcast::channel(256);
        Self {
            inner: Mutex::new(StoreInner {
                slots: HashMap::new(),
                next_seq: 0,
            }),
            batch_gate: Mutex::new(()),
            event_tx,
        }
    }

    /// Subscribe to change events
    pub fn subscribe(&self) -> broadcast::Receiver<SequenceEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: SequenceEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    /// Enroll a lead: active, day 1, all steps pending
    ///
    /// Rejected while the lead has an active or paused enrollment. A lead whose
    /// previous sequence ended is re-enrolled with a fresh enrollment.
    pub async fn enroll(&self, lead: LeadId) -> Result<Enrollment, ValidationError> {
        debug!(%lead, "EnrollmentStore::enroll: called");

        let snapshot = loop {
            // The store lock is never held while waiting on an enrollment
            let existing = self
                .inner
                .lock()
                .await
                .slots
                .get(&lead)
                .map(|slot| Arc::clone(&slot.cell));

            if let Some(cell) = &existing {
                let current = cell.lock().await;
                if !current.is_terminal() {
                    debug!(%lead, status = %current.status, "EnrollmentStore::enroll: already enrolled");
                    return Err(ValidationError::AlreadyEnrolled(lead));
                }
                debug!(%lead, previous = %current.id, "EnrollmentStore::enroll: replacing ended enrollment");
            }

            let mut inner = self.inner.lock().await;
            let unchanged = match (&existing, inner.slots.get(&lead)) {
                (None, None) => true,
                (Some(seen), Some(slot)) => Arc::ptr_eq(seen, &slot.cell),
                _ => false,
            };
            if !unchanged {
                debug!(%lead, "EnrollmentStore::enroll: slot changed while waiting, retrying");
                continue;
            }

            let enrollment = Enrollment::new(lead.clone());
            let snapshot = enrollment.clone();
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.slots.insert(
                lead.clone(),
                Slot {
                    seq,
                    cell: Arc::new(Mutex::new(enrollment)),
                },
            );
            break snapshot;
        };

        info!(%lead, enrollment_id = %snapshot.id, "Lead enrolled");
        self.emit(SequenceEvent::Enrolled {
            lead,
            enrollment_id: snapshot.id.clone(),
        });
        Ok(snapshot)
    }

    /// Snapshot of a lead's enrollment
    pub async fn get(&self, lead: &LeadId) -> Option<Enrollment> {
        debug!(%lead, "EnrollmentStore::get: called");
        let cell = self.handle(lead).await.ok()?;
        let enrollment = cell.lock().await;
        Some(enrollment.clone())
    }

    /// Snapshots in creation order, optionally filtered by status
    pub async fn list(&self, status_filter: Option<EnrollmentStatus>) -> Vec<Enrollment> {
        debug!(?status_filter, "EnrollmentStore::list: called");
        let mut out = Vec::new();
        for (_, cell) in self.handles().await {
            let enrollment = cell.lock().await;
            if status_filter.is_none_or(|s| enrollment.status == s) {
                out.push(enrollment.clone());
            }
        }
        out
    }

    /// Delete a lead's enrollment regardless of status
    ///
    /// Waits for any in-flight operation on the enrollment and returns its
    /// final state.
    pub async fn remove(&self, lead: &LeadId) -> Result<Enrollment, ValidationError> {
        debug!(%lead, "EnrollmentStore::remove: called");
        let slot = self
            .inner
            .lock()
            .await
            .slots
            .remove(lead)
            .ok_or_else(|| ValidationError::NotEnrolled(lead.clone()))?;

        let removed = slot.cell.lock().await.clone();
        info!(%lead, status = %removed.status, "Enrollment removed");
        self.emit(SequenceEvent::Removed { lead: lead.clone() });
        Ok(removed)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.slots.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Lock handle for one enrollment
    pub(crate) async fn handle(&self, lead: &LeadId) -> Result<EnrollmentHandle, ValidationError> {
        self.inner
            .lock()
            .await
            .slots
            .get(lead)
            .map(|slot| Arc::clone(&slot.cell))
            .ok_or_else(|| ValidationError::NotEnrolled(lead.clone()))
    }

    /// Lock handles for every enrollment, in creation order
    pub(crate) async fn handles(&self) -> Vec<(LeadId, EnrollmentHandle)> {
        let inner = self.inner.lock().await;
        let mut slots: Vec<_> = inner
            .slots
            .iter()
            .map(|(lead, slot)| (slot.seq, lead.clone(), Arc::clone(&slot.cell)))
            .collect();
        drop(inner);

        slots.sort_by_key(|(seq, _, _)| *seq);
        slots.into_iter().map(|(_, lead, cell)| (lead, cell)).collect()
    }

    /// Run a synchronous mutation under the enrollment's lock
    pub(crate) async fn with_enrollment<T>(
        &self,
        lead: &LeadId,
        f: impl FnOnce(&mut Enrollment) -> T,
    ) -> Result<T, ValidationError> {
        let cell = self.handle(lead).await?;
        let mut enrollment = cell.lock().await;
        Ok(f(&mut enrollment))
    }

    /// Exclusive access for one batch run
    pub(crate) async fn begin_batch(&self) -> MutexGuard<'_, ()> {
        debug!("EnrollmentStore::begin_batch: waiting for batch gate");
        self.batch_gate.lock().await
    }
}
