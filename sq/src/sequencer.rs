//! Sequencer - wires the store, components and collaborators together

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::batch::{BatchReport, BatchRunner};
use crate::collab::Collaborators;
use crate::config::Config;
use crate::domain::{Enrollment, EnrollmentStatus, LeadId, StepRecord};
use crate::error::SequenceResult;
use crate::prompts::PromptLoader;
use crate::sequence::{BulkReport, ExecutionOutcome, Lifecycle, StepExecutor, StepGenerator};
use crate::store::{EnrollmentStore, SequenceEvent};
use crate::watcher::{ReconcileReport, SignalWatcher};

/// Entry point for the surrounding application
pub struct Sequencer {
    store: Arc<EnrollmentStore>,
    generator: Arc<StepGenerator>,
    executor: Arc<StepExecutor>,
    lifecycle: Lifecycle,
    batch: BatchRunner,
    collaborators: Collaborators,
    config: Config,
    shutdown_tx: watch::Sender<bool>,
}

impl Sequencer {
    pub fn new(config: &Config, collaborators: Collaborators) -> Self {
        debug!("Sequencer::new: called");
        let store = Arc::new(EnrollmentStore::new());
        let prompts = Arc::new(PromptLoader::new(config.prompts.dir.as_deref()));
        let generator = Arc::new(StepGenerator::new(
            Arc::clone(&store),
            &collaborators,
            prompts,
            config.timeouts.clone(),
        ));
        let executor = Arc::new(StepExecutor::new(
            Arc::clone(&store),
            &collaborators,
            config.timeouts.clone(),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let batch = BatchRunner::new(
            Arc::clone(&store),
            Arc::clone(&generator),
            Arc::clone(&executor),
            Arc::clone(&collaborators.quota),
            config.pacing.clone(),
        )
        .with_shutdown(shutdown_rx);

        Self {
            lifecycle: Lifecycle::new(Arc::clone(&store)),
            store,
            generator,
            executor,
            batch,
            collaborators,
            config: config.clone(),
            shutdown_tx,
        }
    }

    // === Store ===

    pub async fn get(&self, lead: &LeadId) -> Option<Enrollment> {
        self.store.get(lead).await
    }

    pub async fn list(&self, status_filter: Option<EnrollmentStatus>) -> Vec<Enrollment> {
        self.store.list(status_filter).await
    }

    /// Subscribe to change events
    pub fn subscribe(&self) -> broadcast::Receiver<SequenceEvent> {
        self.store.subscribe()
    }

    // === Lifecycle ===

    pub async fn enroll(&self, lead: impl Into<LeadId>) -> SequenceResult<Enrollment> {
        self.lifecycle.enroll(lead.into()).await
    }

    pub async fn pause(&self, lead: &LeadId) -> SequenceResult<bool> {
        self.lifecycle.pause(lead).await
    }

    pub async fn resume(&self, lead: &LeadId) -> SequenceResult<bool> {
        self.lifecycle.resume(lead).await
    }

    pub async fn stop(&self, lead: &LeadId) -> SequenceResult<bool> {
        self.lifecycle.stop(lead).await
    }

    pub async fn remove(&self, lead: &LeadId) -> SequenceResult<Enrollment> {
        self.lifecycle.remove(lead).await
    }

    pub async fn pause_all(&self) -> BulkReport {
        self.lifecycle.pause_all().await
    }

    pub async fn resume_all(&self) -> BulkReport {
        self.lifecycle.resume_all().await
    }

    // === Steps ===

    pub async fn generate(&self, lead: &LeadId, day: u8) -> SequenceResult<StepRecord> {
        self.generator.generate(lead, day).await
    }

    pub async fn apply_edit(&self, lead: &LeadId, day: u8, subject: &str, body: &str) -> SequenceResult<StepRecord> {
        self.generator.apply_edit(lead, day, subject, body).await
    }

    pub async fn execute(&self, lead: &LeadId, day: u8) -> SequenceResult<ExecutionOutcome> {
        self.executor.execute(lead, day).await
    }

    // === Batches ===

    pub async fn generate_all_pending(&self) -> BatchReport {
        self.batch.generate_all_pending().await
    }

    pub async fn execute_all_ready(&self, quota: u32) -> BatchReport {
        self.batch.execute_all_ready(quota).await
    }

    /// Ask running batches and the watcher loop to stop between items
    pub fn cancel_batches(&self) {
        info!("Cancelling batch runs");
        self.shutdown_tx.send_replace(true);
    }

    /// Allow batches to run again after a cancel
    pub fn reset_cancellation(&self) {
        debug!("Sequencer::reset_cancellation: called");
        self.shutdown_tx.send_replace(false);
    }

    // === Signals ===

    fn signal_watcher(&self) -> SignalWatcher {
        SignalWatcher::new(
            Arc::clone(&self.store),
            Arc::clone(&self.collaborators.signals),
            self.config.timeouts.signals(),
            self.config.watcher.poll_interval(),
        )
    }

    /// Run one signal reconciliation pass now
    pub async fn reconcile_signals(&self) -> ReconcileReport {
        self.signal_watcher().reconcile_store().await
    }

    /// Start the polling watcher; it stops on [`Sequencer::cancel_batches`]
    pub fn spawn_watcher(&self) -> JoinHandle<()> {
        let watcher = self.signal_watcher();
        let shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(watcher.run(shutdown))
    }
}
