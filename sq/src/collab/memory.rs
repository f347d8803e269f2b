//! In-memory collaborators
//!
//! Deterministic stand-ins for the external providers. The dry-run harness
//! uses them to rehearse a cadence without sending anything, and the tests use
//! their failure injection and call recording.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{
    CallReceipt, ContentWriter, DraftContext, EmailTransport, LeadDirectory, LeadProfile, Signal, SignalSource,
    VoiceTransport,
};
use crate::domain::{LeadId, StepContent};
use crate::error::{Collaborator, CollaboratorError};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fixed set of lead profiles
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    leads: HashMap<LeadId, LeadProfile>,
}

impl MemoryDirectory {
    pub fn new(profiles: impl IntoIterator<Item = LeadProfile>) -> Self {
        let leads = profiles.into_iter().map(|p| (p.lead_id.clone(), p)).collect();
        Self { leads }
    }
}

#[async_trait]
impl LeadDirectory for MemoryDirectory {
    async fn resolve(&self, lead: &LeadId) -> Result<LeadProfile, CollaboratorError> {
        debug!(%lead, "MemoryDirectory::resolve: called");
        self.leads
            .get(lead)
            .cloned()
            .ok_or_else(|| CollaboratorError::UnknownLead(lead.clone()))
    }
}

/// Writer that composes drafts from the rendered brief
///
/// Failures can be queued with [`ScriptedWriter::fail_next`]; an optional delay
/// simulates a slow provider.
#[derive(Debug, Default)]
pub struct ScriptedWriter {
    calls: AtomicUsize,
    pending_failures: AtomicU32,
    rate_limited: Mutex<Option<Duration>>,
    delay: Option<Duration>,
    contexts: Mutex<Vec<DraftContext>>,
}

impl ScriptedWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make the next `count` drafts fail
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Reject the next draft as rate limited
    pub fn rate_limit_next(&self, retry_after: Duration) {
        *lock(&self.rate_limited) = Some(retry_after);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Contexts received so far, in call order
    pub fn contexts(&self) -> Vec<DraftContext> {
        lock(&self.contexts).clone()
    }
}

#[async_trait]
impl ContentWriter for ScriptedWriter {
    async fn draft(&self, context: &DraftContext) -> Result<StepContent, CollaboratorError> {
        debug!(lead = %context.lead_id, day = context.day, "ScriptedWriter::draft: called");
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.contexts).push(context.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let rate_limited = lock(&self.rate_limited).take();
        if let Some(retry_after) = rate_limited {
            debug!(?retry_after, "ScriptedWriter::draft: injected rate limit");
            return Err(CollaboratorError::RateLimited {
                collaborator: Collaborator::ContentWriter,
                retry_after,
            });
        }

        let failing = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            debug!("ScriptedWriter::draft: injected failure");
            return Err(CollaboratorError::failed(Collaborator::ContentWriter, "injected writer failure"));
        }

        let subject = format!("{}: {}", context.display_name, context.kind.label());
        let body = format!(
            "Hi {},\n\n{}\n\nBest regards",
            context.display_name,
            context.brief.trim()
        );
        Ok(StepContent::from_text(subject, body))
    }
}

/// A message handed to [`RecordingMailer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub delivery_id: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Email transport that records messages instead of sending them
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMessage>>,
    pending_failures: AtomicU32,
    delay_ms: AtomicU64,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Simulate a slow transport
    pub fn set_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(millis, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl EmailTransport for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<String, CollaboratorError> {
        debug!(%to, %subject, "RecordingMailer::send: called");
        let delay_ms = self.delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let failing = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CollaboratorError::failed(Collaborator::EmailTransport, "injected transport failure"));
        }

        let mut sent = lock(&self.sent);
        let delivery_id = format!("msg-{:04}", sent.len() + 1);
        sent.push(SentMessage {
            delivery_id: delivery_id.clone(),
            to: to.to_string(),
            subject: subject.to_string(),
            html: html.to_string(),
        });
        Ok(delivery_id)
    }
}

/// Voice transport that records calls instead of dialing
#[derive(Debug)]
pub struct RecordingDialer {
    calls: Mutex<Vec<(LeadId, String)>>,
    open: AtomicBool,
    pending_failures: AtomicU32,
}

impl Default for RecordingDialer {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
            pending_failures: AtomicU32::new(0),
        }
    }
}

impl RecordingDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open or close calling hours
    pub fn set_calling_hours_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(LeadId, String)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl VoiceTransport for RecordingDialer {
    async fn place_call(&self, lead: &LeadId, phone_number: &str) -> Result<CallReceipt, CollaboratorError> {
        debug!(%lead, %phone_number, "RecordingDialer::place_call: called");
        let failing = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CollaboratorError::failed(Collaborator::VoiceTransport, "injected dial failure"));
        }

        let mut calls = lock(&self.calls);
        calls.push((lead.clone(), phone_number.to_string()));
        Ok(CallReceipt {
            call_reference: format!("call-{:04}", calls.len()),
            status: "queued".to_string(),
        })
    }

    fn is_within_calling_hours(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Signal store that tests and the harness push events into
#[derive(Debug, Default)]
pub struct MemorySignals {
    signals: Mutex<HashMap<LeadId, Vec<Signal>>>,
    fetches: AtomicUsize,
    failing: Mutex<Vec<LeadId>>,
}

impl MemorySignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, lead: impl Into<LeadId>, signal: Signal) {
        lock(&self.signals).entry(lead.into()).or_default().push(signal);
    }

    /// Make every fetch for this lead fail
    pub fn fail_for(&self, lead: impl Into<LeadId>) {
        lock(&self.failing).push(lead.into());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalSource for MemorySignals {
    async fn list_signals_for(&self, lead: &LeadId) -> Result<Vec<Signal>, CollaboratorError> {
        debug!(%lead, "MemorySignals::list_signals_for: called");
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if lock(&self.failing).contains(lead) {
            return Err(CollaboratorError::failed(Collaborator::SignalSource, "injected fetch failure"));
        }
        Ok(lock(&self.signals).get(lead).cloned().unwrap_or_default())
    }
}
