//! External collaborator contracts
//!
//! The sequencer owns no transport, writer or CRM. It talks to them through
//! these traits. Every async call is wrapped in [`call_with_timeout`] at the
//! call site so a hung provider surfaces as a [`CollaboratorError`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{LeadId, StepContent, StepKind};
use crate::error::{Collaborator, CollaboratorError};

pub mod memory;
mod quota;

pub use quota::DailyQuota;

/// What the lead directory knows about a lead
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadProfile {
    pub lead_id: LeadId,
    pub display_name: String,
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Short notes on earlier contact outside this sequence
    #[serde(default)]
    pub prior_touch_summaries: Vec<String>,
}

impl LeadProfile {
    pub fn new(lead_id: impl Into<LeadId>, display_name: impl Into<String>) -> Self {
        Self {
            lead_id: lead_id.into(),
            display_name: display_name.into(),
            email_address: None,
            phone_number: None,
            prior_touch_summaries: Vec::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email_address = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }

    pub fn with_prior_touch(mut self, summary: impl Into<String>) -> Self {
        self.prior_touch_summaries.push(summary.into());
        self
    }

    /// Usable phone number, ignoring blank entries
    pub fn phone(&self) -> Option<&str> {
        self.phone_number.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }

    /// Usable email address, ignoring blank entries
    pub fn email(&self) -> Option<&str> {
        self.email_address.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }
}

/// An email already delivered earlier in the sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviousEmail {
    pub day: u8,
    pub subject: String,
    pub body_text: String,
}

/// Everything the writer gets for one draft
#[derive(Debug, Clone, Serialize)]
pub struct DraftContext {
    pub lead_id: LeadId,
    pub display_name: String,
    pub day: u8,
    pub kind: StepKind,
    /// Rendered step brief
    pub brief: String,
    pub prior_touch_summaries: Vec<String>,
    /// Sent emails, so later touches don't repeat earlier ones
    pub previous_emails: Vec<PreviousEmail>,
}

/// Voice transport response for a placed call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallReceipt {
    pub call_reference: String,
    pub status: String,
}

/// Kind of externally observed delivery/engagement event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Reply,
    Bounce,
    Open,
    Click,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reply => write!(f, "reply"),
            Self::Bounce => write!(f, "bounce"),
            Self::Open => write!(f, "open"),
            Self::Click => write!(f, "click"),
        }
    }
}

/// One delivery/engagement event for a lead
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub occurred_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(kind: SignalKind, occurred_at: DateTime<Utc>) -> Self {
        Self { kind, occurred_at }
    }

    /// Signal observed right now
    pub fn now(kind: SignalKind) -> Self {
        Self::new(kind, Utc::now())
    }
}

/// Read-only lookup of lead details
#[async_trait]
pub trait LeadDirectory: Send + Sync {
    async fn resolve(&self, lead: &LeadId) -> Result<LeadProfile, CollaboratorError>;
}

/// Drafts step content; may be slow, rate-limited and non-deterministic
#[async_trait]
pub trait ContentWriter: Send + Sync {
    async fn draft(&self, context: &DraftContext) -> Result<StepContent, CollaboratorError>;
}

/// Sends an email, returning the transport's delivery ID
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<String, CollaboratorError>;
}

/// Places phone calls
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn place_call(&self, lead: &LeadId, phone_number: &str) -> Result<CallReceipt, CollaboratorError>;

    /// Whether calls may be placed right now
    fn is_within_calling_hours(&self) -> bool;
}

/// Pull-based source of delivery/engagement signals
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn list_signals_for(&self, lead: &LeadId) -> Result<Vec<Signal>, CollaboratorError>;
}

/// Shared daily send budget
pub trait QuotaProvider: Send + Sync {
    fn remaining_today(&self) -> u32;

    /// Consume one unit after a successful send or call
    fn record_send(&self);
}

/// The full set of collaborators a sequencer runs against
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn LeadDirectory>,
    pub writer: Arc<dyn ContentWriter>,
    pub email: Arc<dyn EmailTransport>,
    pub voice: Arc<dyn VoiceTransport>,
    pub signals: Arc<dyn SignalSource>,
    pub quota: Arc<dyn QuotaProvider>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("quota_remaining", &self.quota.remaining_today())
            .finish_non_exhaustive()
    }
}

/// Run a collaborator call under a timeout
///
/// An elapsed timeout is reported as [`CollaboratorError::Timeout`], the same
/// way as any other collaborator failure.
pub async fn call_with_timeout<T, F>(collaborator: Collaborator, timeout: Duration, call: F) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            debug!(%collaborator, ?timeout, "call_with_timeout: elapsed");
            Err(CollaboratorError::Timeout { collaborator, timeout })
        }
    }
}
