//! Sequencer error types
//!
//! Validation errors reject a call before any state changes. Collaborator
//! errors are caught where the external call is made; the affected step stays
//! retryable. Policy skips (no phone, calling hours closed) are not errors.

use std::time::Duration;
use thiserror::Error;

use crate::domain::{EnrollmentStatus, LeadId, StepStatus};

/// External collaborators the sequencer talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collaborator {
    LeadDirectory,
    ContentWriter,
    EmailTransport,
    VoiceTransport,
    SignalSource,
}

impl std::fmt::Display for Collaborator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LeadDirectory => write!(f, "lead directory"),
            Self::ContentWriter => write!(f, "content writer"),
            Self::EmailTransport => write!(f, "email transport"),
            Self::VoiceTransport => write!(f, "voice transport"),
            Self::SignalSource => write!(f, "signal source"),
        }
    }
}

/// A precondition was violated; nothing was mutated
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("lead {0} is not enrolled in a sequence")]
    NotEnrolled(LeadId),

    #[error("lead {0} already has an active or paused sequence")]
    AlreadyEnrolled(LeadId),

    #[error("sequence for lead {lead} is {status}; only active sequences can run steps")]
    NotActive { lead: LeadId, status: EnrollmentStatus },

    #[error("sequence for lead {lead} has ended ({status})")]
    Ended { lead: LeadId, status: EnrollmentStatus },

    #[error("day {0} is outside the five-day cadence")]
    InvalidDay(u8),

    #[error("day {day} cannot run yet: lead {lead} is on day {current_day}")]
    OutOfOrder { lead: LeadId, day: u8, current_day: u8 },

    #[error("day {day} step is {status}; generate its content first")]
    StepNotReady { day: u8, status: StepStatus },

    #[error("day {day} step is already {status}")]
    StepFinished { day: u8, status: StepStatus },

    #[error("day {day} step is {status}; only ready content can be edited")]
    NotEditable { day: u8, status: StepStatus },

    #[error("email not configured for lead {0}: no address on file")]
    EmailNotConfigured(LeadId),
}

/// An external collaborator call failed or timed out
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("{collaborator} timed out after {timeout:?}")]
    Timeout { collaborator: Collaborator, timeout: Duration },

    #[error("{collaborator} rate limited, retry after {retry_after:?}")]
    RateLimited {
        collaborator: Collaborator,
        retry_after: Duration,
    },

    #[error("{collaborator} failed: {message}")]
    Failed { collaborator: Collaborator, message: String },

    #[error("lead {0} not found in the lead directory")]
    UnknownLead(LeadId),
}

impl CollaboratorError {
    /// Convenience constructor for a plain failure
    pub fn failed(collaborator: Collaborator, message: impl Into<String>) -> Self {
        Self::Failed {
            collaborator,
            message: message.into(),
        }
    }

    /// Check if retrying the same call later could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::RateLimited { .. } | Self::Failed { .. } => true,
            Self::UnknownLead(_) => false,
        }
    }

    /// Get the retry duration if this is a rate limit error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Errors surfaced by sequencer operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("prompt template error: {0}")]
    Template(String),
}

impl SequenceError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_collaborator(&self) -> bool {
        matches!(self, Self::Collaborator(_))
    }
}

/// Response from sequencer operations
pub type SequenceResult<T> = Result<T, SequenceError>;
