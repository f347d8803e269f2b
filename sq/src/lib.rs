//! Outreach Sequencer - multi-touch outreach cadence engine
//!
//! Runs each enrolled lead through a fixed five-day cadence: intro email,
//! follow-up email, phone call, value-add email and breakup email. Content is
//! drafted by an external writer, steps are delivered through external
//! transports, and reply/bounce signals end a sequence early.
//!
//! # Modules
//!
//! - [`domain`] - Blueprint, enrollments and step records
//! - [`store`] - In-memory enrollment store with per-enrollment locks
//! - [`sequence`] - Generate, execute and lifecycle operations
//! - [`watcher`] - Signal reconciliation and polling loop
//! - [`batch`] - Generate-all and execute-all passes under the send quota
//! - [`collab`] - Collaborator traits and in-memory implementations
//! - [`prompts`] - Step brief templates
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Dry-run harness command line

pub mod batch;
pub mod cli;
pub mod collab;
pub mod config;
pub mod domain;
pub mod error;
pub mod prompts;
pub mod sequence;
pub mod sequencer;
pub mod store;
pub mod watcher;

// Re-export commonly used types
pub use batch::{BatchItemError, BatchReport, BatchRunner};
pub use collab::{
    CallReceipt, Collaborators, ContentWriter, DailyQuota, DraftContext, EmailTransport, LeadDirectory, LeadProfile,
    PreviousEmail, QuotaProvider, Signal, SignalKind, SignalSource, VoiceTransport,
};
pub use config::Config;
pub use domain::{
    BLUEPRINT, BlueprintStep, Channel, EndReason, Engagement, Enrollment, EnrollmentStatus, LeadId, SkipReason,
    StepContent, StepKind, StepRecord, StepStatus,
};
pub use error::{Collaborator, CollaboratorError, SequenceError, SequenceResult, ValidationError};
pub use sequence::{BulkReport, ExecutionOutcome, Lifecycle, StepExecutor, StepGenerator};
pub use sequencer::Sequencer;
pub use store::{EnrollmentStore, SequenceEvent};
pub use watcher::{ReconcileReport, SignalWatcher, Transition};
