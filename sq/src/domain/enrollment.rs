//! Enrollment domain type
//!
//! Tracks one lead's progress through the cadence. All transitions go through
//! methods on this type so the day pointer and terminal-state invariants are
//! enforced in one place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::blueprint::{BLUEPRINT, LAST_DAY, step_for_day};
use super::id::{LeadId, generate_enrollment_id};
use super::step::{SkipReason, StepContent, StepRecord, StepStatus};
use crate::error::ValidationError;

/// Enrollment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    /// Steps may be generated and executed
    #[default]
    Active,
    /// Operator paused the sequence
    Paused,
    /// Stopped manually or by a bounce
    Stopped,
    /// Day-5 step executed
    Completed,
    /// Lead replied; a human took over
    Replied,
}

impl EnrollmentStatus {
    /// Check if the sequence has ended
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Replied)
    }
}

impl std::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Stopped => write!(f, "stopped"),
            Self::Completed => write!(f, "completed"),
            Self::Replied => write!(f, "replied"),
        }
    }
}

impl std::str::FromStr for EnrollmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "stopped" => Ok(Self::Stopped),
            "completed" => Ok(Self::Completed),
            "replied" => Ok(Self::Replied),
            _ => Err(format!("Unknown enrollment status: {}", s)),
        }
    }
}

/// Why a sequence reached a terminal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Operator stopped it
    Manual,
    /// Hard bounce; address undeliverable
    Bounced,
    /// Lead replied
    Replied,
    /// All five touches done
    Completed,
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "stopped by operator"),
            Self::Bounced => write!(f, "undeliverable"),
            Self::Replied => write!(f, "lead replied"),
            Self::Completed => write!(f, "cadence finished"),
        }
    }
}

/// Opens and clicks observed since enrollment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub opens: u32,
    pub clicks: u32,
    pub last_signal_at: Option<DateTime<Utc>>,
}

/// The live sequencing state for one lead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    /// Unique per logical enrollment
    pub id: String,

    pub lead_id: LeadId,

    pub status: EnrollmentStatus,

    /// Day whose step is eligible to run now (1..=5)
    pub current_day: u8,

    pub enrolled_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub end_reason: Option<EndReason>,

    #[serde(default)]
    pub engagement: Engagement,

    /// Always five records, in day order
    pub steps: Vec<StepRecord>,
}

impl Enrollment {
    /// Create an active enrollment on day 1 with every step pending
    pub fn new(lead_id: LeadId) -> Self {
        let now = Utc::now();
        Self {
            id: generate_enrollment_id(&lead_id),
            lead_id,
            status: EnrollmentStatus::Active,
            current_day: 1,
            enrolled_at: now,
            updated_at: now,
            end_reason: None,
            engagement: Engagement::default(),
            steps: BLUEPRINT.iter().map(StepRecord::from_blueprint).collect(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        self.status == EnrollmentStatus::Active
    }

    /// Get the step for a day (1-based)
    pub fn step(&self, day: u8) -> Option<&StepRecord> {
        step_for_day(day)?;
        self.steps.get(usize::from(day - 1))
    }

    fn step_mut(&mut self, day: u8) -> Result<&mut StepRecord, ValidationError> {
        if step_for_day(day).is_none() {
            return Err(ValidationError::InvalidDay(day));
        }
        self.steps
            .get_mut(usize::from(day - 1))
            .ok_or(ValidationError::InvalidDay(day))
    }

    /// The step at the day pointer
    pub fn current_step(&self) -> Option<&StepRecord> {
        self.step(self.current_day)
    }

    /// Emails already delivered, in day order
    pub fn sent_emails(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps
            .iter()
            .filter(|s| s.is_email() && s.status == StepStatus::Sent)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn ensure_not_ended(&self) -> Result<(), ValidationError> {
        if self.is_terminal() {
            return Err(ValidationError::Ended {
                lead: self.lead_id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), ValidationError> {
        self.ensure_not_ended()?;
        if !self.is_active() {
            return Err(ValidationError::NotActive {
                lead: self.lead_id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }

    // === Content generation ===

    /// Mark a step as generating, returning the status to restore on failure
    ///
    /// A step found in `Generating` was abandoned by a caller that never
    /// finished; it is recovered to `Ready` or `Pending` before validation.
    pub fn begin_generation(&mut self, day: u8) -> Result<StepStatus, ValidationError> {
        debug!(lead = %self.lead_id, day, "begin_generation: called");
        self.ensure_active()?;
        let step = self.step_mut(day)?;

        if step.status == StepStatus::Generating {
            let recovered = if step.content.is_some() {
                StepStatus::Ready
            } else {
                StepStatus::Pending
            };
            warn!(day, %recovered, "begin_generation: recovering abandoned generation");
            step.status = recovered;
        }

        if !step.status.is_regenerable() {
            return Err(ValidationError::StepFinished {
                day,
                status: step.status,
            });
        }

        let previous = step.status;
        step.status = StepStatus::Generating;
        self.touch();
        Ok(previous)
    }

    /// Store drafted content and mark the step ready
    pub fn finish_generation(&mut self, day: u8, content: StepContent) -> Result<(), ValidationError> {
        debug!(lead = %self.lead_id, day, "finish_generation: called");
        let step = self.step_mut(day)?;
        step.content = Some(content);
        step.status = StepStatus::Ready;
        step.edited = false;
        step.last_error = None;
        self.touch();
        Ok(())
    }

    /// Restore the pre-call status after a failed writer call
    pub fn abort_generation(&mut self, day: u8, previous: StepStatus, error: &str) -> Result<(), ValidationError> {
        debug!(lead = %self.lead_id, day, %previous, "abort_generation: called");
        let step = self.step_mut(day)?;
        step.status = previous;
        step.last_error = Some(error.to_string());
        self.touch();
        Ok(())
    }

    /// Overwrite ready content with a human edit
    pub fn apply_edit(&mut self, day: u8, subject: &str, body: &str) -> Result<(), ValidationError> {
        debug!(lead = %self.lead_id, day, "apply_edit: called");
        self.ensure_not_ended()?;
        let step = self.step_mut(day)?;
        if step.status != StepStatus::Ready {
            return Err(ValidationError::NotEditable {
                day,
                status: step.status,
            });
        }
        step.content = Some(StepContent::from_text(subject, body));
        step.edited = true;
        self.touch();
        Ok(())
    }

    // === Execution ===

    /// Validate that the step for `day` may be executed now
    pub fn check_executable(&self, day: u8) -> Result<&StepRecord, ValidationError> {
        self.ensure_active()?;
        let step = self.step(day).ok_or(ValidationError::InvalidDay(day))?;

        if day != self.current_day {
            return Err(ValidationError::OutOfOrder {
                lead: self.lead_id.clone(),
                day,
                current_day: self.current_day,
            });
        }

        if step.status.is_terminal() {
            return Err(ValidationError::StepFinished {
                day,
                status: step.status,
            });
        }

        if !step.is_executable() {
            return Err(ValidationError::StepNotReady {
                day,
                status: step.status,
            });
        }

        Ok(step)
    }

    /// Record a delivered email and advance
    pub fn record_sent(&mut self, day: u8, delivery_id: impl Into<String>) -> Result<(), ValidationError> {
        self.check_executable(day)?;
        let step = self.step_mut(day)?;
        step.status = StepStatus::Sent;
        step.delivery_id = Some(delivery_id.into());
        step.last_error = None;
        step.executed_at = Some(Utc::now());
        self.complete_step(day);
        Ok(())
    }

    /// Record a placed call and advance
    pub fn record_called(
        &mut self,
        day: u8,
        call_reference: impl Into<String>,
        call_status: impl Into<String>,
    ) -> Result<(), ValidationError> {
        self.check_executable(day)?;
        let step = self.step_mut(day)?;
        step.status = StepStatus::Called;
        step.call_reference = Some(call_reference.into());
        step.call_status = Some(call_status.into());
        step.last_error = None;
        step.executed_at = Some(Utc::now());
        self.complete_step(day);
        Ok(())
    }

    /// Record a policy skip and advance
    pub fn record_skipped(&mut self, day: u8, reason: SkipReason) -> Result<(), ValidationError> {
        self.check_executable(day)?;
        let step = self.step_mut(day)?;
        step.status = StepStatus::Skipped;
        step.skip_reason = Some(reason);
        step.executed_at = Some(Utc::now());
        self.complete_step(day);
        Ok(())
    }

    /// Record a transport failure; the step stays eligible for retry
    pub fn record_failure(&mut self, day: u8, error: &str) -> Result<(), ValidationError> {
        let step = self.step_mut(day)?;
        step.last_error = Some(error.to_string());
        self.touch();
        Ok(())
    }

    fn complete_step(&mut self, day: u8) {
        if day == LAST_DAY {
            self.status = EnrollmentStatus::Completed;
            self.end_reason = Some(EndReason::Completed);
        }
        self.current_day = (self.current_day + 1).min(LAST_DAY);
        self.touch();
    }

    // === Lifecycle ===

    /// active -> paused; returns whether anything changed
    pub fn pause(&mut self) -> bool {
        if self.status != EnrollmentStatus::Active {
            return false;
        }
        self.status = EnrollmentStatus::Paused;
        self.touch();
        true
    }

    /// paused -> active
    pub fn resume(&mut self) -> bool {
        if self.status != EnrollmentStatus::Paused {
            return false;
        }
        self.status = EnrollmentStatus::Active;
        self.touch();
        true
    }

    /// active or paused -> stopped
    pub fn stop(&mut self) -> bool {
        self.end(EndReason::Manual, EnrollmentStatus::Stopped, true)
    }

    /// active -> replied
    pub fn mark_replied(&mut self) -> bool {
        self.end(EndReason::Replied, EnrollmentStatus::Replied, false)
    }

    /// active -> stopped (undeliverable)
    pub fn mark_bounced(&mut self) -> bool {
        self.end(EndReason::Bounced, EnrollmentStatus::Stopped, false)
    }

    fn end(&mut self, reason: EndReason, status: EnrollmentStatus, from_paused: bool) -> bool {
        let allowed = match self.status {
            EnrollmentStatus::Active => true,
            EnrollmentStatus::Paused => from_paused,
            _ => false,
        };
        if !allowed {
            return false;
        }
        self.status = status;
        self.end_reason = Some(reason);
        self.touch();
        true
    }

    /// Replace engagement counters; returns whether they changed
    pub fn refresh_engagement(&mut self, engagement: Engagement) -> bool {
        if self.engagement == engagement {
            return false;
        }
        self.engagement = engagement;
        self.touch();
        true
    }
}
