//! Change notifications for dashboards

use crate::domain::{EnrollmentStatus, LeadId, StepStatus};

/// Event broadcast when sequence state changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceEvent {
    /// A lead was enrolled (or re-enrolled)
    Enrolled { lead: LeadId, enrollment_id: String },
    /// Step content was drafted or edited
    StepReady { lead: LeadId, day: u8 },
    /// A step reached a terminal status
    StepExecuted { lead: LeadId, day: u8, status: StepStatus },
    /// The enrollment status changed
    StatusChanged {
        lead: LeadId,
        from: EnrollmentStatus,
        to: EnrollmentStatus,
    },
    /// The enrollment was deleted
    Removed { lead: LeadId },
}
