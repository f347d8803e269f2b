//! Domain types for the outreach sequencer
//!
//! The blueprint is static data; enrollments and their step records carry all
//! mutable sequence state.

mod blueprint;
mod enrollment;
mod id;
mod step;

pub use blueprint::{BLUEPRINT, BlueprintStep, Channel, FIRST_DAY, LAST_DAY, StepKind, step_for_day};
pub use enrollment::{EndReason, Engagement, Enrollment, EnrollmentStatus};
pub use id::{LeadId, generate_enrollment_id};
pub use step::{SkipReason, StepContent, StepRecord, StepStatus, text_to_html};
