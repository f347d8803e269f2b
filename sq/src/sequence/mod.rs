//! Per-enrollment operations
//!
//! - `StepGenerator` drafts and edits step content
//! - `StepExecutor` sends emails, places calls and advances the day pointer
//! - `Lifecycle` handles enroll, pause, resume, stop and remove
//!
//! Each operation holds the enrollment's lock for its whole duration, so a
//! manual action and a batch pass never interleave on the same enrollment.

mod executor;
mod generator;
mod lifecycle;

pub use executor::{ExecutionOutcome, StepExecutor};
pub use generator::StepGenerator;
pub use lifecycle::{BulkReport, Lifecycle};
