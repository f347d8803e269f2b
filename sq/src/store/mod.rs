//! Enrollment store
//!
//! Owns every enrollment behind a per-enrollment lock. Other components read
//! snapshots and mutate only while holding that lock.

mod enrollments;
mod events;

pub use enrollments::{EnrollmentHandle, EnrollmentStore};
pub use events::SequenceEvent;
