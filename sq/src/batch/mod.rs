//! Batch runner
//!
//! "Generate all pending" and "execute all ready" across every active
//! enrollment, under the shared daily send quota and with pacing between
//! collaborator calls.

mod report;
mod runner;

pub use report::{BatchItemError, BatchReport};
pub use runner::BatchRunner;
