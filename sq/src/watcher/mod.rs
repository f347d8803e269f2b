//! Signal watcher
//!
//! Polls the signal source and ends sequences early: a reply hands the lead to
//! a human, a hard bounce stops the sequence as undeliverable.

mod reconcile;
mod signal_watcher;

pub use reconcile::{Transition, apply_signals, reconcile};
pub use signal_watcher::{ReconcileReport, SignalWatcher};
