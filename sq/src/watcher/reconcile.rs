//! Signal reconciliation rules

use std::collections::HashMap;

use tracing::debug;

use crate::collab::{Signal, SignalKind};
use crate::domain::{Engagement, Enrollment, EnrollmentStatus, LeadId};

/// A terminal transition caused by signals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub lead: LeadId,
    pub from: EnrollmentStatus,
    pub to: EnrollmentStatus,
}

/// Opens and clicks among the signals that count for this enrollment
fn engagement_from(signals: &[&Signal]) -> Engagement {
    Engagement {
        opens: count(signals, SignalKind::Open),
        clicks: count(signals, SignalKind::Click),
        last_signal_at: signals.iter().map(|s| s.occurred_at).max(),
    }
}

fn count(signals: &[&Signal], kind: SignalKind) -> u32 {
    let n = signals.iter().filter(|s| s.kind == kind).count();
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Apply a lead's signals to its enrollment; returns whether it changed
///
/// Only active enrollments are considered, and only signals at or after
/// `enrolled_at` count. A reply wins over a bounce. Engagement counters are
/// recomputed from the signal set, so applying the same set twice is a no-op.
pub fn apply_signals(enrollment: &mut Enrollment, signals: &[Signal]) -> bool {
    if !enrollment.is_active() {
        return false;
    }

    let relevant: Vec<&Signal> = signals
        .iter()
        .filter(|s| s.occurred_at >= enrollment.enrolled_at)
        .collect();
    let ignored = signals.len() - relevant.len();
    if ignored > 0 {
        debug!(lead = %enrollment.lead_id, ignored, "apply_signals: ignoring signals from before enrollment");
    }

    let mut changed = enrollment.refresh_engagement(engagement_from(&relevant));

    if relevant.iter().any(|s| s.kind == SignalKind::Reply) {
        changed |= enrollment.mark_replied();
    } else if relevant.iter().any(|s| s.kind == SignalKind::Bounce) {
        changed |= enrollment.mark_bounced();
    }
    changed
}

/// Reconcile a set of enrollments against observed signals
///
/// Returns snapshots of the enrollments that changed. Leads missing from
/// `signals` are treated as having none.
pub fn reconcile(enrollments: &mut [Enrollment], signals: &HashMap<LeadId, Vec<Signal>>) -> Vec<Enrollment> {
    debug!(count = enrollments.len(), "reconcile: called");
    let mut mutated = Vec::new();
    for enrollment in enrollments.iter_mut() {
        let lead_signals = signals.get(&enrollment.lead_id).map(Vec::as_slice).unwrap_or_default();
        if apply_signals(enrollment, lead_signals) {
            mutated.push(enrollment.clone());
        }
    }
    mutated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EndReason;
    use chrono::Duration;

    fn after(enrollment: &Enrollment, kind: SignalKind, minutes: i64) -> Signal {
        Signal::new(kind, enrollment.enrolled_at + Duration::minutes(minutes))
    }

    #[test]
    fn test_bounce_stops() {
        let mut e = Enrollment::new(LeadId::from("L1"));
        let signals = vec![after(&e, SignalKind::Bounce, 5)];
        assert!(apply_signals(&mut e, &signals));
        assert_eq!(e.status, EnrollmentStatus::Stopped);
        assert_eq!(e.end_reason, Some(EndReason::Bounced));
    }

    #[test]
    fn test_reply_wins_over_bounce() {
        let mut e = Enrollment::new(LeadId::from("L1"));
        let signals = vec![after(&e, SignalKind::Bounce, 1), after(&e, SignalKind::Reply, 2)];
        apply_signals(&mut e, &signals);
        assert_eq!(e.status, EnrollmentStatus::Replied);
    }

    #[test]
    fn test_opens_and_clicks_only_update_engagement() {
        let mut e = Enrollment::new(LeadId::from("L1"));
        let signals = vec![
            after(&e, SignalKind::Open, 1),
            after(&e, SignalKind::Open, 2),
            after(&e, SignalKind::Click, 3),
        ];
        assert!(apply_signals(&mut e, &signals));
        assert_eq!(e.status, EnrollmentStatus::Active);
        assert_eq!(e.engagement.opens, 2);
        assert_eq!(e.engagement.clicks, 1);
        assert_eq!(e.engagement.last_signal_at, Some(signals[2].occurred_at));
    }

    #[test]
    fn test_signals_before_enrollment_ignored() {
        let mut e = Enrollment::new(LeadId::from("L1"));
        let signals = vec![after(&e, SignalKind::Reply, -60)];
        assert!(!apply_signals(&mut e, &signals));
        assert_eq!(e.status, EnrollmentStatus::Active);
    }

    #[test]
    fn test_non_active_not_reconsidered() {
        let mut e = Enrollment::new(LeadId::from("L1"));
        e.pause();
        let signals = vec![after(&e, SignalKind::Reply, 1)];
        assert!(!apply_signals(&mut e, &signals));
        assert_eq!(e.status, EnrollmentStatus::Paused);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut enrollments = vec![
            Enrollment::new(LeadId::from("L1")),
            Enrollment::new(LeadId::from("L2")),
            Enrollment::new(LeadId::from("L3")),
        ];
        let mut signals = HashMap::new();
        signals.insert(LeadId::from("L1"), vec![after(&enrollments[0], SignalKind::Bounce, 1)]);
        signals.insert(LeadId::from("L2"), vec![after(&enrollments[1], SignalKind::Open, 1)]);

        let mutated = reconcile(&mut enrollments, &signals);
        assert_eq!(mutated.len(), 2);
        let first = enrollments.clone();

        let mutated = reconcile(&mut enrollments, &signals);
        assert!(mutated.is_empty());
        assert_eq!(enrollments, first);
    }
}
