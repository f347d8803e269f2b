//! Batch run reporting

use serde::Serialize;

use crate::domain::LeadId;

/// A per-item failure inside a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItemError {
    pub lead: LeadId,
    pub day: u8,
    pub message: String,
}

/// Counts returned by a batch run so callers can report partial success
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Items a collaborator call was made for
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Call steps skipped by policy (included in `succeeded`)
    pub skipped: usize,
    /// Items that changed state between collection and processing
    pub stale: usize,
    /// Items left untouched because the run was cancelled
    pub cancelled: usize,
    /// The run stopped because the daily send quota ran out
    pub quota_exhausted: bool,
    pub errors: Vec<BatchItemError>,
}

impl BatchReport {
    pub(crate) fn record_error(&mut self, lead: &LeadId, day: u8, message: impl Into<String>) {
        self.failed += 1;
        self.errors.push(BatchItemError {
            lead: lead.clone(),
            day,
            message: message.into(),
        });
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("{} of {} succeeded", self.succeeded, self.attempted)];
        if self.failed > 0 {
            parts.push(format!("{} failed", self.failed));
        }
        if self.skipped > 0 {
            parts.push(format!("{} skipped", self.skipped));
        }
        if self.stale > 0 {
            parts.push(format!("{} no longer eligible", self.stale));
        }
        if self.cancelled > 0 {
            parts.push(format!("{} cancelled", self.cancelled));
        }
        if self.quota_exhausted {
            parts.push("daily send quota exhausted".to_string());
        }
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary() {
        let mut report = BatchReport {
            attempted: 4,
            succeeded: 3,
            skipped: 1,
            ..Default::default()
        };
        report.record_error(&LeadId::from("L2"), 1, "email transport failed: 554");
        report.quota_exhausted = true;

        assert_eq!(
            report.summary(),
            "3 of 4 succeeded, 1 failed, 1 skipped, daily send quota exhausted"
        );
        assert_eq!(report.errors[0].lead, LeadId::from("L2"));
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(BatchReport::default().summary(), "0 of 0 succeeded");
    }
}
