//! StepGenerator - drafts step content through the content writer

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::collab::{
    Collaborators, ContentWriter, DraftContext, LeadDirectory, PreviousEmail, call_with_timeout,
};
use crate::config::TimeoutConfig;
use crate::domain::{Enrollment, LeadId, StepContent, StepRecord};
use crate::error::{Collaborator, SequenceError, SequenceResult, ValidationError};
use crate::prompts::{BriefContext, PromptLoader};
use crate::store::{EnrollmentStore, SequenceEvent};

/// Generates and edits step content
pub struct StepGenerator {
    store: Arc<EnrollmentStore>,
    directory: Arc<dyn LeadDirectory>,
    writer: Arc<dyn ContentWriter>,
    prompts: Arc<PromptLoader>,
    timeouts: TimeoutConfig,
}

impl StepGenerator {
    pub fn new(
        store: Arc<EnrollmentStore>,
        collaborators: &Collaborators,
        prompts: Arc<PromptLoader>,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            store,
            directory: Arc::clone(&collaborators.directory),
            writer: Arc::clone(&collaborators.writer),
            prompts,
            timeouts,
        }
    }

    /// Draft (or redraft) the content for one step
    ///
    /// The step must be `pending` or `ready` on an active enrollment. On
    /// failure the step returns to the status it had before the call and the
    /// error is surfaced.
    pub async fn generate(&self, lead: &LeadId, day: u8) -> SequenceResult<StepRecord> {
        debug!(%lead, day, "StepGenerator::generate: called");
        let cell = self.store.handle(lead).await?;
        let mut enrollment = cell.lock().await;

        let previous = enrollment.begin_generation(day)?;
        let drafted = self.draft(&enrollment, day).await;

        match drafted {
            Ok(content) => {
                enrollment.finish_generation(day, content)?;
                info!(%lead, day, "Step content ready");
                self.store.emit(SequenceEvent::StepReady {
                    lead: lead.clone(),
                    day,
                });
                enrollment
                    .step(day)
                    .cloned()
                    .ok_or_else(|| ValidationError::InvalidDay(day).into())
            }
            Err(e) => {
                warn!(%lead, day, error = %e, "Step generation failed");
                enrollment.abort_generation(day, previous, &e.to_string())?;
                Err(e)
            }
        }
    }

    async fn draft(&self, enrollment: &Enrollment, day: u8) -> SequenceResult<StepContent> {
        let step = enrollment.step(day).ok_or(ValidationError::InvalidDay(day))?;

        let profile = call_with_timeout(
            Collaborator::LeadDirectory,
            self.timeouts.directory(),
            self.directory.resolve(&enrollment.lead_id),
        )
        .await?;

        let previous_emails: Vec<PreviousEmail> = enrollment
            .sent_emails()
            .filter_map(|s| {
                Some(PreviousEmail {
                    day: s.day,
                    subject: s.subject()?.to_string(),
                    body_text: s.body_text()?.to_string(),
                })
            })
            .collect();
        debug!(previous = previous_emails.len(), "StepGenerator::draft: collected sent emails");

        let brief = self
            .prompts
            .render(
                step.kind,
                &BriefContext {
                    display_name: profile.display_name.clone(),
                    day,
                    step_label: step.kind.label().to_string(),
                    prior_touch_summaries: profile.prior_touch_summaries.clone(),
                    previous_emails: previous_emails.clone(),
                },
            )
            .map_err(|e| SequenceError::Template(e.to_string()))?;

        let context = DraftContext {
            lead_id: enrollment.lead_id.clone(),
            display_name: profile.display_name,
            day,
            kind: step.kind,
            brief,
            prior_touch_summaries: profile.prior_touch_summaries,
            previous_emails,
        };

        let content = call_with_timeout(
            Collaborator::ContentWriter,
            self.timeouts.writer(),
            self.writer.draft(&context),
        )
        .await?;
        Ok(content)
    }

    /// Overwrite ready content with a human edit
    ///
    /// The HTML body is derived from the edited text; the step stays `ready`.
    pub async fn apply_edit(&self, lead: &LeadId, day: u8, subject: &str, body: &str) -> SequenceResult<StepRecord> {
        debug!(%lead, day, "StepGenerator::apply_edit: called");
        let step = self
            .store
            .with_enrollment(lead, |enrollment| {
                enrollment.apply_edit(day, subject, body)?;
                enrollment.step(day).cloned().ok_or(ValidationError::InvalidDay(day))
            })
            .await??;

        info!(%lead, day, "Step content edited");
        self.store.emit(SequenceEvent::StepReady {
            lead: lead.clone(),
            day,
        });
        Ok(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EnrollmentStatus, StepStatus};
    use crate::error::CollaboratorError;
    use crate::sequence::fixtures::Fixture;
    use std::time::Duration;

    #[tokio::test]
    async fn test_generate_sets_ready_with_content() {
        let fx = Fixture::new();
        fx.store.enroll(LeadId::from("L1")).await.unwrap();

        let step = fx.generator.generate(&LeadId::from("L1"), 1).await.unwrap();
        assert_eq!(step.status, StepStatus::Ready);
        let content = step.content.unwrap();
        assert_eq!(content.subject, "Dana's Dental: Intro email");
        assert!(content.body_html.starts_with("<p>"));
        assert!(!step.edited);
    }

    #[tokio::test]
    async fn test_generate_passes_prior_touches_to_writer() {
        let fx = Fixture::new();
        fx.store.enroll(LeadId::from("L1")).await.unwrap();
        fx.store.enroll(LeadId::from("L2")).await.unwrap();

        fx.generator.generate(&LeadId::from("L1"), 1).await.unwrap();
        fx.generator.generate(&LeadId::from("L2"), 1).await.unwrap();

        let contexts = fx.writer.contexts();
        assert_eq!(contexts[0].prior_touch_summaries, vec!["Met at the spring expo"]);
        assert!(contexts[0].brief.contains("- Met at the spring expo"));
        assert!(contexts[1].prior_touch_summaries.is_empty());
        assert!(!contexts[1].brief.contains("Earlier contact"));
    }

    #[tokio::test]
    async fn test_generate_any_number_of_times_before_send() {
        let fx = Fixture::new();
        let lead = LeadId::from("L1");
        fx.store.enroll(lead.clone()).await.unwrap();

        for _ in 0..3 {
            fx.generator.generate(&lead, 2).await.unwrap();
        }
        assert_eq!(fx.writer.call_count(), 3);
        assert_eq!(fx.store.get(&lead).await.unwrap().step(2).unwrap().status, StepStatus::Ready);
    }

    #[tokio::test]
    async fn test_generate_failure_restores_pending() {
        let fx = Fixture::new();
        let lead = LeadId::from("L1");
        fx.store.enroll(lead.clone()).await.unwrap();
        fx.writer.fail_next(1);

        let err = fx.generator.generate(&lead, 1).await.unwrap_err();
        assert!(err.is_collaborator());

        let step = fx.store.get(&lead).await.unwrap().step(1).cloned().unwrap();
        assert_eq!(step.status, StepStatus::Pending);
        assert!(step.last_error.unwrap().contains("injected writer failure"));
    }

    #[tokio::test]
    async fn test_regenerate_failure_keeps_ready_content() {
        let fx = Fixture::new();
        let lead = LeadId::from("L1");
        fx.store.enroll(lead.clone()).await.unwrap();
        let first = fx.generator.generate(&lead, 1).await.unwrap();

        fx.writer.fail_next(1);
        assert!(fx.generator.generate(&lead, 1).await.is_err());

        let step = fx.store.get(&lead).await.unwrap().step(1).cloned().unwrap();
        assert_eq!(step.status, StepStatus::Ready);
        assert_eq!(step.content, first.content);
    }

    #[tokio::test]
    async fn test_generate_timeout_is_collaborator_failure() {
        let fx = Fixture::with_writer_delay(Duration::from_millis(200));
        let lead = LeadId::from("L1");
        fx.store.enroll(lead.clone()).await.unwrap();

        let err = fx.generator.generate(&lead, 1).await.unwrap_err();
        assert!(matches!(
            err,
            SequenceError::Collaborator(CollaboratorError::Timeout {
                collaborator: Collaborator::ContentWriter,
                ..
            })
        ));
        assert_eq!(fx.store.get(&lead).await.unwrap().step(1).unwrap().status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn test_generate_includes_sent_emails_in_context() {
        let fx = Fixture::new();
        let lead = LeadId::from("L1");
        fx.store.enroll(lead.clone()).await.unwrap();
        fx.generator.generate(&lead, 1).await.unwrap();
        fx.executor.execute(&lead, 1).await.unwrap();

        fx.generator.generate(&lead, 2).await.unwrap();
        let contexts = fx.writer.contexts();
        let last = contexts.last().unwrap();
        assert_eq!(last.day, 2);
        assert_eq!(last.previous_emails.len(), 1);
        assert_eq!(last.previous_emails[0].subject, "Dana's Dental: Intro email");
        assert!(last.brief.contains("Already sent"));
    }

    #[tokio::test]
    async fn test_generate_rejected_when_not_active() {
        let fx = Fixture::new();
        let lead = LeadId::from("L1");
        fx.store.enroll(lead.clone()).await.unwrap();
        fx.store.with_enrollment(&lead, |e| e.pause()).await.unwrap();

        let err = fx.generator.generate(&lead, 1).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(fx.writer.call_count(), 0);
        let enrollment = fx.store.get(&lead).await.unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::Paused);
        assert_eq!(enrollment.step(1).unwrap().status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn test_generate_rejected_after_send() {
        let fx = Fixture::new();
        let lead = LeadId::from("L1");
        fx.store.enroll(lead.clone()).await.unwrap();
        fx.generator.generate(&lead, 1).await.unwrap();
        fx.executor.execute(&lead, 1).await.unwrap();

        let err = fx.generator.generate(&lead, 1).await.unwrap_err();
        assert_eq!(
            err,
            SequenceError::Validation(ValidationError::StepFinished {
                day: 1,
                status: StepStatus::Sent
            })
        );
    }

    #[tokio::test]
    async fn test_generate_unknown_lead() {
        let fx = Fixture::new();
        let err = fx.generator.generate(&LeadId::from("nobody"), 1).await.unwrap_err();
        assert_eq!(err, SequenceError::Validation(ValidationError::NotEnrolled(LeadId::from("nobody"))));
    }

    #[tokio::test]
    async fn test_apply_edit() {
        let fx = Fixture::new();
        let lead = LeadId::from("L1");
        fx.store.enroll(lead.clone()).await.unwrap();

        assert!(fx.generator.apply_edit(&lead, 1, "s", "b").await.is_err());

        fx.generator.generate(&lead, 1).await.unwrap();
        let step = fx
            .generator
            .apply_edit(&lead, 1, "Quick idea for Dana", "Hi Dana,\n\nShort note.")
            .await
            .unwrap();
        assert!(step.edited);
        assert_eq!(step.status, StepStatus::Ready);
        assert_eq!(step.subject(), Some("Quick idea for Dana"));
        assert_eq!(step.content.unwrap().body_html, "<p>Hi Dana,</p>\n<p>Short note.</p>");
    }
}
