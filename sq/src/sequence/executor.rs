//! StepExecutor - performs the side effect of one step

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::collab::{Collaborators, EmailTransport, LeadDirectory, VoiceTransport, call_with_timeout};
use crate::config::TimeoutConfig;
use crate::domain::{Channel, EnrollmentStatus, LeadId, SkipReason, StepStatus};
use crate::error::{Collaborator, SequenceResult, ValidationError};
use crate::store::{EnrollmentStore, SequenceEvent};

/// What executing a step did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Email accepted by the transport
    Sent { delivery_id: String },
    /// Call placed
    Called { call_reference: String, call_status: String },
    /// Not performed by policy; the day pointer still advanced
    Skipped { reason: SkipReason },
}

impl ExecutionOutcome {
    pub fn step_status(&self) -> StepStatus {
        match self {
            Self::Sent { .. } => StepStatus::Sent,
            Self::Called { .. } => StepStatus::Called,
            Self::Skipped { .. } => StepStatus::Skipped,
        }
    }

    /// Whether this outcome used a unit of the daily send quota
    pub fn consumes_quota(&self) -> bool {
        !matches!(self, Self::Skipped { .. })
    }
}

/// Executes the step at an enrollment's day pointer
pub struct StepExecutor {
    store: Arc<EnrollmentStore>,
    directory: Arc<dyn LeadDirectory>,
    email: Arc<dyn EmailTransport>,
    voice: Arc<dyn VoiceTransport>,
    timeouts: TimeoutConfig,
}

impl StepExecutor {
    pub fn new(store: Arc<EnrollmentStore>, collaborators: &Collaborators, timeouts: TimeoutConfig) -> Self {
        Self {
            store,
            directory: Arc::clone(&collaborators.directory),
            email: Arc::clone(&collaborators.email),
            voice: Arc::clone(&collaborators.voice),
            timeouts,
        }
    }

    /// Execute the step for `day`
    ///
    /// `day` must be the enrollment's current day and the enrollment must be
    /// active. On success the step is terminal and the pointer advances. On a
    /// collaborator failure nothing advances and the step stays eligible.
    pub async fn execute(&self, lead: &LeadId, day: u8) -> SequenceResult<ExecutionOutcome> {
        debug!(%lead, day, "StepExecutor::execute: called");
        let cell = self.store.handle(lead).await?;
        let mut enrollment = cell.lock().await;

        let step = enrollment.check_executable(day)?;
        let channel = step.channel;
        let content = step.content.clone();

        let profile = match call_with_timeout(
            Collaborator::LeadDirectory,
            self.timeouts.directory(),
            self.directory.resolve(lead),
        )
        .await
        {
            Ok(profile) => profile,
            Err(e) => {
                warn!(%lead, day, error = %e, "Lead lookup failed");
                enrollment.record_failure(day, &e.to_string())?;
                return Err(e.into());
            }
        };

        let outcome = match channel {
            Channel::Email => {
                let Some(address) = profile.email() else {
                    debug!(%lead, "StepExecutor::execute: no email address on file");
                    return Err(ValidationError::EmailNotConfigured(lead.clone()).into());
                };
                let Some(content) = content else {
                    return Err(ValidationError::StepNotReady {
                        day,
                        status: StepStatus::Pending,
                    }
                    .into());
                };

                let sent = call_with_timeout(
                    Collaborator::EmailTransport,
                    self.timeouts.email(),
                    self.email.send(address, &content.subject, &content.body_html),
                )
                .await;
                match sent {
                    Ok(delivery_id) => {
                        enrollment.record_sent(day, delivery_id.clone())?;
                        info!(%lead, day, %delivery_id, "Email sent");
                        ExecutionOutcome::Sent { delivery_id }
                    }
                    Err(e) => {
                        warn!(%lead, day, error = %e, "Email send failed");
                        enrollment.record_failure(day, &e.to_string())?;
                        return Err(e.into());
                    }
                }
            }
            Channel::Phone => match profile.phone() {
                None => {
                    enrollment.record_skipped(day, SkipReason::NoPhoneNumber)?;
                    info!(%lead, day, "Call skipped: no phone number on file");
                    ExecutionOutcome::Skipped {
                        reason: SkipReason::NoPhoneNumber,
                    }
                }
                Some(_) if !self.voice.is_within_calling_hours() => {
                    enrollment.record_skipped(day, SkipReason::OutsideCallingHours)?;
                    info!(%lead, day, "Call skipped: outside calling hours");
                    ExecutionOutcome::Skipped {
                        reason: SkipReason::OutsideCallingHours,
                    }
                }
                Some(phone) => {
                    let placed = call_with_timeout(
                        Collaborator::VoiceTransport,
                        self.timeouts.voice(),
                        self.voice.place_call(lead, phone),
                    )
                    .await;
                    match placed {
                        Ok(receipt) => {
                            enrollment.record_called(day, receipt.call_reference.clone(), receipt.status.clone())?;
                            info!(%lead, day, call_reference = %receipt.call_reference, "Call placed");
                            ExecutionOutcome::Called {
                                call_reference: receipt.call_reference,
                                call_status: receipt.status,
                            }
                        }
                        Err(e) => {
                            warn!(%lead, day, error = %e, "Call failed");
                            enrollment.record_failure(day, &e.to_string())?;
                            return Err(e.into());
                        }
                    }
                }
            },
        };

        let status = enrollment.status;
        drop(enrollment);

        self.store.emit(SequenceEvent::StepExecuted {
            lead: lead.clone(),
            day,
            status: outcome.step_status(),
        });
        if status == EnrollmentStatus::Completed {
            info!(%lead, "Sequence completed");
            self.store.emit(SequenceEvent::StatusChanged {
                lead: lead.clone(),
                from: EnrollmentStatus::Active,
                to: EnrollmentStatus::Completed,
            });
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StepContent;
    use crate::error::{CollaboratorError, SequenceError};
    use crate::sequence::fixtures::Fixture;
    use std::time::Duration;

    async fn ready(fx: &Fixture, lead: &LeadId, day: u8) {
        fx.generator.generate(lead, day).await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_email_sends_and_advances() {
        let fx = Fixture::new();
        let lead = LeadId::from("L1");
        fx.store.enroll(lead.clone()).await.unwrap();
        ready(&fx, &lead, 1).await;

        let outcome = fx.executor.execute(&lead, 1).await.unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Sent {
                delivery_id: "msg-0001".to_string()
            }
        );

        let sent = fx.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "dana@example.com");
        assert!(sent[0].html.starts_with("<p>"));

        let enrollment = fx.store.get(&lead).await.unwrap();
        assert_eq!(enrollment.current_day, 2);
        let step = enrollment.step(1).unwrap();
        assert_eq!(step.status, StepStatus::Sent);
        assert_eq!(step.delivery_id.as_deref(), Some("msg-0001"));
        assert!(step.executed_at.is_some());
    }

    #[tokio::test]
    async fn test_execute_rejects_look_ahead() {
        let fx = Fixture::new();
        let lead = LeadId::from("L1");
        fx.store.enroll(lead.clone()).await.unwrap();
        ready(&fx, &lead, 1).await;
        ready(&fx, &lead, 2).await;

        let err = fx.executor.execute(&lead, 2).await.unwrap_err();
        assert!(matches!(
            err,
            SequenceError::Validation(ValidationError::OutOfOrder { day: 2, current_day: 1, .. })
        ));
        assert!(fx.mailer.sent().is_empty());
        assert_eq!(fx.store.get(&lead).await.unwrap().current_day, 1);
    }

    #[tokio::test]
    async fn test_execute_email_requires_ready() {
        let fx = Fixture::new();
        let lead = LeadId::from("L1");
        fx.store.enroll(lead.clone()).await.unwrap();

        let err = fx.executor.execute(&lead, 1).await.unwrap_err();
        assert!(matches!(
            err,
            SequenceError::Validation(ValidationError::StepNotReady { day: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_execute_without_email_address_is_rejected() {
        let fx = Fixture::new();
        let lead = LeadId::from("L3");
        fx.store.enroll(lead.clone()).await.unwrap();
        ready(&fx, &lead, 1).await;
        let before = fx.store.get(&lead).await.unwrap();

        let err = fx.executor.execute(&lead, 1).await.unwrap_err();
        assert_eq!(err, SequenceError::Validation(ValidationError::EmailNotConfigured(lead.clone())));
        assert!(err.to_string().contains("email not configured for lead L3"));
        assert_eq!(fx.store.get(&lead).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_step_retryable() {
        let fx = Fixture::new();
        let lead = LeadId::from("L1");
        fx.store.enroll(lead.clone()).await.unwrap();
        ready(&fx, &lead, 1).await;
        fx.mailer.fail_next(1);

        let err = fx.executor.execute(&lead, 1).await.unwrap_err();
        assert!(err.is_collaborator());
        let enrollment = fx.store.get(&lead).await.unwrap();
        assert_eq!(enrollment.current_day, 1);
        assert_eq!(enrollment.step(1).unwrap().status, StepStatus::Ready);
        assert!(enrollment.step(1).unwrap().last_error.is_some());

        fx.executor.execute(&lead, 1).await.unwrap();
        let enrollment = fx.store.get(&lead).await.unwrap();
        assert_eq!(enrollment.current_day, 2);
        assert!(enrollment.step(1).unwrap().last_error.is_none());
    }

    #[tokio::test]
    async fn test_call_step_without_phone_is_skipped() {
        let fx = Fixture::new();
        let lead = LeadId::from("L2");
        fx.store.enroll(lead.clone()).await.unwrap();
        for day in 1..=2 {
            ready(&fx, &lead, day).await;
            fx.executor.execute(&lead, day).await.unwrap();
        }

        let outcome = fx.executor.execute(&lead, 3).await.unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Skipped {
                reason: SkipReason::NoPhoneNumber
            }
        );
        assert!(!outcome.consumes_quota());
        assert!(fx.dialer.calls().is_empty());

        let enrollment = fx.store.get(&lead).await.unwrap();
        assert_eq!(enrollment.current_day, 4);
        assert_eq!(enrollment.step(3).unwrap().status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn test_call_step_outside_calling_hours_is_skipped() {
        let fx = Fixture::new();
        let lead = LeadId::from("L1");
        fx.store.enroll(lead.clone()).await.unwrap();
        for day in 1..=2 {
            ready(&fx, &lead, day).await;
            fx.executor.execute(&lead, day).await.unwrap();
        }
        fx.dialer.set_calling_hours_open(false);

        let outcome = fx.executor.execute(&lead, 3).await.unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Skipped {
                reason: SkipReason::OutsideCallingHours
            }
        );
        let step = fx.store.get(&lead).await.unwrap().step(3).cloned().unwrap();
        assert_eq!(step.skip_reason, Some(SkipReason::OutsideCallingHours));
    }

    #[tokio::test]
    async fn test_call_step_places_call_without_content() {
        let fx = Fixture::new();
        let lead = LeadId::from("L1");
        fx.store.enroll(lead.clone()).await.unwrap();
        for day in 1..=2 {
            ready(&fx, &lead, day).await;
            fx.executor.execute(&lead, day).await.unwrap();
        }

        let outcome = fx.executor.execute(&lead, 3).await.unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Called {
                call_reference: "call-0001".to_string(),
                call_status: "queued".to_string()
            }
        );
        assert_eq!(fx.dialer.calls(), vec![(lead.clone(), "+1 555 0100".to_string())]);
        let step = fx.store.get(&lead).await.unwrap().step(3).cloned().unwrap();
        assert_eq!(step.status, StepStatus::Called);
        assert_eq!(step.call_reference.as_deref(), Some("call-0001"));
    }

    #[tokio::test]
    async fn test_day_five_completes_sequence() {
        let fx = Fixture::new();
        let lead = LeadId::from("L1");
        fx.store.enroll(lead.clone()).await.unwrap();
        let mut events = fx.store.subscribe();

        for day in 1..=5 {
            if day != 3 {
                ready(&fx, &lead, day).await;
            }
            fx.executor.execute(&lead, day).await.unwrap();
        }

        let enrollment = fx.store.get(&lead).await.unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::Completed);
        assert_eq!(enrollment.current_day, 5);

        let mut completed = false;
        while let Ok(event) = events.try_recv() {
            if let SequenceEvent::StatusChanged { to, .. } = event {
                completed = to == EnrollmentStatus::Completed;
            }
        }
        assert!(completed);

        let err = fx.executor.execute(&lead, 5).await.unwrap_err();
        assert!(matches!(err, SequenceError::Validation(ValidationError::Ended { .. })));
    }

    #[tokio::test]
    async fn test_unknown_lead_does_not_advance() {
        let fx = Fixture::new();
        let lead = LeadId::from("ghost");
        fx.store.enroll(lead.clone()).await.unwrap();
        fx.store
            .with_enrollment(&lead, |e| {
                e.begin_generation(1).unwrap();
                e.finish_generation(1, StepContent::from_text("Hello", "Hi")).unwrap();
            })
            .await
            .unwrap();

        let err = fx.executor.execute(&lead, 1).await.unwrap_err();
        assert!(matches!(
            err,
            SequenceError::Collaborator(CollaboratorError::UnknownLead(_))
        ));
        let enrollment = fx.store.get(&lead).await.unwrap();
        assert_eq!(enrollment.current_day, 1);
        assert_eq!(enrollment.step(1).unwrap().status, StepStatus::Ready);
    }

    #[tokio::test]
    async fn test_slow_transport_times_out() {
        let fx = Fixture::with_mail_timeout(Duration::from_millis(20));
        let lead = LeadId::from("L1");
        fx.store.enroll(lead.clone()).await.unwrap();
        ready(&fx, &lead, 1).await;
        fx.mailer.set_delay(Duration::from_millis(200));

        let err = fx.executor.execute(&lead, 1).await.unwrap_err();
        assert!(matches!(
            err,
            SequenceError::Collaborator(CollaboratorError::Timeout {
                collaborator: Collaborator::EmailTransport,
                ..
            })
        ));
        assert_eq!(fx.store.get(&lead).await.unwrap().current_day, 1);
    }
}
