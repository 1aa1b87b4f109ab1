//! Turns an enrollment into one scheduled send per journey step.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::repos::{
    EnrollmentsRepo, NewScheduledSend, WithdrawScope, RepoError, ScheduledSendsRepo, StepsRepo,
};
use crate::domain::{
    entities::StepRecord, error::DomainError, schedule::SendTimeCalculator, types::SendStatus,
};

#[derive(Debug, Error)]
pub enum ExpandError {
    #[error("enrollment {0} not found")]
    EnrollmentNotFound(i64),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct SequenceExpander {
    enrollments: Arc<dyn EnrollmentsRepo>,
    steps: Arc<dyn StepsRepo>,
    sends: Arc<dyn ScheduledSendsRepo>,
    calculator: Arc<SendTimeCalculator>,
}

impl SequenceExpander {
    pub fn new(
        enrollments: Arc<dyn EnrollmentsRepo>,
        steps: Arc<dyn StepsRepo>,
        sends: Arc<dyn ScheduledSendsRepo>,
        calculator: Arc<SendTimeCalculator>,
    ) -> Self {
        Self {
            enrollments,
            steps,
            sends,
            calculator,
        }
    }

    /// Schedule every step of the enrollment's journey. Returns the number of
    /// sends created; failures are logged and yield zero.
    pub async fn expand(&self, enrollment_id: i64) -> u64 {
        match self.try_expand(enrollment_id).await {
            Ok(created) => created,
            Err(err) => {
                warn!(
                    target = "dripline::application::expander",
                    enrollment_id,
                    error = %err,
                    "Expansion aborted"
                );
                0
            }
        }
    }

    pub async fn try_expand(&self, enrollment_id: i64) -> Result<u64, ExpandError> {
        let enrollment = self
            .enrollments
            .find_enrollment(enrollment_id)
            .await?
            .ok_or(ExpandError::EnrollmentNotFound(enrollment_id))?;

        let mut steps = self
            .steps
            .list_steps_for_journey(enrollment.journey_id)
            .await?;
        if steps.is_empty() {
            info!(
                target = "dripline::application::expander",
                enrollment_id,
                journey_id = enrollment.journey_id,
                "Journey has no steps"
            );
            return Ok(0);
        }
        sort_steps(&mut steps);

        let sends = steps
            .iter()
            .map(|step| {
                let send_at =
                    self.calculator
                        .schedule(enrollment.enrolled_at, &step.timing(), &step.rules)?;
                Ok(NewScheduledSend {
                    enrollment_id,
                    step_id: step.id,
                    send_at,
                })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        let created = self.sends.insert_all(&sends).await?;
        counter!("dripline_sends_scheduled_total").increment(created);
        info!(
            target = "dripline::application::expander",
            enrollment_id,
            journey_id = enrollment.journey_id,
            created,
            "Enrollment expanded"
        );

        if let Err(err) = self.suppress_duplicates(&enrollment.email).await {
            warn!(
                target = "dripline::application::expander",
                enrollment_id,
                error = %err,
                "Duplicate suppression failed"
            );
        }

        Ok(created)
    }

    /// Cancel open sends of any step the address has already received
    /// under another enrollment.
    pub async fn suppress_duplicates(&self, email: &str) -> Result<u64, RepoError> {
        let enrollment_ids = self.enrollments.enrollment_ids_for_email(email).await?;
        if enrollment_ids.is_empty() {
            return Ok(0);
        }

        let step_ids = self.sends.sent_step_ids(&enrollment_ids).await?;
        if step_ids.is_empty() {
            return Ok(0);
        }

        let cancelled = self
            .sends
            .withdraw(
                WithdrawScope::EnrollmentSteps {
                    enrollment_ids,
                    step_ids,
                },
                SendStatus::Cancelled,
            )
            .await?;

        if cancelled > 0 {
            counter!("dripline_sends_cancelled_total").increment(cancelled);
            info!(
                target = "dripline::application::expander",
                cancelled, "Cancelled duplicate sends"
            );
        }
        Ok(cancelled)
    }
}

/// Order steps by day offset, then time-of-day (steps without one first).
pub fn sort_steps(steps: &mut [StepRecord]) {
    steps.sort_by_key(|step| (step.day_offset, step.send_time, step.id));
}
