//! Stopping and redirecting enrollments.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::application::expander::SequenceExpander;
use crate::application::repos::{
    CreateEnrollmentParams, EnrollmentsRepo, JourneysRepo, WithdrawScope, RepoError,
    ScheduledSendsRepo, StatsRepo, StepsRepo,
};
use crate::domain::{
    entities::EnrollmentRecord,
    types::{SendStatus, StatKind},
};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("enrollment {0} not found")]
    EnrollmentNotFound(i64),
    #[error("step {0} not found")]
    StepNotFound(i64),
    #[error("journey {0} not found")]
    JourneyNotFound(i64),
    #[error("no enrollments share the address of enrollment {0}")]
    NoSiblings(i64),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// What caused an enrollment to move into another journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectTrigger {
    Manual,
    Completion,
    Click,
    Repeat,
}

impl RedirectTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            RedirectTrigger::Manual => "manual",
            RedirectTrigger::Completion => "completion",
            RedirectTrigger::Click => "click",
            RedirectTrigger::Repeat => "repeat",
        }
    }
}

#[derive(Clone)]
pub struct EnrollmentLifecycle {
    journeys: Arc<dyn JourneysRepo>,
    enrollments: Arc<dyn EnrollmentsRepo>,
    steps: Arc<dyn StepsRepo>,
    sends: Arc<dyn ScheduledSendsRepo>,
    stats: Arc<dyn StatsRepo>,
    expander: SequenceExpander,
}

impl EnrollmentLifecycle {
    pub fn new(
        journeys: Arc<dyn JourneysRepo>,
        enrollments: Arc<dyn EnrollmentsRepo>,
        steps: Arc<dyn StepsRepo>,
        sends: Arc<dyn ScheduledSendsRepo>,
        stats: Arc<dyn StatsRepo>,
        expander: SequenceExpander,
    ) -> Self {
        Self {
            journeys,
            enrollments,
            steps,
            sends,
            stats,
            expander,
        }
    }

    pub fn expander(&self) -> &SequenceExpander {
        &self.expander
    }

    /// Stop every open send of every enrollment sharing this
    /// enrollment's address.
    pub async fn stop_all(&self, enrollment_id: i64) -> bool {
        match self.try_stop_all(enrollment_id).await {
            Ok(_) => true,
            Err(err) => {
                warn!(
                    target = "dripline::application::lifecycle",
                    enrollment_id,
                    error = %err,
                    "Stop-all failed"
                );
                false
            }
        }
    }

    pub async fn try_stop_all(&self, enrollment_id: i64) -> Result<u64, LifecycleError> {
        let enrollment = self.load(enrollment_id).await?;
        let siblings = self
            .enrollments
            .enrollment_ids_for_email(&enrollment.email)
            .await?;
        if siblings.is_empty() {
            return Err(LifecycleError::NoSiblings(enrollment_id));
        }

        let stopped = self
            .sends
            .withdraw(WithdrawScope::Enrollments(siblings), SendStatus::Stopped)
            .await?;
        info!(
            target = "dripline::application::lifecycle",
            enrollment_id, stopped, "Stopped all sends for address"
        );
        Ok(stopped)
    }

    /// Stop the remaining sends of the step's journey for one enrollment.
    pub async fn stop_single(&self, enrollment_id: i64, step_id: i64) -> bool {
        match self.try_stop_single(enrollment_id, step_id).await {
            Ok(_) => true,
            Err(err) => {
                warn!(
                    target = "dripline::application::lifecycle",
                    enrollment_id,
                    step_id,
                    error = %err,
                    "Stop-single failed"
                );
                false
            }
        }
    }

    pub async fn try_stop_single(
        &self,
        enrollment_id: i64,
        step_id: i64,
    ) -> Result<u64, LifecycleError> {
        let step = self
            .steps
            .find_step(step_id)
            .await?
            .ok_or(LifecycleError::StepNotFound(step_id))?;
        let step_ids: Vec<i64> = self
            .steps
            .list_steps_for_journey(step.journey_id)
            .await?
            .into_iter()
            .map(|step| step.id)
            .collect();

        let stopped = self
            .sends
            .withdraw(
                WithdrawScope::EnrollmentSteps {
                    enrollment_ids: vec![enrollment_id],
                    step_ids,
                },
                SendStatus::Stopped,
            )
            .await?;
        info!(
            target = "dripline::application::lifecycle",
            enrollment_id,
            journey_id = step.journey_id,
            stopped,
            "Stopped journey sends for enrollment"
        );
        Ok(stopped)
    }

    /// Move an enrollment into `target_journey_id`.
    pub async fn redirect(&self, enrollment_id: i64, target_journey_id: i64) -> bool {
        match self.try_redirect(enrollment_id, target_journey_id).await {
            Ok(_) => true,
            Err(err) => {
                warn!(
                    target = "dripline::application::lifecycle",
                    enrollment_id,
                    target_journey_id,
                    error = %err,
                    "Redirect failed"
                );
                false
            }
        }
    }

    /// Returns the new enrollment.
    pub async fn try_redirect(
        &self,
        enrollment_id: i64,
        target_journey_id: i64,
    ) -> Result<EnrollmentRecord, LifecycleError> {
        let open_steps = self.sends.open_step_ids(enrollment_id).await?;
        let stopped = self
            .sends
            .withdraw(
                WithdrawScope::Enrollments(vec![enrollment_id]),
                SendStatus::Stopped,
            )
            .await?;
        if stopped > 0 {
            for step_id in open_steps {
                self.bump(step_id, enrollment_id, StatKind::Stopped).await;
            }
        }

        let source = self.load(enrollment_id).await?;
        let created = self
            .branch(&source, target_journey_id, RedirectTrigger::Manual)
            .await?;

        match self.sends.latest_for_enrollment(enrollment_id).await {
            Ok(Some(latest)) => {
                self.bump(latest.step_id, enrollment_id, StatKind::Redirected)
                    .await
            }
            Ok(None) => {}
            Err(err) => warn!(
                target = "dripline::application::lifecycle",
                enrollment_id,
                error = %err,
                "Could not resolve latest send for redirect counter"
            ),
        }

        Ok(created)
    }

    /// Like [`Self::branch`], loading the source enrollment first.
    pub async fn branch_enrollment(
        &self,
        enrollment_id: i64,
        target_journey_id: i64,
        trigger: RedirectTrigger,
    ) -> Result<EnrollmentRecord, LifecycleError> {
        let source = self.load(enrollment_id).await?;
        self.branch(&source, target_journey_id, trigger).await
    }

    /// Enroll the source's address and list entry into another journey and
    /// schedule it. Sends of the source are left untouched.
    pub async fn branch(
        &self,
        source: &EnrollmentRecord,
        target_journey_id: i64,
        trigger: RedirectTrigger,
    ) -> Result<EnrollmentRecord, LifecycleError> {
        let journey = self
            .journeys
            .find_journey(target_journey_id)
            .await?
            .ok_or(LifecycleError::JourneyNotFound(target_journey_id))?;

        let enrolled_at = OffsetDateTime::now_utc()
            .replace_nanosecond(0)
            .unwrap_or_else(|_| OffsetDateTime::now_utc());
        let created = self
            .enrollments
            .create_enrollment(CreateEnrollmentParams {
                journey_id: journey.id,
                list_entry_id: source.list_entry_id,
                email: source.email.clone(),
                enrolled_at,
                bypass: journey.bypass,
            })
            .await?;

        let scheduled = self.expander.expand(created.id).await;
        counter!("dripline_redirects_total", "trigger" => trigger.as_str()).increment(1);
        info!(
            target = "dripline::application::lifecycle",
            from_enrollment = source.id,
            to_enrollment = created.id,
            journey_id = journey.id,
            trigger = trigger.as_str(),
            scheduled,
            "Enrollment branched"
        );
        Ok(created)
    }

    async fn load(&self, enrollment_id: i64) -> Result<EnrollmentRecord, LifecycleError> {
        self.enrollments
            .find_enrollment(enrollment_id)
            .await?
            .ok_or(LifecycleError::EnrollmentNotFound(enrollment_id))
    }

    async fn bump(&self, step_id: i64, enrollment_id: i64, kind: StatKind) {
        if let Err(err) = self.stats.increment(step_id, enrollment_id, kind).await {
            warn!(
                target = "dripline::application::lifecycle",
                step_id,
                enrollment_id,
                stat = kind.column(),
                error = %err,
                "Stat increment failed"
            );
        }
    }
}
