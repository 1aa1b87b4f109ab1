//! Reactions to open and click tracking events.

use std::sync::Arc;

use tracing::{info, warn};

use crate::application::{
    lifecycle::{EnrollmentLifecycle, LifecycleError, RedirectTrigger},
    links::click_destination,
    repos::{ScheduledSendsRepo, StatsRepo, StepsRepo},
};
use crate::domain::types::StatKind;

#[derive(Clone)]
pub struct BranchHandler {
    steps: Arc<dyn StepsRepo>,
    sends: Arc<dyn ScheduledSendsRepo>,
    stats: Arc<dyn StatsRepo>,
    lifecycle: EnrollmentLifecycle,
}

impl BranchHandler {
    pub fn new(
        steps: Arc<dyn StepsRepo>,
        sends: Arc<dyn ScheduledSendsRepo>,
        stats: Arc<dyn StatsRepo>,
        lifecycle: EnrollmentLifecycle,
    ) -> Self {
        Self {
            steps,
            sends,
            stats,
            lifecycle,
        }
    }

    pub async fn record_open(&self, step_id: i64, enrollment_id: i64) -> bool {
        self.bump(step_id, enrollment_id, StatKind::Opened).await
    }

    /// Count the click and apply the step's click-redirect rule.
    pub async fn record_click(&self, step_id: i64, enrollment_id: i64) -> bool {
        let counted = self.bump(step_id, enrollment_id, StatKind::Clicked).await;

        match self.branch_on_click(step_id, enrollment_id).await {
            Ok(Some(new_enrollment)) => info!(
                target = "dripline::application::branching",
                step_id, enrollment_id, new_enrollment, "Click redirected enrollment"
            ),
            Ok(None) => {}
            Err(err) => warn!(
                target = "dripline::application::branching",
                step_id,
                enrollment_id,
                error = %err,
                "Click branch evaluation failed"
            ),
        }

        counted
    }

    /// Record the click and return where the visitor should be sent. The
    /// destination never depends on whether branching succeeded.
    pub async fn follow_click(
        &self,
        step_id: i64,
        enrollment_id: i64,
        destination: Option<&str>,
    ) -> String {
        self.record_click(step_id, enrollment_id).await;
        click_destination(destination)
    }

    async fn branch_on_click(
        &self,
        step_id: i64,
        enrollment_id: i64,
    ) -> Result<Option<i64>, LifecycleError> {
        let Some(step) = self.steps.find_step(step_id).await? else {
            return Err(LifecycleError::StepNotFound(step_id));
        };
        let Some(target_journey_id) = step.rules.redirect_on_click else {
            return Ok(None);
        };

        if let Some(current) = self.sends.earliest_pending(enrollment_id).await? {
            self.lifecycle
                .try_stop_single(enrollment_id, current.step_id)
                .await?;
        }

        let created = self
            .lifecycle
            .branch_enrollment(enrollment_id, target_journey_id, RedirectTrigger::Click)
            .await?;
        Ok(Some(created.id))
    }

    async fn bump(&self, step_id: i64, enrollment_id: i64, kind: StatKind) -> bool {
        match self.stats.increment(step_id, enrollment_id, kind).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    target = "dripline::application::branching",
                    step_id,
                    enrollment_id,
                    stat = kind.column(),
                    error = %err,
                    "Stat increment failed"
                );
                false
            }
        }
    }
}
