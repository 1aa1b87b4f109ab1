//! Batch delivery of due scheduled sends.

use std::{collections::BTreeMap, sync::Arc};

use metrics::counter;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

use crate::application::{
    lifecycle::{EnrollmentLifecycle, RedirectTrigger},
    links::{LinkError, LinkResolver},
    mailer::{CampaignEmail, CampaignMailer, DEFAULT_UNSUBSCRIBE_FOOTER, TrackingLinks},
    repos::{DueListEntry, DueSend, RepoError, ScheduledSendsRepo, StatsRepo, StepsRepo},
};
use crate::domain::{
    entities::StepRecord,
    types::{SendStatus, StatKind, TrackingKind},
};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Link(#[from] LinkError),
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub batch_size: u32,
    /// Age after which a claim is considered abandoned.
    pub claim_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            claim_timeout: Duration::minutes(15),
        }
    }
}

/// Side effect to run after a send has been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostSendHook {
    IncrementStat {
        step_id: i64,
        enrollment_id: i64,
        kind: StatKind,
    },
    RedirectOnCompletion {
        enrollment_id: i64,
        target_journey_id: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotDue,
    /// Another worker holds the row, or the row left the state this worker
    /// expected (re-claimed or withdrawn) before the result was recorded.
    ClaimedElsewhere,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    Transitioned(SendStatus),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub send_id: i64,
    pub result: DispatchResult,
    pub hooks: Vec<PostSendHook>,
}

impl DispatchOutcome {
    fn transitioned(send_id: i64, status: SendStatus) -> Self {
        Self {
            send_id,
            result: DispatchResult::Transitioned(status),
            hooks: Vec::new(),
        }
    }

    fn skipped(send_id: i64, reason: SkipReason) -> Self {
        Self {
            send_id,
            result: DispatchResult::Skipped(reason),
            hooks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub selected: usize,
    pub sent: usize,
    pub failed: usize,
    pub not_received: usize,
    pub unsubscribed: usize,
    pub skipped: usize,
    pub hook_failures: usize,
}

#[derive(Clone)]
pub struct BatchDispatcher {
    sends: Arc<dyn ScheduledSendsRepo>,
    steps: Arc<dyn StepsRepo>,
    stats: Arc<dyn StatsRepo>,
    mailer: Arc<dyn CampaignMailer>,
    links: Arc<dyn LinkResolver>,
    lifecycle: EnrollmentLifecycle,
    settings: DispatchSettings,
}

impl BatchDispatcher {
    pub fn new(
        sends: Arc<dyn ScheduledSendsRepo>,
        steps: Arc<dyn StepsRepo>,
        stats: Arc<dyn StatsRepo>,
        mailer: Arc<dyn CampaignMailer>,
        links: Arc<dyn LinkResolver>,
        lifecycle: EnrollmentLifecycle,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            sends,
            steps,
            stats,
            mailer,
            links,
            lifecycle,
            settings,
        }
    }

    /// Process one batch of due sends. A failing row never aborts the batch.
    pub async fn run_batch(&self, batch_size: Option<u32>) -> Result<BatchReport, DispatchError> {
        let limit = batch_size.unwrap_or(self.settings.batch_size).max(1);
        let now = OffsetDateTime::now_utc();
        let due = self
            .sends
            .list_due(now, now - self.settings.claim_timeout, limit)
            .await?;

        let mut report = BatchReport {
            selected: due.len(),
            ..BatchReport::default()
        };

        for row in &due {
            let outcome = match self.dispatch_one(row).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(
                        target = "dripline::application::dispatch",
                        send_id = row.send_id,
                        error = %err,
                        "Dispatch failed"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            match outcome.result {
                DispatchResult::Transitioned(SendStatus::Sent) => report.sent += 1,
                DispatchResult::Transitioned(SendStatus::NotReceived) => report.not_received += 1,
                DispatchResult::Transitioned(SendStatus::Unsubscribed) => report.unsubscribed += 1,
                DispatchResult::Transitioned(_) => report.failed += 1,
                DispatchResult::Skipped(_) => report.skipped += 1,
            }
            report.hook_failures += self.process_hooks(&outcome.hooks).await;
        }

        if report.selected > 0 {
            info!(
                target = "dripline::application::dispatch",
                selected = report.selected,
                sent = report.sent,
                failed = report.failed,
                not_received = report.not_received,
                unsubscribed = report.unsubscribed,
                skipped = report.skipped,
                "Dispatch batch finished"
            );
        }
        Ok(report)
    }

    /// Gate, claim and send a single due row.
    pub async fn dispatch_one(&self, due: &DueSend) -> Result<DispatchOutcome, DispatchError> {
        if due.enrollment_unsubscribed {
            return Ok(self.finish(due.send_id, SendStatus::Unsubscribed, None).await?);
        }

        let Some(entry) = due.list_entry.as_ref() else {
            return Ok(self
                .finish(due.send_id, SendStatus::Error, Some("list entry missing"))
                .await?);
        };

        if !entry.confirmed && !due.journey_bypass {
            return Ok(self.finish(due.send_id, SendStatus::NotReceived, None).await?);
        }

        let now = OffsetDateTime::now_utc();
        if due.send_at > now {
            counter!("dripline_sends_dispatched_total", "outcome" => "skipped").increment(1);
            return Ok(DispatchOutcome::skipped(due.send_id, SkipReason::NotDue));
        }

        let stale_before = now - self.settings.claim_timeout;
        if !self.sends.claim(due.send_id, now, stale_before).await? {
            debug!(
                target = "dripline::application::dispatch",
                send_id = due.send_id,
                "Send already claimed"
            );
            counter!("dripline_sends_dispatched_total", "outcome" => "skipped").increment(1);
            return Ok(DispatchOutcome::skipped(
                due.send_id,
                SkipReason::ClaimedElsewhere,
            ));
        }

        let Some(step) = self.steps.find_step(due.step_id).await? else {
            return Ok(self
                .finish(due.send_id, SendStatus::Error, Some("step missing"))
                .await?);
        };

        let email = match self.compose(due, entry, &step) {
            Ok(email) => email,
            Err(err) => {
                return Ok(self
                    .finish(due.send_id, SendStatus::Error, Some(&err.to_string()))
                    .await?);
            }
        };

        if let Err(err) = self.mailer.send_campaign_email(&email).await {
            warn!(
                target = "dripline::application::dispatch",
                send_id = due.send_id,
                enrollment_id = due.enrollment_id,
                step_id = due.step_id,
                error = %err,
                "Mail transport failed"
            );
            return Ok(self
                .finish(due.send_id, SendStatus::Error, Some(&err.to_string()))
                .await?);
        }

        if !self.record(due.send_id, SendStatus::Sent, None).await? {
            return Ok(DispatchOutcome::skipped(
                due.send_id,
                SkipReason::ClaimedElsewhere,
            ));
        }

        let mut hooks = vec![PostSendHook::IncrementStat {
            step_id: due.step_id,
            enrollment_id: due.enrollment_id,
            kind: StatKind::Sent,
        }];
        if let Some(target_journey_id) = step.rules.redirect_on_completion {
            hooks.push(PostSendHook::RedirectOnCompletion {
                enrollment_id: due.enrollment_id,
                target_journey_id,
            });
        }

        Ok(DispatchOutcome {
            send_id: due.send_id,
            result: DispatchResult::Transitioned(SendStatus::Sent),
            hooks,
        })
    }

    /// Run post-send hooks, returning how many failed.
    pub async fn process_hooks(&self, hooks: &[PostSendHook]) -> usize {
        let mut failures = 0;
        for hook in hooks {
            let result = match *hook {
                PostSendHook::IncrementStat {
                    step_id,
                    enrollment_id,
                    kind,
                } => self
                    .stats
                    .increment(step_id, enrollment_id, kind)
                    .await
                    .map_err(|err| err.to_string()),
                PostSendHook::RedirectOnCompletion {
                    enrollment_id,
                    target_journey_id,
                } => self
                    .lifecycle
                    .branch_enrollment(
                        enrollment_id,
                        target_journey_id,
                        RedirectTrigger::Completion,
                    )
                    .await
                    .map(|_| ())
                    .map_err(|err| err.to_string()),
            };

            if let Err(error) = result {
                failures += 1;
                warn!(
                    target = "dripline::application::dispatch",
                    hook = ?hook,
                    error = %error,
                    "Post-send hook failed"
                );
            }
        }
        failures
    }

    /// Record a terminal state without a send; see [`Self::record`].
    async fn finish(
        &self,
        send_id: i64,
        status: SendStatus,
        last_error: Option<&str>,
    ) -> Result<DispatchOutcome, RepoError> {
        if self.record(send_id, status, last_error).await? {
            Ok(DispatchOutcome::transitioned(send_id, status))
        } else {
            Ok(DispatchOutcome::skipped(
                send_id,
                SkipReason::ClaimedElsewhere,
            ))
        }
    }

    /// Apply the conditional transition. Returns false when the row was no
    /// longer in a source state for `status`.
    async fn record(
        &self,
        send_id: i64,
        status: SendStatus,
        last_error: Option<&str>,
    ) -> Result<bool, RepoError> {
        let applied = self
            .sends
            .transition(send_id, status, last_error.map(str::to_string))
            .await?;
        if applied {
            counter!("dripline_sends_dispatched_total", "outcome" => status.as_str())
                .increment(1);
        } else {
            warn!(
                target = "dripline::application::dispatch",
                send_id,
                status = status.as_str(),
                "Send changed state before it could be recorded"
            );
            counter!("dripline_sends_dispatched_total", "outcome" => "skipped").increment(1);
        }
        Ok(applied)
    }

    fn compose(
        &self,
        due: &DueSend,
        entry: &DueListEntry,
        step: &StepRecord,
    ) -> Result<CampaignEmail, LinkError> {
        let links = TrackingLinks {
            open: self
                .links
                .tracking_link(TrackingKind::Open, due.step_id, due.enrollment_id)?,
            click: self
                .links
                .tracking_link(TrackingKind::Click, due.step_id, due.enrollment_id)?,
            unsubscribe: self.links.tracking_link(
                TrackingKind::Unsubscribe,
                due.step_id,
                due.enrollment_id,
            )?,
        };

        let mut placeholders = BTreeMap::new();
        placeholders.insert("enrollment_id".to_string(), due.enrollment_id.to_string());
        placeholders.insert("email".to_string(), entry.email.clone());
        placeholders.insert("journey_id".to_string(), due.journey_id.to_string());
        placeholders.insert(
            "document_url".to_string(),
            entry.document_url.clone().unwrap_or_default(),
        );

        let footer = due
            .unsubscribe_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .unwrap_or(DEFAULT_UNSUBSCRIBE_FOOTER);

        Ok(CampaignEmail {
            step_id: due.step_id,
            enrollment_id: due.enrollment_id,
            recipient: entry.email.clone(),
            subject: step.subject.clone(),
            body: step.body.clone(),
            placeholders,
            include_unsubscribe_footer: true,
            unsubscribe_footer: Some(footer.replace("{{unsubscribe_link}}", &links.unsubscribe)),
            links,
        })
    }
}
