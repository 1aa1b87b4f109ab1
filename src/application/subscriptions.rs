//! Form intake, token confirmation and unsubscribe.

use std::sync::Arc;

use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::{
    expander::{SequenceExpander, sort_steps},
    lifecycle::{EnrollmentLifecycle, LifecycleError, RedirectTrigger},
    links::{LinkError, LinkResolver},
    mailer::{CampaignMailer, ConfirmationEmail, MailError},
    repos::{
        CreateEnrollmentParams, CreateListEntryParams, EnrollmentsRepo, JourneysRepo,
        ListEntriesRepo, WithdrawScope, RepoError, ScheduledSendsRepo, StatsRepo, StepsRepo,
    },
};
use crate::domain::{
    entities::{EnrollmentRecord, JourneyRecord, ListEntryRecord},
    error::DomainError,
    types::{SendStatus, StatKind},
};

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("journey {0} not found")]
    JourneyNotFound(i64),
    #[error("enrollment {0} not found")]
    EnrollmentNotFound(i64),
    #[error("confirmation token is not valid")]
    InvalidToken,
    #[error("confirmation token has expired")]
    TokenExpired,
    #[error("subscription is already confirmed")]
    AlreadyConfirmed,
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A confirmation email was sent for a new list entry.
    ConfirmationSent { list_entry_id: i64 },
    /// Bypass journey with a known address: enrolled immediately.
    Enrolled { enrollment_id: i64, scheduled: u64 },
    /// The address was already enrolled and the repeat rule moved it.
    Repeated { enrollment_id: i64 },
    AlreadyEnrolled { enrollment_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmOutcome {
    pub enrollment_id: i64,
    pub scheduled: u64,
    pub document_url: Option<String>,
}

#[derive(Clone)]
pub struct SubscriptionService {
    journeys: Arc<dyn JourneysRepo>,
    list_entries: Arc<dyn ListEntriesRepo>,
    enrollments: Arc<dyn EnrollmentsRepo>,
    steps: Arc<dyn StepsRepo>,
    sends: Arc<dyn ScheduledSendsRepo>,
    stats: Arc<dyn StatsRepo>,
    mailer: Arc<dyn CampaignMailer>,
    links: Arc<dyn LinkResolver>,
    lifecycle: EnrollmentLifecycle,
    token_ttl: Duration,
}

impl SubscriptionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        journeys: Arc<dyn JourneysRepo>,
        list_entries: Arc<dyn ListEntriesRepo>,
        enrollments: Arc<dyn EnrollmentsRepo>,
        steps: Arc<dyn StepsRepo>,
        sends: Arc<dyn ScheduledSendsRepo>,
        stats: Arc<dyn StatsRepo>,
        mailer: Arc<dyn CampaignMailer>,
        links: Arc<dyn LinkResolver>,
        lifecycle: EnrollmentLifecycle,
        token_ttl: Duration,
    ) -> Self {
        Self {
            journeys,
            list_entries,
            enrollments,
            steps,
            sends,
            stats,
            mailer,
            links,
            lifecycle,
            token_ttl,
        }
    }

    fn expander(&self) -> &SequenceExpander {
        self.lifecycle.expander()
    }

    pub async fn submit(
        &self,
        journey_id: i64,
        email: &str,
    ) -> Result<SubmitOutcome, SubscriptionError> {
        let email = normalize_email(email)?;
        let journey = self.journey(journey_id).await?;

        if let Some(existing) = self
            .enrollments
            .find_for_email_in_journey(&email, journey_id)
            .await?
        {
            return self.resubmit(existing).await;
        }

        let known = !self
            .enrollments
            .enrollment_ids_for_email(&email)
            .await?
            .is_empty();
        if journey.bypass && known {
            return self.enroll_directly(&journey, email).await;
        }

        let entry = self
            .list_entries
            .create_list_entry(CreateListEntryParams {
                journey_id,
                email: email.clone(),
                token: new_token(),
                confirmed_at: None,
                document_url: journey.document_ref.clone(),
            })
            .await?;

        let confirmation_link = self.links.confirmation_link(&entry.token)?;
        self.mailer
            .send_confirmation_email(&ConfirmationEmail {
                journey_id,
                journey_title: journey.title.clone(),
                recipient: email,
                confirmation_link,
            })
            .await?;

        info!(
            target = "dripline::application::subscriptions",
            journey_id,
            list_entry_id = entry.id,
            "Confirmation requested"
        );
        Ok(SubmitOutcome::ConfirmationSent {
            list_entry_id: entry.id,
        })
    }

    /// Consume a confirmation token and start the journey.
    pub async fn confirm(&self, token: &str) -> Result<ConfirmOutcome, SubscriptionError> {
        let entry = self
            .list_entries
            .find_by_token(token.trim())
            .await?
            .ok_or(SubscriptionError::InvalidToken)?;
        if entry.confirmed {
            return Err(SubscriptionError::AlreadyConfirmed);
        }

        let now = now_seconds();
        if now - entry.created_at > self.token_ttl {
            return Err(SubscriptionError::TokenExpired);
        }

        let journey = self.journey(entry.journey_id).await?;
        if !self.list_entries.confirm_list_entry(entry.id, now).await? {
            return Err(SubscriptionError::AlreadyConfirmed);
        }

        let enrollment = self.enroll(&journey, &entry, now).await?;
        let scheduled = self.expander().expand(enrollment.id).await;

        info!(
            target = "dripline::application::subscriptions",
            list_entry_id = entry.id,
            enrollment_id = enrollment.id,
            scheduled,
            "Subscription confirmed"
        );
        Ok(ConfirmOutcome {
            enrollment_id: enrollment.id,
            scheduled,
            document_url: entry.document_url,
        })
    }

    pub async fn unsubscribe(&self, enrollment_id: i64, step_id: Option<i64>) -> bool {
        match self.try_unsubscribe(enrollment_id, step_id).await {
            Ok(_) => true,
            Err(err) => {
                warn!(
                    target = "dripline::application::subscriptions",
                    enrollment_id,
                    error = %err,
                    "Unsubscribe failed"
                );
                false
            }
        }
    }

    /// Returns how many open sends were withdrawn.
    pub async fn try_unsubscribe(
        &self,
        enrollment_id: i64,
        step_id: Option<i64>,
    ) -> Result<u64, SubscriptionError> {
        if self
            .enrollments
            .find_enrollment(enrollment_id)
            .await?
            .is_none()
        {
            return Err(SubscriptionError::EnrollmentNotFound(enrollment_id));
        }

        self.enrollments
            .mark_unsubscribed(enrollment_id, now_seconds())
            .await?;
        let withdrawn = self
            .sends
            .withdraw(
                WithdrawScope::Enrollments(vec![enrollment_id]),
                SendStatus::Unsubscribed,
            )
            .await?;

        let counted_step = match step_id {
            Some(step_id) => Some(step_id),
            None => self
                .sends
                .latest_for_enrollment(enrollment_id)
                .await?
                .map(|send| send.step_id),
        };
        if let Some(step_id) = counted_step
            && let Err(err) = self
                .stats
                .increment(step_id, enrollment_id, StatKind::Unsubscribed)
                .await
        {
            warn!(
                target = "dripline::application::subscriptions",
                enrollment_id,
                step_id,
                error = %err,
                "Stat increment failed"
            );
        }

        info!(
            target = "dripline::application::subscriptions",
            enrollment_id, withdrawn, "Enrollment unsubscribed"
        );
        Ok(withdrawn)
    }

    async fn resubmit(
        &self,
        existing: EnrollmentRecord,
    ) -> Result<SubmitOutcome, SubscriptionError> {
        let mut steps = self
            .steps
            .list_steps_for_journey(existing.journey_id)
            .await?;
        sort_steps(&mut steps);

        let repeat_rule = steps
            .iter()
            .find(|step| step.day_offset == 0)
            .and_then(|step| step.rules.redirect_on_repeat.map(|target| (step.id, target)));

        let Some((step_id, target_journey_id)) = repeat_rule else {
            return Ok(SubmitOutcome::AlreadyEnrolled {
                enrollment_id: existing.id,
            });
        };

        self.lifecycle.try_stop_single(existing.id, step_id).await?;
        let created = self
            .lifecycle
            .branch(&existing, target_journey_id, RedirectTrigger::Repeat)
            .await?;
        Ok(SubmitOutcome::Repeated {
            enrollment_id: created.id,
        })
    }

    async fn enroll_directly(
        &self,
        journey: &JourneyRecord,
        email: String,
    ) -> Result<SubmitOutcome, SubscriptionError> {
        let now = now_seconds();
        let entry = self
            .list_entries
            .create_list_entry(CreateListEntryParams {
                journey_id: journey.id,
                email,
                token: new_token(),
                confirmed_at: Some(now),
                document_url: journey.document_ref.clone(),
            })
            .await?;

        let enrollment = self.enroll(journey, &entry, now).await?;
        let scheduled = self.expander().expand(enrollment.id).await;
        Ok(SubmitOutcome::Enrolled {
            enrollment_id: enrollment.id,
            scheduled,
        })
    }

    async fn enroll(
        &self,
        journey: &JourneyRecord,
        entry: &ListEntryRecord,
        at: OffsetDateTime,
    ) -> Result<EnrollmentRecord, SubscriptionError> {
        let enrollment = self
            .enrollments
            .create_enrollment(CreateEnrollmentParams {
                journey_id: journey.id,
                list_entry_id: Some(entry.id),
                email: entry.email.clone(),
                enrolled_at: at,
                bypass: journey.bypass,
            })
            .await?;
        Ok(enrollment)
    }

    async fn journey(&self, journey_id: i64) -> Result<JourneyRecord, SubscriptionError> {
        self.journeys
            .find_journey(journey_id)
            .await?
            .ok_or(SubscriptionError::JourneyNotFound(journey_id))
    }
}

/// Trim and sanity-check an address. Single-label domains such as
/// `localhost` are accepted.
fn normalize_email(raw: &str) -> Result<String, DomainError> {
    let email = raw.trim();
    let valid = email.len() <= 254
        && !email.chars().any(char::is_whitespace)
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && valid_domain(domain));
    if valid {
        Ok(email.to_string())
    } else {
        Err(DomainError::validation(format!(
            "`{email}` is not an email address"
        )))
    }
}

fn valid_domain(domain: &str) -> bool {
    !domain.is_empty()
        && domain.split('.').all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

fn now_seconds() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(0).unwrap_or(now)
}
