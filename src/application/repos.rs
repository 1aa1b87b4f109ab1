//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{
    EnrollmentRecord, JourneyRecord, ListEntryRecord, ScheduledSendRecord, StatCounterRecord,
    StatCounts, StepRecord,
};
use crate::domain::types::{SendStatus, StatKind};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateListEntryParams {
    pub journey_id: i64,
    pub email: String,
    pub token: String,
    pub confirmed_at: Option<OffsetDateTime>,
    pub document_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateEnrollmentParams {
    pub journey_id: i64,
    pub list_entry_id: Option<i64>,
    pub email: String,
    pub enrolled_at: OffsetDateTime,
    pub bypass: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewScheduledSend {
    pub enrollment_id: i64,
    pub step_id: i64,
    pub send_at: OffsetDateTime,
}

/// Which open sends (pending or claimed) a withdrawal applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawScope {
    /// Every open send of these enrollments.
    Enrollments(Vec<i64>),
    /// Open sends of these enrollments whose step is in `step_ids`.
    EnrollmentSteps {
        enrollment_ids: Vec<i64>,
        step_ids: Vec<i64>,
    },
}

/// List-entry fields the dispatch gate needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueListEntry {
    pub id: i64,
    pub email: String,
    pub confirmed: bool,
    pub document_url: Option<String>,
}

/// A due send joined with its enrollment, list entry and journey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueSend {
    pub send_id: i64,
    pub step_id: i64,
    pub send_at: OffsetDateTime,
    pub enrollment_id: i64,
    pub enrollment_unsubscribed: bool,
    pub journey_id: i64,
    pub journey_bypass: bool,
    pub unsubscribe_text: Option<String>,
    pub list_entry: Option<DueListEntry>,
}

#[async_trait]
pub trait JourneysRepo: Send + Sync {
    async fn find_journey(&self, id: i64) -> Result<Option<JourneyRecord>, RepoError>;
}

#[async_trait]
pub trait ListEntriesRepo: Send + Sync {
    async fn find_list_entry(&self, id: i64) -> Result<Option<ListEntryRecord>, RepoError>;

    async fn find_by_token(&self, token: &str) -> Result<Option<ListEntryRecord>, RepoError>;

    async fn create_list_entry(
        &self,
        params: CreateListEntryParams,
    ) -> Result<ListEntryRecord, RepoError>;

    /// Flip `confirmed` on an unconfirmed entry. Returns false when the entry
    /// was already confirmed or does not exist.
    async fn confirm_list_entry(&self, id: i64, at: OffsetDateTime) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait EnrollmentsRepo: Send + Sync {
    async fn find_enrollment(&self, id: i64) -> Result<Option<EnrollmentRecord>, RepoError>;

    async fn create_enrollment(
        &self,
        params: CreateEnrollmentParams,
    ) -> Result<EnrollmentRecord, RepoError>;

    async fn enrollment_ids_for_email(&self, email: &str) -> Result<Vec<i64>, RepoError>;

    async fn find_for_email_in_journey(
        &self,
        email: &str,
        journey_id: i64,
    ) -> Result<Option<EnrollmentRecord>, RepoError>;

    async fn mark_unsubscribed(&self, id: i64, at: OffsetDateTime) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait StepsRepo: Send + Sync {
    async fn find_step(&self, id: i64) -> Result<Option<StepRecord>, RepoError>;

    async fn list_steps_for_journey(&self, journey_id: i64) -> Result<Vec<StepRecord>, RepoError>;
}

#[async_trait]
pub trait ScheduledSendsRepo: Send + Sync {
    /// Insert every send or none of them.
    async fn insert_all(&self, sends: &[NewScheduledSend]) -> Result<u64, RepoError>;

    /// Pending sends due at or before `now`, plus claimed sends whose claim
    /// predates `stale_before`; at most `limit` rows.
    async fn list_due(
        &self,
        now: OffsetDateTime,
        stale_before: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<DueSend>, RepoError>;

    /// Reserve a send for dispatch. Succeeds on pending rows and on claimed
    /// rows whose claim predates `stale_before`, unless the enrollment has
    /// unsubscribed.
    async fn claim(
        &self,
        id: i64,
        now: OffsetDateTime,
        stale_before: OffsetDateTime,
    ) -> Result<bool, RepoError>;

    /// Conditional single-row transition; only rows in a legal source state
    /// for `to` are touched.
    async fn transition(
        &self,
        id: i64,
        to: SendStatus,
        last_error: Option<String>,
    ) -> Result<bool, RepoError>;

    /// Move open sends in `scope` to the terminal state `to`, returning
    /// affected rows. Claimed rows are included so a send abandoned by a
    /// crashed worker cannot be delivered after the withdrawal.
    async fn withdraw(&self, scope: WithdrawScope, to: SendStatus) -> Result<u64, RepoError>;

    /// Distinct step ids with an open send for the enrollment.
    async fn open_step_ids(&self, enrollment_id: i64) -> Result<Vec<i64>, RepoError>;

    /// Distinct step ids already sent to any of the enrollments.
    async fn sent_step_ids(&self, enrollment_ids: &[i64]) -> Result<Vec<i64>, RepoError>;

    async fn earliest_pending(
        &self,
        enrollment_id: i64,
    ) -> Result<Option<ScheduledSendRecord>, RepoError>;

    async fn latest_for_enrollment(
        &self,
        enrollment_id: i64,
    ) -> Result<Option<ScheduledSendRecord>, RepoError>;
}

#[async_trait]
pub trait StatsRepo: Send + Sync {
    /// Atomically create-or-increment the counter.
    async fn increment(
        &self,
        step_id: i64,
        enrollment_id: i64,
        kind: StatKind,
    ) -> Result<(), RepoError>;

    async fn find_counter(
        &self,
        step_id: i64,
        enrollment_id: i64,
    ) -> Result<Option<StatCounterRecord>, RepoError>;

    async fn totals_for_step(&self, step_id: i64) -> Result<StatCounts, RepoError>;
}
