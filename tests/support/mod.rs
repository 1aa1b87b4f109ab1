//! In-memory adapters shared by the integration tests.
#![allow(dead_code)]

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use dripline::{
    application::{
        branching::BranchHandler,
        dispatch::{BatchDispatcher, DispatchSettings},
        expander::SequenceExpander,
        lifecycle::EnrollmentLifecycle,
        links::{LinkError, LinkResolver},
        mailer::{CampaignEmail, CampaignMailer, ConfirmationEmail, MailError},
        repos::{
            CreateEnrollmentParams, CreateListEntryParams, DueListEntry, DueSend, EnrollmentsRepo,
            JourneysRepo, ListEntriesRepo, NewScheduledSend, RepoError, ScheduledSendsRepo,
            StatsRepo, StepsRepo, WithdrawScope,
        },
        subscriptions::SubscriptionService,
    },
    domain::{
        calendar::HolidayCalendar,
        entities::{
            EnrollmentRecord, JourneyRecord, ListEntryRecord, ScheduledSendRecord,
            StatCounterRecord, StatCounts, StepRecord,
        },
        rules::StepRules,
        schedule::{SchedulePolicy, SendTimeCalculator},
        send_time::SendTime,
        types::{SendStatus, StatKind, TrackingKind},
    },
};
use time::{Duration, OffsetDateTime, macros::datetime};

pub const BASE_URL: &str = "https://mail.test";

#[derive(Default)]
struct State {
    next_id: i64,
    journeys: BTreeMap<i64, JourneyRecord>,
    list_entries: BTreeMap<i64, ListEntryRecord>,
    enrollments: BTreeMap<i64, EnrollmentRecord>,
    steps: BTreeMap<i64, StepRecord>,
    sends: BTreeMap<i64, ScheduledSendRecord>,
    stats: BTreeMap<(i64, i64), StatCounterRecord>,
}

impl State {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Single store implementing every repository trait.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_inserts: AtomicBool,
    fail_stats: AtomicBool,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("memory store poisoned")
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_stats(&self, fail: bool) {
        self.fail_stats.store(fail, Ordering::SeqCst);
    }

    pub fn add_journey(&self, title: &str, bypass: bool) -> JourneyRecord {
        let mut state = self.lock();
        let id = state.id();
        let now = OffsetDateTime::now_utc();
        let journey = JourneyRecord {
            id,
            title: title.to_string(),
            owner: "owner@example.org".to_string(),
            document_ref: Some(format!("https://docs.example.org/{id}.pdf")),
            bypass,
            unsubscribe_text: None,
            created_at: now,
            updated_at: now,
        };
        state.journeys.insert(id, journey.clone());
        journey
    }

    pub fn set_unsubscribe_text(&self, journey_id: i64, text: &str) {
        if let Some(journey) = self.lock().journeys.get_mut(&journey_id) {
            journey.unsubscribe_text = Some(text.to_string());
        }
    }

    pub fn add_step(
        &self,
        journey_id: i64,
        day_offset: i32,
        send_time: Option<&str>,
        delay_minutes: i32,
        rules: Option<&str>,
    ) -> StepRecord {
        let mut state = self.lock();
        let id = state.id();
        let now = OffsetDateTime::now_utc();
        let step = StepRecord {
            id,
            journey_id,
            subject: format!("Step {id}"),
            body: format!("<p>Body of step {id}</p>"),
            day_offset,
            send_time: send_time.and_then(SendTime::parse),
            delay_minutes,
            rules: StepRules::from_json(rules),
            created_at: now,
            updated_at: now,
        };
        state.steps.insert(id, step.clone());
        step
    }

    pub fn add_list_entry(&self, journey_id: i64, email: &str, confirmed: bool) -> ListEntryRecord {
        let mut state = self.lock();
        let id = state.id();
        let now = OffsetDateTime::now_utc();
        let entry = ListEntryRecord {
            id,
            journey_id,
            email: email.to_string(),
            token: format!("token-{id}"),
            confirmed,
            confirmed_at: confirmed.then_some(now),
            document_url: None,
            created_at: now,
        };
        state.list_entries.insert(id, entry.clone());
        entry
    }

    pub fn backdate_list_entry(&self, id: i64, by: Duration) {
        if let Some(entry) = self.lock().list_entries.get_mut(&id) {
            entry.created_at -= by;
        }
    }

    pub fn list_entry(&self, id: i64) -> Option<ListEntryRecord> {
        self.lock().list_entries.get(&id).cloned()
    }

    pub fn list_entry_for(&self, email: &str) -> Option<ListEntryRecord> {
        self.lock()
            .list_entries
            .values()
            .find(|entry| entry.email == email)
            .cloned()
    }

    pub fn add_enrollment(
        &self,
        journey_id: i64,
        list_entry_id: Option<i64>,
        email: &str,
        enrolled_at: OffsetDateTime,
    ) -> EnrollmentRecord {
        let mut state = self.lock();
        let id = state.id();
        let bypass = state
            .journeys
            .get(&journey_id)
            .is_some_and(|journey| journey.bypass);
        let enrollment = EnrollmentRecord {
            id,
            journey_id,
            list_entry_id,
            email: email.to_string(),
            enrolled_at,
            bypass,
            unsubscribed: false,
            created_at: enrolled_at,
            updated_at: enrolled_at,
        };
        state.enrollments.insert(id, enrollment.clone());
        enrollment
    }

    pub fn enrollment(&self, id: i64) -> Option<EnrollmentRecord> {
        self.lock().enrollments.get(&id).cloned()
    }

    pub fn enrollments_for(&self, email: &str) -> Vec<EnrollmentRecord> {
        self.lock()
            .enrollments
            .values()
            .filter(|enrollment| enrollment.email == email)
            .cloned()
            .collect()
    }

    pub fn add_send(
        &self,
        enrollment_id: i64,
        step_id: i64,
        send_at: OffsetDateTime,
        status: SendStatus,
    ) -> ScheduledSendRecord {
        let mut state = self.lock();
        let id = state.id();
        let now = OffsetDateTime::now_utc();
        let send = ScheduledSendRecord {
            id,
            enrollment_id,
            step_id,
            send_at,
            status,
            attempts: 0,
            last_error: None,
            claimed_at: (status == SendStatus::Claimed).then_some(now),
            created_at: now,
            updated_at: now,
        };
        state.sends.insert(id, send.clone());
        send
    }

    pub fn set_claimed_at(&self, send_id: i64, at: OffsetDateTime) {
        if let Some(send) = self.lock().sends.get_mut(&send_id) {
            send.claimed_at = Some(at);
        }
    }

    pub fn send(&self, id: i64) -> Option<ScheduledSendRecord> {
        self.lock().sends.get(&id).cloned()
    }

    pub fn sends_for(&self, enrollment_id: i64) -> Vec<ScheduledSendRecord> {
        let mut sends: Vec<_> = self
            .lock()
            .sends
            .values()
            .filter(|send| send.enrollment_id == enrollment_id)
            .cloned()
            .collect();
        sends.sort_by_key(|send| (send.send_at, send.id));
        sends
    }

    /// Pull every pending send of the enrollment into the past.
    pub fn make_due(&self, enrollment_id: i64) {
        let past = OffsetDateTime::now_utc() - Duration::minutes(1);
        for send in self.lock().sends.values_mut() {
            if send.enrollment_id == enrollment_id && send.status == SendStatus::Pending {
                send.send_at = past;
            }
        }
    }

    pub fn counts(&self, step_id: i64, enrollment_id: i64) -> StatCounts {
        self.lock()
            .stats
            .get(&(step_id, enrollment_id))
            .map(|counter| counter.counts)
            .unwrap_or_default()
    }
}

#[async_trait]
impl JourneysRepo for MemoryStore {
    async fn find_journey(&self, id: i64) -> Result<Option<JourneyRecord>, RepoError> {
        Ok(self.lock().journeys.get(&id).cloned())
    }
}

#[async_trait]
impl ListEntriesRepo for MemoryStore {
    async fn find_list_entry(&self, id: i64) -> Result<Option<ListEntryRecord>, RepoError> {
        Ok(self.lock().list_entries.get(&id).cloned())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<ListEntryRecord>, RepoError> {
        Ok(self
            .lock()
            .list_entries
            .values()
            .find(|entry| entry.token == token)
            .cloned())
    }

    async fn create_list_entry(
        &self,
        params: CreateListEntryParams,
    ) -> Result<ListEntryRecord, RepoError> {
        let mut state = self.lock();
        if state
            .list_entries
            .values()
            .any(|entry| entry.token == params.token)
        {
            return Err(RepoError::Duplicate {
                constraint: "list_entries_token_key".to_string(),
            });
        }
        let id = state.id();
        let entry = ListEntryRecord {
            id,
            journey_id: params.journey_id,
            email: params.email,
            token: params.token,
            confirmed: params.confirmed_at.is_some(),
            confirmed_at: params.confirmed_at,
            document_url: params.document_url,
            created_at: OffsetDateTime::now_utc(),
        };
        state.list_entries.insert(id, entry.clone());
        Ok(entry)
    }

    async fn confirm_list_entry(&self, id: i64, at: OffsetDateTime) -> Result<bool, RepoError> {
        let mut state = self.lock();
        match state.list_entries.get_mut(&id) {
            Some(entry) if !entry.confirmed => {
                entry.confirmed = true;
                entry.confirmed_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl EnrollmentsRepo for MemoryStore {
    async fn find_enrollment(&self, id: i64) -> Result<Option<EnrollmentRecord>, RepoError> {
        Ok(self.lock().enrollments.get(&id).cloned())
    }

    async fn create_enrollment(
        &self,
        params: CreateEnrollmentParams,
    ) -> Result<EnrollmentRecord, RepoError> {
        let mut state = self.lock();
        if !state.journeys.contains_key(&params.journey_id) {
            return Err(RepoError::Integrity {
                message: "enrollments_journey_id_fkey".to_string(),
            });
        }
        let id = state.id();
        let enrollment = EnrollmentRecord {
            id,
            journey_id: params.journey_id,
            list_entry_id: params.list_entry_id,
            email: params.email,
            enrolled_at: params.enrolled_at,
            bypass: params.bypass,
            unsubscribed: false,
            created_at: params.enrolled_at,
            updated_at: params.enrolled_at,
        };
        state.enrollments.insert(id, enrollment.clone());
        Ok(enrollment)
    }

    async fn enrollment_ids_for_email(&self, email: &str) -> Result<Vec<i64>, RepoError> {
        Ok(self
            .lock()
            .enrollments
            .values()
            .filter(|enrollment| enrollment.email == email)
            .map(|enrollment| enrollment.id)
            .collect())
    }

    async fn find_for_email_in_journey(
        &self,
        email: &str,
        journey_id: i64,
    ) -> Result<Option<EnrollmentRecord>, RepoError> {
        Ok(self
            .lock()
            .enrollments
            .values()
            .rev()
            .find(|enrollment| enrollment.email == email && enrollment.journey_id == journey_id)
            .cloned())
    }

    async fn mark_unsubscribed(&self, id: i64, at: OffsetDateTime) -> Result<bool, RepoError> {
        let mut state = self.lock();
        match state.enrollments.get_mut(&id) {
            Some(enrollment) if !enrollment.unsubscribed => {
                enrollment.unsubscribed = true;
                enrollment.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl StepsRepo for MemoryStore {
    async fn find_step(&self, id: i64) -> Result<Option<StepRecord>, RepoError> {
        Ok(self.lock().steps.get(&id).cloned())
    }

    async fn list_steps_for_journey(&self, journey_id: i64) -> Result<Vec<StepRecord>, RepoError> {
        Ok(self
            .lock()
            .steps
            .values()
            .filter(|step| step.journey_id == journey_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ScheduledSendsRepo for MemoryStore {
    async fn insert_all(&self, sends: &[NewScheduledSend]) -> Result<u64, RepoError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("insert rejected"));
        }
        let mut state = self.lock();
        let now = OffsetDateTime::now_utc();
        for send in sends {
            let id = state.id();
            state.sends.insert(
                id,
                ScheduledSendRecord {
                    id,
                    enrollment_id: send.enrollment_id,
                    step_id: send.step_id,
                    send_at: send.send_at,
                    status: SendStatus::Pending,
                    attempts: 0,
                    last_error: None,
                    claimed_at: None,
                    created_at: now,
                    updated_at: now,
                },
            );
        }
        Ok(sends.len() as u64)
    }

    async fn list_due(
        &self,
        now: OffsetDateTime,
        stale_before: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<DueSend>, RepoError> {
        let state = self.lock();
        let mut candidates: Vec<&ScheduledSendRecord> = state
            .sends
            .values()
            .filter(|send| send.send_at <= now && selectable(send, stale_before))
            .collect();
        candidates.sort_by_key(|send| (send.send_at, send.id));

        let mut due = Vec::new();
        for send in candidates.into_iter().take(limit as usize) {
            let Some(enrollment) = state.enrollments.get(&send.enrollment_id) else {
                continue;
            };
            let Some(journey) = state.journeys.get(&enrollment.journey_id) else {
                continue;
            };
            let list_entry = enrollment
                .list_entry_id
                .and_then(|id| state.list_entries.get(&id))
                .map(|entry| DueListEntry {
                    id: entry.id,
                    email: entry.email.clone(),
                    confirmed: entry.confirmed,
                    document_url: entry.document_url.clone(),
                });
            due.push(DueSend {
                send_id: send.id,
                step_id: send.step_id,
                send_at: send.send_at,
                enrollment_id: enrollment.id,
                enrollment_unsubscribed: enrollment.unsubscribed,
                journey_id: journey.id,
                journey_bypass: journey.bypass,
                unsubscribe_text: journey.unsubscribe_text.clone(),
                list_entry,
            });
        }
        Ok(due)
    }

    async fn claim(
        &self,
        id: i64,
        now: OffsetDateTime,
        stale_before: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        let mut state = self.lock();
        let unsubscribed = state
            .sends
            .get(&id)
            .and_then(|send| state.enrollments.get(&send.enrollment_id))
            .is_some_and(|enrollment| enrollment.unsubscribed);
        if unsubscribed {
            return Ok(false);
        }
        match state.sends.get_mut(&id) {
            Some(send) if selectable(send, stale_before) => {
                send.status = SendStatus::Claimed;
                send.claimed_at = Some(now);
                send.attempts += 1;
                send.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition(
        &self,
        id: i64,
        to: SendStatus,
        last_error: Option<String>,
    ) -> Result<bool, RepoError> {
        let mut state = self.lock();
        match state.sends.get_mut(&id) {
            Some(send) if send.status.can_transition_to(to) => {
                send.status = to;
                if last_error.is_some() {
                    send.last_error = last_error;
                }
                send.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn withdraw(&self, scope: WithdrawScope, to: SendStatus) -> Result<u64, RepoError> {
        let open = SendStatus::open_states();
        for state in &open {
            state.transition(to).map_err(|err| RepoError::InvalidInput {
                message: err.to_string(),
            })?;
        }
        let (enrollment_ids, step_ids): (BTreeSet<i64>, Option<BTreeSet<i64>>) = match scope {
            WithdrawScope::Enrollments(ids) => (ids.into_iter().collect(), None),
            WithdrawScope::EnrollmentSteps {
                enrollment_ids,
                step_ids,
            } => (
                enrollment_ids.into_iter().collect(),
                Some(step_ids.into_iter().collect()),
            ),
        };

        let mut state = self.lock();
        let mut affected = 0;
        for send in state.sends.values_mut() {
            let in_scope = enrollment_ids.contains(&send.enrollment_id)
                && step_ids
                    .as_ref()
                    .is_none_or(|steps| steps.contains(&send.step_id));
            if in_scope && open.contains(&send.status) {
                send.status = to;
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn open_step_ids(&self, enrollment_id: i64) -> Result<Vec<i64>, RepoError> {
        let steps: BTreeSet<i64> = self
            .lock()
            .sends
            .values()
            .filter(|send| send.enrollment_id == enrollment_id && !send.status.is_terminal())
            .map(|send| send.step_id)
            .collect();
        Ok(steps.into_iter().collect())
    }

    async fn sent_step_ids(&self, enrollment_ids: &[i64]) -> Result<Vec<i64>, RepoError> {
        let steps: BTreeSet<i64> = self
            .lock()
            .sends
            .values()
            .filter(|send| {
                enrollment_ids.contains(&send.enrollment_id) && send.status == SendStatus::Sent
            })
            .map(|send| send.step_id)
            .collect();
        Ok(steps.into_iter().collect())
    }

    async fn earliest_pending(
        &self,
        enrollment_id: i64,
    ) -> Result<Option<ScheduledSendRecord>, RepoError> {
        Ok(self
            .sends_for(enrollment_id)
            .into_iter()
            .find(|send| send.status == SendStatus::Pending))
    }

    async fn latest_for_enrollment(
        &self,
        enrollment_id: i64,
    ) -> Result<Option<ScheduledSendRecord>, RepoError> {
        Ok(self
            .lock()
            .sends
            .values()
            .rev()
            .find(|send| send.enrollment_id == enrollment_id)
            .cloned())
    }
}

#[async_trait]
impl StatsRepo for MemoryStore {
    async fn increment(
        &self,
        step_id: i64,
        enrollment_id: i64,
        kind: StatKind,
    ) -> Result<(), RepoError> {
        if self.fail_stats.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        let now = OffsetDateTime::now_utc();
        let mut state = self.lock();
        let counter = state
            .stats
            .entry((step_id, enrollment_id))
            .or_insert_with(|| StatCounterRecord {
                step_id,
                enrollment_id,
                counts: StatCounts::default(),
                created_at: now,
                updated_at: now,
            });
        counter.counts.bump(kind);
        counter.updated_at = now;
        Ok(())
    }

    async fn find_counter(
        &self,
        step_id: i64,
        enrollment_id: i64,
    ) -> Result<Option<StatCounterRecord>, RepoError> {
        Ok(self.lock().stats.get(&(step_id, enrollment_id)).cloned())
    }

    async fn totals_for_step(&self, step_id: i64) -> Result<StatCounts, RepoError> {
        let state = self.lock();
        let mut totals = StatCounts::default();
        for counter in state.stats.values().filter(|c| c.step_id == step_id) {
            totals.sent += counter.counts.sent;
            totals.opened += counter.counts.opened;
            totals.clicked += counter.counts.clicked;
            totals.unsubscribed += counter.counts.unsubscribed;
            totals.stopped += counter.counts.stopped;
            totals.redirected += counter.counts.redirected;
        }
        Ok(totals)
    }
}

fn selectable(send: &ScheduledSendRecord, stale_before: OffsetDateTime) -> bool {
    match send.status {
        SendStatus::Pending => true,
        SendStatus::Claimed => send.claimed_at.is_some_and(|at| at < stale_before),
        _ => false,
    }
}

type SendCallback = Box<dyn Fn(&CampaignEmail) + Send + Sync>;

/// Mailer capturing every message; can be told to fail.
#[derive(Default)]
pub struct RecordingMailer {
    campaigns: Mutex<Vec<CampaignEmail>>,
    confirmations: Mutex<Vec<ConfirmationEmail>>,
    fail: AtomicBool,
    on_send: Mutex<Option<SendCallback>>,
}

impl RecordingMailer {
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Run `callback` while a campaign mail is in flight.
    pub fn on_send(&self, callback: impl Fn(&CampaignEmail) + Send + Sync + 'static) {
        *self.on_send.lock().expect("mailer poisoned") = Some(Box::new(callback));
    }

    pub fn campaigns(&self) -> Vec<CampaignEmail> {
        self.campaigns.lock().expect("mailer poisoned").clone()
    }

    pub fn confirmations(&self) -> Vec<ConfirmationEmail> {
        self.confirmations.lock().expect("mailer poisoned").clone()
    }
}

#[async_trait]
impl CampaignMailer for RecordingMailer {
    async fn send_campaign_email(&self, email: &CampaignEmail) -> Result<(), MailError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailError::Rejected { status: 503 });
        }
        if let Some(callback) = self.on_send.lock().expect("mailer poisoned").as_ref() {
            callback(email);
        }
        self.campaigns
            .lock()
            .expect("mailer poisoned")
            .push(email.clone());
        Ok(())
    }

    async fn send_confirmation_email(&self, email: &ConfirmationEmail) -> Result<(), MailError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailError::Transport("connection refused".to_string()));
        }
        self.confirmations
            .lock()
            .expect("mailer poisoned")
            .push(email.clone());
        Ok(())
    }
}

pub struct StubLinks;

impl LinkResolver for StubLinks {
    fn confirmation_link(&self, token: &str) -> Result<String, LinkError> {
        Ok(format!("{BASE_URL}/confirm?token={token}"))
    }

    fn tracking_link(
        &self,
        kind: TrackingKind,
        step_id: i64,
        enrollment_id: i64,
    ) -> Result<String, LinkError> {
        Ok(format!(
            "{BASE_URL}/track/{}?step={step_id}&enrollment={enrollment_id}",
            kind.as_str()
        ))
    }
}

/// Every service wired against one [`MemoryStore`].
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub expander: SequenceExpander,
    pub lifecycle: EnrollmentLifecycle,
    pub dispatcher: BatchDispatcher,
    pub branching: BranchHandler,
    pub subscriptions: SubscriptionService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(SchedulePolicy::default())
    }

    pub fn with_policy(policy: SchedulePolicy) -> Self {
        let store = Arc::new(MemoryStore::default());
        let mailer = Arc::new(RecordingMailer::default());
        let links: Arc<dyn LinkResolver> = Arc::new(StubLinks);
        let calculator = Arc::new(SendTimeCalculator::new(
            Arc::new(HolidayCalendar::new()),
            policy,
        ));

        let expander =
            SequenceExpander::new(store.clone(), store.clone(), store.clone(), calculator);
        let lifecycle = EnrollmentLifecycle::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            expander.clone(),
        );
        let dispatcher = BatchDispatcher::new(
            store.clone(),
            store.clone(),
            store.clone(),
            mailer.clone(),
            links.clone(),
            lifecycle.clone(),
            DispatchSettings::default(),
        );
        let branching = BranchHandler::new(
            store.clone(),
            store.clone(),
            store.clone(),
            lifecycle.clone(),
        );
        let subscriptions = SubscriptionService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            mailer.clone(),
            links,
            lifecycle.clone(),
            Duration::hours(24),
        );

        Self {
            store,
            mailer,
            expander,
            lifecycle,
            dispatcher,
            branching,
            subscriptions,
        }
    }

    /// A confirmed subscriber enrolled into `journey_id` and expanded.
    pub async fn enroll(&self, journey_id: i64, email: &str) -> EnrollmentRecord {
        let entry = self.store.add_list_entry(journey_id, email, true);
        let enrollment = self.store.add_enrollment(
            journey_id,
            Some(entry.id),
            email,
            OffsetDateTime::now_utc().replace_nanosecond(0).expect("valid"),
        );
        self.expander.expand(enrollment.id).await;
        enrollment
    }
}

/// Monday 2024-06-10 at noon UTC.
pub fn monday_noon() -> OffsetDateTime {
    datetime!(2024-06-10 12:00:00 UTC)
}

impl MemoryStore {
    /// Overwrite a send's status, bypassing the state machine.
    pub fn force_status(&self, send_id: i64, status: SendStatus) {
        if let Some(send) = self.lock().sends.get_mut(&send_id) {
            send.status = status;
        }
    }
}
