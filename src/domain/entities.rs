use serde::Serialize;
use time::OffsetDateTime;

use super::rules::StepRules;
use super::schedule::StepTiming;
use super::send_time::SendTime;
use super::types::{SendStatus, StatKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JourneyRecord {
    pub id: i64,
    pub title: String,
    pub owner: String,
    pub document_ref: Option<String>,
    /// Skip the confirmation gate for this journey.
    pub bypass: bool,
    pub unsubscribe_text: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntryRecord {
    pub id: i64,
    pub journey_id: i64,
    pub email: String,
    pub token: String,
    pub confirmed: bool,
    pub confirmed_at: Option<OffsetDateTime>,
    pub document_url: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollmentRecord {
    pub id: i64,
    pub journey_id: i64,
    pub list_entry_id: Option<i64>,
    pub email: String,
    pub enrolled_at: OffsetDateTime,
    pub bypass: bool,
    pub unsubscribed: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub id: i64,
    pub journey_id: i64,
    pub subject: String,
    pub body: String,
    pub day_offset: i32,
    pub send_time: Option<SendTime>,
    pub delay_minutes: i32,
    pub rules: StepRules,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl StepRecord {
    pub fn timing(&self) -> StepTiming {
        StepTiming {
            day_offset: self.day_offset,
            send_time: self.send_time,
            delay_minutes: self.delay_minutes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledSendRecord {
    pub id: i64,
    pub enrollment_id: i64,
    pub step_id: i64,
    pub send_at: OffsetDateTime,
    pub status: SendStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub claimed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatCounts {
    pub sent: i64,
    pub opened: i64,
    pub clicked: i64,
    pub unsubscribed: i64,
    pub stopped: i64,
    pub redirected: i64,
}

impl StatCounts {
    pub fn get(&self, kind: StatKind) -> i64 {
        match kind {
            StatKind::Sent => self.sent,
            StatKind::Opened => self.opened,
            StatKind::Clicked => self.clicked,
            StatKind::Unsubscribed => self.unsubscribed,
            StatKind::Stopped => self.stopped,
            StatKind::Redirected => self.redirected,
        }
    }

    pub fn bump(&mut self, kind: StatKind) {
        let slot = match kind {
            StatKind::Sent => &mut self.sent,
            StatKind::Opened => &mut self.opened,
            StatKind::Clicked => &mut self.clicked,
            StatKind::Unsubscribed => &mut self.unsubscribed,
            StatKind::Stopped => &mut self.stopped,
            StatKind::Redirected => &mut self.redirected,
        };
        *slot += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatCounterRecord {
    pub step_id: i64,
    pub enrollment_id: i64,
    pub counts: StatCounts,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
