//! Shared domain enumerations aligned with persisted database enums.

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Delivery state of one scheduled send (mirrors Postgres enum `send_status`).
///
/// `Pending` waits for the dispatch worker. `Claimed` marks a row a worker
/// has reserved for sending; it can still be withdrawn. Every other state is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "send_status", rename_all = "snake_case")]
pub enum SendStatus {
    Pending,
    Claimed,
    Sent,
    Error,
    NotReceived,
    Stopped,
    Cancelled,
    Unsubscribed,
}

impl SendStatus {
    pub const ALL: [SendStatus; 8] = [
        SendStatus::Pending,
        SendStatus::Claimed,
        SendStatus::Sent,
        SendStatus::Error,
        SendStatus::NotReceived,
        SendStatus::Stopped,
        SendStatus::Cancelled,
        SendStatus::Unsubscribed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SendStatus::Pending => "pending",
            SendStatus::Claimed => "claimed",
            SendStatus::Sent => "sent",
            SendStatus::Error => "error",
            SendStatus::NotReceived => "not_received",
            SendStatus::Stopped => "stopped",
            SendStatus::Cancelled => "cancelled",
            SendStatus::Unsubscribed => "unsubscribed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, SendStatus::Pending | SendStatus::Claimed)
    }

    /// States a withdrawal (stop, cancel, unsubscribe) applies to.
    pub fn open_states() -> Vec<SendStatus> {
        Self::ALL
            .into_iter()
            .filter(|state| !state.is_terminal())
            .collect()
    }

    pub fn can_transition_to(self, next: SendStatus) -> bool {
        use SendStatus::*;

        match self {
            Pending => matches!(
                next,
                Claimed | Error | NotReceived | Stopped | Cancelled | Unsubscribed
            ),
            Claimed => matches!(next, Sent | Error | Stopped | Cancelled | Unsubscribed),
            Sent | Error | NotReceived | Stopped | Cancelled | Unsubscribed => false,
        }
    }

    /// Validate a move to `next`, returning the new state.
    pub fn transition(self, next: SendStatus) -> Result<SendStatus, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::IllegalTransition {
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }

    /// States from which `next` is reachable in one step.
    pub fn sources_of(next: SendStatus) -> Vec<SendStatus> {
        Self::ALL
            .into_iter()
            .filter(|source| source.can_transition_to(next))
            .collect()
    }
}

impl std::fmt::Display for SendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-(step, enrollment) engagement counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    Sent,
    Opened,
    Clicked,
    Unsubscribed,
    Stopped,
    Redirected,
}

impl StatKind {
    /// Column name in `stat_counters`.
    pub fn column(self) -> &'static str {
        match self {
            StatKind::Sent => "sent",
            StatKind::Opened => "opened",
            StatKind::Clicked => "clicked",
            StatKind::Unsubscribed => "unsubscribed",
            StatKind::Stopped => "stopped",
            StatKind::Redirected => "redirected",
        }
    }
}

/// Kind of tracked link embedded in outbound mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingKind {
    Open,
    Click,
    Unsubscribe,
}

impl TrackingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackingKind::Open => "open",
            TrackingKind::Click => "click",
            TrackingKind::Unsubscribe => "unsubscribe",
        }
    }
}
