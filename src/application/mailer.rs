//! Outbound mail collaborator.
//!
//! Rendering and transport live behind [`CampaignMailer`]; this crate only
//! assembles the message envelope and its tracking links.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Footer appended when a journey does not define its own.
pub const DEFAULT_UNSUBSCRIBE_FOOTER: &str =
    "<p>You received this email because you signed up. \
     <a href=\"{{unsubscribe_link}}\">Unsubscribe</a></p>";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport failed: {0}")]
    Transport(String),
    #[error("mail relay rejected the message with status {status}")]
    Rejected { status: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingLinks {
    pub open: String,
    pub click: String,
    pub unsubscribe: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignEmail {
    pub step_id: i64,
    pub enrollment_id: i64,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub placeholders: BTreeMap<String, String>,
    pub include_unsubscribe_footer: bool,
    pub unsubscribe_footer: Option<String>,
    pub links: TrackingLinks,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationEmail {
    pub journey_id: i64,
    pub journey_title: String,
    pub recipient: String,
    pub confirmation_link: String,
}

#[async_trait]
pub trait CampaignMailer: Send + Sync {
    async fn send_campaign_email(&self, email: &CampaignEmail) -> Result<(), MailError>;

    async fn send_confirmation_email(&self, email: &ConfirmationEmail) -> Result<(), MailError>;
}
