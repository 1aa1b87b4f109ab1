//! Mail transports behind [`CampaignMailer`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use url::Url;

use crate::application::mailer::{CampaignEmail, CampaignMailer, ConfirmationEmail, MailError};

use super::error::InfraError;

#[derive(Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
enum RelayPayload<'a> {
    Campaign(&'a CampaignEmail),
    Confirmation(&'a ConfirmationEmail),
}

/// Hands messages to an HTTP relay that renders and delivers them.
#[derive(Clone)]
pub struct WebhookMailer {
    client: reqwest::Client,
    endpoint: Url,
}

impl WebhookMailer {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, InfraError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::mail(format!("failed to build http client: {err}")))?;
        Ok(Self { client, endpoint })
    }

    async fn post(&self, payload: RelayPayload<'_>) -> Result<(), MailError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|err| MailError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(MailError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl CampaignMailer for WebhookMailer {
    async fn send_campaign_email(&self, email: &CampaignEmail) -> Result<(), MailError> {
        self.post(RelayPayload::Campaign(email)).await
    }

    async fn send_confirmation_email(&self, email: &ConfirmationEmail) -> Result<(), MailError> {
        self.post(RelayPayload::Confirmation(email)).await
    }
}

/// Logs messages instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl CampaignMailer for LogMailer {
    async fn send_campaign_email(&self, email: &CampaignEmail) -> Result<(), MailError> {
        info!(
            target = "dripline::infra::mail",
            step_id = email.step_id,
            enrollment_id = email.enrollment_id,
            recipient = %email.recipient,
            subject = %email.subject,
            "Campaign email (log only)"
        );
        Ok(())
    }

    async fn send_confirmation_email(&self, email: &ConfirmationEmail) -> Result<(), MailError> {
        info!(
            target = "dripline::infra::mail",
            journey_id = email.journey_id,
            recipient = %email.recipient,
            link = %email.confirmation_link,
            "Confirmation email (log only)"
        );
        Ok(())
    }
}
