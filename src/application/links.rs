use thiserror::Error;
use url::Url;

use crate::domain::types::TrackingKind;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to build link: {0}")]
    Build(#[from] url::ParseError),
}

/// Absolute URL construction for outbound messages.
pub trait LinkResolver: Send + Sync {
    fn confirmation_link(&self, token: &str) -> Result<String, LinkError>;

    fn tracking_link(
        &self,
        kind: TrackingKind,
        step_id: i64,
        enrollment_id: i64,
    ) -> Result<String, LinkError>;
}

/// Where a tracked click should land. Absolute http(s) URLs and
/// same-origin paths pass through; anything else becomes `/`.
pub fn click_destination(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return "/".to_string();
    };

    if raw.starts_with('/') && !raw.starts_with("//") {
        return raw.to_string();
    }

    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {
            url.to_string()
        }
        _ => "/".to_string(),
    }
}
