use url::Url;

use crate::application::links::{LinkError, LinkResolver};
use crate::domain::types::TrackingKind;

/// Builds public links under a fixed base URL.
#[derive(Debug, Clone)]
pub struct BaseUrlLinkResolver {
    base: Url,
}

impl BaseUrlLinkResolver {
    pub fn new(base: Url) -> Self {
        Self { base }
    }
}

impl LinkResolver for BaseUrlLinkResolver {
    fn confirmation_link(&self, token: &str) -> Result<String, LinkError> {
        let mut url = self.base.join("confirm")?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url.into())
    }

    fn tracking_link(
        &self,
        kind: TrackingKind,
        step_id: i64,
        enrollment_id: i64,
    ) -> Result<String, LinkError> {
        let mut url = self.base.join(&format!("track/{}", kind.as_str()))?;
        url.query_pairs_mut()
            .append_pair("step", &step_id.to_string())
            .append_pair("enrollment", &enrollment_id.to_string());
        Ok(url.into())
    }
}
