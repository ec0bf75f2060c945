use std::sync::Arc;

use reftrack_core::{Referrer, ResultCode};
use url::Url;

use crate::types::{HttpTransport, TrackerClient, VersionInfo};

/// Endpoint and parameter names used to build the attribution request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackerSettings {
    pub endpoint_url: String,
    /// Query parameter carrying the conversion id on the endpoint.
    pub conversion_param: String,
    pub app_id_param: String,
    /// Referrer key holding the conversion id.
    pub referrer_conversion_param: String,
    pub user_agent_prefix: String,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            endpoint_url: "https://xing.com/rest/xas/ads/install".to_string(),
            conversion_param: "googleadid".to_string(),
            app_id_param: "appid".to_string(),
            referrer_conversion_param: "xing_conversion_id".to_string(),
            user_agent_prefix: "XING-TRACK-ANDROID/".to_string(),
        }
    }
}

/// Tracker client calling the install attribution endpoint over HTTP.
pub struct InstallTracker {
    settings: TrackerSettings,
    version: Arc<dyn VersionInfo>,
    transport: Arc<dyn HttpTransport>,
}

impl InstallTracker {
    pub fn new(settings: TrackerSettings, version: Arc<dyn VersionInfo>, transport: Arc<dyn HttpTransport>) -> Self {
        Self { settings, version, transport }
    }

    pub fn build_url(&self, referrer: &str) -> Result<String, url::ParseError> {
        let conversion_id = Referrer::new(referrer)
            .param(&self.settings.referrer_conversion_param)
            .unwrap_or_default();
        let mut url = Url::parse(&self.settings.endpoint_url)?;
        url.query_pairs_mut()
            .append_pair(&self.settings.conversion_param, &conversion_id)
            .append_pair(&self.settings.app_id_param, &self.version.app_id());
        Ok(url.into())
    }

    pub fn user_agent(&self) -> String {
        format!(
            "{}{} Device/{} OS Version/{}",
            self.settings.user_agent_prefix,
            self.version.app_version(),
            self.version.device(),
            self.version.os_release()
        )
    }
}

impl TrackerClient for InstallTracker {
    fn attempt(&self, referrer: &str) -> ResultCode {
        tracing::info!(app_id = %self.version.app_id(), "tracking app install");
        let url = match self.build_url(referrer) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("cannot build tracking url: {e}");
                return ResultCode::FailedUnrecoverable;
            }
        };
        let headers = vec![("User-Agent".to_string(), self.user_agent())];

        match self.transport.get(&url, &headers) {
            Ok(200) => {
                tracing::info!("tracking call succeeded");
                ResultCode::Success
            }
            Ok(status) => {
                tracing::warn!("tracking endpoint answered {status}");
                ResultCode::FailedServerResponse
            }
            Err(e) if e.is_unrecoverable() => {
                tracing::warn!("tracking call cannot succeed: {e}");
                ResultCode::FailedUnrecoverable
            }
            Err(e) => {
                tracing::warn!("tracking call failed: {e}");
                ResultCode::FailedServerResponse
            }
        }
    }
}
