use reftrack_core::ResultCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("http client could not be built: {0}")]
    Build(String),
    #[error("request failed: {0}")]
    Io(String),
}

impl TransportError {
    /// Construction problems cannot be fixed by retrying.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, TransportError::InvalidUrl { .. } | TransportError::Build(_))
    }
}

/// Outbound HTTP capability. One call is one round trip.
pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<u16, TransportError>;
}

/// Application and platform identity.
pub trait VersionInfo: Send + Sync {
    fn app_id(&self) -> String;
    fn app_version(&self) -> String;
    /// Host capability level; decides between delegated and self-managed scheduling.
    fn platform_capability(&self) -> u32;
    fn device(&self) -> String;
    fn os_release(&self) -> String;
}

/// Performs one attribution call. Never fails: every problem becomes a `ResultCode`.
pub trait TrackerClient: Send + Sync {
    fn attempt(&self, referrer: &str) -> ResultCode;
}

/// Identity taken verbatim from configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticVersionInfo {
    pub app_id: String,
    pub app_version: String,
    pub platform_capability: u32,
    pub device: String,
    pub os_release: String,
}

impl VersionInfo for StaticVersionInfo {
    fn app_id(&self) -> String {
        self.app_id.clone()
    }

    fn app_version(&self) -> String {
        self.app_version.clone()
    }

    fn platform_capability(&self) -> u32 {
        self.platform_capability
    }

    fn device(&self) -> String {
        self.device.clone()
    }

    fn os_release(&self) -> String {
        self.os_release.clone()
    }
}
