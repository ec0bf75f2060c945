use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reftrack_core::MAX_ATTEMPTS;
use reftrack_tracker::{StaticVersionInfo, TrackerSettings};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub endpoint: EndpointConfig,
    pub referrer: ReferrerConfig,
    pub retry: RetryConfig,
    pub scheduling: SchedulingConfig,
    pub connectivity: ConnectivityConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub app_id: String,
    pub app_version: String,
    pub platform_capability: u32,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_os_release")]
    pub os_release: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    pub conversion_param: String,
    pub app_id_param: String,
    pub user_agent_prefix: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReferrerConfig {
    pub conversion_id_param: String,
    pub source_param: String,
    pub source_value: String,
    /// Names of the handlers the primary receiver forwards every broadcast to.
    #[serde(default)]
    pub forward_handlers: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delegated_base_interval_ms: u64,
    pub delegated_max_backoff_secs: u64,
    /// Runs after which the in-process task queue drops a job; 0 = never.
    #[serde(default)]
    pub delegated_max_runs: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Capability level from which the host task queue is used.
    pub delegated_min_capability: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    pub sysfs_root: String,
    pub poll_interval_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: "info".to_string() }
    }
}

fn default_device() -> String {
    std::env::consts::ARCH.to_string()
}

fn default_os_release() -> String {
    std::env::consts::OS.to_string()
}

impl Config {
    pub fn default_for_app(app_id: &str) -> Self {
        let tracker = TrackerSettings::default();
        Self {
            app: AppConfig {
                app_id: app_id.to_string(),
                app_version: "unknown".to_string(),
                platform_capability: 21,
                device: default_device(),
                os_release: default_os_release(),
            },
            endpoint: EndpointConfig {
                url: tracker.endpoint_url,
                conversion_param: tracker.conversion_param,
                app_id_param: tracker.app_id_param,
                user_agent_prefix: tracker.user_agent_prefix,
                timeout_secs: 10,
            },
            referrer: ReferrerConfig {
                conversion_id_param: tracker.referrer_conversion_param,
                source_param: "utm_source".to_string(),
                source_value: "xing".to_string(),
                forward_handlers: Vec::new(),
            },
            retry: RetryConfig {
                max_attempts: MAX_ATTEMPTS,
                delegated_base_interval_ms: 1000,
                delegated_max_backoff_secs: 5 * 60 * 60,
                delegated_max_runs: 20,
            },
            scheduling: SchedulingConfig { delegated_min_capability: 21 },
            connectivity: ConnectivityConfig {
                sysfs_root: "/sys/class/net".to_string(),
                poll_interval_ms: 1000,
            },
            storage: StorageConfig { db_path: ".reftrack/reftrack.db".to_string() },
            logging: LoggingConfig::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| "parse reftrack.toml")?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Load the config under `root`, writing defaults on first use.
    pub fn load_or_init(root: &Path) -> Result<Self> {
        let path = Self::config_path(root);
        if path.exists() {
            return Self::load_from(&path);
        }
        let app_id = root.file_name().and_then(|s| s.to_str()).unwrap_or("app");
        let cfg = Self::default_for_app(app_id);
        cfg.save_to(&path)?;
        Ok(cfg)
    }

    pub fn config_path(root: &Path) -> PathBuf {
        root.join(".reftrack").join("reftrack.toml")
    }

    /// Database path; `~` is expanded and relative paths hang off `root`.
    pub fn db_path(&self, root: &Path) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(&self.storage.db_path).to_string());
        if expanded.is_absolute() {
            expanded
        } else {
            root.join(expanded)
        }
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            endpoint_url: self.endpoint.url.clone(),
            conversion_param: self.endpoint.conversion_param.clone(),
            app_id_param: self.endpoint.app_id_param.clone(),
            referrer_conversion_param: self.referrer.conversion_id_param.clone(),
            user_agent_prefix: self.endpoint.user_agent_prefix.clone(),
        }
    }

    pub fn version_info(&self) -> StaticVersionInfo {
        StaticVersionInfo {
            app_id: self.app.app_id.clone(),
            app_version: self.app.app_version.clone(),
            platform_capability: self.app.platform_capability,
            device: self.app.device.clone(),
            os_release: self.app.os_release.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.endpoint.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.connectivity.poll_interval_ms.max(10))
    }
}
