use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;
use crate::queue::RateLimitConfig;
use crate::types::Result;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Approval profile configuration
    #[serde(default)]
    pub approver: ApproverSettings,

    /// Reconciler and work queue configuration
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Request store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// HTTP endpoint configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Name recorded in decision messages and logs
    pub component_name: String,

    /// Log level
    pub log_level: String,

    /// Emit JSON log lines
    pub structured_logging: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            component_name: "csr-approver".to_string(),
            log_level: "info".to_string(),
            structured_logging: false,
        }
    }
}

/// Approval profile configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApproverSettings {
    /// YAML document with the approval profiles. Without one no profile
    /// exists and every request is denied.
    pub profiles_path: Option<PathBuf>,
}

/// Reconciler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Number of parallel workers
    pub workers: usize,

    /// Requeues before an item is dropped (0 = retry forever)
    pub max_retries: u32,

    /// How often the request store is polled for changes
    pub poll_interval_secs: u64,

    /// How often every request is re-queued regardless of changes
    pub resync_interval_secs: u64,

    /// First retry delay
    pub base_delay_ms: u64,

    /// Longest retry delay
    pub max_delay_secs: u64,

    /// Overall retry rate
    pub qps: f64,

    /// Overall retry burst
    pub burst: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            max_retries: 10,
            poll_interval_secs: 5,
            resync_interval_secs: 600,
            base_delay_ms: 5,
            max_delay_secs: 1000,
            qps: 10.0,
            burst: 100,
        }
    }
}

impl ControllerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    /// Work queue backoff parameters
    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_secs(self.max_delay_secs),
            qps: self.qps,
            burst: self.burst,
        }
    }
}

/// Request store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one JSON document per request
    pub requests_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            requests_dir: PathBuf::from("./data/requests"),
        }
    }
}

/// HTTP endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Serve health, readiness and metrics
    pub enabled: bool,

    /// Listen address
    pub listen_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl Settings {
    /// Load configuration from environment variables and configuration files
    pub fn load() -> Result<Self> {
        use std::env;

        match env::var("CONFIG_FILE") {
            Ok(config_path) => Self::load_from(Some(Path::new(&config_path))),
            Err(_) => Self::load_from(None),
        }
    }

    /// Load defaults, then `path` (or the default locations), then `CSRA__*`
    /// environment variables
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        use config::{Config, Environment, File};
        use std::env;

        let mut builder = Config::builder();

        // Add default values
        builder = builder.add_source(Config::try_from(&Self::default())?);

        // Add configuration from files
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        } else {
            builder = builder.add_source(File::with_name("config/default").required(false));

            let env = env::var("APP_ENV").unwrap_or_else(|_| "development".into());
            builder = builder.add_source(File::with_name(&format!("config/{}", env)).required(false));
        }

        // Add environment variables
        builder = builder.add_source(Environment::with_prefix("CSRA").separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    /// Check if configuration is valid
    pub fn validate(&self) -> Result<()> {
        if self.general.component_name.is_empty() {
            return Err(Error::Config("Component name cannot be empty".into()));
        }

        if self.controller.workers == 0 {
            return Err(Error::Config("At least one worker is required".into()));
        }

        if self.controller.poll_interval_secs == 0 {
            return Err(Error::Config("Poll interval cannot be zero".into()));
        }

        if !(self.controller.qps > 0.0) {
            return Err(Error::Config("Retry qps must be positive".into()));
        }

        if self.controller.burst == 0 {
            return Err(Error::Config("Retry burst cannot be zero".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.controller.workers, 1);
        assert_eq!(settings.controller.max_retries, 10);
        assert!(settings.approver.profiles_path.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("approver.yaml");

        let config_content = r#"
general:
  component_name: "test-approver"
  log_level: "debug"
  structured_logging: true
approver:
  profiles_path: "/etc/csr-approver/profiles.yaml"
controller:
  workers: 4
  max_retries: 3
  poll_interval_secs: 1
  resync_interval_secs: 60
  base_delay_ms: 10
  max_delay_secs: 30
  qps: 5.0
  burst: 20
store:
  requests_dir: "/var/lib/csr-approver"
api:
  enabled: false
  listen_addr: "127.0.0.1:9443"
"#;

        let mut file = File::create(&config_path).unwrap();
        file.write_all(config_content.as_bytes()).unwrap();

        let settings = Settings::load_from(Some(&config_path)).unwrap();
        assert_eq!(settings.general.component_name, "test-approver");
        assert!(settings.general.structured_logging);
        assert_eq!(
            settings.approver.profiles_path,
            Some(PathBuf::from("/etc/csr-approver/profiles.yaml"))
        );
        assert_eq!(settings.controller.workers, 4);
        assert_eq!(settings.controller.rate_limit().base_delay, Duration::from_millis(10));
        assert_eq!(settings.controller.resync_interval(), Duration::from_secs(60));
        assert!(!settings.api.enabled);
        assert_eq!(settings.api.listen_addr.to_string(), "127.0.0.1:9443");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("partial.yaml");
        std::fs::write(&config_path, "controller:\n  workers: 2\n").unwrap();

        let settings = Settings::load_from(Some(&config_path)).unwrap();
        assert_eq!(settings.controller.workers, 2);
        assert_eq!(settings.controller.max_retries, 10);
        assert_eq!(settings.general.component_name, "csr-approver");
    }

    #[test]
    fn test_rejects_zero_workers() {
        let mut settings = Settings::default();
        settings.controller.workers = 0;
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }
}
