use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse data file options: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid data file options: {0}")]
    Invalid(String),
}

/// Per-data-file update behaviour.
///
/// Intervals are whole minutes. Options can be built in code through the
/// `#[must_use]` setters or read from TOML with [`DataFileOptions::from_toml_str`];
/// every field except `identifier`, `update_url` and `path` has a default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DataFileOptions {
    pub identifier: String,
    pub update_url: String,
    pub path:       PathBuf,

    #[serde(default = "default_temp_data_directory")]
    pub temp_data_directory: PathBuf,

    #[serde(default = "enabled")]
    pub verify_if_modified_since: bool,
    #[serde(default = "enabled")]
    pub verify_md5: bool,
    #[serde(default)]
    pub decompress: bool,
    #[serde(default)]
    pub update_on_start: bool,
    #[serde(default = "enabled")]
    pub auto_update: bool,
    #[serde(default)]
    pub file_system_watcher: bool,

    #[serde(default = "default_polling_interval")]
    pub polling_interval: u64,
    #[serde(default = "default_maximum_randomisation")]
    pub update_time_maximum_randomisation: u64,
}

fn enabled() -> bool { true }

fn default_temp_data_directory() -> PathBuf { std::env::temp_dir() }

fn default_polling_interval() -> u64 { 30 }

fn default_maximum_randomisation() -> u64 { 10 }

impl DataFileOptions {
    pub fn new(
        identifier: impl Into<String>,
        update_url: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            identifier:                        identifier.into(),
            update_url:                        update_url.into(),
            path:                              path.into(),
            temp_data_directory:               default_temp_data_directory(),
            verify_if_modified_since:          true,
            verify_md5:                        true,
            decompress:                        false,
            update_on_start:                   false,
            auto_update:                       true,
            file_system_watcher:               false,
            polling_interval:                  default_polling_interval(),
            update_time_maximum_randomisation: default_maximum_randomisation(),
        }
    }

    /// Parse and validate options from a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let options: Self = toml::from_str(input)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identifier.trim().is_empty() {
            return Err(ConfigError::Invalid("identifier is empty".to_string()));
        }
        if self.update_url.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "update_url is empty for '{}'",
                self.identifier
            )));
        }
        if self.path.file_name().is_none() {
            return Err(ConfigError::Invalid(format!(
                "path '{}' does not name a file",
                self.path.display()
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn temp_data_directory(mut self, dir: impl AsRef<Path>) -> Self {
        self.temp_data_directory = dir.as_ref().to_path_buf();
        self
    }

    #[must_use]
    pub fn verify_if_modified_since(mut self, enabled: bool) -> Self {
        self.verify_if_modified_since = enabled;
        self
    }

    #[must_use]
    pub fn verify_md5(mut self, enabled: bool) -> Self {
        self.verify_md5 = enabled;
        self
    }

    #[must_use]
    pub fn decompress(mut self, enabled: bool) -> Self {
        self.decompress = enabled;
        self
    }

    #[must_use]
    pub fn update_on_start(mut self, enabled: bool) -> Self {
        self.update_on_start = enabled;
        self
    }

    #[must_use]
    pub fn auto_update(mut self, enabled: bool) -> Self {
        self.auto_update = enabled;
        self
    }

    #[must_use]
    pub fn file_system_watcher(mut self, enabled: bool) -> Self {
        self.file_system_watcher = enabled;
        self
    }

    #[must_use]
    pub fn polling_interval(mut self, minutes: u64) -> Self {
        self.polling_interval = minutes;
        self
    }

    #[must_use]
    pub fn update_time_maximum_randomisation(mut self, minutes: u64) -> Self {
        self.update_time_maximum_randomisation = minutes;
        self
    }
}

/// Service-wide tuning shared by every registered data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Delay between checks for a watched path that does not exist yet.
    pub watch_retry_interval: Duration,
    /// Give up waiting for a watched path after this many checks.
    pub watch_retry_limit:    Option<u32>,
    /// Quiet period that closes a burst of file system events.
    pub watch_debounce:       Duration,
    /// Whole-request timeout for the production HTTP client.
    pub request_timeout:      Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            watch_retry_interval: Duration::from_millis(500),
            watch_retry_limit:    None,
            watch_debounce:       Duration::from_millis(200),
            request_timeout:      Duration::from_secs(300),
        }
    }
}

impl ServiceConfig {
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn watch_retry_interval(mut self, interval: Duration) -> Self {
        self.watch_retry_interval = interval;
        self
    }

    #[must_use]
    pub fn watch_retry_limit(mut self, limit: Option<u32>) -> Self {
        self.watch_retry_limit = limit;
        self
    }

    #[must_use]
    pub fn watch_debounce(mut self, debounce: Duration) -> Self {
        self.watch_debounce = debounce;
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
