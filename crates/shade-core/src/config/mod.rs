use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub recorder: RecorderConfig,

    #[serde(default)]
    pub dashboard: DashboardConfig,

    #[serde(default)]
    pub theme: ThemeConfig,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            recorder: RecorderConfig::default(),
            dashboard: DashboardConfig::default(),
            theme: ThemeConfig::default(),
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.recorder.validate()?;
        if self.dashboard.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "dashboard.poll_interval_ms must be > 0".to_string(),
            ));
        }
        let keys = [
            &self.recorder.consent_key,
            &self.recorder.events_key,
            &self.theme.storage_key,
        ];
        for (i, a) in keys.iter().enumerate() {
            if a.is_empty() {
                return Err(ConfigError::ValidationError(
                    "storage keys cannot be empty".to_string(),
                ));
            }
            if keys[i + 1..].contains(a) {
                return Err(ConfigError::ValidationError(format!(
                    "storage key '{a}' is used twice"
                )));
            }
        }
        Ok(())
    }
}

/// Recorder retention and persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    #[serde(default = "default_max_events")]
    pub max_events: usize,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_consent_key")]
    pub consent_key: String,
    #[serde(default = "default_events_key")]
    pub events_key: String,
}

fn default_max_events() -> usize {
    1000
}
fn default_retention_days() -> u32 {
    30
}
fn default_flush_interval_ms() -> u64 {
    30_000
}
fn default_consent_key() -> String {
    "analytics-consent".to_string()
}
fn default_events_key() -> String {
    "analytics-events".to_string()
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_events: default_max_events(),
            retention_days: default_retention_days(),
            flush_interval_ms: default_flush_interval_ms(),
            consent_key: default_consent_key(),
            events_key: default_events_key(),
        }
    }
}

/// Longest accepted periodic flush interval: one day.
pub const MAX_FLUSH_INTERVAL_MS: u64 = 24 * 60 * 60 * 1000;

impl RecorderConfig {
    /// Retention window in milliseconds.
    pub fn retention_ms(&self) -> i64 {
        i64::from(self.retention_days) * 24 * 60 * 60 * 1000
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_events == 0 {
            return Err(ConfigError::ValidationError(
                "recorder.max_events must be > 0".to_string(),
            ));
        }
        if self.retention_days == 0 {
            return Err(ConfigError::ValidationError(
                "recorder.retention_days must be > 0".to_string(),
            ));
        }
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "recorder.flush_interval_ms must be > 0".to_string(),
            ));
        }
        if self.flush_interval_ms > MAX_FLUSH_INTERVAL_MS {
            return Err(ConfigError::ValidationError(format!(
                "recorder.flush_interval_ms must be <= {MAX_FLUSH_INTERVAL_MS}"
            )));
        }
        if self.consent_key == self.events_key {
            return Err(ConfigError::ValidationError(
                "recorder.consent_key and recorder.events_key must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for dashboard-style consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Fallback refresh interval when not subscribed to notifications.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_top_events")]
    pub top_events: usize,
}

fn default_poll_interval_ms() -> u64 {
    10_000
}
fn default_top_events() -> usize {
    5
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            top_events: default_top_events(),
        }
    }
}

/// Theme preference persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeConfig {
    #[serde(default = "default_theme_key")]
    pub storage_key: String,
}

fn default_theme_key() -> String {
    "theme-preference".to_string()
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            storage_key: default_theme_key(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    ParseError(String),
    #[error("failed to serialize config: {0}")]
    SerializeError(String),
    #[error("config validation failed: {0}")]
    ValidationError(String),
}
