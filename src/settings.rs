//! Persisted settings
//!
//! Stored as pretty-printed camelCase JSON. Loading and saving never fail
//! outward: a missing or corrupt file yields defaults, and a failed write is
//! only logged.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_ADDRESS: &str = "192.168.1.50:5555";
pub const DEFAULT_PORT: u16 = 5555;
pub const DEFAULT_INTERVAL_SECS: u32 = 30;
pub const MIN_INTERVAL_SECS: u32 = 10;
pub const MAX_INTERVAL_SECS: u32 = 600;
/// Screen-off timeouts the app is willing to enforce
pub const ALLOWED_TIMEOUTS_MS: [u32; 2] = [30_000, 60_000];
pub const DEFAULT_TIMEOUT_MS: u32 = 60_000;

/// User settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Device target as `host:port`
    #[serde(alias = "firestickIp")]
    pub device_address: String,
    /// Seconds between enforcement checks
    pub interval_seconds: u32,
    /// Screen-off timeout to enforce, in milliseconds
    pub timeout_ms: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_address: DEFAULT_ADDRESS.to_string(),
            interval_seconds: DEFAULT_INTERVAL_SECS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl Settings {
    /// Split the stored address into host and port.
    ///
    /// An address without a port gets the default adb port.
    pub fn host_and_port(&self) -> (String, String) {
        match self.device_address.trim().rsplit_once(':') {
            Some((host, port)) => (host.trim().to_string(), port.trim().to_string()),
            None => (
                self.device_address.trim().to_string(),
                DEFAULT_PORT.to_string(),
            ),
        }
    }

    /// Validate into an immutable snapshot for one loop run
    pub fn plan(&self) -> Result<EnforcementPlan, ValidationError> {
        let (host, port) = self.host_and_port();
        EnforcementPlan::new(&host, &port, self.interval_seconds, self.timeout_ms)
    }
}

/// Rejected user input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please enter a Fire TV IP address.")]
    EmptyHost,
    #[error("Please enter a valid port (1-65535), got '{0}'.")]
    InvalidPort(String),
    #[error("Interval must be between 10 and 600 seconds, got {0}.")]
    IntervalOutOfRange(u32),
    #[error("Timeout must be 30000 or 60000 ms, got {0}.")]
    UnsupportedTimeout(u32),
}

/// Validate host and port into `host:port`
pub fn device_address(host: &str, port: &str) -> Result<String, ValidationError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(ValidationError::EmptyHost);
    }

    let port = port.trim();
    match port.parse::<u32>() {
        Ok(p) if (1..=65535).contains(&p) => Ok(format!("{}:{}", host, port)),
        _ => Err(ValidationError::InvalidPort(port.to_string())),
    }
}

/// Validated snapshot the enforcement loop runs against.
///
/// The loop never sees later settings changes; restarting picks them up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnforcementPlan {
    pub address: String,
    pub interval: Duration,
    pub target_ms: u32,
}

impl EnforcementPlan {
    pub fn new(
        host: &str,
        port: &str,
        interval_seconds: u32,
        target_ms: u32,
    ) -> Result<Self, ValidationError> {
        let address = device_address(host, port)?;

        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&interval_seconds) {
            return Err(ValidationError::IntervalOutOfRange(interval_seconds));
        }

        if !ALLOWED_TIMEOUTS_MS.contains(&target_ms) {
            return Err(ValidationError::UnsupportedTimeout(target_ms));
        }

        Ok(Self {
            address,
            interval: Duration::from_secs(u64::from(interval_seconds)),
            target_ms,
        })
    }

    /// Settings record matching this plan
    pub fn to_settings(&self) -> Settings {
        Settings {
            device_address: self.address.clone(),
            interval_seconds: self.interval.as_secs() as u32,
            timeout_ms: self.target_ms,
        }
    }
}

/// Loads and saves [`Settings`] at a fixed path
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/screensaver-enforcer/settings.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("screensaver-enforcer")
            .join("settings.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, falling back to defaults on any error
    pub fn load(&self) -> Settings {
        match self.try_load() {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!("Using default settings: {}", e);
                Settings::default()
            }
        }
    }

    /// Save settings; failures are logged and otherwise ignored
    pub fn save(&self, settings: &Settings) {
        if let Err(e) = self.try_save(settings) {
            tracing::debug!("Failed to save settings to {}: {}", self.path.display(), e);
        }
    }

    fn try_load(&self) -> Result<Settings, SettingsError> {
        let json = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn try_save(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}

#[derive(Debug, thiserror::Error)]
enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}
