//! Device commands
//!
//! The handful of adb operations this app needs, expressed as a trait so the
//! enforcement loop can be driven against a fake device in tests.

mod adb;

use async_trait::async_trait;

use crate::host::CommandResult;

pub use adb::AdbDevice;

/// Semantic operations against one device target.
///
/// None of these retry; retry policy belongs to the caller.
#[async_trait]
pub trait DeviceBridge: Send + Sync {
    /// Connect to `address` (already `host:port`)
    async fn connect(&self, address: &str) -> CommandResult;

    /// Read `screen_off_timeout`; parse with [`TimeoutReading::parse`]
    async fn get_timeout(&self) -> CommandResult;

    /// Write `screen_off_timeout`
    async fn set_timeout(&self, ms: u32) -> CommandResult;

    /// Read the screensaver secure settings in one invocation
    async fn diagnostics(&self) -> CommandResult;

    /// Turn on the screensaver flags in one invocation
    async fn enable_dream(&self) -> CommandResult;

    /// Point the screensaver at the stock photos component
    async fn set_screensaver_component(&self) -> CommandResult;
}

/// Outcome of parsing a `get_timeout` reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutReading {
    /// Milliseconds reported by the device
    Value(i64),
    /// Command succeeded but the output is not an integer (`null`, empty, ...)
    Unparseable(String),
}

impl TimeoutReading {
    pub fn parse(stdout: &str) -> Self {
        let trimmed = stdout.trim();
        match trimmed.parse::<i64>() {
            Ok(ms) => TimeoutReading::Value(ms),
            Err(_) => TimeoutReading::Unparseable(trimmed.to_string()),
        }
    }
}

/// How the device answered a connect request. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    AlreadyConnected,
    Connected,
    Unrecognized,
}

impl ConnectStatus {
    pub fn classify(output: &str) -> Self {
        let lower = output.to_lowercase();
        if lower.contains("already") {
            ConnectStatus::AlreadyConnected
        } else if lower.contains("connected") {
            ConnectStatus::Connected
        } else {
            ConnectStatus::Unrecognized
        }
    }
}

/// Screensaver ("Dream") secure settings, in query order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DreamSettings {
    pub screensaver_enabled: String,
    pub activate_on_sleep: String,
    pub activate_on_dock: String,
    pub screensaver_components: String,
}

impl DreamSettings {
    /// Map output line *n* to field *n*; missing lines leave fields empty
    pub fn from_output(stdout: &str) -> Self {
        let mut lines = stdout.split('\n').map(|l| l.trim().to_string());
        Self {
            screensaver_enabled: lines.next().unwrap_or_default(),
            activate_on_sleep: lines.next().unwrap_or_default(),
            activate_on_dock: lines.next().unwrap_or_default(),
            screensaver_components: lines.next().unwrap_or_default(),
        }
    }

    /// Component is unset on the device
    pub fn component_missing(&self) -> bool {
        self.screensaver_components.is_empty() || self.screensaver_components == "null"
    }

    /// Labelled rows for display
    pub fn rows(&self) -> [(&'static str, &str); 4] {
        [
            ("screensaver_enabled", &self.screensaver_enabled),
            ("screensaver_activate_on_sleep", &self.activate_on_sleep),
            ("screensaver_activate_on_dock", &self.activate_on_dock),
            ("screensaver_components", &self.screensaver_components),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_reading_parse() {
        assert_eq!(TimeoutReading::parse("60000"), TimeoutReading::Value(60000));
        assert_eq!(TimeoutReading::parse(" 30000\r\n"), TimeoutReading::Value(30000));
        assert_eq!(TimeoutReading::parse(""), TimeoutReading::Unparseable(String::new()));
        assert_eq!(
            TimeoutReading::parse("null"),
            TimeoutReading::Unparseable("null".into())
        );
        assert!(matches!(
            TimeoutReading::parse("60 seconds"),
            TimeoutReading::Unparseable(_)
        ));
    }

    #[test]
    fn test_connect_status_classify() {
        assert_eq!(
            ConnectStatus::classify("already connected to 10.0.0.5:5555"),
            ConnectStatus::AlreadyConnected
        );
        assert_eq!(
            ConnectStatus::classify("Connected to 10.0.0.5:5555"),
            ConnectStatus::Connected
        );
        assert_eq!(
            ConnectStatus::classify("failed to authenticate"),
            ConnectStatus::Unrecognized
        );
    }

    #[test]
    fn test_dream_settings_short_output() {
        let dream = DreamSettings::from_output("1\n0");
        assert_eq!(dream.screensaver_enabled, "1");
        assert_eq!(dream.activate_on_sleep, "0");
        assert_eq!(dream.activate_on_dock, "");
        assert!(dream.component_missing());

        let dream = DreamSettings::from_output("1\r\n1\r\n1\r\ncom.example/.Saver");
        assert_eq!(dream.screensaver_components, "com.example/.Saver");
        assert!(!dream.component_missing());
    }
}
