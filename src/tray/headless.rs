//! Tray backend for platforms without a notification area integration.
//!
//! Keeps the bridge lifecycle intact and records tooltip changes in the log.

use super::bridge::{TrayBackend, TrayError, TrayGesture};

pub struct HeadlessTray {
    tooltip: String,
}

impl HeadlessTray {
    pub fn create(tooltip: &str) -> Result<Box<dyn TrayBackend>, TrayError> {
        tracing::info!(target: "tray", "Tray: {}", tooltip);
        Ok(Box::new(Self {
            tooltip: tooltip.to_string(),
        }))
    }
}

impl TrayBackend for HeadlessTray {
    fn set_tooltip(&mut self, text: &str) {
        if text != self.tooltip {
            tracing::info!(target: "tray", "Tray: {}", text);
            self.tooltip = text.to_string();
        }
    }

    fn pump(&mut self) -> Vec<TrayGesture> {
        Vec::new()
    }

    fn remove(&mut self) {
        tracing::debug!(target: "tray", "Tray removed");
    }
}
