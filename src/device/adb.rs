//! adb-backed device commands

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::DeviceBridge;
use crate::host::{CommandExecutor, CommandResult};

const GET_TIMEOUT: &str = "shell settings get system screen_off_timeout";
const PUT_TIMEOUT: &str = "shell settings put system screen_off_timeout";
const READ_DREAM: &str = "shell \"settings get secure screensaver_enabled; \
settings get secure screensaver_activate_on_sleep; \
settings get secure screensaver_activate_on_dock; \
settings get secure screensaver_components\"";
const ENABLE_DREAM: &str = "shell \"settings put secure screensaver_enabled 1; \
settings put secure screensaver_activate_on_sleep 1; \
settings put secure screensaver_activate_on_dock 1\"";
const SET_COMPONENT: &str = "shell settings put secure screensaver_components \
com.amazon.bueller.photos/.daydream.ScreenSaverService";

/// Device commands issued through an adb executable
#[derive(Clone)]
pub struct AdbDevice {
    executor: Arc<dyn CommandExecutor>,
    timeout: Duration,
}

impl AdbDevice {
    pub fn new(executor: Arc<dyn CommandExecutor>, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    async fn run(&self, args: &str) -> CommandResult {
        self.executor.run(args, self.timeout).await
    }
}

#[async_trait]
impl DeviceBridge for AdbDevice {
    async fn connect(&self, address: &str) -> CommandResult {
        self.run(&format!("connect {}", address)).await
    }

    async fn get_timeout(&self) -> CommandResult {
        self.run(GET_TIMEOUT).await
    }

    async fn set_timeout(&self, ms: u32) -> CommandResult {
        self.run(&format!("{} {}", PUT_TIMEOUT, ms)).await
    }

    async fn diagnostics(&self) -> CommandResult {
        self.run(READ_DREAM).await
    }

    async fn enable_dream(&self) -> CommandResult {
        self.run(ENABLE_DREAM).await
    }

    async fn set_screensaver_component(&self) -> CommandResult {
        self.run(SET_COMPONENT).await
    }
}
