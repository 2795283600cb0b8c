//! Command-line interface

pub mod check;
pub mod diagnostics;
pub mod start;
pub mod stop;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::control::ControlFiles;
use crate::host::ToolConfig;
use crate::settings::SettingsStore;

/// Process exit codes
pub mod exit_codes {
    /// Graceful stop or successful command
    pub const SUCCESS: i32 = 0;
    /// Anything not covered below, including a faulted loop
    pub const UNEXPECTED_FAILURE: i32 = 1;
    /// Bad address, port, interval or timeout
    pub const VALIDATION_FAILED: i32 = 2;
    /// adb or its companion files are missing
    pub const TOOL_MISSING: i32 = 3;
}

#[derive(Debug, Parser)]
#[command(name = "screensaver-enforcer", version, about)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Settings file
    #[arg(long, global = true, env = "ENFORCER_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Directory containing the adb executable
    #[arg(long, global = true, env = "ENFORCER_TOOL_DIR")]
    pub tool_dir: Option<PathBuf>,

    /// Per-command timeout in seconds
    #[arg(long, global = true, default_value_t = 30)]
    pub command_timeout: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the enforcement loop until stopped
    Start(start::StartArgs),
    /// Ask a running `start` to stop
    Stop,
    /// Check that the adb files are in place
    Check,
    /// Show the device's screensaver settings
    Diagnostics(DeviceArgs),
    /// Turn on the screensaver and set its component when missing
    EnableScreensaver(DeviceArgs),
}

/// Options for one-shot device commands
#[derive(Debug, Args)]
pub struct DeviceArgs {
    /// Device as HOST:PORT (defaults to the saved address)
    #[arg(long)]
    pub address: Option<String>,
}

/// Paths and collaborators resolved from global flags
#[derive(Debug, Clone)]
pub struct AppContext {
    pub settings: SettingsStore,
    pub tools: ToolConfig,
    pub control: ControlFiles,
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Self {
        let settings = SettingsStore::new(
            cli.settings
                .clone()
                .unwrap_or_else(SettingsStore::default_path),
        );
        let tools = ToolConfig::new(
            cli.tool_dir
                .clone()
                .unwrap_or_else(ToolConfig::default_tool_dir),
        )
        .with_command_timeout(Duration::from_secs(cli.command_timeout.max(1)));
        let control_dir = settings
            .path()
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            settings,
            tools,
            control: ControlFiles::new(control_dir),
        }
    }
}

/// Split `HOST[:PORT]`, defaulting the port
pub fn split_address(address: &str) -> (String, String) {
    crate::settings::Settings {
        device_address: address.to_string(),
        ..Default::default()
    }
    .host_and_port()
}
