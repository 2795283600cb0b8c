//! Host module for process management and command execution

pub mod command_runner;

pub use command_runner::{
    CommandExecutor, CommandResult, CommandRunner, ToolConfig, ToolError,
};
