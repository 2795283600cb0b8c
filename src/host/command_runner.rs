//! Command Runner
//!
//! Executes the bundled adb client with output capture.
//! Every invocation spawns one process from the tool directory, waits for it
//! with a wall-clock timeout and returns a [`CommandResult`]. Running a
//! command never fails outward: spawn errors and timeouts are folded into
//! an unsuccessful result with exit code `-1`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Default per-command timeout
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Where platform-tools can be downloaded from
pub const DOWNLOAD_HINT: &str = "https://developer.android.com/studio/releases/platform-tools";

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Location of the adb client and the files it needs next to it
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Directory holding the executable; also the child's working directory
    pub tool_dir: PathBuf,
    /// File name of the executable inside `tool_dir`
    pub executable: String,
    /// Shared libraries that must sit next to the executable
    pub companions: Vec<String>,
    /// Timeout applied by the device layer to each command
    pub command_timeout: Duration,
}

impl ToolConfig {
    /// Tool config rooted at `tool_dir` with the platform's default file set
    pub fn new(tool_dir: impl Into<PathBuf>) -> Self {
        #[cfg(windows)]
        let (executable, companions) = (
            "adb.exe".to_string(),
            vec!["AdbWinApi.dll".to_string(), "AdbWinUsbApi.dll".to_string()],
        );
        #[cfg(not(windows))]
        let (executable, companions) = ("adb".to_string(), Vec::new());

        Self {
            tool_dir: tool_dir.into(),
            executable,
            companions,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// `platform-tools` next to the running executable
    pub fn default_tool_dir() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("platform-tools")
    }

    pub fn with_executable(mut self, name: impl Into<String>) -> Self {
        self.executable = name.into();
        self
    }

    pub fn with_companions(mut self, names: Vec<String>) -> Self {
        self.companions = names;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Full path of the executable
    pub fn executable_path(&self) -> PathBuf {
        self.tool_dir.join(&self.executable)
    }

    /// Check that the executable and its companions exist.
    ///
    /// Every missing file is reported at once.
    pub fn validate(&self) -> Result<(), ToolError> {
        let missing: Vec<String> = std::iter::once(&self.executable)
            .chain(self.companions.iter())
            .filter(|name| !self.tool_dir.join(name.as_str()).is_file())
            .cloned()
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            let mut required = vec![self.executable.clone()];
            required.extend(self.companions.iter().cloned());
            Err(ToolError::Missing {
                missing,
                required,
                dir: self.tool_dir.clone(),
            })
        }
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self::new(Self::default_tool_dir())
    }
}

/// Pre-flight failures for the tool directory
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    /// One or more required files are absent
    #[error(
        "Missing required files in platform-tools folder:\n  {}\n\n\
         Expected location: {}\n\n\
         Download platform-tools from:\n  {}\n\
         Then copy {} to the platform-tools folder.",
        .missing.join(", "),
        .dir.display(),
        DOWNLOAD_HINT,
        .required.join(", ")
    )]
    Missing {
        missing: Vec<String>,
        required: Vec<String>,
        dir: PathBuf,
    },
}

/// Result of running a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit code was zero
    pub success: bool,
    /// Captured stdout, trimmed
    pub stdout: String,
    /// Captured stderr, trimmed; for failures without stderr this carries
    /// the runner's own explanation
    pub stderr: String,
    /// Process exit code, `-1` when the process never produced one
    pub exit_code: i32,
}

impl CommandResult {
    /// Build a result from a finished process.
    ///
    /// Success depends on the exit code alone; adb prints informational
    /// text on stderr even when it succeeds.
    pub fn exited(exit_code: i32, stdout: &str, stderr: &str) -> Self {
        Self {
            success: exit_code == 0,
            stdout: stdout.trim().to_string(),
            stderr: stderr.trim().to_string(),
            exit_code,
        }
    }

    /// Unsuccessful result without a process exit code
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: message.into(),
            exit_code: -1,
        }
    }

    /// Best human-readable reason for a failure
    pub fn error_text(&self, fallback: &str) -> String {
        if !self.stderr.is_empty() {
            self.stderr.clone()
        } else if !self.stdout.is_empty() {
            self.stdout.clone()
        } else {
            fallback.to_string()
        }
    }
}

/// Something that can run one tool invocation
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, args: &str, timeout: Duration) -> CommandResult;
}

/// Command runner for the adb client
#[derive(Debug, Clone)]
pub struct CommandRunner {
    config: ToolConfig,
}

impl CommandRunner {
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    /// Run the executable with `args` and capture its output
    pub async fn run(&self, args: &str, timeout: Duration) -> CommandResult {
        let mut cmd = Command::new(self.config.executable_path());
        apply_args(&mut cmd, args);

        // Co-located DLLs resolve from the working directory
        cmd.current_dir(&self.config.tool_dir);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        tracing::debug!(args, "Running adb command");

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to launch adb");
                return CommandResult::failed(format!("Failed to execute ADB: {}", e));
            }
        };

        // Drain both pipes independently so neither can fill up and stall
        // the child
        let stdout_task = tokio::spawn(read_all(child.stdout.take()));
        let stderr_task = tokio::spawn(read_all(child.stderr.take()));
        let stdout_abort = stdout_task.abort_handle();
        let stderr_abort = stderr_task.abort_handle();

        let finished = tokio::time::timeout(timeout, async {
            let status = child.wait().await;
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            (status, stdout, stderr)
        })
        .await;

        match finished {
            Ok((Ok(status), stdout, stderr)) => {
                let exit_code = status.code().unwrap_or(-1);
                tracing::debug!(exit_code, "adb command finished");
                CommandResult::exited(exit_code, &stdout, &stderr)
            }
            Ok((Err(e), _, _)) => {
                CommandResult::failed(format!("Failed to execute ADB: {}", e))
            }
            Err(_) => {
                // Pipes may be held open by grandchildren; stop waiting on them
                stdout_abort.abort();
                stderr_abort.abort();
                let _ = child.kill().await;
                tracing::debug!(args, "adb command timed out, process killed");
                CommandResult::failed(format!(
                    "Command timed out after {} seconds",
                    timeout.as_secs_f64()
                ))
            }
        }
    }
}

#[async_trait]
impl CommandExecutor for CommandRunner {
    async fn run(&self, args: &str, timeout: Duration) -> CommandResult {
        CommandRunner::run(self, args, timeout).await
    }
}

async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

/// Windows hands the command line to the executable untouched
#[cfg(windows)]
fn apply_args(cmd: &mut Command, args: &str) {
    cmd.raw_arg(args);
}

#[cfg(not(windows))]
fn apply_args(cmd: &mut Command, args: &str) {
    cmd.args(split_args(args));
}

/// Split a command line on whitespace, keeping double-quoted runs together.
///
/// Mirrors the subset of Windows command-line parsing adb relies on:
/// quotes group, `\"` is a literal quote, nothing else is special.
pub fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
                in_token = true;
            }
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_token {
        args.push(current);
    }
    args
}
