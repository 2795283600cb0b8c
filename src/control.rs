//! Cross-process stop requests for the headless CLI
//!
//! A running `start` owns a pid marker; `stop` drops a request file next to
//! it, which the running instance polls for and turns into cancellation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

const PID_FILE: &str = "enforcer.pid";
const STOP_FILE: &str = "stop.request";

/// What `stop` found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRequest {
    Requested,
    NotRunning,
}

/// Marker files inside one state directory
#[derive(Debug, Clone)]
pub struct ControlFiles {
    dir: PathBuf,
}

impl ControlFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn pid_path(&self) -> PathBuf {
        self.dir.join(PID_FILE)
    }

    fn stop_path(&self) -> PathBuf {
        self.dir.join(STOP_FILE)
    }

    /// Record this process as the running instance.
    ///
    /// Clears any stale stop request. The markers are removed when the guard
    /// drops.
    pub fn mark_running(&self) -> std::io::Result<RunningGuard> {
        std::fs::create_dir_all(&self.dir)?;
        let _ = std::fs::remove_file(self.stop_path());
        std::fs::write(self.pid_path(), std::process::id().to_string())?;
        Ok(RunningGuard {
            files: self.clone(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.pid_path().is_file()
    }

    /// Ask the running instance to stop. Repeating the request is harmless.
    pub fn request_stop(&self) -> std::io::Result<StopRequest> {
        if !self.is_running() {
            return Ok(StopRequest::NotRunning);
        }
        std::fs::write(self.stop_path(), b"stop")?;
        Ok(StopRequest::Requested)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_path().is_file()
    }

    /// Cancel `cancel` once a stop request shows up; returns when either
    /// happens.
    pub async fn watch(&self, cancel: CancellationToken, poll: Duration) {
        loop {
            if self.stop_requested() {
                tracing::info!("Stop requested");
                cancel.cancel();
                return;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }
}

/// Removes the running markers on drop
pub struct RunningGuard {
    files: ControlFiles,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(self.files.pid_path());
        let _ = std::fs::remove_file(self.files.stop_path());
    }
}
