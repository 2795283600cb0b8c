//! Enforcement loop
//!
//! Periodically connects to the device, reads `screen_off_timeout` and
//! writes the target value back when it has drifted. Every failure inside
//! an iteration is logged and retried on the next interval; only
//! cancellation ends the loop. Cancellation is cooperative: it is observed
//! between steps and during the sleep, never in the middle of a command.

mod sink;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Local;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::device::{ConnectStatus, DeviceBridge, TimeoutReading};
use crate::settings::EnforcementPlan;

pub use sink::{LogSink, TracingSink};
#[cfg(test)]
pub use sink::MemorySink;

/// Lifecycle of one loop run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopping,
}

/// Why a loop run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// Stopped on request
    Cancelled,
    /// Stopped by a fault outside the modelled failure paths
    Faulted(String),
}

/// What a single iteration did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    Cancelled,
    ConnectFailed,
    ReadFailed,
    Unparseable(String),
    AlreadyCorrect,
    Updated { previous: i64 },
    WriteFailed { previous: i64 },
}

/// Human label for a target, e.g. `1-minute`
pub fn describe_target(ms: u32) -> String {
    if ms % 60_000 == 0 {
        format!("{}-minute", ms / 60_000)
    } else {
        format!("{}-second", ms / 1000)
    }
}

/// Drives a device toward the target timeout
#[derive(Clone)]
pub struct Enforcer {
    device: Arc<dyn DeviceBridge>,
    sink: Arc<dyn LogSink>,
}

impl Enforcer {
    pub fn new(device: Arc<dyn DeviceBridge>, sink: Arc<dyn LogSink>) -> Self {
        Self { device, sink }
    }

    /// Run one connect/read/compare/write pass
    pub async fn enforce_once(
        &self,
        address: &str,
        target_ms: u32,
        cancel: &CancellationToken,
    ) -> IterationOutcome {
        if cancel.is_cancelled() {
            return IterationOutcome::Cancelled;
        }

        self.sink.log(&format!("Connecting to {}...", address));
        let connect = self.device.connect(address).await;
        if !connect.success {
            self.sink.log(&format!(
                "Connect failed: {} - Will retry next interval.",
                connect.error_text("no output")
            ));
            self.sink.status("Connection failed - will retry next interval");
            return IterationOutcome::ConnectFailed;
        }

        match ConnectStatus::classify(&connect.stdout) {
            ConnectStatus::AlreadyConnected | ConnectStatus::Connected => {
                self.sink.log(&format!("Connected: {}", connect.stdout));
            }
            ConnectStatus::Unrecognized => {
                self.sink.log(&format!("Connect response: {}", connect.stdout));
            }
        }

        if cancel.is_cancelled() {
            return IterationOutcome::Cancelled;
        }

        let read = self.device.get_timeout().await;
        if !read.success {
            self.sink.log(&format!(
                "Get timeout failed: {}",
                read.error_text("Failed to get timeout value")
            ));
            self.sink.status("Could not read timeout - will retry");
            return IterationOutcome::ReadFailed;
        }

        let current = match TimeoutReading::parse(&read.stdout) {
            TimeoutReading::Value(ms) => ms,
            TimeoutReading::Unparseable(raw) => {
                self.sink.log(&format!("Could not parse timeout value: '{}'", raw));
                self.sink.status("Could not read timeout - will retry");
                return IterationOutcome::Unparseable(raw);
            }
        };

        self.sink.log(&format!(
            "Current timeout: {}ms ({}s)",
            current,
            current / 1000
        ));

        if current == i64::from(target_ms) {
            self.sink.log(&format!(
                "Timeout already at {}ms - no change needed",
                target_ms
            ));
            self.sink.status(&format!(
                "Timeout correct as of {}",
                Local::now().format("%H:%M:%S")
            ));
            return IterationOutcome::AlreadyCorrect;
        }

        if cancel.is_cancelled() {
            return IterationOutcome::Cancelled;
        }

        let label = describe_target(target_ms);
        self.sink.log(&format!(
            "Timeout is {}ms, setting to {}ms ({})...",
            current, target_ms, label
        ));

        // Write-and-trust: the next iteration's read is the verification
        let write = self.device.set_timeout(target_ms).await;
        if write.success {
            self.sink.log(&format!("Timeout set to {}ms ({})", target_ms, label));
            self.sink.status(&format!(
                "Enforced {} timeout at {}",
                label,
                Local::now().format("%H:%M:%S")
            ));
            IterationOutcome::Updated { previous: current }
        } else {
            self.sink.log(&format!(
                "Set timeout failed: {}",
                write.error_text("Failed to set timeout")
            ));
            self.sink.status("Could not set timeout - will retry");
            IterationOutcome::WriteFailed { previous: current }
        }
    }

    /// Repeat [`Self::enforce_once`] every `plan.interval` until cancelled
    pub async fn run(&self, plan: &EnforcementPlan, cancel: &CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let outcome = self.enforce_once(&plan.address, plan.target_ms, cancel).await;
            tracing::debug!(?outcome, "Enforcement iteration finished");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(plan.interval) => {}
            }
        }
    }

    /// Spawn the loop on the runtime.
    ///
    /// Callers must not start a second loop while one is running.
    pub fn start(self, plan: EnforcementPlan) -> EnforcementHandle {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(LoopState::Running);
        let state_tx = Arc::new(state_tx);

        self.sink.log(&format!(
            "Started enforcement. Target: {}, Interval: {}s",
            plan.address,
            plan.interval.as_secs()
        ));
        self.sink.status(&format!(
            "Running - Enforcing {} timeout...",
            describe_target(plan.target_ms)
        ));

        let task_cancel = cancel.clone();
        let task_state = state_tx.clone();
        let task = tokio::spawn(async move {
            let result = AssertUnwindSafe(self.run(&plan, &task_cancel))
                .catch_unwind()
                .await;

            let exit = match result {
                Ok(()) => {
                    self.sink.log("Enforcement stopped.");
                    self.sink.status("Stopped");
                    LoopExit::Cancelled
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!("Enforcement loop faulted: {}", message);
                    self.sink.log(&format!("Unexpected error: {}", message));
                    self.sink.status(&format!("Stopped with error: {}", message));
                    LoopExit::Faulted(message)
                }
            };

            task_state.send_replace(LoopState::Idle);
            exit
        });

        EnforcementHandle {
            cancel,
            state_tx,
            state_rx,
            task,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Control side of a running loop
pub struct EnforcementHandle {
    cancel: CancellationToken,
    state_tx: Arc<watch::Sender<LoopState>>,
    state_rx: watch::Receiver<LoopState>,
    task: JoinHandle<LoopExit>,
}

impl EnforcementHandle {
    /// Current state
    pub fn state(&self) -> LoopState {
        *self.state_rx.borrow()
    }

    /// Watch for state changes
    pub fn subscribe(&self) -> watch::Receiver<LoopState> {
        self.state_rx.clone()
    }

    /// Token that stops the loop when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request the loop to stop. Calling this again is a no-op.
    pub fn stop(&self) {
        self.state_tx.send_if_modified(|state| {
            if *state == LoopState::Running {
                *state = LoopState::Stopping;
                true
            } else {
                false
            }
        });
        self.cancel.cancel();
    }

    /// Wait for the loop to reach `Idle`
    pub async fn wait(self) -> LoopExit {
        match self.task.await {
            Ok(exit) => exit,
            Err(e) => {
                self.state_tx.send_replace(LoopState::Idle);
                LoopExit::Faulted(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::AdbDevice;
    use crate::host::{CommandExecutor, CommandResult};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    fn ok(stdout: &str) -> CommandResult {
        CommandResult::exited(0, stdout, "")
    }

    /// Scripted device; unscripted calls succeed with empty output
    #[derive(Default)]
    struct FakeDevice {
        connects: Mutex<VecDeque<CommandResult>>,
        reads: Mutex<VecDeque<CommandResult>>,
        writes: Mutex<VecDeque<CommandResult>>,
        calls: Mutex<Vec<String>>,
        panic_on_read: bool,
        cancel_in_connect: Option<CancellationToken>,
        cancel_in_read: Option<CancellationToken>,
    }

    impl FakeDevice {
        fn with_reads(reads: &[&str]) -> Self {
            let device = Self::default();
            device
                .reads
                .lock()
                .unwrap()
                .extend(reads.iter().map(|r| ok(r)));
            device
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn writes(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|c| c.starts_with("set "))
                .collect()
        }

        fn next(queue: &Mutex<VecDeque<CommandResult>>, fallback: &str) -> CommandResult {
            queue.lock().unwrap().pop_front().unwrap_or_else(|| ok(fallback))
        }
    }

    #[async_trait]
    impl DeviceBridge for FakeDevice {
        async fn connect(&self, address: &str) -> CommandResult {
            self.calls.lock().unwrap().push(format!("connect {}", address));
            if let Some(cancel) = &self.cancel_in_connect {
                cancel.cancel();
            }
            Self::next(&self.connects, "connected to device")
        }

        async fn get_timeout(&self) -> CommandResult {
            self.calls.lock().unwrap().push("get".to_string());
            if let Some(cancel) = &self.cancel_in_read {
                cancel.cancel();
            }
            if self.panic_on_read {
                panic!("device exploded");
            }
            Self::next(&self.reads, "60000")
        }

        async fn set_timeout(&self, ms: u32) -> CommandResult {
            self.calls.lock().unwrap().push(format!("set {}", ms));
            Self::next(&self.writes, "")
        }

        async fn diagnostics(&self) -> CommandResult {
            ok("")
        }

        async fn enable_dream(&self) -> CommandResult {
            ok("")
        }

        async fn set_screensaver_component(&self) -> CommandResult {
            ok("")
        }
    }

    fn new_enforcer(device: Arc<FakeDevice>) -> (Enforcer, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::default());
        (Enforcer::new(device, sink.clone()), sink)
    }

    fn plan(interval_secs: u32) -> EnforcementPlan {
        EnforcementPlan::new("10.0.0.5", "5555", interval_secs, 60000).unwrap()
    }

    #[tokio::test]
    async fn test_writes_once_when_drifted() {
        let device = Arc::new(FakeDevice::with_reads(&["30000"]));
        let (enforcer, sink) = new_enforcer(device.clone());
        let cancel = CancellationToken::new();

        let outcome = enforcer.enforce_once("10.0.0.5:5555", 60000, &cancel).await;
        assert_eq!(outcome, IterationOutcome::Updated { previous: 30000 });
        assert_eq!(
            device.calls(),
            vec!["connect 10.0.0.5:5555", "get", "set 60000"]
        );
        assert!(sink.last_status().unwrap().starts_with("Enforced 1-minute timeout at"));
    }

    #[tokio::test]
    async fn test_no_write_when_already_correct() {
        let device = Arc::new(FakeDevice::with_reads(&["60000", "60000", "60000"]));
        let (enforcer, sink) = new_enforcer(device.clone());
        let cancel = CancellationToken::new();

        for _ in 0..3 {
            let outcome = enforcer.enforce_once("10.0.0.5:5555", 60000, &cancel).await;
            assert_eq!(outcome, IterationOutcome::AlreadyCorrect);
        }
        assert!(device.writes().is_empty());
        assert!(sink.last_status().unwrap().starts_with("Timeout correct as of"));
    }

    #[tokio::test]
    async fn test_unparseable_reads_skip_write() {
        for raw in ["", "null", "sixty thousand"] {
            let device = Arc::new(FakeDevice::with_reads(&[raw]));
            let (enforcer, sink) = new_enforcer(device.clone());

            let outcome = enforcer
                .enforce_once("10.0.0.5:5555", 60000, &CancellationToken::new())
                .await;
            assert_eq!(outcome, IterationOutcome::Unparseable(raw.to_string()));
            assert!(device.writes().is_empty());
            assert!(sink
                .lines()
                .iter()
                .any(|l| l.contains("Could not parse timeout value")));
        }
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_device_alone() {
        let device = Arc::new(FakeDevice::default());
        device
            .connects
            .lock()
            .unwrap()
            .push_back(CommandResult::exited(1, "", "cannot connect"));
        let (enforcer, sink) = new_enforcer(device.clone());

        let outcome = enforcer
            .enforce_once("10.0.0.5:5555", 60000, &CancellationToken::new())
            .await;
        assert_eq!(outcome, IterationOutcome::ConnectFailed);
        assert_eq!(device.calls(), vec!["connect 10.0.0.5:5555"]);
        assert!(sink.lines().iter().any(|l| l.contains("cannot connect")));
        assert_eq!(
            sink.last_status().as_deref(),
            Some("Connection failed - will retry next interval")
        );
    }

    #[tokio::test]
    async fn test_read_and_write_failures_are_reported() {
        let device = Arc::new(FakeDevice::default());
        device
            .reads
            .lock()
            .unwrap()
            .push_back(CommandResult::failed("Command timed out after 30 seconds"));
        let (reader, _sink) = new_enforcer(device.clone());
        let cancel = CancellationToken::new();
        assert_eq!(
            reader.enforce_once("a:1", 60000, &cancel).await,
            IterationOutcome::ReadFailed
        );

        let device = Arc::new(FakeDevice::with_reads(&["30000"]));
        device
            .writes
            .lock()
            .unwrap()
            .push_back(CommandResult::exited(255, "", "error: closed"));
        let (writer, sink) = new_enforcer(device.clone());
        assert_eq!(
            writer.enforce_once("a:1", 60000, &cancel).await,
            IterationOutcome::WriteFailed { previous: 30000 }
        );
        assert_eq!(device.writes().len(), 1);
        assert!(sink.lines().iter().any(|l| l.contains("error: closed")));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_has_no_side_effects() {
        let device = Arc::new(FakeDevice::default());
        let (enforcer, sink) = new_enforcer(device.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = enforcer.enforce_once("a:1", 60000, &cancel).await;
        assert_eq!(outcome, IterationOutcome::Cancelled);
        assert!(device.calls().is_empty());
        assert!(sink.lines().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_connect_skips_read() {
        let cancel = CancellationToken::new();
        let device = Arc::new(FakeDevice {
            cancel_in_connect: Some(cancel.clone()),
            ..Default::default()
        });
        let (enforcer, _sink) = new_enforcer(device.clone());

        let outcome = enforcer.enforce_once("10.0.0.5:5555", 60000, &cancel).await;
        assert_eq!(outcome, IterationOutcome::Cancelled);
        assert_eq!(device.calls(), vec!["connect 10.0.0.5:5555"]);
    }

    #[tokio::test]
    async fn test_cancel_during_read_skips_write() {
        let cancel = CancellationToken::new();
        let device = Arc::new(FakeDevice {
            cancel_in_read: Some(cancel.clone()),
            ..FakeDevice::with_reads(&["30000"])
        });
        let (enforcer, _sink) = new_enforcer(device.clone());

        let outcome = enforcer.enforce_once("10.0.0.5:5555", 60000, &cancel).await;
        assert_eq!(outcome, IterationOutcome::Cancelled);
        assert_eq!(device.calls(), vec!["connect 10.0.0.5:5555", "get"]);
        assert!(device.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_sleep_is_prompt() {
        let device = Arc::new(FakeDevice::default());
        let (enforcer, sink) = new_enforcer(device.clone());
        let handle = enforcer.start(plan(10));
        assert_eq!(handle.state(), LoopState::Running);

        tokio::time::sleep(Duration::from_secs(1)).await;
        let started = tokio::time::Instant::now();
        handle.stop();
        handle.stop();

        let exit = handle.wait().await;
        assert_eq!(exit, LoopExit::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(device.calls().iter().filter(|c| *c == "get").count(), 1);
        assert_eq!(sink.last_status().as_deref(), Some("Stopped"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_transitions() {
        let device = Arc::new(FakeDevice::default());
        let (enforcer, _sink) = new_enforcer(device);
        let handle = enforcer.start(plan(600));
        let mut states = handle.subscribe();

        handle.stop();
        assert_eq!(handle.state(), LoopState::Stopping);

        states
            .wait_for(|s| *s == LoopState::Idle)
            .await
            .unwrap();
        assert_eq!(handle.wait().await, LoopExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fault_is_caught_at_loop_boundary() {
        let device = Arc::new(FakeDevice {
            panic_on_read: true,
            ..Default::default()
        });
        let (enforcer, sink) = new_enforcer(device);
        let handle = enforcer.start(plan(10));
        let states = handle.subscribe();

        let exit = handle.wait().await;
        assert_eq!(exit, LoopExit::Faulted("device exploded".to_string()));
        assert_eq!(*states.borrow(), LoopState::Idle);
        assert_eq!(
            sink.last_status().as_deref(),
            Some("Stopped with error: device exploded")
        );
    }

    /// Scripted adb executable keyed on the command verb
    struct ScriptedTool {
        reads: Mutex<VecDeque<&'static str>>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandExecutor for ScriptedTool {
        async fn run(&self, args: &str, _timeout: Duration) -> CommandResult {
            self.calls.lock().unwrap().push(args.to_string());
            if args.starts_with("connect ") {
                ok("connected to 10.0.0.5:5555")
            } else if args.contains("settings get system screen_off_timeout") {
                ok(self.reads.lock().unwrap().pop_front().unwrap_or("60000"))
            } else {
                ok("")
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_two_iterations() {
        let tool = Arc::new(ScriptedTool {
            reads: Mutex::new(VecDeque::from(["30000", "60000"])),
            calls: Mutex::new(Vec::new()),
        });
        let device = Arc::new(AdbDevice::new(tool.clone(), Duration::from_secs(30)));
        let sink = Arc::new(MemorySink::default());

        let mut settings = crate::settings::Settings {
            device_address: "10.0.0.5:5555".into(),
            interval_seconds: 10,
            timeout_ms: 60000,
        };
        let handle = Enforcer::new(device, sink.clone()).start(settings.plan().unwrap());
        // Later edits must not reach the running loop
        settings.timeout_ms = 30000;

        tokio::time::sleep(Duration::from_secs(15)).await;
        handle.stop();
        assert_eq!(handle.wait().await, LoopExit::Cancelled);

        let calls = tool.calls.lock().unwrap().clone();
        let sets: Vec<&String> = calls.iter().filter(|c| c.contains(" put ")).collect();
        assert_eq!(sets, vec!["shell settings put system screen_off_timeout 60000"]);
        assert_eq!(calls.iter().filter(|c| c.starts_with("connect ")).count(), 2);
        assert!(sink
            .lines()
            .iter()
            .any(|l| l.contains("Timeout set to 60000ms")));
        assert!(sink
            .lines()
            .iter()
            .any(|l| l.contains("Timeout already at 60000ms")));
    }

    #[test]
    fn test_describe_target() {
        assert_eq!(describe_target(60000), "1-minute");
        assert_eq!(describe_target(30000), "30-second");
    }
}
