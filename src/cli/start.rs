//! `start`: run the enforcement loop in the foreground

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use crossbeam_channel::RecvTimeoutError;
use tokio_util::sync::CancellationToken;

use super::{split_address, AppContext};
use crate::device::AdbDevice;
use crate::enforcer::{Enforcer, LogSink, LoopExit, LoopState, TracingSink};
use crate::host::CommandRunner;
use crate::settings::EnforcementPlan;
use crate::tray::{platform_factory, TrayBridge, TrayIntent};

const TRAY_TITLE: &str = "Screensaver Enforcer";
const STOP_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Args)]
pub struct StartArgs {
    /// Device as HOST:PORT (defaults to the saved address)
    #[arg(long)]
    pub address: Option<String>,

    /// Seconds between checks, 10-600 (defaults to the saved interval)
    #[arg(long)]
    pub interval: Option<u32>,

    /// Screen-off timeout to enforce: 30000 or 60000 (defaults to the saved value)
    #[arg(long)]
    pub timeout_ms: Option<u32>,

    /// Show a tray icon while running
    #[arg(long)]
    pub tray: bool,
}

/// Logs through tracing and mirrors status into the tray tooltip
struct TraySink {
    tray: Arc<TrayBridge>,
}

impl LogSink for TraySink {
    fn log(&self, line: &str) {
        TracingSink.log(line);
    }

    fn status(&self, status: &str) {
        TracingSink.status(status);
        self.tray
            .update_tooltip(&format!("{} - {}", TRAY_TITLE, status));
    }
}

/// Resolve flags against saved settings into a validated plan
pub fn resolve_plan(args: &StartArgs, ctx: &AppContext) -> anyhow::Result<EnforcementPlan> {
    let stored = ctx.settings.load();
    let (host, port) = match &args.address {
        Some(address) => split_address(address),
        None => stored.host_and_port(),
    };
    let plan = EnforcementPlan::new(
        &host,
        &port,
        args.interval.unwrap_or(stored.interval_seconds),
        args.timeout_ms.unwrap_or(stored.timeout_ms),
    )?;
    Ok(plan)
}

pub async fn run(args: StartArgs, ctx: &AppContext) -> anyhow::Result<LoopExit> {
    let plan = resolve_plan(&args, ctx)?;
    ctx.tools.validate()?;
    ctx.settings.save(&plan.to_settings());

    if ctx.control.is_running() {
        tracing::warn!(
            "Another instance may already be running (marker in {})",
            ctx.control.dir().display()
        );
    }
    let _running = ctx
        .control
        .mark_running()
        .with_context(|| format!("Failed to write run marker in {}", ctx.control.dir().display()))?;

    let tray = if args.tray {
        let tray = Arc::new(TrayBridge::new(platform_factory()));
        tray.create(&format!("{} - Starting", TRAY_TITLE));
        Some(tray)
    } else {
        None
    };

    let sink: Arc<dyn LogSink> = match &tray {
        Some(tray) => Arc::new(TraySink { tray: tray.clone() }),
        None => Arc::new(TracingSink),
    };

    let runner = CommandRunner::new(ctx.tools.clone());
    let device = Arc::new(AdbDevice::new(
        Arc::new(runner),
        ctx.tools.command_timeout,
    ));
    let handle = Enforcer::new(device, sink).start(plan);
    let cancel = handle.cancel_token();

    let watcher = tokio::spawn({
        let control = ctx.control.clone();
        let cancel = cancel.clone();
        async move { control.watch(cancel, STOP_POLL).await }
    });
    let interrupt = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));
    let intents = tray
        .as_ref()
        .map(|tray| forward_tray_intents(tray.intents(), cancel.clone()));

    let mut state = handle.subscribe();
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = state.wait_for(|s| *s == LoopState::Idle) => {}
    }
    tracing::debug!(state = ?handle.state(), "Shutting down enforcement");
    handle.stop();
    let exit = handle.wait().await;

    let _ = watcher.await;
    let _ = interrupt.await;
    if let Some(intents) = intents {
        let _ = intents.await;
    }
    if let Some(tray) = tray.filter(|tray| tray.is_created()) {
        tokio::task::spawn_blocking(move || tray.dispose())
            .await
            .context("Tray shutdown task failed")?;
    }

    Ok(exit)
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => {
                tracing::info!("Interrupted, stopping enforcement...");
                cancel.cancel();
            }
            Err(e) => tracing::warn!("Failed to listen for Ctrl-C: {}", e),
        },
        _ = cancel.cancelled() => {}
    }
}

/// Drain tray intents on a blocking thread until Exit or shutdown
fn forward_tray_intents(
    intents: crossbeam_channel::Receiver<TrayIntent>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || loop {
        match intents.recv_timeout(Duration::from_millis(200)) {
            Ok(TrayIntent::Exit) => {
                tracing::info!("Exit requested from tray");
                cancel.cancel();
                break;
            }
            Ok(TrayIntent::Restore) => {
                tracing::info!("Restore requested from tray; running headless, nothing to show");
            }
            Err(RecvTimeoutError::Timeout) if !cancel.is_cancelled() => {}
            Err(_) => break,
        }
    })
}
