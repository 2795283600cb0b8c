//! Tray bridge
//!
//! Owns the dispatch thread that creates, pumps and removes the native tray
//! icon. The icon and its window handle never leave that thread: tooltip
//! updates and shutdown arrive as [`TrayCommand`]s, and user gestures leave
//! as [`TrayIntent`]s on a channel the rest of the app drains on its own
//! thread.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};

/// Native tooltip buffer holds 128 UTF-16 units including the terminator
pub const TOOLTIP_MAX_CHARS: usize = 127;

/// Abstract requests raised by the tray
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayIntent {
    /// Double-click or "Restore" menu item
    Restore,
    /// "Exit" menu item
    Exit,
}

/// Raw user gestures reported by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayGesture {
    DoubleClick,
    MenuRestore,
    MenuExit,
}

impl TrayGesture {
    pub fn intent(self) -> TrayIntent {
        match self {
            TrayGesture::DoubleClick | TrayGesture::MenuRestore => TrayIntent::Restore,
            TrayGesture::MenuExit => TrayIntent::Exit,
        }
    }
}

/// Messages processed by the dispatch thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayCommand {
    SetTooltip(String),
    Shutdown,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TrayError {
    #[error("Failed to register tray icon: {0}")]
    Register(String),
}

/// A registered tray icon. Lives on the dispatch thread only.
pub trait TrayBackend {
    /// Replace the tooltip text (already truncated)
    fn set_tooltip(&mut self, text: &str);

    /// Process pending native events and return the gestures they produced
    fn pump(&mut self) -> Vec<TrayGesture>;

    /// Unregister the icon and release its resources
    fn remove(&mut self);
}

/// Builds a backend on the dispatch thread from the initial tooltip
pub type BackendFactory =
    Arc<dyn Fn(&str) -> Result<Box<dyn TrayBackend>, TrayError> + Send + Sync>;

/// Timing knobs for the bridge
#[derive(Debug, Clone)]
pub struct TrayConfig {
    /// How long `create` waits for the icon to be registered
    pub ready_timeout: Duration,
    /// How often the dispatch thread pumps native events
    pub poll_interval: Duration,
}

impl Default for TrayConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Truncate to the native tooltip limit, counted in UTF-16 units, without
/// splitting a surrogate pair
pub fn truncate_tooltip(text: &str) -> String {
    let mut units = 0;
    let mut end = 0;
    for (idx, ch) in text.char_indices() {
        if units + ch.len_utf16() > TOOLTIP_MAX_CHARS {
            break;
        }
        units += ch.len_utf16();
        end = idx + ch.len_utf8();
    }
    text[..end].to_string()
}

struct Running {
    commands: Sender<TrayCommand>,
    done: Receiver<()>,
    thread: JoinHandle<()>,
}

/// Handle to the tray presence
pub struct TrayBridge {
    factory: BackendFactory,
    config: TrayConfig,
    running: Mutex<Option<Running>>,
    intent_tx: Sender<TrayIntent>,
    intent_rx: Receiver<TrayIntent>,
}

impl TrayBridge {
    pub fn new(factory: BackendFactory) -> Self {
        Self::with_config(factory, TrayConfig::default())
    }

    pub fn with_config(factory: BackendFactory, config: TrayConfig) -> Self {
        let (intent_tx, intent_rx) = unbounded();
        Self {
            factory,
            config,
            running: Mutex::new(None),
            intent_tx,
            intent_rx,
        }
    }

    /// Receiver for restore/exit intents.
    ///
    /// Intents are sent from the dispatch thread; consumers that touch UI
    /// state must hop to their own thread.
    pub fn intents(&self) -> Receiver<TrayIntent> {
        self.intent_rx.clone()
    }

    /// Whether a dispatch thread is alive
    pub fn is_created(&self) -> bool {
        self.lock_running().is_some()
    }

    /// Start the dispatch thread and register the icon.
    ///
    /// A no-op when already created. Blocks for at most
    /// `ready_timeout`; returns whether the icon reported ready in time.
    pub fn create(&self, tooltip: &str) -> bool {
        let ready_rx = {
            let mut running = self.lock_running();
            if running.is_some() {
                return true;
            }

            let (command_tx, command_rx) = unbounded();
            let (ready_tx, ready_rx) = bounded(1);
            let (done_tx, done_rx) = bounded::<()>(0);

            let factory = self.factory.clone();
            let intents = self.intent_tx.clone();
            let tooltip = truncate_tooltip(tooltip);
            let poll = self.config.poll_interval;

            let spawned = std::thread::Builder::new()
                .name("tray-dispatch".to_string())
                .spawn(move || {
                    let _done = done_tx;
                    dispatch(factory, &tooltip, command_rx, intents, ready_tx, poll);
                });

            match spawned {
                Ok(thread) => {
                    *running = Some(Running {
                        commands: command_tx,
                        done: done_rx,
                        thread,
                    });
                }
                Err(e) => {
                    tracing::warn!("Failed to spawn tray thread: {}", e);
                    return false;
                }
            }
            ready_rx
        };

        // Wait outside the lock so dispose can run concurrently
        match ready_rx.recv_timeout(self.config.ready_timeout) {
            Ok(true) => true,
            Ok(false) => false,
            Err(_) => {
                tracing::warn!("Tray icon not ready after {:?}, continuing", self.config.ready_timeout);
                false
            }
        }
    }

    /// Queue a tooltip change for the dispatch thread
    pub fn update_tooltip(&self, text: &str) {
        if let Some(running) = self.lock_running().as_ref() {
            let _ = running
                .commands
                .send(TrayCommand::SetTooltip(truncate_tooltip(text)));
        }
    }

    /// Remove the icon and stop the dispatch thread. Idempotent.
    pub fn dispose(&self) {
        let Some(running) = self.lock_running().take() else {
            return;
        };

        let _ = running.commands.send(TrayCommand::Shutdown);

        // The done channel disconnects when the thread exits
        match running.done.recv_timeout(self.config.ready_timeout) {
            Err(RecvTimeoutError::Disconnected) => {
                if running.thread.join().is_err() {
                    tracing::warn!("Tray thread panicked");
                }
            }
            _ => tracing::warn!("Tray thread did not exit in time, detaching"),
        }
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for TrayBridge {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn dispatch(
    factory: BackendFactory,
    tooltip: &str,
    commands: Receiver<TrayCommand>,
    intents: Sender<TrayIntent>,
    ready: Sender<bool>,
    poll: Duration,
) {
    let mut backend = match factory(tooltip) {
        Ok(backend) => backend,
        Err(e) => {
            tracing::warn!("{}", e);
            let _ = ready.send(false);
            return;
        }
    };
    let _ = ready.send(true);
    tracing::debug!("Tray icon registered");

    loop {
        for gesture in backend.pump() {
            tracing::debug!(?gesture, "Tray gesture");
            let _ = intents.send(gesture.intent());
        }

        match commands.recv_timeout(poll) {
            Ok(TrayCommand::SetTooltip(text)) => backend.set_tooltip(&text),
            Ok(TrayCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    backend.remove();
    tracing::debug!("Tray icon removed");
}
