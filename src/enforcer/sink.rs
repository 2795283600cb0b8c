//! Log and status sinks fed by the enforcement loop

/// Receives log lines and status updates from whatever thread the loop runs
/// on. Implementations must be thread-safe or hand off internally.
pub trait LogSink: Send + Sync {
    /// One log line
    fn log(&self, line: &str);

    /// Short, user-facing status text
    fn status(&self, _status: &str) {}
}

/// Forwards everything to `tracing`; the subscriber stamps local time
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, line: &str) {
        tracing::info!(target: "enforcer", "{}", line);
    }

    fn status(&self, status: &str) {
        tracing::debug!(target: "enforcer", status, "Status changed");
    }
}

/// Keeps every line in memory
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    pub lines: std::sync::Mutex<Vec<String>>,
    pub statuses: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn last_status(&self) -> Option<String> {
        self.statuses.lock().unwrap().last().cloned()
    }
}

#[cfg(test)]
impl LogSink for MemorySink {
    fn log(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }

    fn status(&self, status: &str) {
        self.statuses.lock().unwrap().push(status.to_string());
    }
}
