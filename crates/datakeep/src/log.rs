use std::sync::Mutex;

use tracing::Level;

/// Destination for the one-line status messages a refresh cycle produces.
///
/// Every cycle outcome other than a silent success is reported here exactly
/// once. The default [`TracingLog`] forwards to `tracing`; hosts can route the
/// messages elsewhere, and tests use [`MemoryLog`] to count them.
pub trait UpdateLog: Send + Sync {
    fn log(&self, level: Level, message: &str);
}

/// Forwards messages to the `tracing` macro matching their level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl UpdateLog for TracingLog {
    fn log(&self, level: Level, message: &str) {
        if level == Level::ERROR {
            tracing::error!(target: "datakeep", "{message}");
        } else if level == Level::WARN {
            tracing::warn!(target: "datakeep", "{message}");
        } else if level == Level::INFO {
            tracing::info!(target: "datakeep", "{message}");
        } else if level == Level::DEBUG {
            tracing::debug!(target: "datakeep", "{message}");
        } else {
            tracing::trace!(target: "datakeep", "{message}");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level:   Level,
    pub message: String,
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLog {
    pub fn new() -> Self { Self::default() }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Number of messages recorded at exactly `level`.
    pub fn count(&self, level: Level) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.level == level)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl UpdateLog for MemoryLog {
    fn log(&self, level: Level, message: &str) {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(LogEntry {
                level,
                message: message.to_string(),
            });
    }
}
