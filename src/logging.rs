//! Injected log sink for the speech core.
//!
//! The core never formats or ships log lines itself. Every component writes
//! through a [`LogSink`] supplied at construction; [`TracingSink`] forwards to
//! `tracing`, [`MemorySink`] keeps records for assertions.

use std::fmt;
use std::sync::Mutex;

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Information => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// Destination for structured log records.
pub trait LogSink: Send + Sync {
    /// Writes one record. `component` names the emitting part of the core.
    fn log(&self, level: LogLevel, component: &str, message: &str);

    fn trace(&self, component: &str, message: &str) {
        self.log(LogLevel::Trace, component, message);
    }

    fn debug(&self, component: &str, message: &str) {
        self.log(LogLevel::Debug, component, message);
    }

    fn info(&self, component: &str, message: &str) {
        self.log(LogLevel::Information, component, message);
    }

    fn warn(&self, component: &str, message: &str) {
        self.log(LogLevel::Warning, component, message);
    }

    fn error(&self, component: &str, message: &str) {
        self.log(LogLevel::Error, component, message);
    }
}

/// Sink that forwards records to the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, component: &str, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(component, "{message}"),
            LogLevel::Debug => tracing::debug!(component, "{message}"),
            LogLevel::Information => tracing::info!(component, "{message}"),
            LogLevel::Warning => tracing::warn!(component, "{message}"),
            LogLevel::Error => tracing::error!(component, "{message}"),
        }
    }
}

/// One record captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub component: String,
    pub message: String,
}

/// Sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all records so far.
    pub fn records(&self) -> Vec<LogRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of records at exactly `level`.
    pub fn count(&self, level: LogLevel) -> usize {
        self.records().iter().filter(|r| r.level == level).count()
    }

    /// Returns true if any record at `level` contains `needle`.
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|r| r.level == level && r.message.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, component: &str, message: &str) {
        let record = LogRecord {
            level,
            component: component.to_string(),
            message: message.to_string(),
        };
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}
