use std::fmt;
use std::sync::Arc;

/// Severity of a log callback, mirrored onto `tracing::Level` by
/// [`TracingLogSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// Logging callback the core calls out to. The core never opens a file or
/// owns a subscriber — a caller supplies this, or defaults to
/// [`TracingLogSink`] via `ManagerConfig::default()`.
pub trait LogSink: Send + Sync {
    fn log(&self, subsystem: &str, message: &str, priority: LogLevel);
}

/// Default sink, bridging into the `tracing` crate. Used whenever a caller
/// doesn't supply its own sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, subsystem: &str, message: &str, priority: LogLevel) {
        match priority {
            LogLevel::Trace => tracing::trace!(target: "dbqueue", subsystem, "{message}"),
            LogLevel::Debug => tracing::debug!(target: "dbqueue", subsystem, "{message}"),
            LogLevel::Info => tracing::info!(target: "dbqueue", subsystem, "{message}"),
            LogLevel::Warn => tracing::warn!(target: "dbqueue", subsystem, "{message}"),
            LogLevel::Error => tracing::error!(target: "dbqueue", subsystem, "{message}"),
        }
    }
}

pub type SharedLogSink = Arc<dyn LogSink>;

pub fn default_log_sink() -> SharedLogSink {
    Arc::new(TracingLogSink)
}
