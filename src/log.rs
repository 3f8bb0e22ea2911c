use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

use tracing::{debug, error, info, trace, warn};

/// Verbosity levels for the injectable logger, least to most verbose.
///
/// `None` silences everything. A message is emitted when its level is at or
/// below the logger's current level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    None = 0,
    Critical = 1,
    Error = 2,
    Warn = 3,
    Info = 4,
    Verbose = 5,
    Debug = 6,
    Trace = 7,
}

impl LogLevel {
    fn from_u8(raw: u8) -> Self {
        use LogLevel::{Critical, Debug, Error, Info, None, Trace, Verbose, Warn};

        match raw {
            0 => None,
            1 => Critical,
            2 => Error,
            3 => Warn,
            4 => Info,
            5 => Verbose,
            6 => Debug,
            _ => Trace,
        }
    }
}

/// Structured logger handed to modules under the `$L` token.
///
/// Each module receives a child scoped to its own name; all children share
/// the root level gate, so [`Logger::set_level`] takes effect everywhere at
/// once. Events are forwarded to the `tracing` ecosystem.
#[derive(Debug, Clone)]
pub struct Logger {
    scope: String,
    level: Arc<AtomicU8>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            scope: String::from("weft"),
            level: Arc::new(AtomicU8::new(LogLevel::Debug as u8)),
        }
    }

    /// A logger scoped to `scope`, sharing this logger's level gate.
    #[must_use]
    pub fn child(&self, scope: &str) -> Self {
        Self {
            scope: scope.to_owned(),
            level: Arc::clone(&self.level),
        }
    }

    pub fn set_level(&self, level: LogLevel) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    #[must_use]
    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    #[inline]
    fn enabled(&self, level: LogLevel) -> bool {
        level <= self.level()
    }

    pub fn trace(&self, message: &str) {
        if self.enabled(LogLevel::Trace) {
            trace!(scope = %self.scope, "{message}");
        }
    }

    pub fn verbose(&self, message: &str) {
        if self.enabled(LogLevel::Verbose) {
            debug!(scope = %self.scope, verbose = true, "{message}");
        }
    }

    pub fn debug(&self, message: &str) {
        if self.enabled(LogLevel::Debug) {
            debug!(scope = %self.scope, "{message}");
        }
    }

    pub fn info(&self, message: &str) {
        if self.enabled(LogLevel::Info) {
            info!(scope = %self.scope, "{message}");
        }
    }

    pub fn warn(&self, message: &str) {
        if self.enabled(LogLevel::Warn) {
            warn!(scope = %self.scope, "{message}");
        }
    }

    pub fn error(&self, message: &str) {
        if self.enabled(LogLevel::Error) {
            error!(scope = %self.scope, "{message}");
        }
    }

    pub fn critical(&self, message: &str) {
        if self.enabled(LogLevel::Critical) {
            error!(scope = %self.scope, critical = true, "{message}");
        }
    }
}
