//! # Logging
//!
//! Two audiences get log output. Operators and developers get the `log` facade
//! (backed by `env_logger`, filtered with `RUST_LOG`). The presentation layer gets
//! [`LogLine`] values delivered as engine events, the console's "system log" view.

use chrono::{DateTime, Local};
use log::{debug, error, info, log_enabled, warn, Level};
use serde::Serialize;
use std::fmt;

/// Initializes the logger with the `env_logger` crate.
pub fn init_logger() {
    env_logger::init();
}

/// Initializes `env_logger`, defaulting to `info` when `RUST_LOG` is unset.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logger_with_default(level: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init();
}

/// Logs an error message.
pub fn log_error(message: &str) {
    if log_enabled!(Level::Error) {
        error!("{message}");
    }
}

/// Logs a warning message.
pub fn log_warn(message: &str) {
    if log_enabled!(Level::Warn) {
        warn!("{message}");
    }
}

/// Logs an informational message.
pub fn log_info(message: &str) {
    if log_enabled!(Level::Info) {
        info!("{message}");
    }
}

/// Logs a debug message.
pub fn log_debug(message: &str) {
    if log_enabled!(Level::Debug) {
        debug!("{message}");
    }
}

/// Which way a log line travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    /// Written to the device.
    Sent,
    /// Read from the device.
    Received,
    /// Produced by the engine itself.
    Info,
}

impl Direction {
    /// The tag shown in front of the text (`>` sent, `<` received).
    pub fn tag(self) -> Option<&'static str> {
        match self {
            Direction::Sent => Some(">"),
            Direction::Received => Some("<"),
            Direction::Info => None,
        }
    }
}

/// A timestamped line for the presentation layer's log view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLine {
    pub timestamp: DateTime<Local>,
    pub direction: Direction,
    pub text: String,
}

impl LogLine {
    pub fn new(direction: Direction, text: impl Into<String>) -> Self {
        LogLine {
            timestamp: Local::now(),
            direction,
            text: text.into(),
        }
    }

    pub fn sent(text: impl Into<String>) -> Self {
        Self::new(Direction::Sent, text)
    }

    pub fn received(text: impl Into<String>) -> Self {
        Self::new(Direction::Received, text)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(Direction::Info, text)
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.timestamp.format("%H:%M:%S"))?;
        match self.direction.tag() {
            Some(tag) => write!(f, "{tag} {}", self.text),
            None => write!(f, "{}", self.text),
        }
    }
}
