//! Run logging injected into the engine.
//!
//! The engine never reaches for a global logger. Callers pass a [`RunLogger`]
//! at construction time; the default is [`NoopLogger`].

use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::shared::time::now_secs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

pub trait RunLogger: Send + Sync {
    fn log(&self, level: LogLevel, event: &str, message: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl RunLogger for NoopLogger {
    fn log(&self, _level: LogLevel, _event: &str, _message: &str) {}
}

/// Forwards run events to `tracing`. Installing a subscriber is up to the host application.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl RunLogger for TracingLogger {
    fn log(&self, level: LogLevel, event: &str, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "runwright", event, "{message}"),
            LogLevel::Info => tracing::info!(target: "runwright", event, "{message}"),
            LogLevel::Warn => tracing::warn!(target: "runwright", event, "{message}"),
            LogLevel::Error => tracing::error!(target: "runwright", event, "{message}"),
        }
    }
}

/// Appends one JSON object per line to a log file. Write failures are dropped.
#[derive(Debug)]
pub struct FileLogger {
    path: PathBuf,
    lock: Mutex<()>,
}

#[derive(Serialize)]
struct LogLine<'a> {
    timestamp: i64,
    level: LogLevel,
    event: &'a str,
    message: &'a str,
}

impl FileLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunLogger for FileLogger {
    fn log(&self, level: LogLevel, event: &str, message: &str) {
        let Ok(line) = serde_json::to_string(&LogLine {
            timestamp: now_secs(),
            level,
            event,
            message,
        }) else {
            return;
        };

        let Ok(_guard) = self.lock.lock() else {
            return;
        };
        if let Some(parent) = self.path.parent() {
            if fs::create_dir_all(parent).is_err() {
                return;
            }
        }
        let Ok(mut file) = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
        else {
            return;
        };
        let _ = writeln!(file, "{line}");
    }
}
