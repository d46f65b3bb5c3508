//! Structured, level-filtered request logging.
//!
//! [`RequestLogger`] is a thin filter in front of `tracing`. The application
//! installs whatever subscriber it likes; events are emitted under the
//! [`targets::REQUEST`] target so they can be filtered independently:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("tidecast_net::request=debug")
//!     .init();
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Target names for log filtering.
pub mod targets {
    /// Request/response/error events from the request logger.
    pub const REQUEST: &str = "tidecast_net::request";
    /// Executor lifecycle (retries, cancellation).
    pub const EXECUTOR: &str = "tidecast_net::executor";
    /// Response cache.
    pub const CACHE: &str = "tidecast_net::cache";
    /// Connectivity monitor.
    pub const CONNECTIVITY: &str = "tidecast_net::connectivity";
}

/// Longest body preview emitted, in characters.
pub const MAX_PREVIEW_CHARS: usize = 1000;

/// Log severity, ordered from most to least verbose.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Everything, including response bodies.
    Verbose,
    /// Request and response summaries.
    Debug,
    /// Notable lifecycle events.
    #[default]
    Info,
    /// Recoverable problems.
    Warning,
    /// Failures.
    Error,
}

impl LogLevel {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Verbose,
            1 => Self::Debug,
            2 => Self::Info,
            3 => Self::Warning,
            _ => Self::Error,
        }
    }

    fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Verbose => "verbose",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// A pipeline event.
#[derive(Clone, Debug, PartialEq)]
pub enum LogEvent {
    /// Outgoing request.
    Request {
        /// HTTP method.
        method: String,
        /// Full URL.
        url: String,
        /// Request headers.
        headers: BTreeMap<String, String>,
        /// Leading part of the request body.
        body_preview: Option<String>,
    },
    /// Incoming response.
    Response {
        /// URL the response came from.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Body size in bytes.
        byte_count: usize,
        /// Name of the type the body decodes into, when known.
        model: Option<String>,
        /// Leading part of the response body; only emitted at verbose level.
        body_preview: Option<String>,
    },
    /// Failure.
    Error {
        /// Human-readable description.
        message: String,
        /// Numeric code, if any.
        code: Option<i64>,
    },
    /// Freeform message.
    Message {
        /// Severity.
        level: LogLevel,
        /// Text.
        text: String,
    },
}

impl LogEvent {
    /// Severity of the event.
    pub fn level(&self) -> LogLevel {
        match self {
            Self::Request { .. } | Self::Response { .. } => LogLevel::Debug,
            Self::Error { .. } => LogLevel::Error,
            Self::Message { level, .. } => *level,
        }
    }

    /// Freeform info message.
    pub fn info(text: impl Into<String>) -> Self {
        Self::Message {
            level: LogLevel::Info,
            text: text.into(),
        }
    }

    /// Freeform warning message.
    pub fn warning(text: impl Into<String>) -> Self {
        Self::Message {
            level: LogLevel::Warning,
            text: text.into(),
        }
    }

    /// Freeform debug message.
    pub fn debug(text: impl Into<String>) -> Self {
        Self::Message {
            level: LogLevel::Debug,
            text: text.into(),
        }
    }

    /// Freeform verbose message.
    pub fn verbose(text: impl Into<String>) -> Self {
        Self::Message {
            level: LogLevel::Verbose,
            text: text.into(),
        }
    }
}

/// Dispatch to the tracing macro matching a runtime level.
macro_rules! emit {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            LogLevel::Verbose => tracing::trace!(target: targets::REQUEST, $($arg)+),
            LogLevel::Debug => tracing::debug!(target: targets::REQUEST, $($arg)+),
            LogLevel::Info => tracing::info!(target: targets::REQUEST, $($arg)+),
            LogLevel::Warning => tracing::warn!(target: targets::REQUEST, $($arg)+),
            LogLevel::Error => tracing::error!(target: targets::REQUEST, $($arg)+),
        }
    };
}

/// Level-filtered sink for pipeline events.
///
/// The threshold is atomic: `set_level` takes effect for all subsequent
/// `log` calls on every thread without locking.
#[derive(Debug)]
pub struct RequestLogger {
    level: AtomicU8,
}

impl Default for RequestLogger {
    fn default() -> Self {
        Self::new(LogLevel::default())
    }
}

impl RequestLogger {
    /// Create a logger with the given threshold.
    pub fn new(level: LogLevel) -> Self {
        Self {
            level: AtomicU8::new(level.as_u8()),
        }
    }

    /// Current threshold.
    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Change the threshold.
    pub fn set_level(&self, level: LogLevel) {
        self.level.store(level.as_u8(), Ordering::Relaxed);
    }

    /// Whether an event at `level` would be emitted.
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        level >= self.level()
    }

    /// Emit an event. Returns whether it passed the level filter.
    pub fn log(&self, event: LogEvent) -> bool {
        let level = event.level();
        if !self.is_enabled(level) {
            return false;
        }

        match event {
            LogEvent::Request {
                method,
                url,
                headers,
                body_preview,
            } => {
                let headers = format!("{headers:?}");
                emit!(
                    level,
                    method = %method,
                    url = %url,
                    headers = %headers,
                    body = body_preview.as_deref().unwrap_or(""),
                    "request"
                );
            }
            LogEvent::Response {
                url,
                status,
                byte_count,
                model,
                body_preview,
            } => {
                let body = if self.level() == LogLevel::Verbose {
                    body_preview.unwrap_or_default()
                } else {
                    String::new()
                };
                emit!(
                    level,
                    url = %url,
                    status,
                    bytes = byte_count,
                    model = model.as_deref().unwrap_or(""),
                    body = %body,
                    "response"
                );
            }
            LogEvent::Error { message, code } => {
                emit!(level, code = code.unwrap_or_default(), "{message}");
            }
            LogEvent::Message { text, .. } => {
                emit!(level, "{text}");
            }
        }
        true
    }

    /// Log a failure with its code.
    pub fn error(&self, message: impl Into<String>, code: Option<i64>) -> bool {
        self.log(LogEvent::Error {
            message: message.into(),
            code,
        })
    }
}

/// Truncate a body to a printable preview.
pub fn body_preview(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(body);
    let mut preview: String = text.chars().take(MAX_PREVIEW_CHARS).collect();
    if text.chars().nth(MAX_PREVIEW_CHARS).is_some() {
        preview.push('…');
    }
    Some(preview)
}
