//! Error types for the networking layer.

use thiserror::Error;

/// Terminal failure of a request pipeline.
///
/// Every call into the executor resolves to exactly one of these, or to a
/// decoded value. The variants carry enough detail for UI messaging: a kind,
/// a human-readable message via `Display`, and a numeric code where one exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// The endpoint could not be turned into a valid URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The server answered with an empty body where data was expected.
    #[error("no data received")]
    NoData,

    /// The response body could not be decoded into the requested type.
    #[error("failed to decode response: {0}")]
    Decoding(String),

    /// The request parameters could not be encoded.
    #[error("failed to encode request: {0}")]
    Encoding(String),

    /// Non-success HTTP status without a dedicated variant.
    #[error("server error {code}: {message}")]
    Server {
        /// HTTP status code.
        code: u16,
        /// Message extracted from the response body, possibly empty.
        message: String,
    },

    /// The transport failed before a response was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// The request was cancelled by the caller.
    #[error("request was cancelled")]
    Cancelled,

    /// No network path is available.
    #[error("no network connection")]
    NoConnectivity,

    /// HTTP 401.
    #[error("authentication required")]
    Unauthorized,

    /// HTTP 403.
    #[error("access forbidden")]
    Forbidden,

    /// HTTP 404.
    #[error("resource not found")]
    NotFound,

    /// HTTP 429.
    #[error("rate limit exceeded")]
    RateLimited,

    /// HTTP 503.
    #[error("service unavailable")]
    ServiceUnavailable,

    /// Anything that does not fit the categories above.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl NetworkError {
    /// Map a non-2xx HTTP status to its error kind.
    ///
    /// Returns `None` for 2xx statuses.
    pub fn from_status(code: u16, body: &[u8]) -> Option<Self> {
        match code {
            200..=299 => None,
            401 => Some(Self::Unauthorized),
            403 => Some(Self::Forbidden),
            404 => Some(Self::NotFound),
            429 => Some(Self::RateLimited),
            503 => Some(Self::ServiceUnavailable),
            _ => Some(Self::Server {
                code,
                message: server_message(body),
            }),
        }
    }

    /// Numeric code associated with this error, if any.
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Server { code, .. } => Some(*code),
            Self::Unauthorized => Some(401),
            Self::Forbidden => Some(403),
            Self::NotFound => Some(404),
            Self::Timeout => Some(408),
            Self::RateLimited => Some(429),
            Self::ServiceUnavailable => Some(503),
            _ => None,
        }
    }

    /// Whether the retry loop may attempt the transport call again.
    ///
    /// Timeouts, transport failures and 5xx responses are retryable; every
    /// other kind terminates the attempt loop immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) | Self::ServiceUnavailable => true,
            Self::Server { code, .. } => *code >= 500,
            _ => false,
        }
    }
}

/// Pull a short message out of an error body.
///
/// JSON bodies with a `message` or `error` string field yield that field,
/// otherwise the body text is used, truncated.
fn server_message(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        for field in ["message", "error"] {
            if let Some(msg) = value.get(field).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }
    String::from_utf8_lossy(body).chars().take(200).collect()
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_builder() {
            Self::InvalidUrl(err.to_string())
        } else if err.is_decode() {
            Self::Decoding(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for NetworkError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for NetworkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decoding(err.to_string())
    }
}

/// A specialized Result type for network operations.
pub type Result<T> = std::result::Result<T, NetworkError>;
