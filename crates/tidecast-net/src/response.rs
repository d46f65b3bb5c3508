//! Raw transport responses.

use bytes::Bytes;

/// Transport metadata accompanying a response body.
#[derive(Clone, Debug)]
pub struct ResponseMeta {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: http::HeaderMap,
    /// Final URL after redirects.
    pub url: String,
}

impl ResponseMeta {
    /// Check if the response indicates success (2xx status).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if the response is a server error (5xx status).
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// The `ETag` validator, if the server sent one.
    pub fn etag(&self) -> Option<&str> {
        self.header("etag")
    }
}

/// A fully read response: body bytes plus metadata.
///
/// Only the executor sees this type; callers receive decoded data or an error.
#[derive(Clone, Debug)]
pub struct RawResponse {
    /// Response body.
    pub body: Bytes,
    /// Status, headers and URL.
    pub meta: ResponseMeta,
}

impl RawResponse {
    /// Create a response.
    pub fn new(status: u16, headers: http::HeaderMap, url: impl Into<String>, body: Bytes) -> Self {
        Self {
            body,
            meta: ResponseMeta {
                status,
                headers,
                url: url.into(),
            },
        }
    }

    /// HTTP status code.
    pub fn status(&self) -> u16 {
        self.meta.status
    }
}
