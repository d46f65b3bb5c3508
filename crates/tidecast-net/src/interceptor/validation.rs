//! Structural validation of successful response bodies.

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::IgnoredAny;

use super::Interceptor;
use crate::error::{NetworkError, Result};
use crate::response::ResponseMeta;

/// Rejects empty or non-JSON bodies on 2xx responses.
///
/// Non-2xx responses pass through untouched so the executor's status mapping
/// still reports `NotFound`, `ServiceUnavailable` and friends.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResponseValidationInterceptor;

#[async_trait]
impl Interceptor for ResponseValidationInterceptor {
    fn name(&self) -> &str {
        "response-validation"
    }

    async fn on_response(&self, body: Bytes, meta: &ResponseMeta) -> Result<Bytes> {
        if !meta.is_success() {
            return Ok(body);
        }
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(NetworkError::NoData);
        }
        serde_json::from_slice::<IgnoredAny>(&body)
            .map_err(|e| NetworkError::Decoding(format!("response is not valid JSON: {e}")))?;
        Ok(body)
    }
}
