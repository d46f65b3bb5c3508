//! Request/response logging.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::Interceptor;
use crate::error::Result;
use crate::logger::{body_preview, LogEvent, RequestLogger};
use crate::request::RequestDescriptor;
use crate::response::ResponseMeta;
use crate::transport::TransportRequest;

/// Emits a request event on the way out and a response event on the way
/// back. Never alters what it sees.
#[derive(Clone, Debug)]
pub struct LoggingInterceptor {
    logger: Arc<RequestLogger>,
    base_url: String,
    model: Option<String>,
}

impl LoggingInterceptor {
    /// Log through `logger`, rendering relative endpoints against `base_url`.
    pub fn new(logger: Arc<RequestLogger>, base_url: impl Into<String>) -> Self {
        Self {
            logger,
            base_url: base_url.into(),
            model: None,
        }
    }

    /// Name the type response bodies decode into, for response events.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[async_trait]
impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &str {
        "logging"
    }

    async fn on_request(&self, request: RequestDescriptor) -> Result<RequestDescriptor> {
        // render what will go on the wire; fall back to the raw endpoint if
        // the descriptor cannot be built yet
        let event = match TransportRequest::build(&request, &self.base_url) {
            Ok(wire) => LogEvent::Request {
                method: wire.method.to_string(),
                url: wire.url.to_string(),
                headers: wire.headers,
                body_preview: wire.body.as_deref().and_then(body_preview),
            },
            Err(_) => LogEvent::Request {
                method: request.method().to_string(),
                url: request.endpoint().to_string(),
                headers: request.headers().clone(),
                body_preview: request.body().map(Bytes::as_ref).and_then(body_preview),
            },
        };
        self.logger.log(event);
        Ok(request)
    }

    async fn on_response(&self, body: Bytes, meta: &ResponseMeta) -> Result<Bytes> {
        self.logger.log(LogEvent::Response {
            url: meta.url.clone(),
            status: meta.status,
            byte_count: body.len(),
            model: self.model.clone(),
            body_preview: body_preview(&body),
        });
        Ok(body)
    }
}
