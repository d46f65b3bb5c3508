//! Request/response interceptors.
//!
//! An [`Interceptor`] sees every logical request once on the way out and
//! every response once on the way back, before status validation. The
//! executor runs an [`InterceptorChain`] in the order it was built, for both
//! phases; it never reorders or skips interceptors. Retries re-send the
//! already decorated request without re-entering the chain.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tidecast_net::interceptor::{
//!     AuthInterceptor, InterceptorChain, ResponseValidationInterceptor, StaticToken,
//! };
//!
//! let chain = InterceptorChain::new()
//!     .with(AuthInterceptor::new(Arc::new(StaticToken::new("secret"))))
//!     .with(ResponseValidationInterceptor);
//! ```

mod auth;
mod logging;
mod rate_limit;
mod validation;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::request::RequestDescriptor;
use crate::response::ResponseMeta;

pub use auth::{AuthInterceptor, StaticToken, TokenProvider};
pub use logging::LoggingInterceptor;
pub use rate_limit::{RateLimitInterceptor, RateLimiter};
pub use validation::ResponseValidationInterceptor;

/// A pluggable request/response transformer.
///
/// Both hooks default to passing their input through unchanged. Returning an
/// error aborts the pipeline with that error unless it is retryable: a
/// retryable `on_response` error re-sends the already built request, without
/// running `on_request` again.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Transform an outgoing request. Must return a new descriptor rather
    /// than relying on shared state.
    async fn on_request(&self, request: RequestDescriptor) -> Result<RequestDescriptor> {
        Ok(request)
    }

    /// Transform an incoming response body.
    async fn on_response(&self, body: Bytes, _meta: &ResponseMeta) -> Result<Bytes> {
        Ok(body)
    }
}

/// Ordered list of interceptors, fixed once the executor is built.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor.
    #[must_use]
    pub fn with(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Append a shared interceptor.
    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    /// Number of interceptors.
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Interceptor names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    /// Run the request phase in order.
    pub async fn apply_request(&self, mut request: RequestDescriptor) -> Result<RequestDescriptor> {
        for interceptor in &self.interceptors {
            request = interceptor.on_request(request).await?;
        }
        Ok(request)
    }

    /// Run the response phase in order.
    pub async fn apply_response(&self, mut body: Bytes, meta: &ResponseMeta) -> Result<Bytes> {
        for interceptor in &self.interceptors {
            body = interceptor.on_response(body, meta).await?;
        }
        Ok(body)
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
