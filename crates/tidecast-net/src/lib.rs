//! Resilient HTTP client core for Tidecast.
//!
//! This crate provides the request pipeline the Tidecast apps talk to their
//! backend through:
//!
//! - **Request Executor**: connectivity gating, retry with pluggable backoff,
//!   in-flight tracking with cancellation
//! - **Interceptors**: logging, bearer authentication, rate limiting and
//!   response validation, applied in a caller-chosen order
//! - **Response Cache**: LRU memory tier plus a persistent, size-bounded disk tier
//! - **Connectivity Monitor**: reachability from the host's network interfaces
//!
//! # Executing Requests
//!
//! ```ignore
//! use std::sync::Arc;
//! use tidecast_net::{ClientConfig, NetworkMonitor, RequestDescriptor, RequestExecutor};
//!
//! let monitor = Arc::new(NetworkMonitor::new());
//! monitor.start()?;
//!
//! let executor = RequestExecutor::builder(ClientConfig::from_file("tidecast.toml")?)
//!     .connectivity(monitor)
//!     .standard_interceptors()
//!     .build()?;
//!
//! let sections: HomeSections = executor
//!     .execute(&RequestDescriptor::get("/home_sections").with_param("page", 1))
//!     .await?;
//! ```
//!
//! ## Failures
//!
//! Every call ends in decoded data or exactly one [`NetworkError`]. Timeouts,
//! transport failures and 5xx responses are retried up to `retry_count`
//! times; everything else, including `NoConnectivity` and decoding failures,
//! is returned immediately.
//!
//! ## Cancellation
//!
//! ```ignore
//! let pending = tokio::spawn({
//!     let executor = executor.clone();
//!     async move { executor.execute_raw(&RequestDescriptor::get("/search")).await }
//! });
//!
//! executor.cancel_all();
//! assert!(matches!(pending.await?, Err(NetworkError::Cancelled)));
//! ```
//!
//! # Logging
//!
//! Events go through `tracing` under the targets in [`logger::targets`];
//! install any subscriber to see them.

pub mod cache;
pub mod config;
pub mod connectivity;
mod error;
pub mod executor;
pub mod interceptor;
pub mod logger;
pub mod request;
pub mod response;
pub mod retry;
pub mod signature;
pub mod transport;

pub use error::{NetworkError, Result};

// Re-export commonly used types at the crate root
pub use cache::{CacheConfig, CacheEntry, CacheStats, ResponseCache};
pub use config::{BackoffKind, ClientConfig, ConfigError};
pub use connectivity::{
    ConnectionKind, Connectivity, ConnectivityStatus, ManualConnectivity, NetworkMonitor,
};
pub use executor::{RequestExecutor, RequestExecutorBuilder};
pub use interceptor::{
    AuthInterceptor, Interceptor, InterceptorChain, LoggingInterceptor, RateLimitInterceptor,
    RateLimiter, ResponseValidationInterceptor, StaticToken, TokenProvider,
};
pub use logger::{LogEvent, LogLevel, RequestLogger};
pub use request::{CachePolicy, HttpMethod, ParamValue, RequestDescriptor};
pub use response::{RawResponse, ResponseMeta};
pub use retry::{Backoff, RetryPolicy};
pub use signature::RequestSignature;
pub use transport::{ReqwestTransport, Transport, TransportRequest};
