//! The request pipeline.
//!
//! [`RequestExecutor`] turns a [`RequestDescriptor`] into decoded data or a
//! [`NetworkError`]:
//!
//! 1. connectivity check (`NoConnectivity`, never retried)
//! 2. interceptor request phase, in order
//! 3. transport request built from the decorated descriptor
//! 4. cache lookup for cacheable GETs
//! 5. transport call with retry and backoff
//! 6. interceptor response phase, in order; a retryable error here re-sends
//!    the same transport request like a transport failure would
//! 7. status validation
//! 8. cache store, then decode
//!
//! Every call is registered in an in-flight registry while it runs so it can
//! be cancelled by descriptor or all at once. A second call for the same
//! method and URL supersedes the first, which fails with `Cancelled`.
//!
//! # Example
//!
//! ```ignore
//! use tidecast_net::{ClientConfig, RequestDescriptor, RequestExecutor};
//!
//! let executor = RequestExecutor::builder(ClientConfig::new("https://api.example.com"))
//!     .standard_interceptors()
//!     .build()?;
//!
//! let feed: Feed = executor
//!     .execute(&RequestDescriptor::get("/home_sections").with_param("page", 1))
//!     .await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;

use crate::cache::{CacheConfig, CacheEntry, ResponseCache};
use crate::config::ClientConfig;
use crate::connectivity::{Connectivity, ManualConnectivity};
use crate::error::{NetworkError, Result};
use crate::interceptor::{
    Interceptor, InterceptorChain, LoggingInterceptor, RateLimitInterceptor,
    ResponseValidationInterceptor,
};
use crate::logger::{LogEvent, RequestLogger, targets};
use crate::request::{CachePolicy, HttpMethod, RequestDescriptor};
use crate::response::ResponseMeta;
use crate::retry::RetryPolicy;
use crate::transport::{ReqwestTransport, Transport, TransportRequest};

/// Unique identifier for one `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RequestId(u64);

impl RequestId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

enum Attempt {
    Done(Result<(Bytes, ResponseMeta)>),
    Retry(String),
}

struct InFlightTask {
    id: RequestId,
    cancel_tx: oneshot::Sender<()>,
}

/// Running calls keyed by method + resolved URL.
#[derive(Default)]
struct InFlightRegistry {
    tasks: Mutex<HashMap<String, InFlightTask>>,
}

impl InFlightRegistry {
    /// Register a call, cancelling any previous call under the same key.
    fn register(&self, key: &str) -> (RequestId, oneshot::Receiver<()>) {
        let id = RequestId::new();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let previous = self
            .tasks
            .lock()
            .insert(key.to_string(), InFlightTask { id, cancel_tx });
        if let Some(previous) = previous {
            tracing::debug!(target: targets::EXECUTOR, key, "superseding in-flight request");
            let _ = previous.cancel_tx.send(());
        }
        (id, cancel_rx)
    }

    /// Remove the entry, unless a newer call has taken the key over.
    fn unregister(&self, key: &str, id: RequestId) {
        let mut tasks = self.tasks.lock();
        if tasks.get(key).is_some_and(|task| task.id == id) {
            tasks.remove(key);
        }
    }

    fn cancel(&self, key: &str) -> bool {
        let task = self.tasks.lock().remove(key);
        match task {
            Some(task) => {
                let _ = task.cancel_tx.send(());
                true
            }
            None => false,
        }
    }

    fn cancel_all(&self) -> usize {
        let drained: Vec<InFlightTask> = self.tasks.lock().drain().map(|(_, task)| task).collect();
        let count = drained.len();
        for task in drained {
            let _ = task.cancel_tx.send(());
        }
        count
    }

    fn len(&self) -> usize {
        self.tasks.lock().len()
    }
}

/// Builder for [`RequestExecutor`].
///
/// Collaborators not supplied explicitly get defaults: a reqwest transport
/// built from the config, connectivity that always reports connected, a
/// logger at the configured level when logging is enabled, and a response
/// cache from the config when caching is enabled.
pub struct RequestExecutorBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    connectivity: Option<Arc<dyn Connectivity>>,
    logger: Option<Arc<RequestLogger>>,
    cache: Option<Arc<ResponseCache>>,
    interceptors: InterceptorChain,
    retry_policy: Option<RetryPolicy>,
    standard_interceptors: bool,
}

impl RequestExecutorBuilder {
    fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            connectivity: None,
            logger: None,
            cache: None,
            interceptors: InterceptorChain::new(),
            retry_policy: None,
            standard_interceptors: false,
        }
    }

    /// Use a custom transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a connectivity source, e.g. a started `NetworkMonitor`.
    pub fn connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Use a shared logger. Ignored when logging is disabled in the config.
    pub fn logger(mut self, logger: Arc<RequestLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Use a shared cache. Ignored when caching is disabled in the config.
    pub fn cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Append an interceptor. Interceptors run in the order they are added.
    pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Append a shared interceptor.
    pub fn shared_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// After the interceptors added explicitly, append logging (when
    /// enabled), rate limiting at `rate_limit_per_second`, and response
    /// validation.
    pub fn standard_interceptors(mut self) -> Self {
        self.standard_interceptors = true;
        self
    }

    /// Override the retry policy derived from the config.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Build the executor.
    pub fn build(self) -> Result<RequestExecutor> {
        let config = self.config;
        config
            .validate()
            .map_err(|e| NetworkError::Unknown(e.to_string()))?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&config)?),
        };
        let connectivity = self
            .connectivity
            .unwrap_or_else(|| Arc::new(ManualConnectivity::connected()));
        let logger = config.enable_logging.then(|| {
            self.logger
                .unwrap_or_else(|| Arc::new(RequestLogger::new(config.log_level)))
        });
        let cache = config.enable_caching.then(|| {
            self.cache
                .unwrap_or_else(|| Arc::new(ResponseCache::new(CacheConfig::from(&config))))
        });

        let mut interceptors = self.interceptors;
        if self.standard_interceptors {
            if let Some(logger) = &logger {
                interceptors.push(Arc::new(LoggingInterceptor::new(
                    Arc::clone(logger),
                    config.base_url.clone(),
                )));
            }
            interceptors.push(Arc::new(RateLimitInterceptor::new(
                config.rate_limit_per_second,
            )));
            interceptors.push(Arc::new(ResponseValidationInterceptor));
        }

        let retry_policy = self.retry_policy.unwrap_or_else(|| config.retry_policy());

        tracing::debug!(
            target: targets::EXECUTOR,
            base_url = %config.base_url,
            interceptors = ?interceptors.names(),
            retries = retry_policy.max_retries,
            caching = cache.is_some(),
            "request executor built"
        );

        Ok(RequestExecutor {
            inner: Arc::new(ExecutorInner {
                config,
                transport,
                connectivity,
                logger,
                cache,
                interceptors,
                retry_policy,
                registry: InFlightRegistry::default(),
            }),
        })
    }
}

struct ExecutorInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    connectivity: Arc<dyn Connectivity>,
    logger: Option<Arc<RequestLogger>>,
    cache: Option<Arc<ResponseCache>>,
    interceptors: InterceptorChain,
    retry_policy: RetryPolicy,
    registry: InFlightRegistry,
}

/// Executes requests with connectivity gating, interceptors, retry and
/// caching.
///
/// Cheap to clone; clones share the registry, cache and collaborators.
#[derive(Clone)]
pub struct RequestExecutor {
    inner: Arc<ExecutorInner>,
}

impl RequestExecutor {
    /// Create a builder.
    pub fn builder(config: ClientConfig) -> RequestExecutorBuilder {
        RequestExecutorBuilder::new(config)
    }

    /// Build an executor with default collaborators and no interceptors.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// The configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The response cache, if caching is enabled.
    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.inner.cache.as_ref()
    }

    /// The request logger, if logging is enabled.
    pub fn logger(&self) -> Option<&Arc<RequestLogger>> {
        self.inner.logger.as_ref()
    }

    /// The effective retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.retry_policy
    }

    /// Number of calls currently registered.
    pub fn in_flight_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Execute a request and decode the JSON body into `T`.
    ///
    /// A body that fails to decode yields [`NetworkError::Decoding`]; the
    /// transport call is not repeated for it.
    pub async fn execute<T: DeserializeOwned>(&self, descriptor: &RequestDescriptor) -> Result<T> {
        let body = self.execute_raw(descriptor).await?;
        serde_json::from_slice(&body).map_err(|e| {
            let error = NetworkError::Decoding(format!(
                "{} into {}: {e}",
                descriptor.endpoint(),
                std::any::type_name::<T>()
            ));
            self.log_error(&error);
            error
        })
    }

    /// Execute a request and return the validated body bytes.
    pub async fn execute_raw(&self, descriptor: &RequestDescriptor) -> Result<Bytes> {
        let key = self.registry_key(descriptor);
        let (id, cancel_rx) = self.inner.registry.register(&key);

        let result = tokio::select! {
            biased;
            _ = cancel_rx => Err(NetworkError::Cancelled),
            result = self.run(descriptor) => result,
        };

        self.inner.registry.unregister(&key, id);
        if let Err(error) = &result {
            self.log_error(error);
        }
        result
    }

    /// Cancel the in-flight call matching this descriptor's method and URL.
    ///
    /// Returns whether a call was found.
    pub fn cancel(&self, descriptor: &RequestDescriptor) -> bool {
        let cancelled = self.inner.registry.cancel(&self.registry_key(descriptor));
        if cancelled {
            tracing::debug!(target: targets::EXECUTOR, endpoint = descriptor.endpoint(), "request cancelled");
        }
        cancelled
    }

    /// Cancel every in-flight call. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let count = self.inner.registry.cancel_all();
        if count > 0 {
            tracing::debug!(target: targets::EXECUTOR, count, "all requests cancelled");
        }
        count
    }

    /// Registry key: method and resolved URL, including the query, of the
    /// caller's descriptor.
    fn registry_key(&self, descriptor: &RequestDescriptor) -> String {
        match TransportRequest::build(descriptor, &self.inner.config.base_url) {
            Ok(wire) => format!("{} {}", wire.method, wire.url),
            Err(_) => format!("{} {}", descriptor.method(), descriptor.endpoint()),
        }
    }

    async fn run(&self, descriptor: &RequestDescriptor) -> Result<Bytes> {
        let inner = &self.inner;

        if !inner.connectivity.is_connected().await {
            return Err(NetworkError::NoConnectivity);
        }

        let request = inner.interceptors.apply_request(descriptor.clone()).await?;
        let wire = TransportRequest::build(&request, &inner.config.base_url)?;

        let policy = request.cache_policy();
        let cache = inner
            .cache
            .as_deref()
            .filter(|_| wire.method == HttpMethod::Get && policy != CachePolicy::None);
        let signature = cache.map(|_| wire.signature());

        if let (Some(cache), Some(signature)) = (cache, &signature)
            && let Some(entry) = cache.retrieve(signature).await
        {
            tracing::debug!(target: targets::EXECUTOR, url = %wire.url, "served from cache");
            self.log(LogEvent::debug(format!("cache hit for {}", wire.url)));
            return Ok(entry.payload);
        }

        let (body, meta) = self.send_with_retry(&wire).await?;

        if let Some(error) = NetworkError::from_status(meta.status, &body) {
            return Err(error);
        }

        if let (Some(cache), Some(signature)) = (cache, &signature) {
            let entry = CacheEntry::new(body.clone(), cache.ttl(), meta.etag().map(str::to_string));
            cache.store_entry(entry, signature, policy).await;
        }

        Ok(body)
    }

    /// Send and run the response phase, re-sending the same request while the
    /// outcome is retryable and retries remain. The request phase is not
    /// repeated.
    async fn send_with_retry(&self, wire: &TransportRequest) -> Result<(Bytes, ResponseMeta)> {
        let policy = self.inner.retry_policy;
        let mut retry = 0;

        loop {
            let reason = match self.attempt(wire, retry < policy.max_retries).await {
                Attempt::Done(result) => return result,
                Attempt::Retry(reason) => reason,
            };

            let delay = policy.backoff.delay(retry);
            tracing::debug!(
                target: targets::EXECUTOR,
                url = %wire.url,
                attempt = retry + 1,
                ?delay,
                %reason,
                "retrying"
            );
            self.log(LogEvent::warning(format!(
                "{} {} failed ({reason}), retry {} of {} in {delay:?}",
                wire.method,
                wire.url,
                retry + 1,
                policy.max_retries
            )));

            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }

    /// One transport call plus the response phase.
    ///
    /// With `can_retry` unset every outcome is final, so an exhausted 5xx
    /// still reaches the interceptors and status mapping.
    async fn attempt(&self, wire: &TransportRequest, can_retry: bool) -> Attempt {
        let response = match self.inner.transport.send(wire).await {
            Ok(response) => response,
            Err(error) if can_retry && error.is_retryable() => {
                return Attempt::Retry(error.to_string());
            }
            Err(error) => return Attempt::Done(Err(error)),
        };
        if can_retry && response.meta.is_server_error() {
            return Attempt::Retry(format!("status {}", response.status()));
        }

        let meta = response.meta;
        match self.inner.interceptors.apply_response(response.body, &meta).await {
            Ok(body) => Attempt::Done(Ok((body, meta))),
            Err(error) if can_retry && error.is_retryable() => {
                Attempt::Retry(format!("response phase: {error}"))
            }
            Err(error) => Attempt::Done(Err(error)),
        }
    }

    fn log(&self, event: LogEvent) {
        if let Some(logger) = &self.inner.logger {
            logger.log(event);
        }
    }

    fn log_error(&self, error: &NetworkError) {
        if let Some(logger) = &self.inner.logger {
            logger.error(error.to_string(), error.code().map(i64::from));
        }
    }
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("base_url", &self.inner.config.base_url)
            .field("interceptors", &self.inner.interceptors)
            .field("retry_policy", &self.inner.retry_policy)
            .field("in_flight", &self.in_flight_count())
            .finish_non_exhaustive()
    }
}
