//! End-to-end tests for the request executor against a mock server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Deserialize;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tidecast_net::{
    AuthInterceptor, CacheConfig, CachePolicy, ClientConfig, ConnectionKind, ConnectivityStatus,
    Interceptor, ManualConnectivity, NetworkError, RateLimitInterceptor, RateLimiter,
    RequestDescriptor, RequestExecutor, ResponseCache, ResponseMeta,
    ResponseValidationInterceptor, Result, StaticToken, TransportRequest,
};

#[derive(Debug, Deserialize, PartialEq)]
struct Greeting {
    message: String,
}

fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::new(server.uri())
        .with_retry_count(2)
        .with_retry_delay(Duration::from_millis(50))
        .with_caching(false)
}

async fn wait_for_in_flight(executor: &RequestExecutor, count: usize) {
    for _ in 0..200 {
        if executor.in_flight_count() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("never reached {count} in-flight requests");
}

#[tokio::test]
async fn test_success_decodes_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/greeting"))
        .and(query_param("lang", "en"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"message": "hi"})))
        .expect(1)
        .mount(&server)
        .await;

    let executor = RequestExecutor::new(config(&server)).unwrap();
    let greeting: Greeting = executor
        .execute(&RequestDescriptor::get("/greeting").with_param("lang", "en"))
        .await
        .unwrap();

    assert_eq!(greeting.message, "hi");
    assert_eq!(executor.in_flight_count(), 0);
}

#[tokio::test]
async fn test_json_headers_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/favorites"))
        .and(header("content-type", "application/json"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let executor = RequestExecutor::new(config(&server)).unwrap();
    executor
        .execute_raw(&RequestDescriptor::post("/favorites").with_param("id", 7))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_non_retryable_status_calls_transport_once() {
    let server = MockServer::start().await;
    Mock::given(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let executor =
        RequestExecutor::new(config(&server).with_retry_count(5)).unwrap();
    let result = executor.execute_raw(&RequestDescriptor::get("/missing")).await;
    assert_eq!(result, Err(NetworkError::NotFound));
}

#[tokio::test]
async fn test_status_mapping() {
    let server = MockServer::start().await;
    for (route, status) in [("/401", 401), ("/403", 403), ("/429", 429), ("/418", 418)] {
        Mock::given(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({"message": "nope"})))
            .mount(&server)
            .await;
    }

    let executor = RequestExecutor::new(config(&server)).unwrap();
    let run = |route: &'static str| {
        let executor = executor.clone();
        async move { executor.execute_raw(&RequestDescriptor::get(route)).await }
    };

    assert_eq!(run("/401").await, Err(NetworkError::Unauthorized));
    assert_eq!(run("/403").await, Err(NetworkError::Forbidden));
    assert_eq!(run("/429").await, Err(NetworkError::RateLimited));
    assert_eq!(
        run("/418").await,
        Err(NetworkError::Server {
            code: 418,
            message: "nope".into()
        })
    );
}

#[tokio::test]
async fn test_retryable_status_uses_full_budget() {
    let server = MockServer::start().await;
    Mock::given(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let executor = RequestExecutor::new(config(&server)).unwrap();
    let start = Instant::now();
    let result = executor.execute_raw(&RequestDescriptor::get("/flaky")).await;

    assert_eq!(result, Err(NetworkError::ServiceUnavailable));
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_recovers_after_server_error() {
    let server = MockServer::start().await;
    Mock::given(path("/recover"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/recover"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"message": "back"})))
        .expect(1)
        .mount(&server)
        .await;

    let executor = RequestExecutor::new(config(&server)).unwrap();
    let greeting: Greeting = executor
        .execute(&RequestDescriptor::get("/recover"))
        .await
        .unwrap();
    assert_eq!(greeting.message, "back");
}

#[tokio::test]
async fn test_no_connectivity_skips_transport() {
    let server = MockServer::start().await;
    // only the call made after reconnecting reaches the server
    Mock::given(path("/offline"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let connectivity = Arc::new(ManualConnectivity::disconnected());
    let executor = RequestExecutor::builder(config(&server))
        .connectivity(connectivity.clone())
        .build()
        .unwrap();

    let descriptor = RequestDescriptor::get("/offline");
    assert_eq!(
        executor.execute_raw(&descriptor).await,
        Err(NetworkError::NoConnectivity)
    );

    connectivity.set_status(ConnectivityStatus::Connected(ConnectionKind::Wifi));
    assert!(executor.execute_raw(&descriptor).await.is_ok());
}

#[tokio::test]
async fn test_malformed_body_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(path("/garbled"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .expect(1)
        .mount(&server)
        .await;

    let executor = RequestExecutor::new(config(&server)).unwrap();
    let result: Result<Greeting> = executor.execute(&RequestDescriptor::get("/garbled")).await;
    assert!(matches!(result, Err(NetworkError::Decoding(_))));
}

#[tokio::test]
async fn test_validation_rejects_empty_body() {
    let server = MockServer::start().await;
    Mock::given(path("/empty"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let executor = RequestExecutor::builder(config(&server))
        .interceptor(ResponseValidationInterceptor)
        .build()
        .unwrap();
    let result = executor.execute_raw(&RequestDescriptor::get("/empty")).await;
    assert_eq!(result, Err(NetworkError::NoData));
}

#[tokio::test]
async fn test_auth_header_is_attached() {
    let server = MockServer::start().await;
    Mock::given(path("/me"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let executor = RequestExecutor::builder(config(&server))
        .interceptor(AuthInterceptor::new(Arc::new(StaticToken::new("secret"))))
        .build()
        .unwrap();
    executor.execute_raw(&RequestDescriptor::get("/me")).await.unwrap();
}

struct Recorder {
    name: &'static str,
    events: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Interceptor for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    async fn on_request(&self, request: RequestDescriptor) -> Result<RequestDescriptor> {
        self.events.lock().push(format!("request:{}", self.name));
        Ok(request)
    }

    async fn on_response(&self, body: Bytes, meta: &ResponseMeta) -> Result<Bytes> {
        self.events
            .lock()
            .push(format!("response:{}:{}", self.name, meta.status));
        Ok(body)
    }
}

#[tokio::test]
async fn test_interceptors_run_once_per_call_in_order() {
    let server = MockServer::start().await;
    Mock::given(path("/ordered"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let events = Arc::new(Mutex::new(Vec::new()));
    let executor = RequestExecutor::builder(config(&server))
        .interceptor(Recorder { name: "first", events: events.clone() })
        .interceptor(Recorder { name: "second", events: events.clone() })
        .build()
        .unwrap();

    let result = executor.execute_raw(&RequestDescriptor::get("/ordered")).await;
    assert!(matches!(result, Err(NetworkError::Server { code: 500, .. })));
    assert_eq!(
        *events.lock(),
        [
            "request:first",
            "request:second",
            "response:first:500",
            "response:second:500"
        ]
    );
}

/// Fails the response phase with `error` for the first `failures` responses.
struct FlakyBody {
    failures: usize,
    error: NetworkError,
    seen: Mutex<usize>,
}

impl FlakyBody {
    fn new(failures: usize, error: NetworkError) -> Self {
        Self { failures, error, seen: Mutex::new(0) }
    }
}

#[async_trait]
impl Interceptor for FlakyBody {
    fn name(&self) -> &str {
        "flaky-body"
    }

    async fn on_response(&self, body: Bytes, _meta: &ResponseMeta) -> Result<Bytes> {
        let mut seen = self.seen.lock();
        *seen += 1;
        if *seen <= self.failures {
            return Err(self.error.clone());
        }
        Ok(body)
    }
}

#[tokio::test]
async fn test_retryable_response_phase_error_resends() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"message": "whole"})))
        .expect(2)
        .mount(&server)
        .await;

    let events = Arc::new(Mutex::new(Vec::new()));
    let executor = RequestExecutor::builder(config(&server).with_retry_count(3))
        .interceptor(Recorder { name: "outer", events: events.clone() })
        .interceptor(FlakyBody::new(1, NetworkError::Transport("truncated stream".into())))
        .build()
        .unwrap();

    let greeting: Greeting = executor.execute(&RequestDescriptor::get("/stream")).await.unwrap();
    assert_eq!(greeting.message, "whole");
    // the request phase ran once; the response phase once per attempt
    assert_eq!(
        *events.lock(),
        ["request:outer", "response:outer:200", "response:outer:200"]
    );
}

#[tokio::test]
async fn test_response_phase_errors_follow_retry_classification() {
    let server = MockServer::start().await;
    Mock::given(path("/always-slow"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(path("/rejected"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let retryable = RequestExecutor::builder(config(&server))
        .interceptor(FlakyBody::new(usize::MAX, NetworkError::Timeout))
        .build()
        .unwrap();
    let result = retryable.execute_raw(&RequestDescriptor::get("/always-slow")).await;
    assert_eq!(result, Err(NetworkError::Timeout));

    let final_error = RequestExecutor::builder(config(&server))
        .interceptor(FlakyBody::new(usize::MAX, NetworkError::Forbidden))
        .build()
        .unwrap();
    let result = final_error.execute_raw(&RequestDescriptor::get("/rejected")).await;
    assert_eq!(result, Err(NetworkError::Forbidden));
}

#[tokio::test]
async fn test_get_responses_are_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cached"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"abc\"")
                .set_body_json(serde_json::json!({"message": "stored"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let executor = RequestExecutor::new(
        config(&server)
            .with_caching(true)
            .with_cache_dir(dir.path()),
    )
    .unwrap();

    let descriptor = RequestDescriptor::get("/cached");
    let first: Greeting = executor.execute(&descriptor).await.unwrap();
    let second: Greeting = executor.execute(&descriptor).await.unwrap();
    assert_eq!(first, second);

    let cache = executor.cache().unwrap();
    let signature = TransportRequest::build(&descriptor, &server.uri())
        .unwrap()
        .signature();
    let entry = cache.retrieve(&signature).await.unwrap();
    assert_eq!(entry.etag.as_deref(), Some("\"abc\""));
    assert!(cache.disk_usage().await > 0);
}

#[tokio::test]
async fn test_cache_hits_still_pass_request_phase() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let limiter = Arc::new(RateLimiter::with_window(10, Duration::from_secs(60)));
    let executor = RequestExecutor::builder(
        config(&server)
            .with_caching(true)
            .with_cache_dir(dir.path()),
    )
    .interceptor(RateLimitInterceptor::from_limiter(limiter.clone()))
    .build()
    .unwrap();

    let descriptor = RequestDescriptor::get("/limited");
    executor.execute_raw(&descriptor).await.unwrap();
    executor.execute_raw(&descriptor).await.unwrap();

    // the cache key depends on headers added by the request phase, so the
    // second call takes a slot before it is served from the cache
    assert_eq!(limiter.in_window(), 2);
}

#[tokio::test]
async fn test_cache_bypass_and_non_get() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(ResponseCache::new(CacheConfig::default().with_dir(dir.path())));
    let executor = RequestExecutor::builder(config(&server).with_caching(true))
        .cache(cache.clone())
        .build()
        .unwrap();

    let uncached = RequestDescriptor::get("/fresh").with_cache_policy(CachePolicy::None);
    executor.execute_raw(&uncached).await.unwrap();
    executor.execute_raw(&uncached).await.unwrap();

    let post = RequestDescriptor::post("/fresh");
    executor.execute_raw(&post).await.unwrap();
    executor.execute_raw(&post).await.unwrap();

    let stats = cache.stats().await;
    assert_eq!(stats.memory_entries, 0);
    assert_eq!(stats.disk_entries, 0);
}

#[tokio::test]
async fn test_cancel_all_aborts_in_flight_requests() {
    let server = MockServer::start().await;
    for route in ["/slow/a", "/slow/b"] {
        Mock::given(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{}")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let executor = RequestExecutor::new(
        config(&server)
            .with_caching(true)
            .with_cache_dir(dir.path()),
    )
    .unwrap();

    let tasks: Vec<_> = ["/slow/a", "/slow/b"]
        .into_iter()
        .map(|route| {
            let executor = executor.clone();
            tokio::spawn(async move { executor.execute_raw(&RequestDescriptor::get(route)).await })
        })
        .collect();

    wait_for_in_flight(&executor, 2).await;
    assert_eq!(executor.cancel_all(), 2);

    for task in tasks {
        assert_eq!(task.await.unwrap(), Err(NetworkError::Cancelled));
    }
    assert_eq!(executor.in_flight_count(), 0);

    let stats = executor.cache().unwrap().stats().await;
    assert_eq!(stats.memory_entries, 0);
    assert_eq!(stats.disk_entries, 0);
}

#[tokio::test]
async fn test_cancel_by_descriptor() {
    let server = MockServer::start().await;
    Mock::given(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let executor = RequestExecutor::new(config(&server)).unwrap();
    let descriptor = RequestDescriptor::get("/slow").with_param("page", 1);

    let task = tokio::spawn({
        let executor = executor.clone();
        let descriptor = descriptor.clone();
        async move { executor.execute_raw(&descriptor).await }
    });
    wait_for_in_flight(&executor, 1).await;

    assert!(!executor.cancel(&RequestDescriptor::get("/slow").with_param("page", 2)));
    assert!(executor.cancel(&descriptor));
    assert_eq!(task.await.unwrap(), Err(NetworkError::Cancelled));
    assert!(!executor.cancel(&descriptor));
}

#[tokio::test]
async fn test_cancel_during_retry_delay_stops_attempts() {
    let server = MockServer::start().await;
    Mock::given(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let executor = RequestExecutor::new(
        config(&server).with_retry_delay(Duration::from_secs(10)),
    )
    .unwrap();
    let task = tokio::spawn({
        let executor = executor.clone();
        async move { executor.execute_raw(&RequestDescriptor::get("/down")).await }
    });

    // let the first attempt land, then cancel while sleeping before the retry
    wait_for_in_flight(&executor, 1).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    executor.cancel_all();

    assert_eq!(task.await.unwrap(), Err(NetworkError::Cancelled));
}

#[tokio::test]
async fn test_second_call_supersedes_first() {
    let server = MockServer::start().await;
    Mock::given(path("/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"message": "results"}))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let executor = RequestExecutor::new(config(&server)).unwrap();
    let descriptor = RequestDescriptor::get("/search").with_param("q", "tide");

    let first = tokio::spawn({
        let executor = executor.clone();
        let descriptor = descriptor.clone();
        async move { executor.execute::<Greeting>(&descriptor).await }
    });
    wait_for_in_flight(&executor, 1).await;

    let second: Greeting = executor.execute(&descriptor).await.unwrap();
    assert_eq!(second.message, "results");
    assert_eq!(first.await.unwrap(), Err(NetworkError::Cancelled));
    assert_eq!(executor.in_flight_count(), 0);
}
