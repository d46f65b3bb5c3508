//! Client-side rate limiting.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::Interceptor;
use crate::error::Result;
use crate::request::RequestDescriptor;

/// Sliding window rate limiter.
///
/// Keeps the timestamps of the requests admitted during the trailing window
/// and admits a new one only while fewer than `max_requests` are recorded.
/// The prune/check/record step happens under one lock, so concurrent
/// callers can never overfill the window. Waiting callers sleep until the
/// oldest timestamp leaves the window and then try again.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Allow `requests_per_second` requests in any trailing second.
    /// Zero is treated as one.
    pub fn new(requests_per_second: u32) -> Self {
        Self::with_window(requests_per_second, Duration::from_secs(1))
    }

    /// Allow `max_requests` requests in any trailing `window`.
    pub fn with_window(max_requests: u32, window: Duration) -> Self {
        let max_requests = max_requests.max(1) as usize;
        Self {
            max_requests,
            window,
            timestamps: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    /// Maximum requests per window.
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Record a request if the window has room.
    pub fn try_acquire(&self) -> bool {
        self.admit(Instant::now()).is_ok()
    }

    /// Wait until the window has room, then record the request.
    ///
    /// Returns the instant the request was recorded at.
    pub async fn acquire(&self) -> Instant {
        loop {
            let now = Instant::now();
            match self.admit(now) {
                Ok(()) => return now,
                Err(until) => tokio::time::sleep_until(until).await,
            }
        }
    }

    /// Time until a request would be admitted, or `None` if one would be now.
    pub fn wait_time(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock();
        self.prune(&mut timestamps, now);
        if timestamps.len() < self.max_requests {
            return None;
        }
        timestamps
            .front()
            .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
    }

    /// Requests recorded in the current window.
    pub fn in_window(&self) -> usize {
        let mut timestamps = self.timestamps.lock();
        self.prune(&mut timestamps, Instant::now());
        timestamps.len()
    }

    /// Record `now` or report when the oldest entry expires.
    fn admit(&self, now: Instant) -> std::result::Result<(), Instant> {
        let mut timestamps = self.timestamps.lock();
        self.prune(&mut timestamps, now);
        if timestamps.len() < self.max_requests {
            timestamps.push_back(now);
            return Ok(());
        }
        match timestamps.front() {
            Some(oldest) => Err(*oldest + self.window),
            None => Err(now + self.window),
        }
    }

    fn prune(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = timestamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Interceptor that suspends outgoing requests until the limiter admits them.
#[derive(Clone, Debug)]
pub struct RateLimitInterceptor {
    limiter: Arc<RateLimiter>,
}

impl RateLimitInterceptor {
    /// Limit to `requests_per_second`.
    pub fn new(requests_per_second: u32) -> Self {
        Self::from_limiter(Arc::new(RateLimiter::new(requests_per_second)))
    }

    /// Share an existing limiter, e.g. across several executors.
    pub fn from_limiter(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    /// The underlying limiter.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

#[async_trait]
impl Interceptor for RateLimitInterceptor {
    fn name(&self) -> &str {
        "rate-limit"
    }

    async fn on_request(&self, request: RequestDescriptor) -> Result<RequestDescriptor> {
        self.limiter.acquire().await;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rate_is_clamped() {
        assert_eq!(RateLimiter::new(0).max_requests(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_fills_window() {
        let limiter = RateLimiter::new(3);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.in_window(), 3);
        assert_eq!(limiter.wait_time(), Some(Duration::from_secs(1)));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(limiter.wait_time(), None);
        assert!(limiter.try_acquire());
        assert_eq!(limiter.in_window(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_never_exceed_rate() {
        let limiter = Arc::new(RateLimiter::new(10));
        let start = Instant::now();

        let tasks: Vec<_> = (0..25)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();

        let mut admitted = Vec::new();
        for task in tasks {
            admitted.push(task.await.unwrap());
        }
        admitted.sort();

        // every caller got through
        assert_eq!(admitted.len(), 25);
        assert!(admitted[24].duration_since(start) >= Duration::from_secs(2));

        for (i, first) in admitted.iter().enumerate() {
            let in_window = admitted[i..]
                .iter()
                .filter(|t| t.duration_since(*first) < Duration::from_secs(1))
                .count();
            assert!(in_window <= 10, "{in_window} requests within one second");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_interceptor_passes_request_through() {
        let interceptor = RateLimitInterceptor::new(1);
        let request = RequestDescriptor::get("/a").with_param("page", 1);

        let out = interceptor.on_request(request.clone()).await.unwrap();
        assert_eq!(out, request);

        let start = Instant::now();
        interceptor.on_request(request).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}
