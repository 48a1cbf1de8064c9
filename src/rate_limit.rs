//! Fixed-window rate limiting, one counter per peer IP.
//!
//! The counter map is shared across actix workers through an `Arc`, so the
//! limit holds process-wide. A request beyond the configured maximum inside
//! the current window is rejected with 429 and the usual envelope body.
//! Nothing is persisted or coordinated across processes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::{ready, LocalBoxFuture, Ready};

use crate::config::Config;
use crate::error::AppError;

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<RateLimiterInner>,
}

struct RateLimiterInner {
    window: Duration,
    max_requests: u32,
    counters: Mutex<HashMap<String, WindowCounter>>,
}

struct WindowCounter {
    window_start: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Duration::from_secs(config.rate_limit_window_secs),
            config.rate_limit_max_requests,
        )
    }

    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            inner: Arc::new(RateLimiterInner {
                window,
                max_requests,
                counters: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Records one request from `peer` and says whether it may proceed.
    fn check(&self, peer: &str) -> bool {
        let now = Instant::now();
        let mut counters = self
            .inner
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Opportunistically drop windows that have rolled over so the map
        // does not grow with one-off clients.
        counters.retain(|_, counter| now.duration_since(counter.window_start) < self.inner.window);

        let counter = counters.entry(peer.to_string()).or_insert(WindowCounter {
            window_start: now,
            count: 0,
        });
        counter.count += 1;
        counter.count <= self.inner.max_requests
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimiter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RateLimiterService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimiterService {
            service,
            limiter: self.clone(),
        }))
    }
}

pub struct RateLimiterService<S> {
    service: S,
    limiter: RateLimiter,
}

impl<S, B> Service<ServiceRequest> for RateLimiterService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let peer = req
            .peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        if self.limiter.check(&peer) {
            let fut = self.service.call(req);
            Box::pin(fut)
        } else {
            log::warn!("rate limit exceeded for {}", peer);
            let err = AppError::RateLimited(
                "Too many requests from this IP, please try again later.".into(),
            );
            Box::pin(async move { Err(err.into()) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_within_limit_pass() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 3);
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));
    }

    #[test]
    fn test_peers_are_counted_independently() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.2"));
        assert!(!limiter.check("10.0.0.1"));
    }

    #[test]
    fn test_window_rollover_resets_the_counter() {
        let limiter = RateLimiter::new(Duration::from_millis(10), 1);
        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.check("10.0.0.1"));
    }
}
