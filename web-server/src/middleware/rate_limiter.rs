// web-server/src/middleware/rate_limiter.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Instant, Duration};
use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header,
    Error, ResponseError,
    HttpResponse
};
use common::{ErrorResponse, RateLimitConfig};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use std::fmt;

#[derive(Debug)]
struct RateLimitExceeded {
    retry_after: u64,
}

impl fmt::Display for RateLimitExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rate limit exceeded")
    }
}

impl ResponseError for RateLimitExceeded {
    fn status_code(&self) -> actix_web::http::StatusCode {
        actix_web::http::StatusCode::TOO_MANY_REQUESTS
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::TooManyRequests()
            .append_header((header::RETRY_AFTER, self.retry_after.to_string()))
            .json(ErrorResponse::new("Rate limit exceeded. Please try again later."))
    }
}

#[derive(Debug, Default)]
struct HitStore {
    hits: HashMap<String, Vec<Instant>>,
    last_sweep: Option<Instant>,
}

impl HitStore {
    /// Drop clients with no hits left inside the window
    fn sweep(&mut self, now: Instant, window: Duration) {
        self.hits.retain(|_, times| {
            times.retain(|time| now.saturating_duration_since(*time) < window);
            !times.is_empty()
        });
        self.last_sweep = Some(now);
    }
}

/// Sliding-window limiter keyed by client IP, applied to path prefixes
#[derive(Debug, Clone)]
pub struct RateLimiter {
    paths: Vec<String>,
    max_requests: usize,
    window: Duration,
    store: Arc<Mutex<HitStore>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            paths: config.paths.clone(),
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_secs),
            store: Arc::new(Mutex::new(HitStore::default())),
        }
    }

    fn applies_to(&self, path: &str) -> bool {
        self.paths.iter().any(|p| path.starts_with(p.as_str()))
    }

    fn is_rate_limited(&self, ip: &str, now: Instant) -> bool {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let window = self.window;

        // At most one full sweep per window
        let sweep_due = store
            .last_sweep
            .map_or(true, |last| now.saturating_duration_since(last) >= window);
        if sweep_due {
            store.sweep(now, window);
        }

        let hits = store.hits.entry(ip.to_string()).or_default();
        hits.retain(|time| now.saturating_duration_since(*time) < window);

        if hits.len() >= self.max_requests {
            true
        } else {
            hits.push(now);
            false
        }
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.store.lock().unwrap_or_else(PoisonError::into_inner).hits.len()
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimiter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RateLimiterMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimiterMiddleware {
            service,
            limiter: self.clone(),
        }))
    }
}

pub struct RateLimiterMiddleware<S> {
    service: S,
    limiter: RateLimiter,
}

impl<S, B> Service<ServiceRequest> for RateLimiterMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<ServiceResponse<B>, Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if self.limiter.applies_to(req.path()) {
            let ip = req.connection_info().realip_remote_addr()
                .unwrap_or("unknown")
                .to_string();

            if self.limiter.is_rate_limited(&ip, Instant::now()) {
                tracing::warn!("Rate limit exceeded for IP: {}", ip);
                let retry_after = self.limiter.window.as_secs();
                return Box::pin(async move {
                    Err(RateLimitExceeded { retry_after }.into())
                });
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            fut.await
        })
    }
}
