use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AppError;

/// Result of a rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied,
}

/// Process-wide request limiter, injected into the router state
pub trait RequestLimiter: Send + Sync {
    fn check(&self, client_key: &str) -> RateDecision;

    /// Evicts state for clients that have been idle
    fn sweep(&self);
}

/// Keyed GCRA limiter allowing `per_minute` requests per client
pub struct GovernorLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
}

impl GovernorLimiter {
    pub fn per_minute(per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::keyed(Quota::per_minute(per_minute)),
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }
}

impl RequestLimiter for GovernorLimiter {
    fn check(&self, client_key: &str) -> RateDecision {
        match self.limiter.check_key(&client_key.to_string()) {
            Ok(()) => RateDecision::Allowed,
            Err(_) => RateDecision::Denied,
        }
    }

    fn sweep(&self) {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        tracing::debug!(
            before,
            after = self.limiter.len(),
            "Swept rate limiter"
        );
    }
}

/// Spawns the periodic sweep; the task lives as long as the process
pub fn spawn_sweeper(limiter: Arc<dyn RequestLimiter>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            limiter.sweep();
        }
    })
}

/// State for [`rate_limit_middleware`]
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<dyn RequestLimiter>,
    /// Whether `x-forwarded-for` / `x-real-ip` were set by a trusted proxy
    pub trust_proxy_headers: bool,
}

/// Identifies the caller
///
/// With trusted proxy headers: first forwarded hop, then real-ip, then the
/// socket. Otherwise only the socket address counts, since any client can
/// send those headers.
pub fn client_key(request: &Request, trust_proxy_headers: bool) -> String {
    let from_proxy = trust_proxy_headers
        .then(|| proxy_client(request.headers()))
        .flatten();

    from_proxy
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "anonymous".to_string())
}

fn proxy_client(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded.or(real_ip).map(str::to_string)
}

/// Rejects the request with 429 before any handler work when over quota
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request, state.trust_proxy_headers);
    match state.limiter.check(&key) {
        RateDecision::Allowed => next.run(request).await,
        RateDecision::Denied => {
            tracing::warn!(client = %key, "Rate limit exceeded");
            AppError::RateLimited.into_response()
        }
    }
}
