//! Pairing request throttling and request logging.

use crate::error::BrokerError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Instant};
use tracing::{debug, warn};

type PairingLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-minute budget for new pairing sessions.
///
/// Every pairing request opens a provider connection, so the budget is
/// process-wide rather than per client. Clones draw from the same budget.
#[derive(Clone)]
pub struct PairingRateLimit {
    limiter: Arc<PairingLimiter>,
}

impl PairingRateLimit {
    /// Admit `requests` pairing requests per minute. Zero admits one.
    pub fn per_minute(requests: u32) -> Self {
        let burst = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(burst))),
        }
    }

    /// A budget no test will exhaust.
    pub fn unlimited() -> Self {
        Self::per_minute(u32::MAX)
    }

    /// Take one request from the budget. False when it is spent.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

/// Reject pairing requests over budget with 429 before any session is
/// allocated.
pub async fn throttle_pairing(
    State(limit): State<PairingRateLimit>,
    request: Request,
    next: Next,
) -> Result<Response, BrokerError> {
    if !limit.try_acquire() {
        warn!("Pairing budget spent, rejecting request");
        return Err(BrokerError::RateLimitExceeded);
    }

    Ok(next.run(request).await)
}

/// Log each request by method, path and status.
///
/// The query string is never logged; it carries the phone number.
pub async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let start = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let duration = start.elapsed();

    if status.is_client_error() || status.is_server_error() {
        warn!(%method, %path, %status, ?duration, "Request failed");
    } else {
        debug!(%method, %path, %status, ?duration, "Request completed");
    }

    response
}
