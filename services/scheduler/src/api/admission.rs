//! Bounded-concurrency admission gate for the management API.
//!
//! A fixed pool of permits caps how many requests execute the downstream
//! chain at once. A request that cannot take a permit within the configured
//! wait is shed with 503. The permit is an RAII guard held across the
//! downstream call, so every exit path releases it, including an unwinding
//! panic dropping the response future.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Semaphore;
use tracing::warn;

/// Shared permit pool for the admission gate.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    limit: usize,
    wait: Duration,
}

impl ConcurrencyGate {
    /// A gate admitting at most `limit` concurrent requests, each waiting
    /// up to `wait` for a permit.
    pub fn new(limit: usize, wait: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            wait,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Middleware enforcing the gate. Layer over the routes to protect.
pub async fn limit_concurrent_requests(
    State(gate): State<ConcurrencyGate>,
    request: Request,
    next: Next,
) -> Response {
    match tokio::time::timeout(gate.wait, gate.semaphore.clone().acquire_owned()).await {
        Ok(Ok(_permit)) => next.run(request).await,
        Ok(Err(_)) => {
            // The semaphore is never closed; reaching this is a wiring bug.
            warn!("Admission gate semaphore closed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(_) => {
            warn!(limit = gate.limit, "Shedding request, concurrency limit reached");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Too many concurrent requests! Allowed: {}.", gate.limit),
            )
                .into_response()
        }
    }
}
