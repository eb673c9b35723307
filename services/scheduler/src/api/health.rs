//! Health check endpoints.
//!
//! Used by load balancers and orchestration systems to decide whether the
//! scheduler should receive traffic. These routes are deliberately outside
//! the admission gate.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status: "ok" or "degraded".
    pub status: String,

    /// Service name.
    pub service: String,

    /// Service version.
    pub version: String,

    /// Current timestamp (ISO 8601).
    pub timestamp: String,

    /// Detailed component health (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<ComponentHealth>,
}

/// Component health details.
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    /// Offer matcher manager mailbox status.
    pub matcher_manager: ComponentStatus,
}

/// Individual component status.
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    /// Status: "ok" or "unavailable".
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Create health check routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/livez", get(livez))
}

/// Basic liveness probe: 200 whenever the server is up.
async fn healthz() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "scheduler".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        components: None,
    })
}

/// Readiness probe: 503 until the matcher manager is accepting messages.
async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let manager_ok = !state.manager().is_closed();

    let components = ComponentHealth {
        matcher_manager: ComponentStatus {
            status: if manager_ok { "ok" } else { "unavailable" }.to_string(),
            message: if manager_ok {
                None
            } else {
                Some("manager mailbox closed".to_string())
            },
        },
    };

    let response = HealthResponse {
        status: if manager_ok { "ok" } else { "degraded" }.to_string(),
        service: "scheduler".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        components: Some(components),
    };

    if manager_ok {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Minimal liveness probe for orchestrators.
async fn livez() -> impl IntoResponse {
    StatusCode::OK
}
