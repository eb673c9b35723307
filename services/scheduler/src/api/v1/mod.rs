//! Management API, version 1.
//!
//! Exposes the manager's token counter and introspection. Matcher
//! registration happens over the matcher transport, not this API.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/launch-tokens", put(set_launch_tokens).post(add_launch_tokens))
        .route("/offers/wanted", get(offers_wanted))
        .route("/status", get(status))
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Request to replace the launch token counter.
#[derive(Debug, Deserialize)]
pub struct SetLaunchTokensRequest {
    pub tokens: u64,
}

/// Request to grant additional launch tokens.
#[derive(Debug, Deserialize)]
pub struct AddLaunchTokensRequest {
    pub delta: i64,
}

/// Current wanted-offers signal.
#[derive(Debug, Serialize)]
pub struct OffersWantedResponse {
    pub wanted: bool,
}

// =============================================================================
// Handlers
// =============================================================================

async fn set_launch_tokens(
    State(state): State<AppState>,
    Json(request): Json<SetLaunchTokensRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .manager()
        .set_launch_tokens(request.tokens)
        .await
        .map_err(|e| ApiError::internal("manager_unavailable", e.to_string()))?;

    Ok(StatusCode::NO_CONTENT)
}

async fn add_launch_tokens(
    State(state): State<AppState>,
    Json(request): Json<AddLaunchTokensRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // External callers only grant tokens; consumption is internal.
    if request.delta < 0 {
        return Err(ApiError::bad_request(
            "negative_token_delta",
            "delta must be non-negative",
        ));
    }

    state
        .manager()
        .add_launch_tokens(request.delta)
        .await
        .map_err(|e| ApiError::internal("manager_unavailable", e.to_string()))?;

    Ok(StatusCode::NO_CONTENT)
}

async fn offers_wanted(State(state): State<AppState>) -> impl IntoResponse {
    let wanted = *state.manager().offers_wanted().borrow();
    Json(OffersWantedResponse { wanted })
}

async fn status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let status = state
        .manager()
        .status()
        .await
        .map_err(|e| ApiError::internal("manager_unavailable", e.to_string()))?;

    Ok(Json(status))
}
