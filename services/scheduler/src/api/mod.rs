//! HTTP API handlers and routing.

pub mod admission;
pub mod error;
mod health;
mod v1;

use axum::{
    http::{header, Method},
    middleware, Router,
};
use keel_id::RequestId as KeelRequestId;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{
        MakeRequestId, PropagateRequestIdLayer, RequestId as TowerRequestId, SetRequestIdLayer,
    },
    trace::TraceLayer,
};

use crate::state::AppState;

#[derive(Clone, Copy)]
struct MakeKeelRequestId;

impl MakeRequestId for MakeKeelRequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<TowerRequestId> {
        let request_id = KeelRequestId::new().to_string();
        let header_value = axum::http::HeaderValue::from_str(&request_id).ok()?;
        Some(TowerRequestId::new(header_value))
    }
}

/// Create the main API router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_origin(Any);

    let request_id_header = header::HeaderName::from_static("x-request-id");
    let set_request_id = SetRequestIdLayer::new(request_id_header.clone(), MakeKeelRequestId);
    let propagate_request_id = PropagateRequestIdLayer::new(request_id_header);

    // The admission gate wraps the management API only; health probes must
    // keep answering while the API sheds load.
    let gated_v1 = v1::routes().layer(middleware::from_fn_with_state(
        state.admission().clone(),
        admission::limit_concurrent_requests,
    ));

    Router::new()
        .merge(health::routes())
        .nest("/v1", gated_v1)
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id)
        .layer(set_request_id)
        .layer(cors)
        .with_state(state)
}
