use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{
    api::AppState,
    middleware::{make_span_with_request_id, rate_limit_middleware, request_id_middleware},
};

pub mod catalog;
pub mod recommendations;

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes(state))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
        )
}

/// API routes under /api/v1
fn api_routes(state: AppState) -> Router {
    let recommend = Router::new()
        .route("/recommendations", post(recommendations::recommend))
        .route_layer(middleware::from_fn_with_state(
            state.rate_limit_state(),
            rate_limit_middleware,
        ));

    Router::new()
        .route("/providers", get(catalog::providers))
        .route("/genres", get(catalog::genres))
        .merge(recommend)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
