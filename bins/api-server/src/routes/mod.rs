use std::time::Duration;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod auth;
pub mod tools;
pub mod users;

/// Everything under `/api` sits behind the session gate; `/login`,
/// `/logout` and `/health` stay public.
fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/session", get(auth::session_info))
        .merge(tools::router())
        .merge(users::router())
        .route_layer(from_fn_with_state(state, auth::require_session))
}

pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .nest("/api", api_routes(state.clone()))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_methods(Any)
                .allow_origin(Any)
                .allow_headers(Any),
        )
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
