//! Schema-driven REST routes: `/--schema` plus a fallback that serves every table path.

use crate::handlers::rest::{dispatch, schema};
use crate::state::AppState;
use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tower_http::limit::RequestBodyLimitLayer;

pub fn rest_routes(state: AppState) -> Router {
    let limit = state.engine.settings().body_limit_bytes;
    Router::new()
        .route("/--schema", get(schema))
        .fallback(dispatch)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(limit))
        .with_state(state)
}
