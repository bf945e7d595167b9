pub mod common;
pub mod rest;

pub use common::{common_routes, common_routes_with_ready};
pub use rest::rest_routes;

use crate::state::AppState;
use axum::Router;

/// Health, readiness and version routes merged with the REST fallback.
pub fn app_router(state: AppState) -> Router {
    common_routes_with_ready(state.clone()).merge(rest_routes(state))
}
