// Package route definitions

use axum::{
    routing::get,
    Router,
};

use crate::config::state::AppState;
use super::handler;

/// Creates router with the package list, create and retrieve endpoints
pub fn package_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/flow-results/packages/",
            get(handler::list_packages_handler).post(handler::create_package_handler),
        )
        .route("/api/v1/flow-results/packages/{id}/", get(handler::retrieve_package_handler))
}
