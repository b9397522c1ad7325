// Start of file: /src/api/mod.rs

/*
    * HTTP surface: the Flow Results packages and responses endpoints behind
    * authentication, plus the open health probe.
*/

pub mod health;
pub mod middleware;
pub mod packages;
pub mod responses;

use axum::{middleware::from_fn_with_state, Router};

use crate::config::state::AppState;

/// Routes that require an authenticated user
pub fn flow_results_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(packages::package_routes())
        .merge(responses::response_routes())
        .route_layer(from_fn_with_state(state.clone(), middleware::authenticate))
}

/// Every route the service exposes
pub fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(flow_results_routes(state))
        .merge(health::health_routes())
}

// End of file: /src/api/mod.rs
