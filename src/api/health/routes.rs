// Health route definitions

use axum::{routing::get, Router};

use crate::config::state::AppState;
use super::handler;

/// Unauthenticated probe used by orchestrators and load balancers
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health/", get(handler::health_check))
}
