// Health endpoint reporting store connectivity

use serde_json::json;
use axum::{http::StatusCode, extract::State};

use crate::config::state::AppState;
use crate::utils::response_handler::HandlerResponse;
use tracing::{instrument, warn};

/// Health check endpoint that verifies database connectivity
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> HandlerResponse {
    match state.store.ping().await {
        Ok(()) => HandlerResponse::ok(json!({ "database": "working" })),
        Err(e) => {
            warn!("Health check failed: {}", e);
            HandlerResponse::new(StatusCode::SERVICE_UNAVAILABLE)
                .data(json!({ "database": format!("unavailable: {e}") }))
        }
    }
}
