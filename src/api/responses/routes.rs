// Flow response route definitions

use axum::{
    routing::get,
    Router,
};

use crate::config::state::AppState;
use super::handler;

/// Creates router with the response list and submit endpoints
pub fn response_routes() -> Router<AppState> {
    Router::new().route(
        "/api/v1/flow-results/packages/{id}/responses/",
        get(handler::list_responses_handler).post(handler::create_responses_handler),
    )
}
