// Unified response system for consistent API responses
// Provides the HandlerResponse builder and the middleware that logs every
// response and gives bodyless error responses a JSON body

use std::convert::Infallible;

use axum::{
    Json,
    body::Body,
    http::{
        header::CONTENT_TYPE, HeaderValue, Method, Request, Response,
        response::Parts, StatusCode,
    },
    middleware::Next,
    response::IntoResponse,
};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::utils::utils::to_two_space_indented_json;

/// Convenience struct for building responses in handlers
#[derive(Debug, Clone)]
pub struct HandlerResponse {
    pub status_code: StatusCode,
    pub data: Value,
}

impl HandlerResponse {
    /// Creates a new response with specified status code
    pub fn new(status_code: StatusCode) -> Self {
        Self {
            status_code,
            data: Value::Object(Default::default()),
        }
    }

    pub fn ok(data: Value) -> Self {
        Self::new(StatusCode::OK).data(data)
    }

    pub fn created(data: Value) -> Self {
        Self::new(StatusCode::CREATED).data(data)
    }

    /// Sets the JSON body of the response
    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

impl IntoResponse for HandlerResponse {
    fn into_response(self) -> axum::response::Response {
        let mut response: Response<Body> = Json(&self.data).into_response();
        *response.status_mut() = self.status_code;

        // Marks the body as already formatted for the response middleware
        response.extensions_mut().insert(self);
        response
    }
}

/// Body for error responses that reached the client without one
fn default_error_body(parts: &Parts) -> Value {
    json!({
        "detail": parts.status.canonical_reason().unwrap_or("Unknown status")
    })
}

/// Logs the formatted body at debug level with proper JSON indentation
fn log_formatted_body(data: &Value) {
    match to_two_space_indented_json(data) {
        Ok(spaced_json) => debug!("\nFinal response:\n{}", spaced_json),
        Err(err) => error!("Failed to format response JSON: {:?}", err),
    }
}

/// Builds the replacement response with JSON content type
fn build_error_response(mut parts: Parts, body: &Value) -> Response<Body> {
    let json_body: Vec<u8> = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());

    parts.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);

    Response::from_parts(parts, Body::from(json_body))
}

/// Middleware that logs every response and normalizes error bodies to `{"detail": ...}`
pub async fn response_wrapper(
    req: Request<Body>,
    next: Next,
) -> Result<Response<Body>, Infallible> {
    let started: Instant = Instant::now();
    let method: Method = req.method().clone();
    let path: String = req.uri().path().to_string();

    let response: Response<Body> = next.run(req).await;
    let elapsed_ms: u128 = started.elapsed().as_millis();
    let status: StatusCode = response.status();

    if status.is_server_error() {
        warn!(%method, %path, status = status.as_u16(), elapsed_ms, "request failed");
    } else {
        info!(%method, %path, status = status.as_u16(), elapsed_ms, "request completed");
    }

    let structured: Option<HandlerResponse> = response.extensions().get::<HandlerResponse>().cloned();
    match structured {
        Some(handled) => {
            log_formatted_body(&handled.data);
            Ok(response)
        }
        None if status.is_client_error() || status.is_server_error() => {
            let (parts, _) = response.into_parts();
            let body: Value = default_error_body(&parts);
            log_formatted_body(&body);
            Ok(build_error_response(parts, &body))
        }
        None => Ok(response),
    }
}
