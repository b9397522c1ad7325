// Error taxonomy for HTTP handlers and the global error mapping for middleware layers

use axum::{
    BoxError,
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};
use std::error::Error;
use tracing::error;
// tower's error type for timeouts
use tower::timeout::error::Elapsed;
// Axum uses http_body_util for length-limiting
use http_body_util::LengthLimitError;

use crate::database::store::StoreError;
use crate::utils::pagination::InvalidCursor;
use crate::utils::response_handler::HandlerResponse;
use crate::utils::validation::ErrorTree;

pub const NOT_AUTHENTICATED: &str = "Authentication credentials were not provided.";
pub const PERMISSION_DENIED: &str = "You do not have permission to perform this action.";
pub const NOT_FOUND: &str = "Not found.";
const SERVER_ERROR: &str = "A server error occurred.";

/// Every error a handler or request middleware can answer with
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid input.")]
    Validation(ErrorTree),

    #[error("JSON parse error - {0}")]
    ParseError(String),

    #[error("Unsupported media type \"{0}\" in request.")]
    UnsupportedMediaType(String),

    #[error("Authentication credentials were not provided.")]
    NotAuthenticated,

    #[error("{0}")]
    AuthenticationFailed(&'static str),

    #[error("You do not have permission to perform this action.")]
    PermissionDenied,

    #[error("{0}")]
    NotFound(String),

    #[error("Method \"{0}\" not allowed.")]
    MethodNotAllowed(String),

    #[error("Invalid HTTP_HOST header: '{0}'.")]
    DisallowedHost(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found() -> Self {
        Self::NotFound(NOT_FOUND.to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::ParseError(_) | Self::DisallowedHost(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::NotAuthenticated | Self::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> Value {
        match self {
            Self::Validation(errors) => errors.to_json(),
            // internal details stay in the logs
            Self::Internal(_) => json!({ "detail": SERVER_ERROR }),
            other => json!({ "detail": other.to_string() }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            error!("Internal error: {}", detail);
        }

        let status: StatusCode = self.status_code();
        let mut response: Response = HandlerResponse::new(status).data(self.body()).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Token"));
        }

        response
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Internal(format!("store error: {err}"))
    }
}

impl From<ErrorTree> for ApiError {
    fn from(errors: ErrorTree) -> Self {
        Self::Validation(errors)
    }
}

impl From<InvalidCursor> for ApiError {
    fn from(err: InvalidCursor) -> Self {
        Self::NotFound(err.to_string())
    }
}

/// Maps various error types to appropriate HTTP responses
pub async fn handle_global_error(err: BoxError) -> impl IntoResponse {
    // 413 if the body was too large
    if find_cause::<LengthLimitError>(&*err).is_some() || err.is::<LengthLimitError>() {
        return StatusCode::PAYLOAD_TOO_LARGE;
    }

    // 408 if the request took too long
    if err.is::<Elapsed>() {
        return StatusCode::REQUEST_TIMEOUT;
    }

    // Otherwise, 500
    error!("Unhandled middleware error: {}", err);
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Helper function to find specific error type in error chain
pub fn find_cause<T: Error + 'static>(err: &dyn Error) -> Option<&T> {
    let mut source: Option<&dyn Error> = err.source();

    while let Some(s) = source {
        if let Some(typed) = s.downcast_ref::<T>() {
            return Some(typed);
        }
        source = s.source();
    }

    None
}
