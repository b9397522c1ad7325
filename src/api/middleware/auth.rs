use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::config::state::AppState;
use crate::models::{Permission, User};
use crate::utils::error_handler::ApiError;

const INVALID_TOKEN: &str = "Invalid token.";
const INVALID_CREDENTIALS: &str = "Invalid username/password.";
const INACTIVE_USER: &str = "User inactive or deleted.";

/// Checked when there is no stored hash so failed lookups cost one bcrypt verify
static PLACEHOLDER_HASH: Lazy<Option<String>> = Lazy::new(|| bcrypt::hash("placeholder", bcrypt::DEFAULT_COST).ok());

/// Authenticated user, stored in request extensions for handlers
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user: User,
}

impl UserContext {
    /// Fails with 403 unless the user holds `permission`
    pub fn require(&self, permission: Permission) -> Result<(), ApiError> {
        if self.user.has_permission(permission) {
            Ok(())
        } else {
            debug!("User '{}' lacks {}", self.user.username, permission);
            Err(ApiError::PermissionDenied)
        }
    }
}

/// A parsed `Authorization` header
#[derive(Debug, PartialEq, Eq)]
enum Credentials {
    Token(String),
    Basic { username: String, password: String },
}

/// Parses `Token <key>` or `Basic <base64>`. Other schemes read as no credentials.
fn parse_authorization(header: &str) -> Result<Option<Credentials>, ApiError> {
    let parts: Vec<&str> = header.split_whitespace().collect();
    let Some(scheme) = parts.first() else {
        return Ok(None);
    };

    match scheme.to_ascii_lowercase().as_str() {
        "token" => match parts.as_slice() {
            [_] => Err(ApiError::AuthenticationFailed("Invalid token header. No credentials provided.")),
            [_, key] => Ok(Some(Credentials::Token(key.to_string()))),
            _ => Err(ApiError::AuthenticationFailed(
                "Invalid token header. Token string should not contain spaces.",
            )),
        },
        "basic" => match parts.as_slice() {
            [_] => Err(ApiError::AuthenticationFailed("Invalid basic header. No credentials provided.")),
            [_, encoded] => {
                let invalid = || {
                    ApiError::AuthenticationFailed(
                        "Invalid basic header. Credentials not correctly base64 encoded.",
                    )
                };
                let decoded: Vec<u8> = STANDARD.decode(encoded).map_err(|_| invalid())?;
                let decoded: String = String::from_utf8(decoded).map_err(|_| invalid())?;
                let (username, password) = decoded.split_once(':').ok_or_else(invalid)?;
                Ok(Some(Credentials::Basic {
                    username: username.to_string(),
                    password: password.to_string(),
                }))
            }
            _ => Err(ApiError::AuthenticationFailed(
                "Invalid basic header. Credentials string should not contain spaces.",
            )),
        },
        _ => Ok(None),
    }
}

async fn verify_password(password: String, hash: String) -> bool {
    // bcrypt runs on the blocking pool
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}

/// False unless `hash` is present and matches. Always runs exactly one bcrypt verify.
async fn check_password(password: String, hash: Option<String>) -> bool {
    match hash {
        Some(hash) => verify_password(password, hash).await,
        None => {
            if let Some(placeholder) = PLACEHOLDER_HASH.clone() {
                verify_password(password, placeholder).await;
            }
            false
        }
    }
}

async fn resolve_user(state: &AppState, credentials: Credentials) -> Result<User, ApiError> {
    let user: User = match credentials {
        Credentials::Token(key) => state
            .store
            .find_user_by_token(&key)
            .await?
            .ok_or(ApiError::AuthenticationFailed(INVALID_TOKEN))?,
        Credentials::Basic { username, password } => {
            let user: Option<User> = state.store.find_user(&username).await?;
            let hash: Option<String> = user.as_ref().and_then(|u| u.password_hash.clone());

            let verified: bool = check_password(password, hash).await;

            match user {
                Some(user) if verified => user,
                _ => return Err(ApiError::AuthenticationFailed(INVALID_CREDENTIALS)),
            }
        }
    };

    if !user.is_active {
        return Err(ApiError::AuthenticationFailed(INACTIVE_USER));
    }

    Ok(user)
}

/// Middleware that authenticates the request from its `Authorization` header
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header: Option<&str> = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let credentials: Credentials = match header.map(parse_authorization).transpose()?.flatten() {
        Some(credentials) => credentials,
        None => return Err(ApiError::NotAuthenticated),
    };

    let user: User = resolve_user(&state, credentials).await.inspect_err(|e| {
        if matches!(e, ApiError::AuthenticationFailed(_)) {
            warn!("Rejected credentials for {}: {}", request.uri().path(), e);
        }
    })?;

    debug!("Authenticated '{}'", user.username);
    request.extensions_mut().insert(UserContext { user });

    Ok(next.run(request).await)
}
