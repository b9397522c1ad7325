use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::config::state::AppState;
use crate::utils::error_handler::ApiError;
use crate::utils::utils::request_host;

/// Hosts accepted in debug mode when no allowlist is configured
const DEBUG_HOSTS: [&str; 3] = [".localhost", "127.0.0.1", "[::1]"];

/// Lowercased host without its port; IPv6 literals keep their brackets
fn split_domain(host: &str) -> String {
    let host: String = host.trim().to_ascii_lowercase();
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => host[..=end].to_string(),
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((domain, _port)) => domain.to_string(),
        None => host,
    }
}

/// `*` matches everything; `.example.com` matches the domain and its subdomains
fn matches_pattern(domain: &str, pattern: &str) -> bool {
    let pattern: String = pattern.to_ascii_lowercase();
    if pattern == "*" {
        return true;
    }
    match pattern.strip_prefix('.') {
        Some(parent) => domain == parent || domain.ends_with(&pattern),
        None => domain == pattern,
    }
}

pub fn is_allowed(host: &str, allowed_hosts: &[String], debug: bool) -> bool {
    let domain: String = split_domain(host);
    if domain.is_empty() {
        return false;
    }

    if allowed_hosts.is_empty() && debug {
        return DEBUG_HOSTS.iter().any(|pattern| matches_pattern(&domain, pattern));
    }

    allowed_hosts.iter().any(|pattern| matches_pattern(&domain, pattern))
}

/// Middleware rejecting requests whose `Host` header is not allowlisted
pub async fn validate_host(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let host: &str = request_host(request.headers());
    let env = &state.environment;

    if !is_allowed(host, &env.allowed_hosts, env.debug) {
        warn!("Rejected request for disallowed host '{}'", host);
        return Err(ApiError::DisallowedHost(host.to_string()));
    }

    Ok(next.run(request).await)
}
