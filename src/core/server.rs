// Application server configuration and setup

use std::time::Duration;
use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    extract::DefaultBodyLimit,
    error_handling::HandleErrorLayer,
    http::Method,
    serve,
};
use tower::{ServiceBuilder, timeout::TimeoutLayer};
use tokio::{signal, net::TcpListener};
use listenfd::ListenFd;
use anyhow::Result;
use tracing::{error, info};

use crate::api::{api_routes, middleware::validate_host};
use crate::config::environment::EnvironmentVariables;
use crate::config::state::AppState;
use crate::utils::{
    error_handler::{handle_global_error, ApiError},
    response_handler::response_wrapper
};

/// Creates and configures the application router with all middleware layers
pub fn create_app(state: AppState) -> Router {
    let env: &EnvironmentVariables = &state.environment;

    Router::new()
        .merge(api_routes(&state))
        .fallback(fallback_handler)
        .method_not_allowed_fallback(method_not_allowed_handler)
        .layer(from_fn_with_state(state.clone(), validate_host))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(response_wrapper))
                .layer(HandleErrorLayer::new(handle_global_error))
                .layer(TimeoutLayer::new(Duration::from_secs(env.default_timeout_seconds)))
                .layer(DefaultBodyLimit::max(env.max_request_body_size))
        )
        .with_state(state)
}

async fn fallback_handler() -> ApiError {
    ApiError::not_found()
}

async fn method_not_allowed_handler(method: Method) -> ApiError {
    ApiError::MethodNotAllowed(method.to_string())
}

/// Sets up the TCP listener from environment or binds to new address
pub async fn setup_listener(env: &EnvironmentVariables) -> Result<TcpListener> {
    let mut listenfd: ListenFd = ListenFd::from_env();

    let listener: TcpListener = match listenfd.take_tcp_listener(0)? {
        Some(std_listener) => {
            std_listener.set_nonblocking(true)?;
            TcpListener::from_std(std_listener)?
        }
        None => {
            let addr: String = format!("{}:{}", env.host, env.port);
            TcpListener::bind(&addr).await?
        }
    };

    Ok(listener)
}

/// Serves the API until Ctrl+C or TERM, then releases the store
pub async fn run(state: AppState) -> Result<()> {
    let listener: TcpListener = setup_listener(&state.environment).await?;
    info!("Server listening on: {}", listener.local_addr()?);

    let app: Router = create_app(state.clone());
    serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.shutdown().await;
    info!("Server stopped");
    Ok(())
}

/// Handles graceful shutdown signals (Ctrl+C and TERM)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install TERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Shutting down via Ctrl+C"),
        _ = terminate => info!("Shutting down via TERM signal"),
    }
}
