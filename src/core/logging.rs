// Start of file: /src/core/logging.rs

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "flow_results=info,tower_http=info";

// Initialize the tracing subscriber; RUST_LOG overrides the default filter
pub fn init_tracing() {
    let env_filter: EnvFilter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // a second call (CLI helpers, tests) keeps the first subscriber
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

// End of file: /src/core/logging.rs
