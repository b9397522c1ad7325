// Start of file: /src/config/environment.rs

// * Environment configuration with a singleton pattern.
// * Tests build their own instance through `from_vars`.

use std::{borrow::Cow, collections::HashMap};
// * anyhow for convenient error handling
use anyhow::{anyhow, Context, Result};
// * once_cell for lazy static initialization
use once_cell::sync::Lazy;
use tracing::warn;

// ! Default values for environment variables (used if variables aren't set):
const DEFAULT_ENVIRONMENT: &str = "development";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PROTOCOL: &str = "http";
const DEFAULT_DATABASE_URL: &str = "postgres://postgres@127.0.0.1/flow_results";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MAX_BODY_SIZE: usize = 2_641_440; // 2.5MB
const DEFAULT_TIMEOUT: u64 = 30; // 30 seconds
const DEFAULT_PAGE_SIZE: usize = 100;
const DEFAULT_MAX_PAGE_SIZE: usize = 1000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 20;

// * A struct containing all environment variables used by the app
#[derive(Clone)]
pub struct EnvironmentVariables {
    pub environment: Cow<'static, str>,
    pub secret_key: String,
    pub debug: bool,
    pub allowed_hosts: Vec<String>,
    pub host: Cow<'static, str>,
    pub port: u16,
    pub protocol: Cow<'static, str>,
    pub database_url: String,
    pub db_max_connections: u32,
    pub max_request_body_size: usize,
    pub default_timeout_seconds: u64,
    pub page_size: usize,
    pub max_page_size: usize,
    pub worker_threads: Option<usize>,
}

// * Hand-written so the secret key and database password never reach the logs
impl std::fmt::Debug for EnvironmentVariables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentVariables")
            .field("environment", &self.environment)
            .field("secret_key", &"<redacted>")
            .field("debug", &self.debug)
            .field("allowed_hosts", &self.allowed_hosts)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("protocol", &self.protocol)
            .field("database_url", &"<redacted>")
            .field("db_max_connections", &self.db_max_connections)
            .field("max_request_body_size", &self.max_request_body_size)
            .field("default_timeout_seconds", &self.default_timeout_seconds)
            .field("page_size", &self.page_size)
            .field("max_page_size", &self.max_page_size)
            .field("worker_threads", &self.worker_threads)
            .finish()
    }
}

impl EnvironmentVariables {
    // * Loads environment variables from the process.
    // * Only reads .env if ENVIRONMENT != "production".
    pub fn load() -> Result<Self> {
        // ? In non-production environments, attempt to load .env
        if std::env::var("ENVIRONMENT").unwrap_or_default() != "production" {
            dotenv::dotenv().ok();
        }

        // * Collect all environment vars from the system and .env
        let vars: HashMap<String, String> = std::env::vars().collect();

        Self::from_vars(&vars)
    }

    // * Builds the configuration from an explicit map of variables
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        // * A small helper closure to fetch a non-empty variable by key
        let get_var = |key: &str| {
            vars.get(key)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
        };

        let secret_key: String = get_var("SECRET_KEY")
            .map(str::to_string)
            .ok_or_else(|| anyhow!("SECRET_KEY must be set"))?;

        let database_url: String = get_var("DATABASE_URL")
            .or_else(|| get_var("FLOW_RESULTS_DATABASE"))
            .map(str::to_string)
            .unwrap_or_else(|| {
                warn!("Missing DATABASE_URL, defaulting to '{DEFAULT_DATABASE_URL}'");
                DEFAULT_DATABASE_URL.to_string()
            });

        let page_size: usize = get_var("PAGE_SIZE")
            .map(|s| s.parse().context("Invalid PAGE_SIZE"))
            .transpose()?
            .unwrap_or(DEFAULT_PAGE_SIZE);

        let max_page_size: usize = get_var("MAX_PAGE_SIZE")
            .map(|s| s.parse().context("Invalid MAX_PAGE_SIZE"))
            .transpose()?
            .unwrap_or(DEFAULT_MAX_PAGE_SIZE);

        if page_size == 0 || max_page_size < page_size {
            return Err(anyhow!(
                "PAGE_SIZE must be positive and no larger than MAX_PAGE_SIZE ({page_size} > {max_page_size})"
            ));
        }

        // * Build our EnvironmentVariables, providing defaults if missing
        Ok(Self {
            environment: get_var("ENVIRONMENT")
                .map(|s| Cow::Owned(s.into()))
                .unwrap_or_else(|| {
                    warn!("Missing ENVIRONMENT, defaulting to '{DEFAULT_ENVIRONMENT}'");
                    Cow::Borrowed(DEFAULT_ENVIRONMENT)
                }),

            secret_key,

            debug: get_var("DEBUG")
                .map(parse_bool)
                .transpose()
                .context("Invalid DEBUG value")?
                .unwrap_or(false),

            allowed_hosts: get_var("ALLOWED_HOSTS")
                .map(parse_list)
                .unwrap_or_default(),

            host: get_var("HOST")
                .map(|s| Cow::Owned(s.into()))
                .unwrap_or(Cow::Borrowed(DEFAULT_HOST)),

            port: get_var("PORT")
                .map(|s| s.parse().context("Invalid PORT value"))
                .transpose()?
                .unwrap_or(DEFAULT_PORT),

            protocol: get_var("PROTOCOL")
                .map(|s| Cow::Owned(s.into()))
                .unwrap_or(Cow::Borrowed(DEFAULT_PROTOCOL)),

            database_url,

            db_max_connections: get_var("DB_MAX_CONNECTIONS")
                .map(|s| s.parse().context("Invalid DB_MAX_CONNECTIONS"))
                .transpose()?
                .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),

            max_request_body_size: get_var("DATA_UPLOAD_MAX_MEMORY_SIZE")
                .map(|s| s.parse().context("Invalid DATA_UPLOAD_MAX_MEMORY_SIZE"))
                .transpose()?
                .unwrap_or(DEFAULT_MAX_BODY_SIZE),

            default_timeout_seconds: get_var("DEFAULT_TIMEOUT_SECONDS")
                .map(|s| s.parse().context("Invalid DEFAULT_TIMEOUT_SECONDS"))
                .transpose()?
                .unwrap_or(DEFAULT_TIMEOUT),

            page_size,
            max_page_size,

            worker_threads: get_var("WORKER_THREADS")
                .map(|s| s.parse().context("Invalid WORKER_THREADS"))
                .transpose()?,
        })
    }

    // * Returns a reference to the lazily-initialized environment configuration
    pub fn instance() -> Result<&'static Self> {
        static INSTANCE: Lazy<Result<EnvironmentVariables, String>> = Lazy::new(|| {
            let config: EnvironmentVariables =
                EnvironmentVariables::load().map_err(|e| format!("{e:#}"))?;

            if cfg!(debug_assertions) {
                tracing::debug!("Loaded environment configuration: {:#?}", config);
            }

            Ok(config)
        });

        INSTANCE
            .as_ref()
            .map_err(|message| anyhow!("Failed to load environment configuration: {message}"))
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

// * Accepts the usual spellings of a boolean flag
fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "no" | "n" | "off" => Ok(false),
        other => Err(anyhow!("'{other}' is not a boolean")),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}


// End of file: /src/config/environment.rs
