// Start of file: /src/core/cli.rs

/*
    * Management command line. `serve` runs the API; the other subcommands
    * manage the schema, users, tokens, permissions and response retention.
*/

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Months, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::environment::EnvironmentVariables;
use crate::config::state::AppState;
use crate::core::server;
use crate::database::{FlowStore, PgStore};
use crate::models::{generate_token_key, Permission, User};

/// Flow Results API server and management commands
#[derive(Parser, Debug)]
#[command(name = "flow-results")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Run the HTTP API (the default when no subcommand is given)
    Serve {
        /// Keep everything in memory instead of PostgreSQL
        #[arg(long)]
        in_memory: bool,
    },

    /// Create or update the database schema
    Migrate,

    /// Fail when any expected table is missing
    CheckSchema,

    /// Create an API user
    CreateUser {
        username: String,

        /// Password for basic authentication; without one the user can only use tokens
        #[arg(long)]
        password: Option<String>,

        /// Grant every permission
        #[arg(long)]
        superuser: bool,
    },

    /// Create (or replace) a user's API token and print it
    CreateToken {
        username: String,
    },

    /// Grant model permissions, e.g. `grant alice view_flow add_flowresponse`
    Grant {
        username: String,

        #[arg(required = true)]
        permissions: Vec<Permission>,
    },

    /// Revoke model permissions
    Revoke {
        username: String,

        #[arg(required = true)]
        permissions: Vec<Permission>,
    },

    /// Block a user from authenticating without deleting their data
    DeactivateUser {
        username: String,
    },

    /// Allow a deactivated user to authenticate again
    ActivateUser {
        username: String,
    },

    /// Delete responses older than the given number of months
    DeleteHistoricalResponses {
        retention_months: u32,
    },
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve { in_memory: false })
    }
}

/// Runs one subcommand to completion
pub async fn run(command: Commands, env: &EnvironmentVariables) -> Result<()> {
    if let Commands::Serve { in_memory } = command {
        let state: AppState = AppState::connect(env, in_memory).await?;
        return server::run(state).await;
    }

    let store: PgStore = PgStore::connect(env).await?;
    let outcome: Result<()> = run_management(command, env, &store).await;
    store.shutdown().await;
    outcome
}

async fn run_management(command: Commands, env: &EnvironmentVariables, store: &PgStore) -> Result<()> {
    match command {
        Commands::Serve { .. } => Err(anyhow!("serve is not a management command")),

        Commands::Migrate => store.migrate().await,

        Commands::CheckSchema => {
            let missing: Vec<String> = store.missing_tables().await?;
            if missing.is_empty() {
                info!("Schema is up to date");
                Ok(())
            } else {
                Err(anyhow!("Missing tables: {}; run `flow-results migrate`", missing.join(", ")))
            }
        }

        Commands::CreateUser { username, password, superuser } => {
            let user: User = create_user(store, &username, password.as_deref(), superuser).await?;
            println!("Created user '{}'", user.username);
            Ok(())
        }

        Commands::CreateToken { username } => {
            let key: String = create_token(store, &env.secret_key, &username).await?;
            println!("{key}");
            Ok(())
        }

        Commands::Grant { username, permissions } => {
            set_permissions(store, &username, &permissions, true).await?;
            println!("Granted {} to '{}'", join_codenames(&permissions), username);
            Ok(())
        }

        Commands::Revoke { username, permissions } => {
            set_permissions(store, &username, &permissions, false).await?;
            println!("Revoked {} from '{}'", join_codenames(&permissions), username);
            Ok(())
        }

        Commands::DeactivateUser { username } => {
            set_active(store, &username, false).await?;
            println!("Deactivated '{username}'");
            Ok(())
        }

        Commands::ActivateUser { username } => {
            set_active(store, &username, true).await?;
            println!("Activated '{username}'");
            Ok(())
        }

        Commands::DeleteHistoricalResponses { retention_months } => {
            delete_historical_responses(store, retention_months, Utc::now()).await?;
            Ok(())
        }
    }
}

fn join_codenames(permissions: &[Permission]) -> String {
    permissions.iter().map(|p| p.codename()).collect::<Vec<&str>>().join(", ")
}

pub async fn create_user(
    store: &dyn FlowStore,
    username: &str,
    password: Option<&str>,
    superuser: bool,
) -> Result<User> {
    let username: &str = username.trim();
    if username.is_empty() {
        return Err(anyhow!("Username may not be blank"));
    }

    let password_hash: Option<String> = password
        .map(|p| bcrypt::hash(p, bcrypt::DEFAULT_COST))
        .transpose()
        .context("Failed to hash password")?;

    let user: User = store.create_user(username, password_hash, superuser).await?;
    info!(username = %user.username, superuser, "User created");
    Ok(user)
}

/// Issues a fresh token, replacing any previous one
pub async fn create_token(store: &dyn FlowStore, secret_key: &str, username: &str) -> Result<String> {
    let key: String = generate_token_key(secret_key);
    store.create_token(username, &key).await?;
    info!(%username, "API token created");
    Ok(key)
}

pub async fn set_permissions(
    store: &dyn FlowStore,
    username: &str,
    permissions: &[Permission],
    granted: bool,
) -> Result<()> {
    for permission in permissions {
        store.set_permission(username, *permission, granted).await?;
    }
    Ok(())
}

pub async fn set_active(store: &dyn FlowStore, username: &str, active: bool) -> Result<()> {
    store.set_active(username, active).await?;
    info!(%username, active, "User activity changed");
    Ok(())
}

/// Midnight UTC, `months` calendar months before `now`
pub fn retention_cutoff(now: DateTime<Utc>, months: u32) -> Result<DateTime<Utc>> {
    let shifted: DateTime<Utc> = now
        .checked_sub_months(Months::new(months))
        .ok_or_else(|| anyhow!("Retention of {months} months reaches before the supported date range"))?;

    Ok(shifted.date_naive().and_time(NaiveTime::MIN).and_utc())
}

pub async fn delete_historical_responses(store: &dyn FlowStore, months: u32, now: DateTime<Utc>) -> Result<u64> {
    let cutoff: DateTime<Utc> = retention_cutoff(now, months)?;
    let deleted: u64 = store.delete_responses_before(cutoff).await?;
    info!(%cutoff, deleted, "Deleted historical responses");
    Ok(deleted)
}


// End of file: /src/core/cli.rs
