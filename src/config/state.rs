// Application state shared by every handler

use std::sync::Arc;

use crate::config::environment::EnvironmentVariables;
use crate::database::{FlowStore, MemoryStore, PgStore};

#[derive(Debug, Clone)]
pub struct AppState {
    pub environment: Arc<EnvironmentVariables>,
    pub store: Arc<dyn FlowStore>,
}

impl AppState {
    pub fn new(environment: Arc<EnvironmentVariables>, store: Arc<dyn FlowStore>) -> Self {
        Self { environment, store }
    }

    /// Builds the state the server runs with: PostgreSQL unless `in_memory` is set
    pub async fn connect(environment: &EnvironmentVariables, in_memory: bool) -> anyhow::Result<Self> {
        let environment_arc: Arc<EnvironmentVariables> = Arc::new(environment.clone());

        let store: Arc<dyn FlowStore> = if in_memory {
            tracing::warn!("Using the in-memory store; nothing will be persisted");
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(PgStore::connect(environment).await?)
        };

        Ok(Self::new(environment_arc, store))
    }

    /// Gracefully release store connections
    pub async fn shutdown(&self) {
        self.store.shutdown().await;
    }
}
