pub mod memory_store;
pub mod postgres_service;
pub mod store;

pub use memory_store::MemoryStore;
pub use postgres_service::PgStore;
pub use store::{FlowStore, ResponseFilter, StoreError, StoreResult};
