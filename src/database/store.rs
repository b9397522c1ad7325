// =============================================================================
// FLOW STORE - Persistence seam shared by the PostgreSQL and in-memory backends
// =============================================================================

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    Flow, FlowQuestion, FlowResponse, NewFlow, NewFlowResponse, NewQuestion, Permission, TypedValue, User,
};
use crate::utils::pagination::{Page, PageRequest};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("flow with id {0} already exists")]
    DuplicatePackage(Uuid),

    #[error("user '{0}' already exists")]
    DuplicateUser(String),

    #[error("user '{0}' does not exist")]
    UnknownUser(String),

    #[error("row_id '{row_id}' already recorded for question {question_key}")]
    DuplicateRow { question_key: i64, row_id: String },

    #[error("corrupt stored value: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Time bounds applied when listing responses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseFilter {
    /// Exclusive lower bound
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub end: Option<DateTime<Utc>>,
}

impl ResponseFilter {
    pub fn matches(&self, timestamp: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| *timestamp > start) && self.end.map_or(true, |end| *timestamp <= end)
    }
}

/// Identifies a stored row id: `(question primary key, row id type code, row id text)`.
/// The type code keeps `1` and `"1"` apart.
pub type RowKey = (i64, i16, String);

pub fn row_key(question_key: i64, row_id: &TypedValue) -> RowKey {
    (question_key, row_id.value_type().code(), row_id.identifier_text())
}

#[async_trait]
pub trait FlowStore: Send + Sync + std::fmt::Debug {
    /// Stores a package and its questions atomically
    async fn create_package(&self, flow: NewFlow, questions: Vec<NewQuestion>) -> StoreResult<Flow>;

    /// Packages ordered by `(modified, primary_key)`
    async fn list_packages(&self, page: &PageRequest) -> StoreResult<Page<Flow>>;

    async fn get_package(&self, id: Uuid) -> StoreResult<Option<(Flow, Vec<FlowQuestion>)>>;

    /// The subset of `keys` already stored
    async fn existing_row_ids(&self, keys: &[RowKey]) -> StoreResult<HashSet<RowKey>>;

    /// Stores a batch of responses atomically and returns how many were stored
    async fn insert_responses(&self, responses: Vec<NewFlowResponse>) -> StoreResult<u64>;

    /// A package's responses ordered by `(timestamp, id)`
    async fn list_responses(
        &self,
        flow: &Flow,
        filter: &ResponseFilter,
        page: &PageRequest,
    ) -> StoreResult<Page<FlowResponse>>;

    /// Deletes every response older than `cutoff` and returns the count
    async fn delete_responses_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    async fn find_user(&self, username: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_token(&self, key: &str) -> StoreResult<Option<User>>;

    async fn create_user(&self, username: &str, password_hash: Option<String>, is_superuser: bool) -> StoreResult<User>;

    /// Replaces any existing token for the user
    async fn create_token(&self, username: &str, key: &str) -> StoreResult<()>;

    async fn set_permission(&self, username: &str, permission: Permission, granted: bool) -> StoreResult<()>;

    /// Inactive users fail authentication but keep their tokens and permissions
    async fn set_active(&self, username: &str, active: bool) -> StoreResult<()>;

    /// Cheap connectivity check for health probes
    async fn ping(&self) -> StoreResult<()>;

    /// Releases connections; a no-op for stores without any
    async fn shutdown(&self) {}
}
