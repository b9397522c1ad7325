// =============================================================================
// MEMORY STORE - FlowStore kept in process memory (tests, --in-memory runs)
// =============================================================================

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::store::{row_key, FlowStore, ResponseFilter, RowKey, StoreError, StoreResult};
use crate::models::value::storage_precision;
use crate::models::{Flow, FlowQuestion, FlowResponse, NewFlow, NewFlowResponse, NewQuestion, Permission, User};
use crate::utils::pagination::{Page, PageRequest, Positioned};

#[derive(Debug, Default)]
struct Tables {
    flows: Vec<Flow>,
    questions: Vec<FlowQuestion>,
    responses: Vec<FlowResponse>,
    users: Vec<User>,
    // token key -> user id
    tokens: HashMap<String, i64>,
    next_key: i64,
}

impl Tables {
    fn next_key(&mut self) -> i64 {
        self.next_key += 1;
        self.next_key
    }

    fn user_mut(&mut self, username: &str) -> StoreResult<&mut User> {
        self.users
            .iter_mut()
            .find(|u| u.username == username)
            .ok_or_else(|| StoreError::UnknownUser(username.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Orders candidate rows the way the SQL backend would and applies the fetch limit
fn window<T: Positioned + Clone>(rows: impl Iterator<Item = T>, page: &PageRequest) -> Page<T> {
    let mut rows: Vec<T> = rows.filter(|row| page.admits(&row.position())).collect();
    rows.sort_by_key(Positioned::position);
    if page.is_reverse() {
        rows.reverse();
    }
    rows.truncate(page.fetch_limit());
    Page::from_window(rows, page)
}

#[async_trait]
impl FlowStore for MemoryStore {
    async fn create_package(&self, flow: NewFlow, questions: Vec<NewQuestion>) -> StoreResult<Flow> {
        let mut tables = self.tables.write().await;

        if tables.flows.iter().any(|f| f.id == flow.id) {
            return Err(StoreError::DuplicatePackage(flow.id));
        }

        let stored: Flow = Flow {
            primary_key: tables.next_key(),
            id: flow.id,
            name: flow.name,
            version: flow.version,
            created: storage_precision(flow.created),
            modified: storage_precision(flow.modified),
            title: flow.title,
            language: flow.language,
        };

        for question in questions {
            let primary_key: i64 = tables.next_key();
            tables.questions.push(FlowQuestion {
                primary_key,
                flow_key: stored.primary_key,
                id: question.id,
                question_type: question.question_type,
                label: question.label,
                type_options: question.type_options,
            });
        }

        tables.flows.push(stored.clone());
        Ok(stored)
    }

    async fn list_packages(&self, page: &PageRequest) -> StoreResult<Page<Flow>> {
        let tables = self.tables.read().await;
        Ok(window(tables.flows.iter().cloned(), page))
    }

    async fn get_package(&self, id: Uuid) -> StoreResult<Option<(Flow, Vec<FlowQuestion>)>> {
        let tables = self.tables.read().await;
        let Some(flow) = tables.flows.iter().find(|f| f.id == id).cloned() else {
            return Ok(None);
        };
        let questions: Vec<FlowQuestion> = tables
            .questions
            .iter()
            .filter(|q| q.flow_key == flow.primary_key)
            .cloned()
            .collect();
        Ok(Some((flow, questions)))
    }

    async fn existing_row_ids(&self, keys: &[RowKey]) -> StoreResult<HashSet<RowKey>> {
        let tables = self.tables.read().await;
        let stored: HashSet<RowKey> = tables
            .responses
            .iter()
            .map(|r| row_key(r.question_key, &r.row_id))
            .collect();
        Ok(keys.iter().filter(|key| stored.contains(*key)).cloned().collect())
    }

    async fn insert_responses(&self, responses: Vec<NewFlowResponse>) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;

        // check the whole batch before touching anything
        let mut seen: HashSet<RowKey> = tables
            .responses
            .iter()
            .map(|r| row_key(r.question_key, &r.row_id))
            .collect();
        for response in &responses {
            let key: RowKey = row_key(response.question_key, &response.row_id);
            if !seen.insert(key.clone()) {
                return Err(StoreError::DuplicateRow {
                    question_key: key.0,
                    row_id: key.2,
                });
            }
        }

        let count: u64 = responses.len() as u64;
        for response in responses {
            let question_id: String = tables
                .questions
                .iter()
                .find(|q| q.primary_key == response.question_key)
                .map(|q| q.id.clone())
                .ok_or_else(|| StoreError::Corrupt(format!("unknown question {}", response.question_key)))?;
            let id: i64 = tables.next_key();
            tables.responses.push(FlowResponse {
                id,
                flow_key: response.flow_key,
                question_key: response.question_key,
                question_id,
                timestamp: storage_precision(response.timestamp),
                row_id: response.row_id,
                contact_id: response.contact_id,
                session_id: response.session_id,
                response: response.response,
                response_metadata: response.response_metadata,
            });
        }

        Ok(count)
    }

    async fn list_responses(
        &self,
        flow: &Flow,
        filter: &ResponseFilter,
        page: &PageRequest,
    ) -> StoreResult<Page<FlowResponse>> {
        let tables = self.tables.read().await;
        let rows = tables
            .responses
            .iter()
            .filter(|r| r.flow_key == flow.primary_key && filter.matches(&r.timestamp))
            .cloned();
        Ok(window(rows, page))
    }

    async fn delete_responses_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before: usize = tables.responses.len();
        tables.responses.retain(|r| r.timestamp >= cutoff);
        Ok((before - tables.responses.len()) as u64)
    }

    async fn find_user(&self, username: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_token(&self, key: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tokens
            .get(key)
            .and_then(|user_id| tables.users.iter().find(|u| u.id == *user_id))
            .cloned())
    }

    async fn create_user(&self, username: &str, password_hash: Option<String>, is_superuser: bool) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|u| u.username == username) {
            return Err(StoreError::DuplicateUser(username.to_string()));
        }

        let user: User = User {
            id: tables.next_key(),
            username: username.to_string(),
            password_hash,
            is_active: true,
            is_superuser,
            permissions: HashSet::new(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn create_token(&self, username: &str, key: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let user_id: i64 = tables.user_mut(username)?.id;
        tables.tokens.retain(|_, owner| *owner != user_id);
        tables.tokens.insert(key.to_string(), user_id);
        Ok(())
    }

    async fn set_permission(&self, username: &str, permission: Permission, granted: bool) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let user: &mut User = tables.user_mut(username)?;
        if granted {
            user.permissions.insert(permission);
        } else {
            user.permissions.remove(&permission);
        }
        Ok(())
    }

    async fn set_active(&self, username: &str, active: bool) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.user_mut(username)?.is_active = active;
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
