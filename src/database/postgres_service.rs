// =============================================================================
// POSTGRES STORE - FlowStore backed by a single sqlx connection pool
// =============================================================================

use std::collections::HashSet;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{ConnectOptions, Executor, PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info, log::LevelFilter};
use uuid::Uuid;

use crate::config::environment::EnvironmentVariables;
use crate::database::store::{FlowStore, ResponseFilter, RowKey, StoreError, StoreResult};
use crate::models::{
    Flow, FlowQuestion, FlowResponse, FlowVersion, NewFlow, NewFlowResponse, NewQuestion, Permission,
    QuestionType, TypedValue, User,
};
use crate::utils::pagination::{Page, PageRequest};

// =============================================================================
// SQL CONSTANTS
// =============================================================================

/// Single initialization SQL script
const INIT_SCHEMA_SQL: &str = include_str!("sql/schema_init.sql");

/// Tables the schema script creates
pub const EXPECTED_TABLES: [&str; 6] = [
    "flows",
    "flow_questions",
    "flow_responses",
    "users",
    "auth_tokens",
    "user_permissions",
];

const FLOW_COLUMNS: &str = "primary_key, id, name, version, created, modified, title, language";

const RESPONSE_COLUMNS: &str = "r.id, r.flow_key, r.question_key, q.id AS question_id, r.timestamp, \
     r.row_id_type, r.row_id_value, r.contact_id_type, r.contact_id_value, \
     r.session_id_type, r.session_id_value, r.response_type, r.response_value, r.response_metadata";

const USER_COLUMNS: &str = "u.id, u.username, u.password_hash, u.is_active, u.is_superuser";

// =============================================================================
// POSTGRES STORE
// =============================================================================

/// Database service owning the application's connection pool.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects using `DATABASE_URL`. The schema is not touched; call `migrate()`.
    pub async fn connect(config: &EnvironmentVariables) -> Result<Self> {
        info!("Connecting to PostgreSQL...");

        let options: PgConnectOptions = create_connect_options(config)?;
        let pool: PgPool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .min_connections(1)
            .idle_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        info!("Database connection pool ready");
        Ok(Self { pool })
    }

    /// Runs the idempotent schema script
    pub async fn migrate(&self) -> Result<()> {
        info!("Executing schema initialization...");

        self.pool
            .execute(INIT_SCHEMA_SQL)
            .await
            .context("Failed to execute schema initialization SQL")?;

        info!("Schema initialization completed");
        Ok(())
    }

    /// Expected tables missing from the current schema
    pub async fn missing_tables(&self) -> Result<Vec<String>> {
        let present: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = current_schema() AND table_name = ANY($1)
            "#,
        )
        .bind(EXPECTED_TABLES.iter().map(|t| t.to_string()).collect::<Vec<String>>())
        .fetch_all(&self.pool)
        .await
        .context("Failed to inspect database schema")?;

        Ok(EXPECTED_TABLES
            .iter()
            .filter(|table| !present.iter().any(|p| p == *table))
            .map(|table| table.to_string())
            .collect())
    }

    async fn user_permissions(&self, user_id: i64) -> StoreResult<HashSet<Permission>> {
        let codenames: Vec<String> = sqlx::query_scalar("SELECT codename FROM user_permissions WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        // codenames we no longer know about are ignored
        Ok(codenames.iter().filter_map(|c| c.parse().ok()).collect())
    }

    async fn user_from_row(&self, row: Option<PgRow>) -> StoreResult<Option<User>> {
        let Some(row) = row else {
            return Ok(None);
        };

        let id: i64 = row.try_get("id")?;
        Ok(Some(User {
            id,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            is_active: row.try_get("is_active")?,
            is_superuser: row.try_get("is_superuser")?,
            permissions: self.user_permissions(id).await?,
        }))
    }

    async fn user_id(&self, username: &str) -> StoreResult<i64> {
        sqlx::query_scalar("SELECT id FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::UnknownUser(username.to_string()))
    }
}

#[async_trait]
impl FlowStore for PgStore {
    async fn create_package(&self, flow: NewFlow, questions: Vec<NewQuestion>) -> StoreResult<Flow> {
        let mut tx: sqlx::Transaction<'_, Postgres> = self.pool.begin().await?;

        let inserted: Result<PgRow, sqlx::Error> = sqlx::query(&format!(
            r#"
            INSERT INTO flows (id, name, version, created, modified, title, language)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {FLOW_COLUMNS}
            "#
        ))
        .bind(flow.id)
        .bind(&flow.name)
        .bind(flow.version.as_str())
        .bind(flow.created)
        .bind(flow.modified)
        .bind(&flow.title)
        .bind(&flow.language)
        .fetch_one(&mut *tx)
        .await;

        let row: PgRow = match inserted {
            Ok(row) => row,
            Err(e) if is_unique_violation(&e) => return Err(StoreError::DuplicatePackage(flow.id)),
            Err(e) => return Err(e.into()),
        };
        let stored: Flow = flow_from_row(&row)?;

        for question in &questions {
            sqlx::query(
                r#"
                INSERT INTO flow_questions (flow_key, id, type, label, type_options)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(stored.primary_key)
            .bind(&question.id)
            .bind(question.question_type.as_str())
            .bind(&question.label)
            .bind(Value::Object(question.type_options.clone()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Stored flow {} with {} question(s)", stored.id, questions.len());
        Ok(stored)
    }

    async fn list_packages(&self, page: &PageRequest) -> StoreResult<Page<Flow>> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {FLOW_COLUMNS} FROM flows WHERE TRUE"));
        push_page_clause(&mut builder, page, "modified", "primary_key");

        let rows: Vec<PgRow> = builder.build().fetch_all(&self.pool).await?;
        let flows: Vec<Flow> = rows.iter().map(flow_from_row).collect::<StoreResult<_>>()?;
        Ok(Page::from_window(flows, page))
    }

    async fn get_package(&self, id: Uuid) -> StoreResult<Option<(Flow, Vec<FlowQuestion>)>> {
        let row: Option<PgRow> = sqlx::query(&format!("SELECT {FLOW_COLUMNS} FROM flows WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let flow: Flow = flow_from_row(&row)?;

        let question_rows: Vec<PgRow> = sqlx::query(
            r#"
            SELECT primary_key, flow_key, id, type, label, type_options
            FROM flow_questions
            WHERE flow_key = $1
            ORDER BY primary_key
            "#,
        )
        .bind(flow.primary_key)
        .fetch_all(&self.pool)
        .await?;

        let questions: Vec<FlowQuestion> = question_rows
            .iter()
            .map(question_from_row)
            .collect::<StoreResult<_>>()?;

        Ok(Some((flow, questions)))
    }

    async fn existing_row_ids(&self, keys: &[RowKey]) -> StoreResult<HashSet<RowKey>> {
        if keys.is_empty() {
            return Ok(HashSet::new());
        }

        let question_keys: Vec<i64> = keys.iter().map(|(q, _, _)| *q).collect();
        let row_id_types: Vec<i16> = keys.iter().map(|(_, t, _)| *t).collect();
        let row_ids: Vec<String> = keys.iter().map(|(_, _, r)| r.clone()).collect();

        let rows: Vec<RowKey> = sqlx::query_as(
            r#"
            SELECT question_key, row_id_type, row_id_value
            FROM flow_responses
            WHERE (question_key, row_id_type, row_id_value) IN (
                SELECT * FROM UNNEST($1::bigint[], $2::smallint[], $3::text[])
            )
            "#,
        )
        .bind(question_keys)
        .bind(row_id_types)
        .bind(row_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn insert_responses(&self, responses: Vec<NewFlowResponse>) -> StoreResult<u64> {
        let mut tx: sqlx::Transaction<'_, Postgres> = self.pool.begin().await?;
        let mut inserted: u64 = 0;

        for response in &responses {
            let row_id_text: String = response.row_id.identifier_text();
            let (contact_type, contact_value) = response.contact_id.to_stored();
            let (session_type, session_value) = response.session_id.to_stored();
            let (response_type, response_value) = response.response.to_stored();

            let result = sqlx::query(
                r#"
                INSERT INTO flow_responses (
                    flow_key, question_key, timestamp,
                    row_id_type, row_id_value,
                    contact_id_type, contact_id_value,
                    session_id_type, session_id_value,
                    response_type, response_value, response_metadata
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(response.flow_key)
            .bind(response.question_key)
            .bind(response.timestamp)
            .bind(response.row_id.value_type().code())
            .bind(&row_id_text)
            .bind(contact_type)
            .bind(contact_value)
            .bind(session_type)
            .bind(session_value)
            .bind(response_type)
            .bind(response_value)
            .bind(Value::Object(response.response_metadata.clone()))
            .execute(&mut *tx)
            .await;

            match result {
                Ok(done) => inserted += done.rows_affected(),
                Err(e) if is_unique_violation(&e) => {
                    return Err(StoreError::DuplicateRow {
                        question_key: response.question_key,
                        row_id: row_id_text,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn list_responses(
        &self,
        flow: &Flow,
        filter: &ResponseFilter,
        page: &PageRequest,
    ) -> StoreResult<Page<FlowResponse>> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT {RESPONSE_COLUMNS} FROM flow_responses r \
             JOIN flow_questions q ON q.primary_key = r.question_key \
             WHERE r.flow_key = "
        ));
        builder.push_bind(flow.primary_key);

        if let Some(start) = filter.start {
            builder.push(" AND r.timestamp > ").push_bind(start);
        }
        if let Some(end) = filter.end {
            builder.push(" AND r.timestamp <= ").push_bind(end);
        }
        push_page_clause(&mut builder, page, "r.timestamp", "r.id");

        let rows: Vec<PgRow> = builder.build().fetch_all(&self.pool).await?;
        let responses: Vec<FlowResponse> = rows.iter().map(response_from_row).collect::<StoreResult<_>>()?;
        Ok(Page::from_window(responses, page))
    }

    async fn delete_responses_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM flow_responses WHERE timestamp < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn find_user(&self, username: &str) -> StoreResult<Option<User>> {
        let row: Option<PgRow> = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users u WHERE u.username = $1"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        self.user_from_row(row).await
    }

    async fn find_user_by_token(&self, key: &str) -> StoreResult<Option<User>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users u JOIN auth_tokens t ON t.user_id = u.id WHERE t.key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        self.user_from_row(row).await
    }

    async fn create_user(&self, username: &str, password_hash: Option<String>, is_superuser: bool) -> StoreResult<User> {
        let inserted: Result<PgRow, sqlx::Error> = sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, is_superuser)
            VALUES ($1, $2, $3)
            RETURNING id, username, password_hash, is_active, is_superuser
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .bind(is_superuser)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(row) => self
                .user_from_row(Some(row))
                .await?
                .ok_or_else(|| StoreError::UnknownUser(username.to_string())),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateUser(username.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_token(&self, username: &str, key: &str) -> StoreResult<()> {
        let user_id: i64 = self.user_id(username).await?;
        sqlx::query(
            r#"
            INSERT INTO auth_tokens (key, user_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET key = EXCLUDED.key, created = NOW()
            "#,
        )
        .bind(key)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_permission(&self, username: &str, permission: Permission, granted: bool) -> StoreResult<()> {
        let user_id: i64 = self.user_id(username).await?;
        let sql: &str = if granted {
            "INSERT INTO user_permissions (user_id, codename) VALUES ($1, $2) ON CONFLICT DO NOTHING"
        } else {
            "DELETE FROM user_permissions WHERE user_id = $1 AND codename = $2"
        };
        sqlx::query(sql)
            .bind(user_id)
            .bind(permission.codename())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_active(&self, username: &str, active: bool) -> StoreResult<()> {
        let updated: u64 = sqlx::query("UPDATE users SET is_active = $2 WHERE username = $1")
            .bind(username)
            .bind(active)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(StoreError::UnknownUser(username.to_string()));
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn shutdown(&self) {
        info!("Closing database connection pool...");
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}

// =============================================================================
// INTERNAL HELPERS
// =============================================================================

/// Connection options with SSL and UTC timezone
fn create_connect_options(config: &EnvironmentVariables) -> Result<PgConnectOptions> {
    let mut options: PgConnectOptions = PgConnectOptions::from_str(&config.database_url)
        .context("Invalid DATABASE_URL")?
        .log_statements(LevelFilter::Debug);

    options = options.options([("timezone", "UTC"), ("application_name", "flow-results")]);

    // Configure SSL based on environment
    if config.is_production() {
        options = options.ssl_mode(sqlx::postgres::PgSslMode::Require);
    }

    Ok(options)
}

/// Appends the cursor bound, ordering and limit for a page request
fn push_page_clause(builder: &mut QueryBuilder<'_, Postgres>, page: &PageRequest, time_column: &str, key_column: &str) {
    if let Some(cursor) = page.cursor {
        let operator: &str = if cursor.reverse { "<" } else { ">" };
        builder
            .push(format!(" AND ({time_column}, {key_column}) {operator} ("))
            .push_bind(cursor.position.timestamp)
            .push(", ")
            .push_bind(cursor.position.key)
            .push(")");
    }

    let direction: &str = if page.is_reverse() { "DESC" } else { "ASC" };
    builder
        .push(format!(" ORDER BY {time_column} {direction}, {key_column} {direction} LIMIT "))
        .push_bind(i64::try_from(page.fetch_limit()).unwrap_or(i64::MAX));
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

fn flow_from_row(row: &PgRow) -> StoreResult<Flow> {
    let version: String = row.try_get("version")?;
    Ok(Flow {
        primary_key: row.try_get("primary_key")?,
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        version: FlowVersion::parse(&version).map_err(StoreError::Corrupt)?,
        created: row.try_get("created")?,
        modified: row.try_get("modified")?,
        title: row.try_get("title")?,
        language: row.try_get("language")?,
    })
}

fn question_from_row(row: &PgRow) -> StoreResult<FlowQuestion> {
    let question_type: String = row.try_get("type")?;
    let type_options: Value = row.try_get("type_options")?;
    Ok(FlowQuestion {
        primary_key: row.try_get("primary_key")?,
        flow_key: row.try_get("flow_key")?,
        id: row.try_get("id")?,
        question_type: question_type.parse::<QuestionType>().map_err(StoreError::Corrupt)?,
        label: row.try_get("label")?,
        type_options: into_object(type_options),
    })
}

fn response_from_row(row: &PgRow) -> StoreResult<FlowResponse> {
    let typed = |type_column: &str, value: Value| -> StoreResult<TypedValue> {
        let code: i16 = row.try_get(type_column)?;
        TypedValue::from_stored(code, &value).map_err(StoreError::Corrupt)
    };

    let row_id_text: String = row.try_get("row_id_value")?;
    let metadata: Value = row.try_get("response_metadata")?;

    Ok(FlowResponse {
        id: row.try_get("id")?,
        flow_key: row.try_get("flow_key")?,
        question_key: row.try_get("question_key")?,
        question_id: row.try_get("question_id")?,
        timestamp: row.try_get("timestamp")?,
        row_id: typed("row_id_type", Value::String(row_id_text))?,
        contact_id: typed("contact_id_type", row.try_get("contact_id_value")?)?,
        session_id: typed("session_id_type", row.try_get("session_id_value")?)?,
        response: typed("response_type", row.try_get("response_value")?)?,
        response_metadata: into_object(metadata),
    })
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
