// Flow response handlers

use std::collections::{HashMap, HashSet};

use axum::{
    body::Bytes,
    extract::{Path, Query, RawQuery, State},
    http::HeaderMap,
    Extension,
};
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::api::middleware::UserContext;
use crate::api::packages::handler::{load_package, package_path, page_links, responses_path};
use crate::config::state::AppState;
use crate::database::store::{row_key, ResponseFilter, RowKey, StoreError};
use crate::models::response::identifier;
use crate::models::{FlowQuestion, FlowResponse, NewFlowResponse, Permission, TypedValue};
use crate::utils::error_handler::ApiError;
use crate::utils::pagination::{Page, PageRequest};
use crate::utils::response_handler::HandlerResponse;
use crate::utils::utils::{absolute_url, parse_json_body};
use crate::utils::validation::ErrorTree;

use super::serializer::{self, ResponsesInput, DUPLICATE_ROW, ID_MISMATCH};

/// Lists a package's responses, oldest first
#[instrument(name = "list_responses", skip(state, context, headers, params, raw_query))]
pub async fn list_responses_handler(
    State(state): State<AppState>,
    Extension(context): Extension<UserContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    RawQuery(raw_query): RawQuery,
) -> Result<HandlerResponse, ApiError> {
    context.require(Permission::ViewFlowResponse)?;

    let (flow, _) = load_package(&state, &id).await?;

    let env = &state.environment;
    let filter: ResponseFilter = serializer::parse_filter(&params)?;
    let request: PageRequest = PageRequest::from_query(&params, env.page_size, env.max_page_size, &env.secret_key)?;
    let page: Page<FlowResponse> = state.store.list_responses(&flow, &filter, &request).await?;

    let url: String = absolute_url(env, &headers, &responses_path(&flow.id));
    let links: Value = page_links(&state, &url, raw_query.as_deref(), &page);

    Ok(HandlerResponse::ok(serializer::responses_document(
        &flow,
        &page.items,
        &absolute_url(env, &headers, &package_path(&flow.id)),
        links,
    )))
}

/// Stores a batch of responses; either every row is stored or none is
#[instrument(name = "create_responses", skip(state, context, headers, body))]
pub async fn create_responses_handler(
    State(state): State<AppState>,
    Extension(context): Extension<UserContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<HandlerResponse, ApiError> {
    context.require(Permission::AddFlowResponse)?;

    let (flow, questions) = load_package(&state, &id).await?;

    let body: Value = parse_json_body(&headers, &body)?;
    let input: ResponsesInput = serializer::parse_responses(&body)?;

    if input.id != flow.id.to_string() {
        let mut errors: ErrorTree = ErrorTree::new();
        errors.child("data").add("id", ID_MISMATCH);
        return Err(errors.into());
    }

    let candidates: Vec<RowKey> = candidate_row_keys(&questions, &input.rows);
    let stored: HashSet<RowKey> = state.store.existing_row_ids(&candidates).await?;

    let responses: Vec<NewFlowResponse> = serializer::validate_rows(&flow, &questions, &input.rows, &stored)
        .map_err(serializer::wrap_row_errors)?;

    let created: u64 = match state.store.insert_responses(responses).await {
        Ok(created) => created,
        // a concurrent batch stored the same row id first
        Err(StoreError::DuplicateRow { row_id, .. }) => {
            let mut errors: ErrorTree = ErrorTree::new();
            errors.push(format!("{DUPLICATE_ROW} ({row_id})"));
            return Err(serializer::wrap_row_errors(errors).into());
        }
        Err(e) => return Err(e.into()),
    };

    info!("Stored {} response(s) for package {}", created, flow.id);

    Ok(HandlerResponse::created(json!({
        "data": {
            "type": serializer::RESPONSES_TYPE,
            "id": flow.id.to_string(),
            "attributes": {
                "created": created
            }
        }
    })))
}

/// `(question, row id)` pairs the batch would create, for rows that name a known question
fn candidate_row_keys(questions: &[FlowQuestion], rows: &[Vec<Value>]) -> Vec<RowKey> {
    rows.iter()
        .filter_map(|row| {
            let question_id: &str = row.get(4)?.as_str()?;
            let question: &FlowQuestion = questions.iter().find(|q| q.id == question_id)?;
            let row_id: TypedValue = identifier(row.get(1)?).ok()?;
            Some(row_key(question.primary_key, &row_id))
        })
        .collect()
}
