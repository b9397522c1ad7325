// Package (flow) handlers

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Path, Query, RawQuery, State},
    http::HeaderMap,
    Extension,
};
use serde_json::{json, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::api::middleware::UserContext;
use crate::config::state::AppState;
use crate::database::store::StoreError;
use crate::models::{Flow, FlowQuestion, NewFlow, NewQuestion, Permission};
use crate::utils::error_handler::ApiError;
use crate::utils::pagination::{cursor_link, self_link, Page, PageRequest};
use crate::utils::response_handler::HandlerResponse;
use crate::utils::utils::{absolute_url, parse_json_body};
use crate::utils::validation::ErrorTree;

use super::serializer::{self, PackageInput};

pub const PACKAGES_PATH: &str = "/api/v1/flow-results/packages/";
const DUPLICATE_PACKAGE: &str = "Flow with this Id already exists.";

pub fn package_path(id: &Uuid) -> String {
    format!("{PACKAGES_PATH}{id}/")
}

pub fn responses_path(id: &Uuid) -> String {
    format!("{PACKAGES_PATH}{id}/responses/")
}

/// Parses a package id from the path; anything that isn't a UUID is not found
pub fn parse_package_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::not_found())
}

/// Loads a package and its questions or fails with 404
pub async fn load_package(state: &AppState, raw_id: &str) -> Result<(Flow, Vec<FlowQuestion>), ApiError> {
    let id: Uuid = parse_package_id(raw_id)?;
    state.store.get_package(id).await?.ok_or_else(ApiError::not_found)
}

/// Builds the `links` object for a page
pub fn page_links<T>(
    state: &AppState,
    url: &str,
    raw_query: Option<&str>,
    page: &Page<T>,
) -> Value {
    let secret: &str = &state.environment.secret_key;
    json!({
        "self": self_link(url, raw_query),
        "next": page.next.as_ref().map(|cursor| cursor_link(url, raw_query, cursor, secret)),
        "previous": page.previous.as_ref().map(|cursor| cursor_link(url, raw_query, cursor, secret)),
    })
}

/// Lists packages, oldest modification first
#[instrument(name = "list_packages", skip_all)]
pub async fn list_packages_handler(
    State(state): State<AppState>,
    Extension(context): Extension<UserContext>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    RawQuery(raw_query): RawQuery,
) -> Result<HandlerResponse, ApiError> {
    context.require(Permission::ViewFlow)?;

    let env = &state.environment;
    let request: PageRequest = PageRequest::from_query(&params, env.page_size, env.max_page_size, &env.secret_key)?;
    let page: Page<Flow> = state.store.list_packages(&request).await?;

    let url: String = absolute_url(env, &headers, PACKAGES_PATH);
    let data: Vec<Value> = page.items.iter().map(serializer::summary).collect();

    Ok(HandlerResponse::ok(json!({
        "links": page_links(&state, &url, raw_query.as_deref(), &page),
        "data": data,
    })))
}

/// Creates a package from its descriptor
#[instrument(name = "create_package", skip_all)]
pub async fn create_package_handler(
    State(state): State<AppState>,
    Extension(context): Extension<UserContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<HandlerResponse, ApiError> {
    context.require(Permission::AddFlow)?;

    let body: Value = parse_json_body(&headers, &body)?;
    let input: PackageInput = serializer::parse_package(&body)?;

    let flow: NewFlow = input.flow.clean().map_err(serializer::remap_flow_errors)?;

    let mut question_errors: Vec<(String, ErrorTree)> = Vec::new();
    let mut questions: Vec<NewQuestion> = Vec::with_capacity(input.questions.len());
    for question in input.questions {
        match NewQuestion::build(&question.id, &question.question_type, &question.label, question.type_options) {
            Ok(built) => questions.push(built),
            Err(errors) => question_errors.push((question.id, errors)),
        }
    }
    if !question_errors.is_empty() {
        return Err(serializer::question_errors(question_errors).into());
    }

    let stored: Flow = match state.store.create_package(flow, questions).await {
        Ok(stored) => stored,
        Err(StoreError::DuplicatePackage(_)) => {
            let mut attributes: ErrorTree = ErrorTree::new();
            attributes.add("id", DUPLICATE_PACKAGE);
            return Err(serializer::wrap_attributes(attributes).into());
        }
        Err(e) => return Err(e.into()),
    };

    info!("Created package {}", stored.id);

    let (flow, questions) = state
        .store
        .get_package(stored.id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("package {} vanished after creation", stored.id)))?;

    Ok(HandlerResponse::created(render_descriptor(&state, &headers, &flow, &questions)))
}

/// Returns a package descriptor
#[instrument(name = "retrieve_package", skip(state, context, headers))]
pub async fn retrieve_package_handler(
    State(state): State<AppState>,
    Extension(context): Extension<UserContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<HandlerResponse, ApiError> {
    context.require(Permission::ViewFlow)?;

    let (flow, questions) = load_package(&state, &id).await?;
    Ok(HandlerResponse::ok(render_descriptor(&state, &headers, &flow, &questions)))
}

fn render_descriptor(state: &AppState, headers: &HeaderMap, flow: &Flow, questions: &[FlowQuestion]) -> Value {
    let env = &state.environment;
    serializer::descriptor(
        flow,
        questions,
        &absolute_url(env, headers, &package_path(&flow.id)),
        &absolute_url(env, headers, &responses_path(&flow.id)),
    )
}
