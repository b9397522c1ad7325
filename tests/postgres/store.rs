//! tests/postgres/store.rs
//! PgStore against a real database. Each test skips itself when DATABASE_URL
//! is unset and uses fresh package ids so runs can share a database.

#[path = "../mod.rs"]
mod common;

use std::collections::HashSet;

use chrono::{DateTime, Duration, TimeZone, Utc};
use flow_results::database::store::row_key;
use flow_results::database::{FlowStore, PgStore, ResponseFilter, StoreError};
use flow_results::models::{
    Flow, FlowQuestion, FlowResponse, FlowVersion, NewFlow, NewFlowResponse, NewQuestion, QuestionType, TypedValue,
};
use flow_results::utils::pagination::{Cursor, PageRequest};
use serde_json::Map;
use uuid::Uuid;

async fn connect() -> Option<PgStore> {
    let url: String = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set, skipping PostgreSQL test");
            return None;
        }
    };
    let env = common::test_environment(&[("DATABASE_URL", url.as_str())]);
    let store: PgStore = PgStore::connect(&env).await.expect("Failed to connect to PostgreSQL");
    store.migrate().await.expect("Failed to migrate schema");
    Some(store)
}

fn new_flow(modified: DateTime<Utc>) -> NewFlow {
    NewFlow {
        id: Uuid::new_v4(),
        name: "pg_test_survey".to_string(),
        version: FlowVersion::V1_0_0Rc1,
        created: modified,
        modified,
        title: String::new(),
        language: "eng".to_string(),
    }
}

async fn seed_package(store: &PgStore) -> (Flow, FlowQuestion) {
    let question: NewQuestion = NewQuestion {
        id: "1448506774930_29".to_string(),
        question_type: QuestionType::Text,
        label: "What is your favourite colour?".to_string(),
        type_options: Map::new(),
    };
    let flow: Flow = store.create_package(new_flow(Utc::now()), vec![question]).await.unwrap();
    let (flow, mut questions) = store.get_package(flow.id).await.unwrap().unwrap();
    (flow, questions.remove(0))
}

fn response(flow: &Flow, question: &FlowQuestion, row_id: TypedValue, timestamp: DateTime<Utc>) -> NewFlowResponse {
    NewFlowResponse {
        flow_key: flow.primary_key,
        question_key: question.primary_key,
        timestamp,
        row_id,
        contact_id: TypedValue::Integer(1),
        session_id: TypedValue::String("session".into()),
        response: TypedValue::String("blue".into()),
        response_metadata: Map::new(),
    }
}

#[tokio::test]
async fn duplicate_package_ids_are_reported() {
    let Some(store) = connect().await else { return };

    let flow: NewFlow = new_flow(Utc::now());
    store.create_package(flow.clone(), vec![]).await.unwrap();
    assert!(matches!(
        store.create_package(flow, vec![]).await,
        Err(StoreError::DuplicatePackage(_))
    ));
    store.shutdown().await;
}

#[tokio::test]
async fn row_ids_are_unique_per_type() {
    let Some(store) = connect().await else { return };
    let (flow, question) = seed_package(&store).await;
    let now: DateTime<Utc> = Utc::now();

    let stored: u64 = store
        .insert_responses(vec![
            response(&flow, &question, TypedValue::Integer(1), now),
            response(&flow, &question, TypedValue::String("1".into()), now),
        ])
        .await
        .unwrap();
    assert_eq!(stored, 2);

    let known = store
        .existing_row_ids(&[
            row_key(question.primary_key, &TypedValue::Integer(1)),
            row_key(question.primary_key, &TypedValue::Integer(2)),
        ])
        .await
        .unwrap();
    assert_eq!(known.len(), 1);
    assert!(known.contains(&row_key(question.primary_key, &TypedValue::Integer(1))));

    assert!(matches!(
        store
            .insert_responses(vec![response(&flow, &question, TypedValue::Integer(1), now)])
            .await,
        Err(StoreError::DuplicateRow { .. })
    ));
    store.shutdown().await;
}

#[tokio::test]
async fn cursors_walk_sub_second_timestamps_without_repeats() {
    let Some(store) = connect().await else { return };
    let (flow, question) = seed_package(&store).await;
    let base: DateTime<Utc> = Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap() + Duration::nanoseconds(123_456_789);

    let batch: Vec<NewFlowResponse> = (0..3)
        .map(|i| response(&flow, &question, TypedValue::Integer(i), base + Duration::nanoseconds(i)))
        .collect();
    store.insert_responses(batch).await.unwrap();

    let filter: ResponseFilter = ResponseFilter::default();
    let mut request: PageRequest = PageRequest::first(1);
    let mut seen: Vec<i64> = Vec::new();
    loop {
        let page = store.list_responses(&flow, &filter, &request).await.unwrap();
        let rows: Vec<FlowResponse> = page.items;
        assert_eq!(rows.len(), 1);
        seen.push(rows[0].id);

        let Some(next) = page.next else { break };
        let cursor: Cursor = Cursor::decode(&next.encode("secret"), "secret").unwrap();
        request = PageRequest { cursor: Some(cursor), size: 1 };
    }

    let unique: HashSet<i64> = seen.iter().copied().collect();
    assert_eq!(seen.len(), 3);
    assert_eq!(unique.len(), 3);
    store.shutdown().await;
}

#[tokio::test]
async fn deletes_only_responses_before_the_cutoff() {
    let Some(store) = connect().await else { return };
    let (flow, question) = seed_package(&store).await;
    let cutoff: DateTime<Utc> = Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap();

    store
        .insert_responses(vec![
            response(&flow, &question, TypedValue::Integer(1), cutoff - Duration::days(1)),
            response(&flow, &question, TypedValue::Integer(2), cutoff + Duration::days(1)),
        ])
        .await
        .unwrap();

    assert!(store.delete_responses_before(cutoff).await.unwrap() >= 1);

    let page = store
        .list_responses(&flow, &ResponseFilter::default(), &PageRequest::first(10))
        .await
        .unwrap();
    let row_ids: Vec<TypedValue> = page.items.into_iter().map(|r| r.row_id).collect();
    assert_eq!(row_ids, vec![TypedValue::Integer(2)]);
    store.shutdown().await;
}
