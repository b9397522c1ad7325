//! tests/packages/list.rs
//! Package listing and cursor pagination.

#[path = "../mod.rs"]
mod common;

use chrono::{Duration, TimeZone, Utc};
use flow_results::database::FlowStore;
use flow_results::models::{FlowVersion, NewFlow};
use reqwest::StatusCode;
use serde_json::Value;
use uuid::Uuid;

async fn seed_packages(app: &common::TestApp, count: i64) {
    let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    for i in 0..count {
        let flow: NewFlow = NewFlow {
            id: Uuid::new_v4(),
            name: format!("flow-{i}"),
            version: FlowVersion::V1_0_0Rc1,
            created: start,
            modified: start + Duration::minutes(i),
            title: String::new(),
            language: String::new(),
        };
        app.store.create_package(flow, Vec::new()).await.unwrap();
    }
}

#[tokio::test]
async fn lists_package_summaries() {
    let app = common::spawn_app().await;
    let token: String = app.full_access_token().await;
    app.create_package(&token, &common::package_descriptor(Some(common::PACKAGE_ID))).await;

    let resp: reqwest::Response = app.get(&app.url(common::PACKAGES_URL), &token).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["links"]["self"], app.url(common::PACKAGES_URL));
    assert!(body["links"]["next"].is_null());
    assert!(body["links"]["previous"].is_null());

    let data: &Vec<Value> = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["type"], "packages");
    assert_eq!(data[0]["id"], common::PACKAGE_ID);
    assert_eq!(data[0]["attributes"]["name"], "standard_test_survey");
    assert_eq!(data[0]["attributes"]["title"], "Standard Test Survey");
}

#[tokio::test]
async fn pages_follow_cursor_links() {
    let app = common::spawn_app().await;
    let token: String = app.full_access_token().await;
    seed_packages(&app, 101).await;

    let first: Value = app.get(&app.url(common::PACKAGES_URL), &token).await.json().await.unwrap();
    let items: &Vec<Value> = first["data"].as_array().unwrap();
    assert_eq!(items.len(), 100);
    assert_eq!(items[0]["attributes"]["name"], "flow-0");
    assert_eq!(items[99]["attributes"]["name"], "flow-99");
    assert!(first["links"]["previous"].is_null());

    let next: &str = first["links"]["next"].as_str().unwrap();
    assert!(next.contains("cursor="));

    let second: Value = app.get(next, &token).await.json().await.unwrap();
    let items: &Vec<Value> = second["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["attributes"]["name"], "flow-100");
    assert!(second["links"]["next"].is_null());

    let previous: &str = second["links"]["previous"].as_str().unwrap();
    let back: Value = app.get(previous, &token).await.json().await.unwrap();
    let items: &Vec<Value> = back["data"].as_array().unwrap();
    assert_eq!(items.len(), 100);
    assert_eq!(items[0]["attributes"]["name"], "flow-0");
}

#[tokio::test]
async fn page_size_is_capped() {
    let app = common::spawn_app_with(&[("PAGE_SIZE", "2"), ("MAX_PAGE_SIZE", "3")]).await;
    let token: String = app.full_access_token().await;
    seed_packages(&app, 5).await;

    let url: String = format!("{}?page[size]=10", app.url(common::PACKAGES_URL));
    let body: Value = app.get(&url, &token).await.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let body: Value = app.get(&app.url(common::PACKAGES_URL), &token).await.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn tampered_cursors_are_not_found() {
    let app = common::spawn_app().await;
    let token: String = app.full_access_token().await;

    let url: String = format!("{}?cursor=bm90LWEtY3Vyc29y", app.url(common::PACKAGES_URL));
    let resp: reqwest::Response = app.get(&url, &token).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn next_page_does_not_repeat_packages_created_now() {
    let app = common::spawn_app_with(&[("PAGE_SIZE", "1")]).await;
    let token: String = app.full_access_token().await;
    for name in ["first_survey", "second_survey"] {
        let mut descriptor: Value = common::package_descriptor(None);
        let attributes: &mut Value = &mut descriptor["data"]["attributes"];
        attributes["name"] = Value::from(name);
        attributes.as_object_mut().unwrap().remove("created");
        attributes.as_object_mut().unwrap().remove("modified");
        app.create_package(&token, &descriptor).await;
    }

    let first: Value = app.get(&app.url(common::PACKAGES_URL), &token).await.json().await.unwrap();
    assert_eq!(first["data"].as_array().unwrap().len(), 1);
    let next: &str = first["links"]["next"].as_str().unwrap();

    let second: Value = app.get(next, &token).await.json().await.unwrap();
    assert_eq!(second["data"].as_array().unwrap().len(), 1);
    assert_ne!(first["data"][0]["attributes"]["name"], second["data"][0]["attributes"]["name"]);
    assert!(second["links"]["next"].is_null());
}
