//! tests/packages/retrieve.rs
//! Fetching a single package descriptor.

#[path = "../mod.rs"]
mod common;

use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn descriptor_round_trips() {
    let app = common::spawn_app().await;
    let token: String = app.full_access_token().await;
    let created: Value = app.create_package(&token, &common::package_descriptor(Some(common::PACKAGE_ID))).await;

    let resp: reqwest::Response = app.get(&app.package_url(common::PACKAGE_ID), &token).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.json::<Value>().await.unwrap(), created);
}

#[tokio::test]
async fn unknown_packages_are_not_found() {
    let app = common::spawn_app().await;
    let token: String = app.full_access_token().await;

    for id in [common::PACKAGE_ID, "not-a-uuid"] {
        let resp: reqwest::Response = app.get(&app.package_url(id), &token).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.json::<Value>().await.unwrap(), json!({"detail": "Not found."}));
    }
}
