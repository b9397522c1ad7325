//! tests/auth/permissions.rs
//! Each endpoint requires its model permission; superusers hold them all.

#[path = "../mod.rs"]
mod common;

use flow_results::database::FlowStore;
use flow_results::models::Permission;
use reqwest::StatusCode;
use serde_json::{json, Value};

const FORBIDDEN: &str = "You do not have permission to perform this action.";

#[tokio::test]
async fn package_endpoints_need_flow_permissions() {
    let app = common::spawn_app().await;
    let viewer: String = app.token_with("viewer", &[Permission::ViewFlow]).await;
    let creator: String = app.token_with("creator", &[Permission::AddFlow]).await;
    let descriptor: Value = common::package_descriptor(Some(common::PACKAGE_ID));

    let resp: reqwest::Response = app.post_json(&app.url(common::PACKAGES_URL), &viewer, &descriptor).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({ "detail": FORBIDDEN }));

    let resp: reqwest::Response = app.post_json(&app.url(common::PACKAGES_URL), &creator, &descriptor).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp: reqwest::Response = app.get(&app.url(common::PACKAGES_URL), &creator).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp: reqwest::Response = app.get(&app.package_url(common::PACKAGE_ID), &viewer).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn response_endpoints_need_response_permissions() {
    let app = common::spawn_app().await;
    let admin: String = app.full_access_token().await;
    let flow_only: String = app.token_with("flow-only", &[Permission::ViewFlow, Permission::AddFlow]).await;
    app.create_package(&admin, &common::package_descriptor(Some(common::PACKAGE_ID))).await;

    let resp: reqwest::Response = app.get(&app.responses_url(common::PACKAGE_ID), &flow_only).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let body: Value = common::responses_body(common::PACKAGE_ID, json!([]));
    let resp: reqwest::Response = app.post_json(&app.responses_url(common::PACKAGE_ID), &flow_only, &body).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn superusers_hold_every_permission() {
    let app = common::spawn_app().await;
    app.store.create_user("root", None, true).await.unwrap();
    app.store.create_token("root", "0123456789abcdef0123456789abcdef01234567").await.unwrap();

    let resp: reqwest::Response = app
        .get(&app.url(common::PACKAGES_URL), "0123456789abcdef0123456789abcdef01234567")
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
}
