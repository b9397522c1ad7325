//! tests/global_errors/400.rs
//! Ensures that requests for hosts outside ALLOWED_HOSTS are rejected.

#[path = "../mod.rs"]
mod common;

use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn returns_400_for_disallowed_host() {
    let app = common::spawn_app().await;

    let resp: reqwest::Response = app
        .client
        .get(app.url("/health/"))
        .header("Host", "evil.example.com")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({"detail": "Invalid HTTP_HOST header: 'evil.example.com'."})
    );
}

#[tokio::test]
async fn wildcard_hosts_accept_anything() {
    let app = common::spawn_app_with(&[("ALLOWED_HOSTS", "*")]).await;

    let resp: reqwest::Response = app
        .client
        .get(app.url("/health/"))
        .header("Host", "anything.example.org")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(resp.status(), StatusCode::OK);
}
