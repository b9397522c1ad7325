//! tests/global_errors/404.rs
//! Ensures that hitting an unknown route returns HTTP 404 with a JSON body.

#[path = "../mod.rs"]
mod common;

use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn returns_404_for_nonexistent_route() {
    let app = common::spawn_app().await;

    let resp: reqwest::Response = app
        .client
        .get(app.url("/does-not-exist"))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({"detail": "Not found."}));
}
