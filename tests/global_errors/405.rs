//! tests/global_errors/405.rs
//! Ensures that an unsupported method on a known route returns HTTP 405.

#[path = "../mod.rs"]
mod common;

use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn returns_405_for_unsupported_method() {
    let app = common::spawn_app().await;
    let token: String = app.full_access_token().await;

    let resp: reqwest::Response = app
        .client
        .delete(app.url(common::PACKAGES_URL))
        .header("Authorization", format!("Token {token}"))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({"detail": "Method \"DELETE\" not allowed."}));
}
