//! tests/global_errors/413.rs
//! Ensures that a body over DATA_UPLOAD_MAX_MEMORY_SIZE triggers 413.

#[path = "../mod.rs"]
mod common;

use reqwest::StatusCode;
use serde_json::Value;

#[tokio::test]
async fn returns_413_when_payload_exceeds_global_limit() {
    let app = common::spawn_app_with(&[("DATA_UPLOAD_MAX_MEMORY_SIZE", "1024")]).await;
    let token: String = app.full_access_token().await;

    let oversized_payload: Vec<u8> = vec![b' '; 4096];

    let resp: reqwest::Response = app
        .client
        .post(app.url(common::PACKAGES_URL))
        .header("Authorization", format!("Token {token}"))
        .header("Content-Type", "application/json")
        .body(oversized_payload)
        .send()
        .await
        .expect("Failed to send large request.");

    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let json: Value = resp.json().await.unwrap();
    assert!(json["detail"].is_string());
}
