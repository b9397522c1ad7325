//! tests/auth/authentication.rs
//! Token and basic authentication on the Flow Results endpoints.

#[path = "../mod.rs"]
mod common;

use flow_results::database::FlowStore;
use flow_results::models::Permission;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn missing_credentials_are_unauthorized() {
    let app = common::spawn_app().await;

    let resp: reqwest::Response = app.client.get(app.url(common::PACKAGES_URL)).send().await.unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers()["www-authenticate"], "Token");
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({"detail": "Authentication credentials were not provided."})
    );
}

#[tokio::test]
async fn bad_tokens_are_rejected() {
    let app = common::spawn_app().await;

    let cases: [(&str, &str); 3] = [
        ("Token not-a-real-key", "Invalid token."),
        ("Token", "Invalid token header. No credentials provided."),
        ("Token a b", "Invalid token header. Token string should not contain spaces."),
    ];
    for (header, detail) in cases {
        let resp: reqwest::Response = app
            .client
            .get(app.url(common::PACKAGES_URL))
            .header("Authorization", header)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.json::<Value>().await.unwrap(), json!({ "detail": detail }));
    }
}

#[tokio::test]
async fn basic_authentication_checks_the_password() {
    let app = common::spawn_app().await;
    let hash: String = bcrypt::hash("correct horse", 4).unwrap();
    app.store.create_user("basic-user", Some(hash), false).await.unwrap();
    app.store.set_permission("basic-user", Permission::ViewFlow, true).await.unwrap();

    let resp: reqwest::Response = app
        .client
        .get(app.url(common::PACKAGES_URL))
        .basic_auth("basic-user", Some("correct horse"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp: reqwest::Response = app
        .client
        .get(app.url(common::PACKAGES_URL))
        .basic_auth("basic-user", Some("wrong"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({"detail": "Invalid username/password."}));
}

#[tokio::test]
async fn unknown_users_get_the_same_basic_failure() {
    let app = common::spawn_app().await;

    let resp: reqwest::Response = app
        .client
        .get(app.url(common::PACKAGES_URL))
        .basic_auth("nobody", Some("placeholder"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({"detail": "Invalid username/password."}));
}

#[tokio::test]
async fn inactive_users_are_rejected() {
    let app = common::spawn_app().await;
    let token: String = app.token_with("leaver", &[Permission::ViewFlow]).await;
    app.store.set_active("leaver", false).await.unwrap();

    let resp: reqwest::Response = app.get(&app.url(common::PACKAGES_URL), &token).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({"detail": "User inactive or deleted."}));
}

#[tokio::test]
async fn health_needs_no_credentials() {
    let app = common::spawn_app().await;

    let resp: reqwest::Response = app.client.get(app.url("/health/")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({"database": "working"}));
}
