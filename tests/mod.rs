//! tests/mod.rs
//! A shared test helper to spawn the API on an ephemeral port, backed by the
//! in-memory store, plus helpers to seed users and packages.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::{serve, Router};
use flow_results::config::{environment::EnvironmentVariables, state::AppState};
use flow_results::core::server::create_app;
use flow_results::database::{FlowStore, MemoryStore};
use flow_results::models::{generate_token_key, Permission};
use serde_json::{json, Value};
use tokio::net::TcpListener as TokioTcpListener;

pub const SECRET_KEY: &str = "integration-test-secret";
pub const PACKAGES_URL: &str = "/api/v1/flow-results/packages/";
pub const PACKAGE_ID: &str = "b40e9c4d-5b9b-4f4f-8a62-1a0e1a6e3c2d";

pub struct TestApp {
    pub base_url: String,
    pub store: Arc<MemoryStore>,
    pub client: reqwest::Client,
}

/// Environment for tests; `overrides` replace the defaults
pub fn test_environment(overrides: &[(&str, &str)]) -> EnvironmentVariables {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("SECRET_KEY".to_string(), SECRET_KEY.to_string()),
        ("ALLOWED_HOSTS".to_string(), "127.0.0.1".to_string()),
        ("ENVIRONMENT".to_string(), "test".to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }
    EnvironmentVariables::from_vars(&vars).expect("Invalid test environment")
}

/// Spawns the app on a random unused port
pub async fn spawn_app() -> TestApp {
    spawn_app_with(&[]).await
}

pub async fn spawn_app_with(overrides: &[(&str, &str)]) -> TestApp {
    let env: EnvironmentVariables = test_environment(overrides);
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let state: AppState = AppState::new(Arc::new(env), store.clone());

    let app: Router = create_app(state);

    // * Bind an ephemeral port using std::net::TcpListener.
    let std_listener: std::net::TcpListener = std::net::TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind random port");
    std_listener.set_nonblocking(true).unwrap();

    let tokio_listener: TokioTcpListener = TokioTcpListener::from_std(std_listener)
        .expect("Failed to convert to tokio listener");

    let addr: std::net::SocketAddr = tokio_listener.local_addr().unwrap();

    tokio::spawn(async move {
        serve(tokio_listener, app)
            .await
            .expect("Server failed");
    });

    TestApp {
        base_url: format!("http://{}", addr),
        store,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn package_url(&self, id: &str) -> String {
        self.url(&format!("{PACKAGES_URL}{id}/"))
    }

    pub fn responses_url(&self, id: &str) -> String {
        self.url(&format!("{PACKAGES_URL}{id}/responses/"))
    }

    /// Creates a user holding `permissions` and returns their API token
    pub async fn token_with(&self, username: &str, permissions: &[Permission]) -> String {
        self.store.create_user(username, None, false).await.unwrap();
        for permission in permissions {
            self.store.set_permission(username, *permission, true).await.unwrap();
        }
        let key: String = generate_token_key(SECRET_KEY);
        self.store.create_token(username, &key).await.unwrap();
        key
    }

    /// A token for a user with every permission
    pub async fn full_access_token(&self) -> String {
        self.token_with("full-access", &Permission::ALL).await
    }

    pub async fn get(&self, url: &str, token: &str) -> reqwest::Response {
        self.client
            .get(url)
            .header("Authorization", format!("Token {token}"))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_json(&self, url: &str, token: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(url)
            .header("Authorization", format!("Token {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Stores `descriptor` through the API and asserts it was accepted
    pub async fn create_package(&self, token: &str, descriptor: &Value) -> Value {
        let resp: reqwest::Response = self.post_json(&self.url(PACKAGES_URL), token, descriptor).await;
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        resp.json().await.unwrap()
    }
}

/// A package descriptor covering the common question types
pub fn package_descriptor(id: Option<&str>) -> Value {
    json!({
        "data": {
            "type": "packages",
            "id": id,
            "attributes": {
                "profile": "flow-results-package",
                "name": "standard_test_survey",
                "flow-results-specification": "1.0.0-rc1",
                "created": "2015-11-26 02:59:24+00:00",
                "modified": "2017-12-04 17:09:34+00:00",
                "id": id,
                "title": "Standard Test Survey",
                "resources": [{
                    "path": null,
                    "mediatype": "application/json",
                    "encoding": "utf-8",
                    "schema": {
                        "language": "eng",
                        "fields": [],
                        "questions": {
                            "1448506769745_42": {
                                "type": "select_one",
                                "label": "Are you a woman or a man?",
                                "type_options": {"choices": ["Woman", "Man", "Other"]}
                            },
                            "1448506773018_89": {
                                "type": "numeric",
                                "label": "How old are you? Please enter your age in years.",
                                "type_options": {}
                            },
                            "1448506774930_29": {
                                "type": "text",
                                "label": "What is your favourite colour?",
                                "type_options": {}
                            }
                        }
                    }
                }]
            }
        }
    })
}

/// A response batch for `package_id`
pub fn responses_body(package_id: &str, rows: Value) -> Value {
    json!({
        "data": {
            "type": "responses",
            "id": package_id,
            "attributes": {
                "responses": rows
            }
        }
    })
}
