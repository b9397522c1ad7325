//! tests/responses/create.rs
//! Submitting response batches: all rows are stored or none are.

#[path = "../mod.rs"]
mod common;

use reqwest::StatusCode;
use serde_json::{json, Value};

fn valid_rows() -> Value {
    json!([
        ["2017-05-23T13:35:37.356-04:00", 20394823948i64, 923842093, 10499221, "1448506769745_42", "Woman", {}],
        ["2017-05-23T13:35:47.012-04:00", 20394823950i64, 923842093, 10499221, "1448506773018_89", 32, {}],
        ["2017-05-23T13:36:02.113-04:00", "row-3", "contact-a", "session-b", "1448506774930_29", "blue", {"language": "eng"}]
    ])
}

#[tokio::test]
async fn stores_a_valid_batch() {
    let app = common::spawn_app().await;
    let token: String = app.full_access_token().await;
    app.create_package(&token, &common::package_descriptor(Some(common::PACKAGE_ID))).await;

    let body: Value = common::responses_body(common::PACKAGE_ID, valid_rows());
    let resp: reqwest::Response = app.post_json(&app.responses_url(common::PACKAGE_ID), &token, &body).await;

    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({"data": {"type": "responses", "id": common::PACKAGE_ID, "attributes": {"created": 3}}})
    );
}

#[tokio::test]
async fn invalid_rows_store_nothing() {
    let app = common::spawn_app().await;
    let token: String = app.full_access_token().await;
    app.create_package(&token, &common::package_descriptor(Some(common::PACKAGE_ID))).await;

    let rows: Value = json!([
        ["2017-05-23T13:35:37.356-04:00", 1, 2, 3, "1448506769745_42", "Woman", {}],
        ["2017-05-23T13:35:37.356-04:00", 2, 2, 3, "1448506773018_89", "thirty", {}],
        ["2017-05-23T13:35:37.356-04:00", 3, 2, 3, "unknown", 1, {}]
    ]);
    let resp: reqwest::Response = app
        .post_json(&app.responses_url(common::PACKAGE_ID), &token, &common::responses_body(common::PACKAGE_ID, rows))
        .await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({"data": {"attributes": {"responses": {
            "1": {"response": ["must be float or integer"]},
            "2": {"question_id": ["\"unknown\" is not a question in this package."]}
        }}}})
    );

    let listed: Value = app.get(&app.responses_url(common::PACKAGE_ID), &token).await.json().await.unwrap();
    assert_eq!(listed["data"]["attributes"]["responses"], json!([]));
}

#[tokio::test]
async fn row_ids_are_unique_per_question() {
    let app = common::spawn_app().await;
    let token: String = app.full_access_token().await;
    app.create_package(&token, &common::package_descriptor(Some(common::PACKAGE_ID))).await;
    let url: String = app.responses_url(common::PACKAGE_ID);

    let first: Value = json!([["2017-05-23T13:35:37Z", 1, 2, 3, "1448506769745_42", "Woman", {}]]);
    let resp: reqwest::Response = app.post_json(&url, &token, &common::responses_body(common::PACKAGE_ID, first)).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // row 1 repeats a stored row id, row 2 repeats one within the batch
    let second: Value = json!([
        ["2017-05-23T13:35:38Z", 9, 2, 3, "1448506773018_89", 40, {}],
        ["2017-05-23T13:35:38Z", 1, 2, 3, "1448506769745_42", "Man", {}],
        ["2017-05-23T13:35:38Z", 9, 2, 3, "1448506773018_89", 41, {}]
    ]);
    let resp: reqwest::Response = app.post_json(&url, &token, &common::responses_body(common::PACKAGE_ID, second)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({"data": {"attributes": {"responses": {
            "1": {"row_id": ["Flow response with this Question and Row id already exists."]},
            "2": {"row_id": ["Flow response with this Question and Row id already exists."]}
        }}}})
    );
}

#[tokio::test]
async fn integer_and_string_row_ids_are_different_rows() {
    let app = common::spawn_app().await;
    let token: String = app.full_access_token().await;
    app.create_package(&token, &common::package_descriptor(Some(common::PACKAGE_ID))).await;

    let rows: Value = json!([
        ["2017-05-23T13:35:37Z", 1, 2, 3, "1448506769745_42", "Woman", {}],
        ["2017-05-23T13:35:38Z", "1", 2, 3, "1448506769745_42", "Man", {}]
    ]);
    let resp: reqwest::Response = app
        .post_json(&app.responses_url(common::PACKAGE_ID), &token, &common::responses_body(common::PACKAGE_ID, rows))
        .await;

    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(resp.json::<Value>().await.unwrap()["data"]["attributes"]["created"], 2);
}

#[tokio::test]
async fn body_id_must_match_the_url() {
    let app = common::spawn_app().await;
    let token: String = app.full_access_token().await;
    app.create_package(&token, &common::package_descriptor(Some(common::PACKAGE_ID))).await;

    let body: Value = common::responses_body("00000000-0000-0000-0000-000000000000", valid_rows());
    let resp: reqwest::Response = app.post_json(&app.responses_url(common::PACKAGE_ID), &token, &body).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({"data": {"id": ["Must match the package id in the URL."]}})
    );
}

#[tokio::test]
async fn unknown_packages_are_not_found() {
    let app = common::spawn_app().await;
    let token: String = app.full_access_token().await;

    let body: Value = common::responses_body(common::PACKAGE_ID, valid_rows());
    let resp: reqwest::Response = app.post_json(&app.responses_url(common::PACKAGE_ID), &token, &body).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
