//! Back-office endpoints against a running admin server.
//!
//! These tests require:
//! - A migrated `PostgreSQL` database (pz-cli migrate)
//! - The admin server running (cargo run -p pizzaria-admin)
//! - An operator account in `ADMIN_TEST_EMAIL` / `ADMIN_TEST_PASSWORD`
//!
//! Run with: cargo test -p pizzaria-integration-tests -- --ignored

#![allow(clippy::unwrap_used, clippy::expect_used)]

use reqwest::{Client, StatusCode, redirect::Policy};
use serde_json::{Value, json};

/// Base URL for the admin server (configurable via environment).
fn admin_base_url() -> String {
    std::env::var("ADMIN_BASE_URL").unwrap_or_else(|_| "http://localhost:3001".to_string())
}

fn client() -> Client {
    Client::builder()
        .cookie_store(true)
        .redirect(Policy::none())
        .build()
        .expect("Failed to create HTTP client")
}

/// Log in and keep the session cookie in the client.
async fn authenticated_client() -> Client {
    let client = client();
    let email = std::env::var("ADMIN_TEST_EMAIL").expect("ADMIN_TEST_EMAIL not set");
    let password = std::env::var("ADMIN_TEST_PASSWORD").expect("ADMIN_TEST_PASSWORD not set");

    let resp = client
        .post(format!("{}/auth/login", admin_base_url()))
        .form(&[("email", email.as_str()), ("password", password.as_str())])
        .send()
        .await
        .expect("Failed to log in");
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()["location"], "/");
    client
}

#[tokio::test]
#[ignore = "Requires running admin server"]
async fn test_health() {
    let resp = client()
        .get(format!("{}/health", admin_base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
#[ignore = "Requires running admin server"]
async fn test_api_requires_a_session() {
    let resp = client()
        .get(format!("{}/api/board", admin_base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running admin server and operator credentials"]
async fn test_board_has_one_column_per_status() {
    let client = authenticated_client().await;
    let board: Value = client
        .get(format!("{}/api/board", admin_base_url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let statuses: Vec<&str> = board["columns"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["status"].as_str().unwrap())
        .collect();
    assert_eq!(
        statuses,
        ["pendente", "preparando", "saiu_entrega", "finalizado", "cancelado"]
    );
}

#[tokio::test]
#[ignore = "Requires running admin server and operator credentials"]
async fn test_move_of_unknown_order_is_not_found() {
    let client = authenticated_client().await;
    let resp = client
        .post(format!("{}/api/orders/999999999/move", admin_base_url()))
        .json(&json!({"from": "pendente", "to": "preparando"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
#[ignore = "Requires running admin server and operator credentials"]
async fn test_reversed_report_period_is_rejected() {
    let client = authenticated_client().await;
    let resp = client
        .get(format!(
            "{}/api/reports/sales?from=2024-05-11&to=2024-05-10",
            admin_base_url()
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
