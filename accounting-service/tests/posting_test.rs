//! Journal posting: balance validation, serials, and corrections.

mod common;

use common::spawn_app;
use serde_json::{json, Value};
use uuid::Uuid;

#[tokio::test]
async fn health_check_works() {
    let app = spawn_app().await;
    let response = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "accounting-service");
}

#[tokio::test]
async fn bootstrap_seeds_standard_chart() {
    let app = spawn_app().await;
    let accounts: Vec<Value> = app
        .client
        .get(app.url("/accounts"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(accounts.len(), 14);
    for code in ["1000", "1020", "1200", "2300", "4000", "5000"] {
        assert!(
            accounts.iter().any(|a| a["code"] == code),
            "missing seeded account {code}"
        );
    }
}

#[tokio::test]
async fn balanced_entry_is_posted_with_serial() {
    let app = spawn_app().await;
    let bank = app.account_id("1020").await;
    let revenue = app.account_id("4000").await;

    let response = app
        .post_simple_entry("2026-03-15", bank, revenue, "1500.00")
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let entry: Value = response.json().await.unwrap();
    assert!(entry["serial_number"]
        .as_str()
        .unwrap()
        .starts_with("JRN-2026-"));
    assert_eq!(entry["total_debit"], "1500.00");
    assert_eq!(entry["total_credit"], "1500.00");
    assert_eq!(entry["state"], "active");
    assert_eq!(entry["version"], 1);
}

#[tokio::test]
async fn serial_numbers_are_sequential() {
    let app = spawn_app().await;
    let bank = app.account_id("1020").await;
    let revenue = app.account_id("4000").await;

    let first: Value = app
        .post_simple_entry("2026-01-10", bank, revenue, "100.00")
        .await
        .json()
        .await
        .unwrap();
    let second: Value = app
        .post_simple_entry("2026-01-11", bank, revenue, "200.00")
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(first["serial_number"], "JRN-2026-0001");
    assert_eq!(second["serial_number"], "JRN-2026-0002");
}

#[tokio::test]
async fn unbalanced_entry_is_rejected() {
    let app = spawn_app().await;
    let bank = app.account_id("1020").await;
    let revenue = app.account_id("4000").await;

    let response = app
        .client
        .post(app.url("/journal-entries"))
        .json(&json!({
            "date": "2026-03-15",
            "lines": [
                { "account_id": bank, "debit": "100.00" },
                { "account_id": revenue, "credit": "90.00" }
            ]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "unbalanced_entry");
}

#[tokio::test]
async fn single_line_entry_fails_validation() {
    let app = spawn_app().await;
    let bank = app.account_id("1020").await;

    let response = app
        .client
        .post(app.url("/journal-entries"))
        .json(&json!({
            "date": "2026-03-15",
            "lines": [{ "account_id": bank, "debit": "100.00" }]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 422);
}

#[tokio::test]
async fn unknown_account_is_rejected() {
    let app = spawn_app().await;
    let bank = app.account_id("1020").await;

    let response = app
        .post_simple_entry("2026-03-15", bank, Uuid::new_v4(), "100.00")
        .await;
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "unknown_account");
}

#[tokio::test]
async fn correction_supersedes_original() {
    let app = spawn_app().await;
    let bank = app.account_id("1020").await;
    let revenue = app.account_id("4000").await;

    let original: Value = app
        .post_simple_entry("2026-03-15", bank, revenue, "1000.00")
        .await
        .json()
        .await
        .unwrap();
    let original_id = original["entry_id"].as_str().unwrap();

    let response = app
        .client
        .post(app.url(&format!("/journal-entries/{original_id}/correct")))
        .json(&json!({
            "date": "2026-03-15",
            "lines": [
                { "account_id": bank, "debit": "1100.00" },
                { "account_id": revenue, "credit": "1100.00" }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let replacement: Value = response.json().await.unwrap();
    assert_eq!(replacement["version"], 2);

    // Original is tagged, not deleted.
    let fetched: Value = app
        .client
        .get(app.url(&format!("/journal-entries/{original_id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["state"], "superseded");
    assert_eq!(fetched["replaced_by"], replacement["entry_id"]);

    // Only the replacement contributes to the trial balance.
    let tb: Value = app
        .client
        .get(app.url("/reports/trial-balance"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tb["total_debit"], "1100.00");
}

#[tokio::test]
async fn correcting_twice_conflicts() {
    let app = spawn_app().await;
    let bank = app.account_id("1020").await;
    let revenue = app.account_id("4000").await;

    let original: Value = app
        .post_simple_entry("2026-03-15", bank, revenue, "500.00")
        .await
        .json()
        .await
        .unwrap();
    let original_id = original["entry_id"].as_str().unwrap();

    let correction = json!({
        "date": "2026-03-15",
        "lines": [
            { "account_id": bank, "debit": "550.00" },
            { "account_id": revenue, "credit": "550.00" }
        ]
    });

    let first = app
        .client
        .post(app.url(&format!("/journal-entries/{original_id}/correct")))
        .json(&correction)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status().as_u16(), 201);

    let second = app
        .client
        .post(app.url(&format!("/journal-entries/{original_id}/correct")))
        .json(&correction)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status().as_u16(), 409);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["kind"], "already_superseded");
}
