//! Audit trail coverage of every mutating operation.

mod common;

use common::spawn_app;
use serde_json::{json, Value};

async fn audit_log(app: &common::TestApp) -> Vec<Value> {
    app.client
        .get(app.url("/audit-log"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

fn has_action(log: &[Value], action: &str, entity_type: &str) -> bool {
    log.iter()
        .any(|e| e["action"] == action && e["entity_type"] == entity_type)
}

#[tokio::test]
async fn bootstrap_is_audited() {
    let app = spawn_app().await;
    let log = audit_log(&app).await;
    assert!(has_action(&log, "bootstrap", "account"));
}

#[tokio::test]
async fn postings_and_locks_are_audited() {
    let app = spawn_app().await;
    let bank = app.account_id("1020").await;
    let revenue = app.account_id("4000").await;

    let original: Value = app
        .post_simple_entry("2025-06-01", bank, revenue, "100.00")
        .await
        .json()
        .await
        .unwrap();
    let original_id = original["entry_id"].as_str().unwrap();

    app.client
        .post(app.url(&format!("/journal-entries/{original_id}/correct")))
        .json(&json!({
            "date": "2025-06-01",
            "lines": [
                { "account_id": bank, "debit": "110.00" },
                { "account_id": revenue, "credit": "110.00" }
            ]
        }))
        .send()
        .await
        .unwrap();

    let periods: Vec<Value> = app
        .client
        .get(app.url("/periods"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let period_id = periods
        .iter()
        .find(|p| p["code"] == "FY2025")
        .unwrap()["period_id"]
        .as_str()
        .unwrap()
        .to_string();
    app.client
        .post(app.url(&format!("/periods/{period_id}/lock")))
        .json(&json!({}))
        .send()
        .await
        .unwrap();

    let log = audit_log(&app).await;
    assert!(has_action(&log, "create", "journal_entry"));
    assert!(has_action(&log, "correct", "journal_entry"));
    assert!(has_action(&log, "lock", "fiscal_period"));

    // Correction rows capture both serial numbers.
    let correction = log
        .iter()
        .find(|e| e["action"] == "correct")
        .expect("correction not audited");
    assert!(correction["previous_state"]["serial_number"]
        .as_str()
        .unwrap()
        .starts_with("JRN-"));
    assert!(correction["new_state"]["replaced_by"].is_string());
}

#[tokio::test]
async fn account_lifecycle_is_audited() {
    let app = spawn_app().await;

    let created: Value = app
        .client
        .post(app.url("/accounts"))
        .json(&json!({
            "code": "5300",
            "name_local": "Insurance Expense",
            "account_type": "expense"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let account_id = created["account_id"].as_str().unwrap();

    let response = app
        .client
        .post(app.url(&format!("/accounts/{account_id}/deactivate")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let log = audit_log(&app).await;
    assert!(has_action(&log, "deactivate", "account"));
}

#[tokio::test]
async fn duplicate_account_code_conflicts() {
    let app = spawn_app().await;

    // 1020 is part of the seeded chart.
    let response = app
        .client
        .post(app.url("/accounts"))
        .json(&json!({
            "code": "1020",
            "name_local": "Second Bank",
            "account_type": "asset"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "duplicate_code");
}

#[tokio::test]
async fn deactivated_account_rejects_new_postings() {
    let app = spawn_app().await;
    let revenue = app.account_id("4000").await;

    let created: Value = app
        .client
        .post(app.url("/accounts"))
        .json(&json!({
            "code": "1030",
            "name_local": "Old Bank",
            "account_type": "asset"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let account_id: uuid::Uuid = created["account_id"].as_str().unwrap().parse().unwrap();

    app.client
        .post(app.url(&format!("/accounts/{account_id}/deactivate")))
        .send()
        .await
        .unwrap();

    let response = app
        .post_simple_entry("2026-07-01", account_id, revenue, "10.00")
        .await;
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "unknown_account");
}
