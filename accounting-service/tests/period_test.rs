//! Fiscal period coverage and locking.

mod common;

use common::spawn_app;
use serde_json::{json, Value};

async fn period_id_for(app: &common::TestApp, code: &str) -> String {
    let periods: Vec<Value> = app
        .client
        .get(app.url("/periods"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    periods
        .iter()
        .find(|p| p["code"] == code)
        .unwrap_or_else(|| panic!("period {code} not found"))["period_id"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn posting_creates_covering_period() {
    let app = spawn_app().await;
    let bank = app.account_id("1020").await;
    let revenue = app.account_id("4000").await;

    let response = app
        .post_simple_entry("2025-06-01", bank, revenue, "100.00")
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let periods: Vec<Value> = app
        .client
        .get(app.url("/periods"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let fy2025 = periods.iter().find(|p| p["code"] == "FY2025").unwrap();
    assert_eq!(fy2025["start_date"], "2025-01-01");
    assert_eq!(fy2025["end_date"], "2025-12-31");
    assert_eq!(fy2025["is_locked"], false);
}

#[tokio::test]
async fn locked_period_rejects_posting() {
    let app = spawn_app().await;
    let bank = app.account_id("1020").await;
    let revenue = app.account_id("4000").await;

    app.post_simple_entry("2025-06-01", bank, revenue, "100.00")
        .await;
    let period_id = period_id_for(&app, "FY2025").await;

    let lock = app
        .client
        .post(app.url(&format!("/periods/{period_id}/lock")))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(lock.status().as_u16(), 200);

    let response = app
        .post_simple_entry("2025-09-01", bank, revenue, "50.00")
        .await;
    assert_eq!(response.status().as_u16(), 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "period_locked");
}

#[tokio::test]
async fn lock_is_idempotent() {
    let app = spawn_app().await;
    let bank = app.account_id("1020").await;
    let revenue = app.account_id("4000").await;

    app.post_simple_entry("2025-06-01", bank, revenue, "100.00")
        .await;
    let period_id = period_id_for(&app, "FY2025").await;

    for _ in 0..2 {
        let response = app
            .client
            .post(app.url(&format!("/periods/{period_id}/lock")))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["is_locked"], true);
    }
}

#[tokio::test]
async fn locked_period_rejects_corrections() {
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

    let period_id = period_id_for(&app, "FY2025").await;
    app.client
        .post(app.url(&format!("/periods/{period_id}/lock")))
        .json(&json!({}))
        .send()
        .await
        .unwrap();

    // A correction would change the locked period's reports.
    let response = app
        .client
        .post(app.url(&format!("/journal-entries/{original_id}/correct")))
        .json(&json!({
            "date": "2026-01-15",
            "lines": [
                { "account_id": bank, "debit": "120.00" },
                { "account_id": revenue, "credit": "120.00" }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "period_locked");
}

#[tokio::test]
async fn posting_in_open_year_still_works_after_lock() {
    let app = spawn_app().await;
    let bank = app.account_id("1020").await;
    let revenue = app.account_id("4000").await;

    app.post_simple_entry("2025-06-01", bank, revenue, "100.00")
        .await;
    let period_id = period_id_for(&app, "FY2025").await;
    app.client
        .post(app.url(&format!("/periods/{period_id}/lock")))
        .json(&json!({}))
        .send()
        .await
        .unwrap();

    let response = app
        .post_simple_entry("2026-02-01", bank, revenue, "75.00")
        .await;
    assert_eq!(response.status().as_u16(), 201);
}
