//! Report folds over the live ledger.

mod common;

use common::spawn_app;
use serde_json::Value;
use uuid::Uuid;

async fn get_json(app: &common::TestApp, path: &str) -> Value {
    app.client
        .get(app.url(path))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// Rent received by bank transfer, then maintenance paid: the standard
/// fixture for the statement tests.
async fn seed_rent_and_maintenance(app: &common::TestApp) -> (Uuid, Uuid, Uuid) {
    let bank = app.account_id("1020").await;
    let revenue = app.account_id("4000").await;
    let maintenance = app.account_id("5100").await;

    app.post_simple_entry("2026-03-01", bank, revenue, "2000.00")
        .await;
    app.post_simple_entry("2026-03-20", maintenance, bank, "450.00")
        .await;
    (bank, revenue, maintenance)
}

#[tokio::test]
async fn trial_balance_always_balances() {
    let app = spawn_app().await;
    seed_rent_and_maintenance(&app).await;

    let tb = get_json(&app, "/reports/trial-balance").await;
    assert_eq!(tb["total_debit"], tb["total_credit"]);
    assert_eq!(tb["total_debit"], "2450.00");

    let rows = tb["rows"].as_array().unwrap();
    let bank_row = rows.iter().find(|r| r["code"] == "1020").unwrap();
    assert_eq!(bank_row["debit"], "1550.00");
}

#[tokio::test]
async fn trial_balance_over_a_date_range_still_closes() {
    let app = spawn_app().await;
    seed_rent_and_maintenance(&app).await;

    // Only the March 20th maintenance entry falls in the window.
    let tb = get_json(
        &app,
        "/reports/trial-balance?from=2026-03-10&as_of=2026-12-31",
    )
    .await;
    assert_eq!(tb["total_debit"], tb["total_credit"]);
    assert_eq!(tb["total_debit"], "450.00");

    let rows = tb["rows"].as_array().unwrap();
    let maintenance_row = rows.iter().find(|r| r["code"] == "5100").unwrap();
    assert_eq!(maintenance_row["debit"], "450.00");
}

#[tokio::test]
async fn income_statement_reports_net_income() {
    let app = spawn_app().await;
    seed_rent_and_maintenance(&app).await;

    let is = get_json(
        &app,
        "/reports/income-statement?from=2026-01-01&to=2026-12-31",
    )
    .await;
    assert_eq!(is["total_revenue"], "2000.00");
    assert_eq!(is["total_expenses"], "450.00");
    assert_eq!(is["net_income"], "1550.00");
}

#[tokio::test]
async fn income_statement_respects_date_range() {
    let app = spawn_app().await;
    seed_rent_and_maintenance(&app).await;

    // Only the March 1st revenue entry falls in the first half of the month.
    let is = get_json(
        &app,
        "/reports/income-statement?from=2026-03-01&to=2026-03-15",
    )
    .await;
    assert_eq!(is["total_revenue"], "2000.00");
    assert_eq!(is["total_expenses"], "0");
}

#[tokio::test]
async fn balance_sheet_balances_with_net_income() {
    let app = spawn_app().await;
    seed_rent_and_maintenance(&app).await;

    let bs = get_json(&app, "/reports/balance-sheet?as_of=2026-12-31").await;
    assert_eq!(bs["total_assets"], "1550.00");
    assert_eq!(bs["net_income"], "1550.00");
    assert_eq!(bs["total_assets"], bs["total_liabilities_and_equity"]);
}

#[tokio::test]
async fn cash_flow_reconciles_cash_movement() {
    let app = spawn_app().await;
    seed_rent_and_maintenance(&app).await;

    let cf = get_json(&app, "/reports/cash-flow?from=2026-01-01&to=2026-12-31").await;
    assert_eq!(cf["opening_cash"], "0");
    assert_eq!(cf["closing_cash"], "1550.00");
    assert_eq!(cf["net_change"], "1550.00");
    assert_eq!(cf["operating"], "1550.00");
}

#[tokio::test]
async fn account_balance_reads_on_the_normal_side() {
    let app = spawn_app().await;
    let (bank, revenue, _) = seed_rent_and_maintenance(&app).await;

    let bank_balance = get_json(&app, &format!("/accounts/{bank}/balance")).await;
    assert_eq!(bank_balance["balance"], "1550.00");

    // Credit-normal: revenue reads positive too.
    let revenue_balance = get_json(&app, &format!("/accounts/{revenue}/balance")).await;
    assert_eq!(revenue_balance["balance"], "2000.00");
}

#[tokio::test]
async fn account_ledger_tracks_running_balance() {
    let app = spawn_app().await;
    let (bank, _, _) = seed_rent_and_maintenance(&app).await;

    let ledger = get_json(&app, &format!("/accounts/{bank}/ledger")).await;
    let rows = ledger["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["running_balance"], "2000.00");
    assert_eq!(rows[1]["running_balance"], "1550.00");
    assert_eq!(ledger["closing_balance"], "1550.00");
}

#[tokio::test]
async fn account_ledger_carries_opening_balance() {
    let app = spawn_app().await;
    let (bank, _, _) = seed_rent_and_maintenance(&app).await;

    let ledger = get_json(
        &app,
        &format!("/accounts/{bank}/ledger?from=2026-03-10&to=2026-12-31"),
    )
    .await;
    assert_eq!(ledger["opening_balance"], "2000.00");
    let rows = ledger["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(ledger["closing_balance"], "1550.00");
}

#[tokio::test]
async fn bank_dimension_ledger_filters_entries() {
    let app = spawn_app().await;
    let bank = app.account_id("1020").await;
    let revenue = app.account_id("4000").await;
    let bank_account_id = Uuid::new_v4();

    // One entry tagged with the bank dimension, one without.
    app.client
        .post(app.url("/journal-entries"))
        .json(&serde_json::json!({
            "date": "2026-05-01",
            "bank_account_id": bank_account_id,
            "lines": [
                { "account_id": bank, "debit": "300.00" },
                { "account_id": revenue, "credit": "300.00" }
            ]
        }))
        .send()
        .await
        .unwrap();
    app.post_simple_entry("2026-05-02", bank, revenue, "999.00")
        .await;

    let ledger = get_json(&app, &format!("/ledgers/bank/{bank_account_id}")).await;
    let rows = ledger["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(ledger["total_debit"], "300.00");
}

#[tokio::test]
async fn anomaly_scan_flags_negative_asset_balance() {
    let app = spawn_app().await;
    let bank = app.account_id("1020").await;
    let expense = app.account_id("5000").await;

    // Spend from an empty bank account: asset goes negative.
    app.post_simple_entry("2026-06-01", expense, bank, "800.00")
        .await;

    let anomalies: Vec<Value> = app
        .client
        .get(app.url("/anomalies"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0]["kind"], "negative_normal_balance");
    assert_eq!(anomalies[0]["code"], "1020");
}
