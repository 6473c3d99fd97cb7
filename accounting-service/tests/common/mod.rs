//! Shared test harness: spawns the service on an ephemeral port with the
//! in-memory storage backend.

use accounting_service::config::AccountingConfig;
use accounting_service::startup::Application;
use serde_json::{json, Value};
use uuid::Uuid;

pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
}

pub async fn spawn_app() -> TestApp {
    let config = AccountingConfig::in_memory();
    let app = Application::build(config)
        .await
        .expect("Failed to build application");
    let port = app.port();
    tokio::spawn(app.run_until_stopped());

    TestApp {
        base_url: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Look up a seeded account's id by its chart code.
    pub async fn account_id(&self, code: &str) -> Uuid {
        let accounts: Vec<Value> = self
            .client
            .get(self.url("/accounts"))
            .send()
            .await
            .expect("Failed to list accounts")
            .json()
            .await
            .expect("Failed to parse accounts");
        let account = accounts
            .iter()
            .find(|a| a["code"] == code)
            .unwrap_or_else(|| panic!("account {code} not seeded"));
        account["account_id"]
            .as_str()
            .unwrap()
            .parse()
            .expect("invalid account id")
    }

    /// Post a two-line entry moving `amount` from credit to debit account.
    pub async fn post_simple_entry(
        &self,
        date: &str,
        debit_account: Uuid,
        credit_account: Uuid,
        amount: &str,
    ) -> reqwest::Response {
        self.client
            .post(self.url("/journal-entries"))
            .json(&json!({
                "date": date,
                "lines": [
                    { "account_id": debit_account, "debit": amount },
                    { "account_id": credit_account, "credit": amount }
                ]
            }))
            .send()
            .await
            .expect("Failed to post entry")
    }
}
