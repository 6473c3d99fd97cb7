//! Balance anomaly detection.
//!
//! Read-only heuristics over computed balances. Findings are advisory and
//! never block posting; the books stay exactly as entered.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::models::AccountType;
use crate::store::{EntryFilter, LedgerStore};

use super::error::LedgerError;
use super::reports::{account_balances, AccountBalance};

/// Expense balances above this multiple of the expense-account average are
/// flagged for review.
const EXPENSE_OUTLIER_FACTOR: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    NegativeNormalBalance,
    ExpenseOutlier,
}

/// One advisory finding on an account balance.
#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub account_id: Uuid,
    pub code: String,
    pub name_local: String,
    pub balance: Decimal,
    pub message: String,
}

/// Scan balances for suspicious values. Pure; callers supply the fold.
pub fn detect(balances: &[AccountBalance]) -> Vec<Anomaly> {
    let mut findings = Vec::new();

    for balance in balances {
        if balance.balance < Decimal::ZERO {
            let side = if balance.account_type.is_debit_normal() {
                "debit"
            } else {
                "credit"
            };
            findings.push(Anomaly {
                kind: AnomalyKind::NegativeNormalBalance,
                account_id: balance.account_id,
                code: balance.code.clone(),
                name_local: balance.name_local.clone(),
                balance: balance.balance,
                message: format!(
                    "{} account {} has a negative {side}-side balance of {}",
                    balance.account_type, balance.code, balance.balance
                ),
            });
        }
    }

    let expenses: Vec<&AccountBalance> = balances
        .iter()
        .filter(|b| b.account_type == AccountType::Expense && b.balance > Decimal::ZERO)
        .collect();
    if expenses.len() >= 2 {
        let total: Decimal = expenses.iter().map(|b| b.balance).sum();
        for expense in &expenses {
            // Average over the other expense accounts; including the
            // candidate would let a large balance raise its own threshold.
            let peer_average =
                (total - expense.balance) / Decimal::from((expenses.len() - 1) as i64);
            let threshold = peer_average * Decimal::from(EXPENSE_OUTLIER_FACTOR);
            if expense.balance > threshold {
                findings.push(Anomaly {
                    kind: AnomalyKind::ExpenseOutlier,
                    account_id: expense.account_id,
                    code: expense.code.clone(),
                    name_local: expense.name_local.clone(),
                    balance: expense.balance,
                    message: format!(
                        "expense account {} balance {} exceeds {}x the peer average {}",
                        expense.code, expense.balance, EXPENSE_OUTLIER_FACTOR, peer_average
                    ),
                });
            }
        }
    }

    findings
}

/// Runs detection over the live store.
#[derive(Clone)]
pub struct AnomalyDetector {
    store: Arc<dyn LedgerStore>,
}

impl AnomalyDetector {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn scan(&self) -> Result<Vec<Anomaly>, LedgerError> {
        let accounts = self.store.list_accounts(false).await?;
        let entries = self.store.list_entries(&EntryFilter::default()).await?;
        Ok(detect(&account_balances(&accounts, &entries)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance(code: &str, account_type: AccountType, amount: i64) -> AccountBalance {
        AccountBalance {
            account_id: Uuid::new_v4(),
            code: code.to_string(),
            name_local: format!("Account {code}"),
            account_type,
            total_debit: Decimal::ZERO,
            total_credit: Decimal::ZERO,
            balance: Decimal::from(amount),
        }
    }

    #[test]
    fn negative_asset_balance_is_flagged() {
        let balances = vec![
            balance("1020", AccountType::Asset, -250),
            balance("4000", AccountType::Revenue, 250),
        ];
        let findings = detect(&balances);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, AnomalyKind::NegativeNormalBalance);
        assert_eq!(findings[0].code, "1020");
    }

    #[test]
    fn expense_outlier_is_flagged() {
        let balances = vec![
            balance("5000", AccountType::Expense, 100),
            balance("5100", AccountType::Expense, 120),
            balance("5200", AccountType::Expense, 5000),
        ];
        let findings = detect(&balances);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, AnomalyKind::ExpenseOutlier);
        assert_eq!(findings[0].code, "5200");
    }

    #[test]
    fn outlier_threshold_comes_from_peers_only() {
        // One dominant balance must not lift the threshold above itself.
        let balances = vec![
            balance("5000", AccountType::Expense, 100),
            balance("5100", AccountType::Expense, 120),
            balance("5200", AccountType::Expense, 5000),
        ];
        let findings = detect(&balances);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, "5200");

        // Even spending across accounts stays unflagged.
        let even = vec![
            balance("5000", AccountType::Expense, 400),
            balance("5100", AccountType::Expense, 400),
            balance("5200", AccountType::Expense, 400),
        ];
        assert!(detect(&even).is_empty());
    }

    #[test]
    fn healthy_books_produce_no_findings() {
        let balances = vec![
            balance("1020", AccountType::Asset, 700),
            balance("4000", AccountType::Revenue, 1000),
            balance("5100", AccountType::Expense, 300),
        ];
        assert!(detect(&balances).is_empty());
    }
}
