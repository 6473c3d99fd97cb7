//! Chart-of-accounts model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account types following standard accounting categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    /// Get string representation for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Liability => "liability",
            Self::Equity => "equity",
            Self::Revenue => "revenue",
            Self::Expense => "expense",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "asset" => Some(Self::Asset),
            "liability" => Some(Self::Liability),
            "equity" => Some(Self::Equity),
            "revenue" => Some(Self::Revenue),
            "expense" => Some(Self::Expense),
            _ => None,
        }
    }

    /// Whether the account's normal balance is on the debit side.
    ///
    /// Asset/Expense increase with debits; Liability/Equity/Revenue increase
    /// with credits. Report presentation flips the raw (debit - credit) sum
    /// for credit-normal accounts so a healthy balance reads positive.
    pub fn is_debit_normal(&self) -> bool {
        matches!(self, Self::Asset | Self::Expense)
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ledger account. The `account_type` is immutable after creation and
/// accounts are never deleted, only deactivated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_id: Uuid,
    pub code: String,
    pub name_local: String,
    pub name_alt: Option<String>,
    pub account_type: AccountType,
    pub parent_id: Option<Uuid>,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccount {
    pub code: String,
    pub name_local: String,
    pub name_alt: Option<String>,
    pub account_type: AccountType,
    pub parent_id: Option<Uuid>,
    pub sort_order: i32,
}
