//! Business logic for the accounting ledger.

pub mod anomaly;
pub mod documents;
pub mod error;
pub mod events;
pub mod ledger;
pub mod metrics;
pub mod reports;

pub use anomaly::{detect, Anomaly, AnomalyDetector, AnomalyKind};
pub use documents::{posting_rule, DocumentBridge, PostingRule};
pub use error::LedgerError;
pub use events::{ChangeNotifier, EntityClass};
pub use ledger::{validate_lines, Ledger};
pub use metrics::{get_metrics, init_metrics};
pub use reports::{
    account_balances, AccountBalance, AccountLedger, BalanceSheet, CashFlowStatement,
    DimensionLedger, IncomeStatement, ReportEngine, TrialBalance,
};
