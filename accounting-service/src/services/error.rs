//! Domain error taxonomy.
//!
//! Validation errors carry enough detail for the calling UI to highlight the
//! offending input; they are surfaced synchronously and never retried.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unbalanced entry: total debit {debit} != total credit {credit}")]
    UnbalancedEntry { debit: Decimal, credit: Decimal },

    #[error("fiscal period {code} is locked; cannot post on {date}")]
    PeriodLocked { code: String, date: NaiveDate },

    #[error("account code '{0}' already exists")]
    DuplicateCode(String),

    #[error("journal entry must have at least two lines")]
    TooFewLines,

    #[error("line {index}: exactly one of debit or credit must be positive")]
    InvalidLine { index: usize },

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("account {0} does not exist or is inactive")]
    UnknownAccount(Uuid),

    #[error("entry {0} is already superseded")]
    AlreadySuperseded(Uuid),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateCode(code) => Self::DuplicateCode(code),
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Store(other),
        }
    }
}

impl LedgerError {
    /// Machine-readable error kind for API consumers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnbalancedEntry { .. } => "unbalanced_entry",
            Self::PeriodLocked { .. } => "period_locked",
            Self::DuplicateCode(_) => "duplicate_code",
            Self::TooFewLines => "too_few_lines",
            Self::InvalidLine { .. } => "invalid_line",
            Self::InvalidDocument(_) => "invalid_document",
            Self::UnknownAccount(_) => "unknown_account",
            Self::AlreadySuperseded(_) => "already_superseded",
            Self::NotFound { .. } => "not_found",
            Self::Store(_) => "storage",
        }
    }
}
