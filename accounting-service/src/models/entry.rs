//! Journal entry model for double-entry accounting.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::DocumentType;

/// Tolerance for debit/credit equality, absorbing rounding on split lines.
pub fn balance_epsilon() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

/// Lifecycle status carried on an entry (business meaning only; folds treat
/// everything except `Cancelled` as effective).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Draft,
    Pending,
    Approved,
    Paid,
    Cancelled,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "approved" => Self::Approved,
            "paid" => Self::Paid,
            "cancelled" => Self::Cancelled,
            _ => Self::Draft,
        }
    }
}

/// Correction state. An entry is never edited in place: a correction posts a
/// replacement entry and tags the original `Superseded`, which excludes it
/// from every balance/report fold while keeping it visible for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum EntryState {
    Active,
    Superseded { replaced_by: Uuid },
}

/// One side of a journal entry. Exactly one of `debit`/`credit` is positive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalLine {
    pub account_id: Uuid,
    pub debit: Decimal,
    pub credit: Decimal,
    pub description_local: Option<String>,
    pub description_alt: Option<String>,
}

impl JournalLine {
    /// Signed amount (positive for debit, negative for credit).
    pub fn signed_amount(&self) -> Decimal {
        self.debit - self.credit
    }
}

/// Dimension and description metadata attached to an entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryMeta {
    pub description_local: Option<String>,
    pub description_alt: Option<String>,
    pub document_type: Option<DocumentType>,
    pub document_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub bank_account_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub status: Option<EntryStatus>,
}

/// One balanced, dated, multi-line financial fact. Created once, never
/// mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub entry_id: Uuid,
    pub serial_number: String,
    pub version: i32,
    pub date: NaiveDate,
    pub lines: Vec<JournalLine>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub description_local: Option<String>,
    pub description_alt: Option<String>,
    pub document_type: Option<DocumentType>,
    pub document_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub bank_account_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub status: EntryStatus,
    #[serde(flatten)]
    pub state: EntryState,
    pub created_utc: DateTime<Utc>,
}

impl JournalEntry {
    /// Whether this entry participates in balance and report folds.
    pub fn is_current(&self) -> bool {
        matches!(self.state, EntryState::Active) && self.status != EntryStatus::Cancelled
    }
}

/// Validated input for posting an entry. Totals are computed by the poster;
/// the store assigns id, serial number and creation timestamp atomically.
#[derive(Debug, Clone)]
pub struct NewJournalEntry {
    pub date: NaiveDate,
    pub lines: Vec<JournalLine>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub version: i32,
    pub meta: EntryMeta,
}

impl NewJournalEntry {
    /// Materialize the persisted entry once the store has allocated its
    /// identity and serial number.
    pub fn into_entry(
        self,
        entry_id: Uuid,
        serial_number: String,
        created_utc: DateTime<Utc>,
    ) -> JournalEntry {
        JournalEntry {
            entry_id,
            serial_number,
            version: self.version,
            date: self.date,
            lines: self.lines,
            total_debit: self.total_debit,
            total_credit: self.total_credit,
            description_local: self.meta.description_local,
            description_alt: self.meta.description_alt,
            document_type: self.meta.document_type,
            document_id: self.meta.document_id,
            contact_id: self.meta.contact_id,
            bank_account_id: self.meta.bank_account_id,
            property_id: self.meta.property_id,
            project_id: self.meta.project_id,
            status: self.meta.status.unwrap_or(EntryStatus::Approved),
            state: EntryState::Active,
            created_utc,
        }
    }
}
