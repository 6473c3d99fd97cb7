//! Pluggable persistence port for the ledger engine.
//!
//! Business logic never assumes a storage medium: tests and the `memory`
//! backend use [`memory::MemoryStore`], production uses the transactional
//! [`postgres::PgStore`]. Every create operation allocates the record's
//! serial number and persists the record in one atomic step.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Account, AuditLogEntry, CreateAccount, CreateDocument, Document, FiscalPeriod, JournalEntry,
    NewJournalEntry,
};

/// Storage-level failures, mapped to domain errors by the services.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate code '{0}'")]
    DuplicateCode(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn backend(msg: impl std::fmt::Display) -> Self {
        Self::Backend(anyhow::anyhow!("{msg}"))
    }
}

/// Filter for listing journal entries. Dimension fields match the entry,
/// not its lines.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub contact_id: Option<Uuid>,
    pub bank_account_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    /// When true, superseded and cancelled entries are included (audit
    /// views); report folds leave this false.
    pub include_non_current: bool,
}

/// Filter for listing documents.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Only approved/paid documents lacking a journal entry.
    pub unposted_only: bool,
}

/// The persistence port. All five record classes are independently durable
/// and listable; no operation deletes financial facts.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // -- chart of accounts ---------------------------------------------------

    async fn create_account(&self, input: CreateAccount) -> Result<Account, StoreError>;
    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, StoreError>;
    async fn get_account_by_code(&self, code: &str) -> Result<Option<Account>, StoreError>;
    async fn list_accounts(&self, active_only: bool) -> Result<Vec<Account>, StoreError>;
    async fn deactivate_account(&self, account_id: Uuid) -> Result<Account, StoreError>;
    async fn count_accounts(&self) -> Result<u64, StoreError>;

    // -- journal entries -----------------------------------------------------

    /// Persist a validated entry, allocating its serial number atomically.
    async fn create_entry(&self, new: NewJournalEntry) -> Result<JournalEntry, StoreError>;
    async fn get_entry(&self, entry_id: Uuid) -> Result<Option<JournalEntry>, StoreError>;
    async fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<JournalEntry>, StoreError>;
    /// Tag an entry as superseded by its correction. The only mutation an
    /// entry ever sees.
    async fn mark_superseded(&self, entry_id: Uuid, replaced_by: Uuid) -> Result<(), StoreError>;

    // -- documents -----------------------------------------------------------

    async fn create_document(&self, new: CreateDocument) -> Result<Document, StoreError>;
    async fn get_document(&self, document_id: Uuid) -> Result<Option<Document>, StoreError>;
    async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>, StoreError>;
    /// Link a posted document to its journal entry (set exactly once).
    async fn link_document_entry(
        &self,
        document_id: Uuid,
        entry_id: Uuid,
    ) -> Result<(), StoreError>;

    // -- fiscal periods ------------------------------------------------------

    /// Insert `period` unless one already covers its start date; returns the
    /// covering period either way.
    async fn ensure_period(&self, period: FiscalPeriod) -> Result<FiscalPeriod, StoreError>;
    async fn get_period(&self, period_id: Uuid) -> Result<Option<FiscalPeriod>, StoreError>;
    async fn list_periods(&self) -> Result<Vec<FiscalPeriod>, StoreError>;
    async fn period_for_date(&self, date: NaiveDate) -> Result<Option<FiscalPeriod>, StoreError>;
    /// One-way lock; idempotent when already locked.
    async fn lock_period(
        &self,
        period_id: Uuid,
        closed_by: Option<Uuid>,
        closed_at: DateTime<Utc>,
    ) -> Result<FiscalPeriod, StoreError>;

    // -- audit log -----------------------------------------------------------

    async fn append_audit(&self, entry: AuditLogEntry) -> Result<(), StoreError>;
    /// Most recent first.
    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditLogEntry>, StoreError>;
}
