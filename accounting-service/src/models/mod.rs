//! Domain models for the ledger engine.

pub mod account;
pub mod audit;
pub mod document;
pub mod entry;
pub mod period;
pub mod serial;

pub use account::{Account, AccountType, CreateAccount};
pub use audit::{AuditAction, AuditLogEntry, EntityKind};
pub use document::{
    CreateDocument, Document, DocumentItem, DocumentStatus, DocumentType, PaymentMethod,
};
pub use entry::{
    balance_epsilon, EntryMeta, EntryState, EntryStatus, JournalEntry, JournalLine,
    NewJournalEntry,
};
pub use period::FiscalPeriod;
pub use serial::format_serial;
