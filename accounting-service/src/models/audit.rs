//! Append-only audit log model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State-changing actions recorded for accountability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Correct,
    Lock,
    Deactivate,
    Bootstrap,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Correct => "correct",
            Self::Lock => "lock",
            Self::Deactivate => "deactivate",
            Self::Bootstrap => "bootstrap",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "correct" => Self::Correct,
            "lock" => Self::Lock,
            "deactivate" => Self::Deactivate,
            "bootstrap" => Self::Bootstrap,
            _ => Self::Create,
        }
    }
}

/// Entity classes the audit log references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Account,
    JournalEntry,
    Document,
    FiscalPeriod,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::JournalEntry => "journal_entry",
            Self::Document => "document",
            Self::FiscalPeriod => "fiscal_period",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "journal_entry" => Self::JournalEntry,
            "document" => Self::Document,
            "fiscal_period" => Self::FiscalPeriod,
            _ => Self::Account,
        }
    }
}

/// One immutable audit row. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub audit_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub entity_type: EntityKind,
    pub entity_id: Uuid,
    pub user_id: Option<Uuid>,
    pub reason: Option<String>,
    pub previous_state: Option<serde_json::Value>,
    pub new_state: Option<serde_json::Value>,
}
