//! In-memory store backend.
//!
//! A single `RwLock` over the whole state makes every write its own critical
//! section, which is what gives serial allocation + record creation their
//! atomicity here. Used by tests and the `memory` storage backend.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::instrument;
use uuid::Uuid;

use crate::models::{
    format_serial, serial::JOURNAL_ENTRY_PREFIX, Account, AuditLogEntry, CreateAccount,
    CreateDocument, Document, EntryState, FiscalPeriod, JournalEntry, NewJournalEntry,
};

use super::{DocumentFilter, EntryFilter, LedgerStore, StoreError};

#[derive(Default)]
struct MemoryState {
    accounts: Vec<Account>,
    entries: Vec<JournalEntry>,
    documents: Vec<Document>,
    periods: Vec<FiscalPeriod>,
    audit: Vec<AuditLogEntry>,
}

/// Non-durable [`LedgerStore`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Sequence value is count(existing serials of this prefix+year) + 1.
fn next_serial(existing: impl Iterator<Item = String>, prefix: &str, year: i32) -> String {
    let marker = format!("{prefix}-{year}-");
    let count = existing.filter(|s| s.starts_with(&marker)).count() as u32;
    format_serial(prefix, year, count + 1)
}

fn matches_entry(entry: &JournalEntry, filter: &EntryFilter) -> bool {
    if !filter.include_non_current && !entry.is_current() {
        return false;
    }
    if let Some(from) = filter.from {
        if entry.date < from {
            return false;
        }
    }
    if let Some(to) = filter.to {
        if entry.date > to {
            return false;
        }
    }
    if filter.contact_id.is_some() && entry.contact_id != filter.contact_id {
        return false;
    }
    if filter.bank_account_id.is_some() && entry.bank_account_id != filter.bank_account_id {
        return false;
    }
    if filter.property_id.is_some() && entry.property_id != filter.property_id {
        return false;
    }
    if filter.project_id.is_some() && entry.project_id != filter.project_id {
        return false;
    }
    true
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn create_account(&self, input: CreateAccount) -> Result<Account, StoreError> {
        let mut state = self.state.write().await;
        if state.accounts.iter().any(|a| a.code == input.code) {
            return Err(StoreError::DuplicateCode(input.code));
        }
        let account = Account {
            account_id: Uuid::new_v4(),
            code: input.code,
            name_local: input.name_local,
            name_alt: input.name_alt,
            account_type: input.account_type,
            parent_id: input.parent_id,
            is_active: true,
            sort_order: input.sort_order,
            created_utc: Utc::now(),
        };
        state.accounts.push(account.clone());
        Ok(account)
    }

    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .accounts
            .iter()
            .find(|a| a.account_id == account_id)
            .cloned())
    }

    async fn get_account_by_code(&self, code: &str) -> Result<Option<Account>, StoreError> {
        let state = self.state.read().await;
        Ok(state.accounts.iter().find(|a| a.code == code).cloned())
    }

    async fn list_accounts(&self, active_only: bool) -> Result<Vec<Account>, StoreError> {
        let state = self.state.read().await;
        let mut accounts: Vec<Account> = state
            .accounts
            .iter()
            .filter(|a| !active_only || a.is_active)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.code.cmp(&b.code)));
        Ok(accounts)
    }

    async fn deactivate_account(&self, account_id: Uuid) -> Result<Account, StoreError> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .iter_mut()
            .find(|a| a.account_id == account_id)
            .ok_or(StoreError::NotFound {
                entity: "account",
                id: account_id,
            })?;
        account.is_active = false;
        Ok(account.clone())
    }

    async fn count_accounts(&self) -> Result<u64, StoreError> {
        let state = self.state.read().await;
        Ok(state.accounts.len() as u64)
    }

    #[instrument(skip(self, new), fields(date = %new.date))]
    async fn create_entry(&self, new: NewJournalEntry) -> Result<JournalEntry, StoreError> {
        let mut state = self.state.write().await;
        let serial = next_serial(
            state.entries.iter().map(|e| e.serial_number.clone()),
            JOURNAL_ENTRY_PREFIX,
            new.date.year(),
        );
        let entry = new.into_entry(Uuid::new_v4(), serial, Utc::now());
        state.entries.push(entry.clone());
        Ok(entry)
    }

    async fn get_entry(&self, entry_id: Uuid) -> Result<Option<JournalEntry>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .find(|e| e.entry_id == entry_id)
            .cloned())
    }

    async fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<JournalEntry>, StoreError> {
        let state = self.state.read().await;
        let mut entries: Vec<JournalEntry> = state
            .entries
            .iter()
            .filter(|e| matches_entry(e, filter))
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then(a.serial_number.cmp(&b.serial_number))
        });
        Ok(entries)
    }

    async fn mark_superseded(&self, entry_id: Uuid, replaced_by: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.entry_id == entry_id)
            .ok_or(StoreError::NotFound {
                entity: "journal entry",
                id: entry_id,
            })?;
        entry.state = EntryState::Superseded { replaced_by };
        Ok(())
    }

    #[instrument(skip(self, new), fields(doc_type = new.doc_type.as_str()))]
    async fn create_document(&self, new: CreateDocument) -> Result<Document, StoreError> {
        let mut state = self.state.write().await;
        let serial = next_serial(
            state.documents.iter().map(|d| d.serial_number.clone()),
            new.doc_type.serial_prefix(),
            new.date.year(),
        );
        let document = new.into_document(Uuid::new_v4(), serial, Utc::now());
        state.documents.push(document.clone());
        Ok(document)
    }

    async fn get_document(&self, document_id: Uuid) -> Result<Option<Document>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .documents
            .iter()
            .find(|d| d.document_id == document_id)
            .cloned())
    }

    async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>, StoreError> {
        let state = self.state.read().await;
        let mut documents: Vec<Document> = state
            .documents
            .iter()
            .filter(|d| {
                if filter.unposted_only && !d.is_unposted() {
                    return false;
                }
                if let Some(from) = filter.from {
                    if d.date < from {
                        return false;
                    }
                }
                if let Some(to) = filter.to {
                    if d.date > to {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        documents.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then(a.serial_number.cmp(&b.serial_number))
        });
        Ok(documents)
    }

    async fn link_document_entry(
        &self,
        document_id: Uuid,
        entry_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let document = state
            .documents
            .iter_mut()
            .find(|d| d.document_id == document_id)
            .ok_or(StoreError::NotFound {
                entity: "document",
                id: document_id,
            })?;
        document.journal_entry_id = Some(entry_id);
        Ok(())
    }

    async fn ensure_period(&self, period: FiscalPeriod) -> Result<FiscalPeriod, StoreError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .periods
            .iter()
            .find(|p| p.contains_date(period.start_date))
        {
            return Ok(existing.clone());
        }
        state.periods.push(period.clone());
        Ok(period)
    }

    async fn get_period(&self, period_id: Uuid) -> Result<Option<FiscalPeriod>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .periods
            .iter()
            .find(|p| p.period_id == period_id)
            .cloned())
    }

    async fn list_periods(&self) -> Result<Vec<FiscalPeriod>, StoreError> {
        let state = self.state.read().await;
        let mut periods = state.periods.clone();
        periods.sort_by_key(|p| p.start_date);
        Ok(periods)
    }

    async fn period_for_date(&self, date: NaiveDate) -> Result<Option<FiscalPeriod>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .periods
            .iter()
            .find(|p| p.contains_date(date))
            .cloned())
    }

    async fn lock_period(
        &self,
        period_id: Uuid,
        closed_by: Option<Uuid>,
        closed_at: DateTime<Utc>,
    ) -> Result<FiscalPeriod, StoreError> {
        let mut state = self.state.write().await;
        let period = state
            .periods
            .iter_mut()
            .find(|p| p.period_id == period_id)
            .ok_or(StoreError::NotFound {
                entity: "fiscal period",
                id: period_id,
            })?;
        if !period.is_locked {
            period.is_locked = true;
            period.closed_at = Some(closed_at);
            period.closed_by = closed_by;
        }
        Ok(period.clone())
    }

    async fn append_audit(&self, entry: AuditLogEntry) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.audit.push(entry);
        Ok(())
    }

    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditLogEntry>, StoreError> {
        let state = self.state.read().await;
        Ok(state.audit.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountType, EntryMeta, JournalLine};
    use rust_decimal::Decimal;

    fn line(account_id: Uuid, debit: Decimal, credit: Decimal) -> JournalLine {
        JournalLine {
            account_id,
            debit,
            credit,
            description_local: None,
            description_alt: None,
        }
    }

    fn new_entry(date: NaiveDate, amount: Decimal) -> NewJournalEntry {
        NewJournalEntry {
            date,
            lines: vec![
                line(Uuid::new_v4(), amount, Decimal::ZERO),
                line(Uuid::new_v4(), Decimal::ZERO, amount),
            ],
            total_debit: amount,
            total_credit: amount,
            version: 1,
            meta: EntryMeta::default(),
        }
    }

    #[tokio::test]
    async fn serials_are_sequential_per_year() {
        let store = MemoryStore::new();
        let d2024 = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let d2025 = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        let amount = Decimal::new(10000, 2);

        let first = store.create_entry(new_entry(d2024, amount)).await.unwrap();
        let second = store.create_entry(new_entry(d2024, amount)).await.unwrap();
        let other_year = store.create_entry(new_entry(d2025, amount)).await.unwrap();

        assert_eq!(first.serial_number, "JRN-2024-0001");
        assert_eq!(second.serial_number, "JRN-2024-0002");
        assert_eq!(other_year.serial_number, "JRN-2025-0001");
    }

    #[tokio::test]
    async fn duplicate_account_code_rejected() {
        let store = MemoryStore::new();
        let input = CreateAccount {
            code: "1000".to_string(),
            name_local: "Cash".to_string(),
            name_alt: None,
            account_type: AccountType::Asset,
            parent_id: None,
            sort_order: 0,
        };
        store.create_account(input.clone()).await.unwrap();
        let err = store.create_account(input).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCode(code) if code == "1000"));
    }

    #[tokio::test]
    async fn superseded_entries_excluded_by_default() {
        let store = MemoryStore::new();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let amount = Decimal::new(5000, 2);

        let original = store.create_entry(new_entry(date, amount)).await.unwrap();
        let correction = store.create_entry(new_entry(date, amount)).await.unwrap();
        store
            .mark_superseded(original.entry_id, correction.entry_id)
            .await
            .unwrap();

        let current = store.list_entries(&EntryFilter::default()).await.unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].entry_id, correction.entry_id);

        let all = store
            .list_entries(&EntryFilter {
                include_non_current: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn lock_period_is_idempotent() {
        let store = MemoryStore::new();
        let period = FiscalPeriod::calendar_year(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let period = store.ensure_period(period).await.unwrap();

        let user = Uuid::new_v4();
        let first = store
            .lock_period(period.period_id, Some(user), Utc::now())
            .await
            .unwrap();
        assert!(first.is_locked);

        let second = store
            .lock_period(period.period_id, None, Utc::now())
            .await
            .unwrap();
        assert!(second.is_locked);
        assert_eq!(second.closed_by, Some(user), "lock fields set only once");
    }
}
