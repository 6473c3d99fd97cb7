//! Core ledger operations: chart of accounts, journal posting, corrections,
//! fiscal periods, bootstrap, and the audit trail.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    balance_epsilon, Account, AccountType, AuditAction, AuditLogEntry, CreateAccount, EntityKind,
    EntryMeta, EntryState, FiscalPeriod, JournalEntry, JournalLine, NewJournalEntry,
};
use crate::store::{EntryFilter, LedgerStore};

use super::error::LedgerError;
use super::events::{ChangeNotifier, EntityClass};
use super::metrics::{ENTRIES_POSTED_TOTAL, ERRORS_TOTAL};

/// Standard chart seeded by bootstrap so the system is never without
/// accounts. Codes are referenced by the document posting rules.
const SEED_ACCOUNTS: &[(&str, &str, AccountType)] = &[
    ("1000", "Cash on Hand", AccountType::Asset),
    ("1020", "Bank Accounts", AccountType::Asset),
    ("1150", "Cheques Receivable", AccountType::Asset),
    ("1200", "Accounts Receivable", AccountType::Asset),
    ("2100", "Accounts Payable", AccountType::Liability),
    ("2200", "Tenant Deposits Held", AccountType::Liability),
    ("2300", "VAT Payable", AccountType::Liability),
    ("3000", "Owner Capital", AccountType::Equity),
    ("3100", "Retained Earnings", AccountType::Equity),
    ("4000", "Rental Revenue", AccountType::Revenue),
    ("4100", "Service Fee Revenue", AccountType::Revenue),
    ("5000", "Operating Expenses", AccountType::Expense),
    ("5100", "Maintenance Expense", AccountType::Expense),
    ("5200", "Utilities Expense", AccountType::Expense),
];

/// The only writer of ledger facts. Cheap to clone; state lives in the store.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    notifier: ChangeNotifier,
}

/// Validate proposed lines and return (total_debit, total_credit).
pub fn validate_lines(lines: &[JournalLine]) -> Result<(Decimal, Decimal), LedgerError> {
    if lines.len() < 2 {
        return Err(LedgerError::TooFewLines);
    }

    let mut total_debit = Decimal::ZERO;
    let mut total_credit = Decimal::ZERO;

    for (index, line) in lines.iter().enumerate() {
        let debit_side = line.debit > Decimal::ZERO;
        let credit_side = line.credit > Decimal::ZERO;
        if debit_side == credit_side || line.debit < Decimal::ZERO || line.credit < Decimal::ZERO {
            return Err(LedgerError::InvalidLine { index });
        }
        total_debit += line.debit;
        total_credit += line.credit;
    }

    if (total_debit - total_credit).abs() > balance_epsilon() {
        return Err(LedgerError::UnbalancedEntry {
            debit: total_debit,
            credit: total_credit,
        });
    }

    Ok((total_debit, total_credit))
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: ChangeNotifier) -> Self {
        Self { store, notifier }
    }

    /// Idempotent bootstrap run once at service start: seed the standard
    /// chart when empty and make sure today's date has a covering period.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> Result<(), LedgerError> {
        if self.store.count_accounts().await? == 0 {
            for (code, name, account_type) in SEED_ACCOUNTS {
                self.store
                    .create_account(CreateAccount {
                        code: (*code).to_string(),
                        name_local: (*name).to_string(),
                        name_alt: None,
                        account_type: *account_type,
                        parent_id: None,
                        sort_order: code.parse().unwrap_or(0),
                    })
                    .await?;
            }
            info!(count = SEED_ACCOUNTS.len(), "Seeded standard chart of accounts");
            self.audit(
                AuditAction::Bootstrap,
                EntityKind::Account,
                Uuid::nil(),
                None,
                Some("seeded standard chart of accounts".to_string()),
                None,
                None,
            )
            .await;
            self.notifier.publish(EntityClass::Accounts);
        }

        self.ensure_coverage(Utc::now().date_naive()).await?;
        Ok(())
    }

    // -- chart of accounts ---------------------------------------------------

    pub async fn list_accounts(&self, active_only: bool) -> Result<Vec<Account>, LedgerError> {
        Ok(self.store.list_accounts(active_only).await?)
    }

    pub async fn get_account(&self, account_id: Uuid) -> Result<Account, LedgerError> {
        self.store
            .get_account(account_id)
            .await?
            .ok_or(LedgerError::NotFound {
                entity: "account",
                id: account_id,
            })
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_account(&self, input: CreateAccount) -> Result<Account, LedgerError> {
        if input.code.trim().is_empty() {
            return Err(LedgerError::InvalidDocument("account code is empty".into()));
        }
        let account = self.store.create_account(input).await?;
        self.audit(
            AuditAction::Create,
            EntityKind::Account,
            account.account_id,
            None,
            None,
            None,
            Some(json!({ "code": account.code, "type": account.account_type.as_str() })),
        )
        .await;
        self.notifier.publish(EntityClass::Accounts);
        Ok(account)
    }

    /// Accounts are never deleted; deactivation hides them from new postings
    /// while history stays reportable.
    pub async fn deactivate_account(&self, account_id: Uuid) -> Result<Account, LedgerError> {
        let account = self.store.deactivate_account(account_id).await?;
        self.audit(
            AuditAction::Deactivate,
            EntityKind::Account,
            account_id,
            None,
            None,
            Some(json!({ "is_active": true })),
            Some(json!({ "is_active": false })),
        )
        .await;
        self.notifier.publish(EntityClass::Accounts);
        Ok(account)
    }

    // -- fiscal periods ------------------------------------------------------

    /// Make sure `date` has a covering period, creating the calendar year on
    /// demand.
    pub async fn ensure_coverage(&self, date: NaiveDate) -> Result<FiscalPeriod, LedgerError> {
        if let Some(period) = self.store.period_for_date(date).await? {
            return Ok(period);
        }
        let period = self
            .store
            .ensure_period(FiscalPeriod::calendar_year(date))
            .await?;
        self.notifier.publish(EntityClass::Periods);
        Ok(period)
    }

    pub async fn is_locked_for_date(&self, date: NaiveDate) -> Result<bool, LedgerError> {
        Ok(self
            .store
            .period_for_date(date)
            .await?
            .map(|p| p.is_locked)
            .unwrap_or(false))
    }

    pub async fn periods(&self) -> Result<Vec<FiscalPeriod>, LedgerError> {
        Ok(self.store.list_periods().await?)
    }

    /// Lock a period against further posting. Idempotent: locking an already
    /// locked period returns it unchanged without a second audit row.
    #[instrument(skip(self))]
    pub async fn lock_period(
        &self,
        period_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<FiscalPeriod, LedgerError> {
        let existing = self
            .store
            .get_period(period_id)
            .await?
            .ok_or(LedgerError::NotFound {
                entity: "fiscal period",
                id: period_id,
            })?;
        if existing.is_locked {
            return Ok(existing);
        }

        let locked = self
            .store
            .lock_period(period_id, user_id, Utc::now())
            .await?;
        info!(code = %locked.code, "Fiscal period locked");
        self.audit(
            AuditAction::Lock,
            EntityKind::FiscalPeriod,
            period_id,
            user_id,
            Some("period closed for posting".to_string()),
            Some(json!({ "is_locked": false })),
            Some(json!({ "is_locked": true, "code": locked.code })),
        )
        .await;
        self.notifier.publish(EntityClass::Periods);
        Ok(locked)
    }

    // -- journal posting -----------------------------------------------------

    /// Validate and persist a balanced entry. No partial writes: the store
    /// persists the entry and its lines as one atomic unit.
    #[instrument(skip(self, lines, meta), fields(date = %date, line_count = lines.len()))]
    pub async fn post_entry(
        &self,
        date: NaiveDate,
        lines: Vec<JournalLine>,
        meta: EntryMeta,
    ) -> Result<JournalEntry, LedgerError> {
        match self.post_entry_version(date, lines, meta, 1).await {
            Ok(entry) => {
                ENTRIES_POSTED_TOTAL.with_label_values(&["ok"]).inc();
                Ok(entry)
            }
            Err(err) => {
                ENTRIES_POSTED_TOTAL.with_label_values(&["rejected"]).inc();
                ERRORS_TOTAL.with_label_values(&[err.kind()]).inc();
                Err(err)
            }
        }
    }

    async fn post_entry_version(
        &self,
        date: NaiveDate,
        lines: Vec<JournalLine>,
        meta: EntryMeta,
        version: i32,
    ) -> Result<JournalEntry, LedgerError> {
        let (total_debit, total_credit) = validate_lines(&lines)?;

        let period = self.ensure_coverage(date).await?;
        if period.is_locked {
            return Err(LedgerError::PeriodLocked {
                code: period.code,
                date,
            });
        }

        for line in &lines {
            let account = self.store.get_account(line.account_id).await?;
            match account {
                Some(a) if a.is_active => {}
                _ => return Err(LedgerError::UnknownAccount(line.account_id)),
            }
        }

        let entry = self
            .store
            .create_entry(NewJournalEntry {
                date,
                lines,
                total_debit,
                total_credit,
                version,
                meta,
            })
            .await?;

        info!(
            serial = %entry.serial_number,
            total = %entry.total_debit,
            "Journal entry posted"
        );
        self.audit(
            AuditAction::Create,
            EntityKind::JournalEntry,
            entry.entry_id,
            None,
            None,
            None,
            Some(json!({
                "serial_number": entry.serial_number,
                "date": entry.date,
                "total_debit": entry.total_debit,
                "total_credit": entry.total_credit,
            })),
        )
        .await;
        self.notifier.publish(EntityClass::Entries);
        Ok(entry)
    }

    /// Append-only correction: post a replacement entry and tag the original
    /// as superseded. Rejected when the original's period is locked, since
    /// superseding would change that period's reports.
    #[instrument(skip(self, lines, meta))]
    pub async fn correct_entry(
        &self,
        original_id: Uuid,
        date: NaiveDate,
        lines: Vec<JournalLine>,
        meta: EntryMeta,
    ) -> Result<JournalEntry, LedgerError> {
        let original = self
            .store
            .get_entry(original_id)
            .await?
            .ok_or(LedgerError::NotFound {
                entity: "journal entry",
                id: original_id,
            })?;

        if let EntryState::Superseded { .. } = original.state {
            return Err(LedgerError::AlreadySuperseded(original_id));
        }

        if let Some(period) = self.store.period_for_date(original.date).await? {
            if period.is_locked {
                return Err(LedgerError::PeriodLocked {
                    code: period.code,
                    date: original.date,
                });
            }
        }

        let replacement = self
            .post_entry_version(date, lines, meta, original.version + 1)
            .await?;
        self.store
            .mark_superseded(original_id, replacement.entry_id)
            .await?;

        self.audit(
            AuditAction::Correct,
            EntityKind::JournalEntry,
            original_id,
            None,
            Some("entry superseded by correction".to_string()),
            Some(json!({ "serial_number": original.serial_number })),
            Some(json!({
                "serial_number": replacement.serial_number,
                "replaced_by": replacement.entry_id,
            })),
        )
        .await;
        self.notifier.publish(EntityClass::Entries);
        Ok(replacement)
    }

    pub async fn entries(&self, filter: &EntryFilter) -> Result<Vec<JournalEntry>, LedgerError> {
        Ok(self.store.list_entries(filter).await?)
    }

    pub async fn get_entry(&self, entry_id: Uuid) -> Result<JournalEntry, LedgerError> {
        self.store
            .get_entry(entry_id)
            .await?
            .ok_or(LedgerError::NotFound {
                entity: "journal entry",
                id: entry_id,
            })
    }

    // -- audit trail -----------------------------------------------------------

    pub async fn audit_log(&self, limit: usize) -> Result<Vec<AuditLogEntry>, LedgerError> {
        Ok(self.store.list_audit(limit).await?)
    }

    /// Best-effort append: one retry, then a local warning. An audit-store
    /// failure never rolls back the financial write it describes.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn audit(
        &self,
        action: AuditAction,
        entity_type: EntityKind,
        entity_id: Uuid,
        user_id: Option<Uuid>,
        reason: Option<String>,
        previous_state: Option<serde_json::Value>,
        new_state: Option<serde_json::Value>,
    ) {
        let entry = AuditLogEntry {
            audit_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            entity_type,
            entity_id,
            user_id,
            reason,
            previous_state,
            new_state,
        };

        for attempt in 1..=2u32 {
            match self.store.append_audit(entry.clone()).await {
                Ok(()) => {
                    self.notifier.publish(EntityClass::Audit);
                    return;
                }
                Err(e) if attempt < 2 => {
                    warn!(error = %e, "Audit append failed, retrying once");
                }
                Err(e) => {
                    ERRORS_TOTAL.with_label_values(&["audit_write"]).inc();
                    warn!(
                        error = %e,
                        action = action.as_str(),
                        entity_type = entity_type.as_str(),
                        entity_id = %entity_id,
                        "Audit append failed; continuing without audit record"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(debit: Decimal, credit: Decimal) -> JournalLine {
        JournalLine {
            account_id: Uuid::new_v4(),
            debit,
            credit,
            description_local: None,
            description_alt: None,
        }
    }

    #[test]
    fn rejects_single_line() {
        let err = validate_lines(&[line(Decimal::new(100, 0), Decimal::ZERO)]).unwrap_err();
        assert!(matches!(err, LedgerError::TooFewLines));
    }

    #[test]
    fn rejects_zero_zero_line() {
        let lines = [
            line(Decimal::new(100, 0), Decimal::ZERO),
            line(Decimal::ZERO, Decimal::ZERO),
        ];
        let err = validate_lines(&lines).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidLine { index: 1 }));
    }

    #[test]
    fn rejects_both_sides_positive() {
        let lines = [
            line(Decimal::new(100, 0), Decimal::new(100, 0)),
            line(Decimal::ZERO, Decimal::new(100, 0)),
        ];
        let err = validate_lines(&lines).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidLine { index: 0 }));
    }

    #[test]
    fn rejects_unbalanced_totals() {
        let lines = [
            line(Decimal::new(100, 0), Decimal::ZERO),
            line(Decimal::ZERO, Decimal::new(90, 0)),
        ];
        let err = validate_lines(&lines).unwrap_err();
        match err {
            LedgerError::UnbalancedEntry { debit, credit } => {
                assert_eq!(debit, Decimal::new(100, 0));
                assert_eq!(credit, Decimal::new(90, 0));
            }
            other => panic!("expected UnbalancedEntry, got {other:?}"),
        }
    }

    #[test]
    fn accepts_rounding_within_tolerance() {
        // 0.005 difference is inside the 0.01 tolerance.
        let lines = [
            line(Decimal::new(10000, 2), Decimal::ZERO),
            line(Decimal::ZERO, Decimal::new(99995, 3)),
        ];
        let (debit, credit) = validate_lines(&lines).unwrap();
        assert_eq!(debit, Decimal::new(10000, 2));
        assert_eq!(credit, Decimal::new(99995, 3));
    }

    #[test]
    fn accepts_multi_line_split() {
        let lines = [
            line(Decimal::new(150, 0), Decimal::ZERO),
            line(Decimal::ZERO, Decimal::new(100, 0)),
            line(Decimal::ZERO, Decimal::new(50, 0)),
        ];
        assert!(validate_lines(&lines).is_ok());
    }
}
