//! Report engine.
//!
//! Every report is a pure fold over accounts and current journal entries,
//! computed on demand; there are no materialized balances to drift out of
//! sync with the entries. Superseded and cancelled entries never contribute.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::models::{Account, AccountType, JournalEntry};
use crate::store::{EntryFilter, LedgerStore};

use super::error::LedgerError;
use super::metrics::REPORT_DURATION;

/// Cash and cash-equivalent account codes for the cash flow statement.
const CASH_ACCOUNT_CODES: &[&str] = &["1000", "1020", "1150"];

/// Per-account raw and presentation balances.
#[derive(Debug, Clone, Serialize)]
pub struct AccountBalance {
    pub account_id: Uuid,
    pub code: String,
    pub name_local: String,
    pub account_type: AccountType,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    /// Normal-side balance: debit - credit for debit-normal accounts,
    /// credit - debit otherwise, so a healthy balance reads positive.
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialBalanceRow {
    pub account_id: Uuid,
    pub code: String,
    pub name_local: String,
    pub account_type: AccountType,
    pub debit: Decimal,
    pub credit: Decimal,
}

/// All accounts with activity, debit and credit columns totalled. The two
/// totals are equal whenever every posted entry balanced.
#[derive(Debug, Clone, Serialize)]
pub struct TrialBalance {
    pub from: Option<NaiveDate>,
    pub as_of: Option<NaiveDate>,
    pub rows: Vec<TrialBalanceRow>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub account_id: Uuid,
    pub code: String,
    pub name_local: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct IncomeStatement {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub revenue: Vec<ReportRow>,
    pub expenses: Vec<ReportRow>,
    pub total_revenue: Decimal,
    pub total_expenses: Decimal,
    pub net_income: Decimal,
}

/// Point-in-time statement. Current-period net income is reported as its own
/// equity component, so `total_assets == total_liabilities_and_equity` holds
/// without a closing entry.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceSheet {
    pub as_of: NaiveDate,
    pub assets: Vec<ReportRow>,
    pub liabilities: Vec<ReportRow>,
    pub equity: Vec<ReportRow>,
    pub net_income: Decimal,
    pub total_assets: Decimal,
    pub total_liabilities: Decimal,
    pub total_equity: Decimal,
    pub total_liabilities_and_equity: Decimal,
}

/// Simplified indirect-method cash flow: operating activity is the period's
/// net income, reconciled against the actual movement on cash accounts.
#[derive(Debug, Clone, Serialize)]
pub struct CashFlowStatement {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub operating: Decimal,
    pub opening_cash: Decimal,
    pub closing_cash: Decimal,
    pub net_change: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerRow {
    pub entry_id: Uuid,
    pub serial_number: String,
    pub date: NaiveDate,
    pub description: Option<String>,
    pub debit: Decimal,
    pub credit: Decimal,
    pub running_balance: Decimal,
}

/// Single-account sub-ledger with a normal-side running balance.
#[derive(Debug, Clone, Serialize)]
pub struct AccountLedger {
    pub account_id: Uuid,
    pub code: String,
    pub name_local: String,
    pub account_type: AccountType,
    pub opening_balance: Decimal,
    pub rows: Vec<LedgerRow>,
    pub closing_balance: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct DimensionRow {
    pub entry_id: Uuid,
    pub serial_number: String,
    pub date: NaiveDate,
    pub description: Option<String>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
}

/// Entries grouped by a business dimension (contact, bank account, property,
/// project). Entry-level rows only: a balanced entry's lines net to zero, so
/// a per-line running balance would carry no information here.
#[derive(Debug, Clone, Serialize)]
pub struct DimensionLedger {
    pub rows: Vec<DimensionRow>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
}

/// Sum debit/credit per account over current entries.
fn fold_totals(entries: &[JournalEntry]) -> HashMap<Uuid, (Decimal, Decimal)> {
    let mut totals: HashMap<Uuid, (Decimal, Decimal)> = HashMap::new();
    for entry in entries.iter().filter(|e| e.is_current()) {
        for line in &entry.lines {
            let slot = totals.entry(line.account_id).or_default();
            slot.0 += line.debit;
            slot.1 += line.credit;
        }
    }
    totals
}

/// Per-account balances over the given entries. Accounts without activity
/// are included with zero balances so the chart stays visible in reports.
pub fn account_balances(accounts: &[Account], entries: &[JournalEntry]) -> Vec<AccountBalance> {
    let totals = fold_totals(entries);
    let mut balances: Vec<AccountBalance> = accounts
        .iter()
        .map(|account| {
            let (debit, credit) = totals
                .get(&account.account_id)
                .copied()
                .unwrap_or((Decimal::ZERO, Decimal::ZERO));
            let balance = if account.account_type.is_debit_normal() {
                debit - credit
            } else {
                credit - debit
            };
            AccountBalance {
                account_id: account.account_id,
                code: account.code.clone(),
                name_local: account.name_local.clone(),
                account_type: account.account_type,
                total_debit: debit,
                total_credit: credit,
                balance,
            }
        })
        .collect();
    balances.sort_by(|a, b| a.code.cmp(&b.code));
    balances
}

/// Trial balance over the given entries: each account shows the net of its
/// raw debit/credit activity on its heavier side. Any date-range subset of
/// balanced entries still closes, so a `from` bound never breaks the totals.
pub fn trial_balance(
    accounts: &[Account],
    entries: &[JournalEntry],
    from: Option<NaiveDate>,
    as_of: Option<NaiveDate>,
) -> TrialBalance {
    let mut rows = Vec::new();
    let mut total_debit = Decimal::ZERO;
    let mut total_credit = Decimal::ZERO;

    for balance in account_balances(accounts, entries) {
        let net = balance.total_debit - balance.total_credit;
        if net == Decimal::ZERO {
            continue;
        }
        let (debit, credit) = if net > Decimal::ZERO {
            (net, Decimal::ZERO)
        } else {
            (Decimal::ZERO, -net)
        };
        total_debit += debit;
        total_credit += credit;
        rows.push(TrialBalanceRow {
            account_id: balance.account_id,
            code: balance.code,
            name_local: balance.name_local,
            account_type: balance.account_type,
            debit,
            credit,
        });
    }

    TrialBalance {
        from,
        as_of,
        rows,
        total_debit,
        total_credit,
    }
}

fn rows_of_type(balances: &[AccountBalance], account_type: AccountType) -> Vec<ReportRow> {
    balances
        .iter()
        .filter(|b| b.account_type == account_type && b.balance != Decimal::ZERO)
        .map(|b| ReportRow {
            account_id: b.account_id,
            code: b.code.clone(),
            name_local: b.name_local.clone(),
            amount: b.balance,
        })
        .collect()
}

fn sum(rows: &[ReportRow]) -> Decimal {
    rows.iter().map(|r| r.amount).sum()
}

/// Income statement for a period's entries.
pub fn income_statement(
    accounts: &[Account],
    entries: &[JournalEntry],
    from: NaiveDate,
    to: NaiveDate,
) -> IncomeStatement {
    let balances = account_balances(accounts, entries);
    let revenue = rows_of_type(&balances, AccountType::Revenue);
    let expenses = rows_of_type(&balances, AccountType::Expense);
    let total_revenue = sum(&revenue);
    let total_expenses = sum(&expenses);
    IncomeStatement {
        from,
        to,
        revenue,
        expenses,
        total_revenue,
        total_expenses,
        net_income: total_revenue - total_expenses,
    }
}

/// Balance sheet from all entries up to `as_of`.
pub fn balance_sheet(
    accounts: &[Account],
    entries: &[JournalEntry],
    as_of: NaiveDate,
) -> BalanceSheet {
    let balances = account_balances(accounts, entries);
    let assets = rows_of_type(&balances, AccountType::Asset);
    let liabilities = rows_of_type(&balances, AccountType::Liability);
    let equity = rows_of_type(&balances, AccountType::Equity);
    let net_income =
        sum(&rows_of_type(&balances, AccountType::Revenue)) - sum(&rows_of_type(&balances, AccountType::Expense));

    let total_assets = sum(&assets);
    let total_liabilities = sum(&liabilities);
    let total_equity = sum(&equity);
    BalanceSheet {
        as_of,
        assets,
        liabilities,
        equity,
        net_income,
        total_assets,
        total_liabilities,
        total_equity,
        total_liabilities_and_equity: total_liabilities + total_equity + net_income,
    }
}

fn cash_balance(accounts: &[Account], entries: &[JournalEntry]) -> Decimal {
    account_balances(accounts, entries)
        .iter()
        .filter(|b| CASH_ACCOUNT_CODES.contains(&b.code.as_str()))
        .map(|b| b.balance)
        .sum()
}

/// Computes reports against the store. Clone is cheap; all state is shared.
#[derive(Clone)]
pub struct ReportEngine {
    store: Arc<dyn LedgerStore>,
}

impl ReportEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    async fn load(
        &self,
        filter: &EntryFilter,
    ) -> Result<(Vec<Account>, Vec<JournalEntry>), LedgerError> {
        let accounts = self.store.list_accounts(false).await?;
        let entries = self.store.list_entries(filter).await?;
        Ok((accounts, entries))
    }

    #[instrument(skip(self))]
    pub async fn trial_balance(
        &self,
        from: Option<NaiveDate>,
        as_of: Option<NaiveDate>,
    ) -> Result<TrialBalance, LedgerError> {
        let timer = REPORT_DURATION.with_label_values(&["trial_balance"]).start_timer();
        let (accounts, entries) = self
            .load(&EntryFilter {
                from,
                to: as_of,
                ..Default::default()
            })
            .await?;
        let report = trial_balance(&accounts, &entries, from, as_of);
        timer.observe_duration();
        Ok(report)
    }

    #[instrument(skip(self))]
    pub async fn income_statement(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<IncomeStatement, LedgerError> {
        let timer = REPORT_DURATION
            .with_label_values(&["income_statement"])
            .start_timer();
        let (accounts, entries) = self
            .load(&EntryFilter {
                from: Some(from),
                to: Some(to),
                ..Default::default()
            })
            .await?;
        let report = income_statement(&accounts, &entries, from, to);
        timer.observe_duration();
        Ok(report)
    }

    #[instrument(skip(self))]
    pub async fn balance_sheet(&self, as_of: NaiveDate) -> Result<BalanceSheet, LedgerError> {
        let timer = REPORT_DURATION.with_label_values(&["balance_sheet"]).start_timer();
        let (accounts, entries) = self
            .load(&EntryFilter {
                to: Some(as_of),
                ..Default::default()
            })
            .await?;
        let report = balance_sheet(&accounts, &entries, as_of);
        timer.observe_duration();
        Ok(report)
    }

    /// Indirect cash flow: opening/closing cash are cumulative balances,
    /// operating activity is the period's net income.
    #[instrument(skip(self))]
    pub async fn cash_flow(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<CashFlowStatement, LedgerError> {
        let timer = REPORT_DURATION.with_label_values(&["cash_flow"]).start_timer();
        let accounts = self.store.list_accounts(false).await?;
        let before = self
            .store
            .list_entries(&EntryFilter {
                to: from.pred_opt(),
                ..Default::default()
            })
            .await?;
        let through = self
            .store
            .list_entries(&EntryFilter {
                to: Some(to),
                ..Default::default()
            })
            .await?;
        let period = self
            .store
            .list_entries(&EntryFilter {
                from: Some(from),
                to: Some(to),
                ..Default::default()
            })
            .await?;

        let opening_cash = cash_balance(&accounts, &before);
        let closing_cash = cash_balance(&accounts, &through);
        let statement = income_statement(&accounts, &period, from, to);
        let report = CashFlowStatement {
            from,
            to,
            operating: statement.net_income,
            opening_cash,
            closing_cash,
            net_change: closing_cash - opening_cash,
        };
        timer.observe_duration();
        Ok(report)
    }

    /// Balance of one account as of a date (cumulative from the first entry).
    #[instrument(skip(self))]
    pub async fn account_balance(
        &self,
        account_id: Uuid,
        as_of: Option<NaiveDate>,
    ) -> Result<AccountBalance, LedgerError> {
        let (accounts, entries) = self
            .load(&EntryFilter {
                to: as_of,
                ..Default::default()
            })
            .await?;
        account_balances(&accounts, &entries)
            .into_iter()
            .find(|b| b.account_id == account_id)
            .ok_or(LedgerError::NotFound {
                entity: "account",
                id: account_id,
            })
    }

    /// Sub-ledger for a single account, with running balance on its normal
    /// side. Rows outside [from, to] contribute to the opening balance only.
    #[instrument(skip(self))]
    pub async fn account_ledger(
        &self,
        account_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<AccountLedger, LedgerError> {
        let timer = REPORT_DURATION.with_label_values(&["account_ledger"]).start_timer();
        let account = self
            .store
            .get_account(account_id)
            .await?
            .ok_or(LedgerError::NotFound {
                entity: "account",
                id: account_id,
            })?;

        let entries = self
            .store
            .list_entries(&EntryFilter {
                to,
                ..Default::default()
            })
            .await?;

        let debit_normal = account.account_type.is_debit_normal();
        let mut opening = Decimal::ZERO;
        let mut rows = Vec::new();
        let mut balance = Decimal::ZERO;

        for entry in entries.iter().filter(|e| e.is_current()) {
            let (debit, credit) = entry
                .lines
                .iter()
                .filter(|l| l.account_id == account_id)
                .fold((Decimal::ZERO, Decimal::ZERO), |(d, c), l| {
                    (d + l.debit, c + l.credit)
                });
            if debit == Decimal::ZERO && credit == Decimal::ZERO {
                continue;
            }
            let movement = if debit_normal { debit - credit } else { credit - debit };
            if from.is_some_and(|f| entry.date < f) {
                opening += movement;
                continue;
            }
            balance += movement;
            rows.push(LedgerRow {
                entry_id: entry.entry_id,
                serial_number: entry.serial_number.clone(),
                date: entry.date,
                description: entry.description_local.clone(),
                debit,
                credit,
                running_balance: opening + balance,
            });
        }

        let ledger = AccountLedger {
            account_id,
            code: account.code,
            name_local: account.name_local,
            account_type: account.account_type,
            opening_balance: opening,
            closing_balance: opening + balance,
            rows,
        };
        timer.observe_duration();
        Ok(ledger)
    }

    /// Sub-ledger filtered by business dimension.
    #[instrument(skip(self, filter))]
    pub async fn dimension_ledger(&self, filter: &EntryFilter) -> Result<DimensionLedger, LedgerError> {
        let timer = REPORT_DURATION
            .with_label_values(&["dimension_ledger"])
            .start_timer();
        let entries = self.store.list_entries(filter).await?;
        let mut total_debit = Decimal::ZERO;
        let mut total_credit = Decimal::ZERO;
        let rows = entries
            .iter()
            .filter(|e| e.is_current())
            .map(|e| {
                total_debit += e.total_debit;
                total_credit += e.total_credit;
                DimensionRow {
                    entry_id: e.entry_id,
                    serial_number: e.serial_number.clone(),
                    date: e.date,
                    description: e.description_local.clone(),
                    total_debit: e.total_debit,
                    total_credit: e.total_credit,
                }
            })
            .collect();
        timer.observe_duration();
        Ok(DimensionLedger {
            rows,
            total_debit,
            total_credit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryState, EntryStatus, JournalLine};
    use chrono::Utc;

    fn account(code: &str, account_type: AccountType) -> Account {
        Account {
            account_id: Uuid::new_v4(),
            code: code.to_string(),
            name_local: format!("Account {code}"),
            name_alt: None,
            account_type,
            parent_id: None,
            is_active: true,
            sort_order: 0,
            created_utc: Utc::now(),
        }
    }

    fn entry(lines: Vec<JournalLine>, state: EntryState) -> JournalEntry {
        let total_debit: Decimal = lines.iter().map(|l| l.debit).sum();
        let total_credit: Decimal = lines.iter().map(|l| l.credit).sum();
        JournalEntry {
            entry_id: Uuid::new_v4(),
            serial_number: "JRN-2026-0001".into(),
            version: 1,
            date: NaiveDate::from_ymd_opt(2026, 3, 15).unwrap(),
            lines,
            total_debit,
            total_credit,
            description_local: None,
            description_alt: None,
            document_type: None,
            document_id: None,
            contact_id: None,
            bank_account_id: None,
            property_id: None,
            project_id: None,
            status: EntryStatus::Approved,
            state,
            created_utc: Utc::now(),
        }
    }

    fn line(account_id: Uuid, debit: i64, credit: i64) -> JournalLine {
        JournalLine {
            account_id,
            debit: Decimal::from(debit),
            credit: Decimal::from(credit),
            description_local: None,
            description_alt: None,
        }
    }

    #[test]
    fn trial_balance_debits_equal_credits() {
        let cash = account("1020", AccountType::Asset);
        let rent = account("4000", AccountType::Revenue);
        let accounts = vec![cash.clone(), rent.clone()];
        let entries = vec![entry(
            vec![line(cash.account_id, 1000, 0), line(rent.account_id, 0, 1000)],
            EntryState::Active,
        )];

        let tb = trial_balance(&accounts, &entries, None, None);
        assert_eq!(tb.total_debit, tb.total_credit);
        assert_eq!(tb.total_debit, Decimal::from(1000));
        assert_eq!(tb.rows.len(), 2);
    }

    #[test]
    fn superseded_entries_do_not_contribute() {
        let cash = account("1020", AccountType::Asset);
        let rent = account("4000", AccountType::Revenue);
        let accounts = vec![cash.clone(), rent.clone()];
        let entries = vec![
            entry(
                vec![line(cash.account_id, 500, 0), line(rent.account_id, 0, 500)],
                EntryState::Superseded {
                    replaced_by: Uuid::new_v4(),
                },
            ),
            entry(
                vec![line(cash.account_id, 700, 0), line(rent.account_id, 0, 700)],
                EntryState::Active,
            ),
        ];

        let balances = account_balances(&accounts, &entries);
        let cash_balance = balances.iter().find(|b| b.code == "1020").unwrap();
        assert_eq!(cash_balance.balance, Decimal::from(700));
    }

    #[test]
    fn balance_sheet_balances_with_net_income() {
        let cash = account("1020", AccountType::Asset);
        let rent = account("4000", AccountType::Revenue);
        let maint = account("5100", AccountType::Expense);
        let accounts = vec![cash.clone(), rent.clone(), maint.clone()];
        let entries = vec![
            entry(
                vec![line(cash.account_id, 1000, 0), line(rent.account_id, 0, 1000)],
                EntryState::Active,
            ),
            entry(
                vec![line(maint.account_id, 300, 0), line(cash.account_id, 0, 300)],
                EntryState::Active,
            ),
        ];

        let bs = balance_sheet(
            &accounts,
            &entries,
            NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
        );
        assert_eq!(bs.total_assets, Decimal::from(700));
        assert_eq!(bs.net_income, Decimal::from(700));
        assert_eq!(bs.total_assets, bs.total_liabilities_and_equity);
    }

    #[test]
    fn income_statement_nets_revenue_against_expenses() {
        let cash = account("1020", AccountType::Asset);
        let rent = account("4000", AccountType::Revenue);
        let maint = account("5100", AccountType::Expense);
        let accounts = vec![cash.clone(), rent.clone(), maint.clone()];
        let from = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();
        let entries = vec![
            entry(
                vec![line(cash.account_id, 2000, 0), line(rent.account_id, 0, 2000)],
                EntryState::Active,
            ),
            entry(
                vec![line(maint.account_id, 450, 0), line(cash.account_id, 0, 450)],
                EntryState::Active,
            ),
        ];

        let is = income_statement(&accounts, &entries, from, to);
        assert_eq!(is.total_revenue, Decimal::from(2000));
        assert_eq!(is.total_expenses, Decimal::from(450));
        assert_eq!(is.net_income, Decimal::from(1550));
    }
}
