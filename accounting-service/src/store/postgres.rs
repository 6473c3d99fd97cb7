//! PostgreSQL store backend.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    format_serial, serial::JOURNAL_ENTRY_PREFIX, Account, AccountType, AuditAction,
    AuditLogEntry, CreateAccount, CreateDocument, Document, DocumentStatus, DocumentType,
    EntityKind, EntryState, EntryStatus, FiscalPeriod, JournalEntry, NewJournalEntry,
    PaymentMethod,
};

use super::{DocumentFilter, EntryFilter, LedgerStore, StoreError};

/// Bounded retry for serialization failures on the write paths; validation
/// errors are never retried.
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Durable [`LedgerStore`] implementation over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new connection pool.
    #[instrument(skip(database_url), fields(service = "accounting-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, StoreError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::backend(format!("Failed to connect: {e}")))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::backend(format!("Health check failed: {e}")))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::backend(format!("Migration failed: {e}")))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Allocate the next serial for (prefix, year) inside `tx`, so the
    /// counter bump and the record insert commit or roll back together.
    async fn allocate_serial(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        prefix: &str,
        year: i32,
    ) -> Result<String, StoreError> {
        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO serial_counters (prefix, year, next_value)
            VALUES ($1, $2, 2)
            ON CONFLICT (prefix, year)
            DO UPDATE SET next_value = serial_counters.next_value + 1
            RETURNING next_value - 1
            "#,
        )
        .bind(prefix)
        .bind(year)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| StoreError::backend(format!("Failed to allocate serial: {e}")))?;

        Ok(format_serial(prefix, year, seq as u32))
    }
}

fn is_serialization_failure(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("40001")
    )
}

fn row_to_account(row: &PgRow) -> Result<Account, StoreError> {
    let type_str: String = row.try_get("account_type").map_err(anyhow::Error::new)?;
    Ok(Account {
        account_id: row.try_get("account_id").map_err(anyhow::Error::new)?,
        code: row.try_get("code").map_err(anyhow::Error::new)?,
        name_local: row.try_get("name_local").map_err(anyhow::Error::new)?,
        name_alt: row.try_get("name_alt").map_err(anyhow::Error::new)?,
        account_type: AccountType::from_str(&type_str)
            .ok_or_else(|| StoreError::backend(format!("unknown account type '{type_str}'")))?,
        parent_id: row.try_get("parent_id").map_err(anyhow::Error::new)?,
        is_active: row.try_get("is_active").map_err(anyhow::Error::new)?,
        sort_order: row.try_get("sort_order").map_err(anyhow::Error::new)?,
        created_utc: row.try_get("created_utc").map_err(anyhow::Error::new)?,
    })
}

fn row_to_entry(row: &PgRow) -> Result<JournalEntry, StoreError> {
    let lines_json: serde_json::Value = row.try_get("lines").map_err(anyhow::Error::new)?;
    let lines = serde_json::from_value(lines_json)
        .map_err(|e| StoreError::backend(format!("corrupt entry lines: {e}")))?;
    let status: String = row.try_get("status").map_err(anyhow::Error::new)?;
    let doc_type: Option<String> = row.try_get("document_type").map_err(anyhow::Error::new)?;
    let replaced_by: Option<Uuid> = row.try_get("replaced_by").map_err(anyhow::Error::new)?;

    Ok(JournalEntry {
        entry_id: row.try_get("entry_id").map_err(anyhow::Error::new)?,
        serial_number: row.try_get("serial_number").map_err(anyhow::Error::new)?,
        version: row.try_get("version").map_err(anyhow::Error::new)?,
        date: row.try_get("entry_date").map_err(anyhow::Error::new)?,
        lines,
        total_debit: row.try_get("total_debit").map_err(anyhow::Error::new)?,
        total_credit: row.try_get("total_credit").map_err(anyhow::Error::new)?,
        description_local: row
            .try_get("description_local")
            .map_err(anyhow::Error::new)?,
        description_alt: row.try_get("description_alt").map_err(anyhow::Error::new)?,
        document_type: doc_type.as_deref().map(DocumentType::from_str),
        document_id: row.try_get("document_id").map_err(anyhow::Error::new)?,
        contact_id: row.try_get("contact_id").map_err(anyhow::Error::new)?,
        bank_account_id: row.try_get("bank_account_id").map_err(anyhow::Error::new)?,
        property_id: row.try_get("property_id").map_err(anyhow::Error::new)?,
        project_id: row.try_get("project_id").map_err(anyhow::Error::new)?,
        status: EntryStatus::from_str(&status),
        state: match replaced_by {
            Some(id) => EntryState::Superseded { replaced_by: id },
            None => EntryState::Active,
        },
        created_utc: row.try_get("created_utc").map_err(anyhow::Error::new)?,
    })
}

fn row_to_document(row: &PgRow) -> Result<Document, StoreError> {
    let doc_type: String = row.try_get("doc_type").map_err(anyhow::Error::new)?;
    let status: String = row.try_get("status").map_err(anyhow::Error::new)?;
    let payment_method: Option<String> =
        row.try_get("payment_method").map_err(anyhow::Error::new)?;
    let items_json: Option<serde_json::Value> = row.try_get("items").map_err(anyhow::Error::new)?;
    let items = items_json
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| StoreError::backend(format!("corrupt document items: {e}")))?;
    let attachments_json: Option<serde_json::Value> =
        row.try_get("attachments").map_err(anyhow::Error::new)?;
    let attachments = attachments_json
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| StoreError::backend(format!("corrupt attachments: {e}")))?;

    Ok(Document {
        document_id: row.try_get("document_id").map_err(anyhow::Error::new)?,
        serial_number: row.try_get("serial_number").map_err(anyhow::Error::new)?,
        doc_type: DocumentType::from_str(&doc_type),
        status: DocumentStatus::from_str(&status),
        date: row.try_get("doc_date").map_err(anyhow::Error::new)?,
        due_date: row.try_get("due_date").map_err(anyhow::Error::new)?,
        contact_id: row.try_get("contact_id").map_err(anyhow::Error::new)?,
        bank_account_id: row.try_get("bank_account_id").map_err(anyhow::Error::new)?,
        property_id: row.try_get("property_id").map_err(anyhow::Error::new)?,
        project_id: row.try_get("project_id").map_err(anyhow::Error::new)?,
        amount: row.try_get("amount").map_err(anyhow::Error::new)?,
        currency: row.try_get("currency").map_err(anyhow::Error::new)?,
        vat_rate: row.try_get("vat_rate").map_err(anyhow::Error::new)?,
        vat_amount: row.try_get("vat_amount").map_err(anyhow::Error::new)?,
        total_amount: row.try_get("total_amount").map_err(anyhow::Error::new)?,
        payment_method: payment_method.as_deref().map(PaymentMethod::from_str),
        items,
        journal_entry_id: row.try_get("journal_entry_id").map_err(anyhow::Error::new)?,
        attachments,
        created_utc: row.try_get("created_utc").map_err(anyhow::Error::new)?,
    })
}

fn row_to_period(row: &PgRow) -> Result<FiscalPeriod, StoreError> {
    Ok(FiscalPeriod {
        period_id: row.try_get("period_id").map_err(anyhow::Error::new)?,
        code: row.try_get("code").map_err(anyhow::Error::new)?,
        start_date: row.try_get("start_date").map_err(anyhow::Error::new)?,
        end_date: row.try_get("end_date").map_err(anyhow::Error::new)?,
        is_locked: row.try_get("is_locked").map_err(anyhow::Error::new)?,
        closed_at: row.try_get("closed_at").map_err(anyhow::Error::new)?,
        closed_by: row.try_get("closed_by").map_err(anyhow::Error::new)?,
    })
}

fn row_to_audit(row: &PgRow) -> Result<AuditLogEntry, StoreError> {
    let action: String = row.try_get("action").map_err(anyhow::Error::new)?;
    let entity_type: String = row.try_get("entity_type").map_err(anyhow::Error::new)?;
    Ok(AuditLogEntry {
        audit_id: row.try_get("audit_id").map_err(anyhow::Error::new)?,
        timestamp: row.try_get("ts").map_err(anyhow::Error::new)?,
        action: AuditAction::from_str(&action),
        entity_type: EntityKind::from_str(&entity_type),
        entity_id: row.try_get("entity_id").map_err(anyhow::Error::new)?,
        user_id: row.try_get("user_id").map_err(anyhow::Error::new)?,
        reason: row.try_get("reason").map_err(anyhow::Error::new)?,
        previous_state: row.try_get("previous_state").map_err(anyhow::Error::new)?,
        new_state: row.try_get("new_state").map_err(anyhow::Error::new)?,
    })
}

#[async_trait]
impl LedgerStore for PgStore {
    #[instrument(skip(self, input), fields(code = %input.code))]
    async fn create_account(&self, input: CreateAccount) -> Result<Account, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO accounts (account_id, code, name_local, name_alt, account_type, parent_id, is_active, sort_order)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7)
            RETURNING account_id, code, name_local, name_alt, account_type, parent_id, is_active, sort_order, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.code)
        .bind(&input.name_local)
        .bind(&input.name_alt)
        .bind(input.account_type.as_str())
        .bind(input.parent_id)
        .bind(input.sort_order)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                StoreError::DuplicateCode(input.code.clone())
            }
            _ => StoreError::backend(format!("Failed to create account: {e}")),
        })?;

        row_to_account(&row)
    }

    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT account_id, code, name_local, name_alt, account_type, parent_id, is_active, sort_order, created_utc
            FROM accounts
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::backend(format!("Failed to get account: {e}")))?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn get_account_by_code(&self, code: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT account_id, code, name_local, name_alt, account_type, parent_id, is_active, sort_order, created_utc
            FROM accounts
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::backend(format!("Failed to get account by code: {e}")))?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn list_accounts(&self, active_only: bool) -> Result<Vec<Account>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT account_id, code, name_local, name_alt, account_type, parent_id, is_active, sort_order, created_utc
            FROM accounts
            WHERE ($1 = FALSE OR is_active)
            ORDER BY sort_order, code
            "#,
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::backend(format!("Failed to list accounts: {e}")))?;

        rows.iter().map(row_to_account).collect()
    }

    async fn deactivate_account(&self, account_id: Uuid) -> Result<Account, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE accounts SET is_active = FALSE
            WHERE account_id = $1
            RETURNING account_id, code, name_local, name_alt, account_type, parent_id, is_active, sort_order, created_utc
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::backend(format!("Failed to deactivate account: {e}")))?;

        match row {
            Some(row) => row_to_account(&row),
            None => Err(StoreError::NotFound {
                entity: "account",
                id: account_id,
            }),
        }
    }

    async fn count_accounts(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::backend(format!("Failed to count accounts: {e}")))?;
        Ok(count as u64)
    }

    #[instrument(skip(self, new), fields(date = %new.date))]
    async fn create_entry(&self, new: NewJournalEntry) -> Result<JournalEntry, StoreError> {
        let lines_json = serde_json::to_value(&new.lines)
            .map_err(|e| StoreError::backend(format!("Failed to encode lines: {e}")))?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_create_entry(&new, &lines_json).await {
                Ok(entry) => return Ok(entry),
                Err(RetryableError::Transient(e)) if attempt < MAX_WRITE_ATTEMPTS => {
                    warn!(attempt = attempt, error = %e, "Retrying entry insert after serialization failure");
                }
                Err(RetryableError::Transient(e)) => {
                    return Err(StoreError::backend(format!("Failed to insert entry: {e}")))
                }
                Err(RetryableError::Fatal(e)) => return Err(e),
            }
        }
    }

    async fn get_entry(&self, entry_id: Uuid) -> Result<Option<JournalEntry>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT entry_id, serial_number, version, entry_date, lines, total_debit, total_credit,
                   description_local, description_alt, document_type, document_id,
                   contact_id, bank_account_id, property_id, project_id, status, replaced_by, created_utc
            FROM journal_entries
            WHERE entry_id = $1
            "#,
        )
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::backend(format!("Failed to get entry: {e}")))?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<JournalEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT entry_id, serial_number, version, entry_date, lines, total_debit, total_credit,
                   description_local, description_alt, document_type, document_id,
                   contact_id, bank_account_id, property_id, project_id, status, replaced_by, created_utc
            FROM journal_entries
            WHERE ($1::date IS NULL OR entry_date >= $1)
              AND ($2::date IS NULL OR entry_date <= $2)
              AND ($3::uuid IS NULL OR contact_id = $3)
              AND ($4::uuid IS NULL OR bank_account_id = $4)
              AND ($5::uuid IS NULL OR property_id = $5)
              AND ($6::uuid IS NULL OR project_id = $6)
              AND ($7 = TRUE OR (replaced_by IS NULL AND status <> 'cancelled'))
            ORDER BY entry_date, serial_number
            "#,
        )
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.contact_id)
        .bind(filter.bank_account_id)
        .bind(filter.property_id)
        .bind(filter.project_id)
        .bind(filter.include_non_current)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::backend(format!("Failed to list entries: {e}")))?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn mark_superseded(&self, entry_id: Uuid, replaced_by: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE journal_entries SET replaced_by = $2 WHERE entry_id = $1 AND replaced_by IS NULL",
        )
        .bind(entry_id)
        .bind(replaced_by)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::backend(format!("Failed to mark entry superseded: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "journal entry",
                id: entry_id,
            });
        }
        Ok(())
    }

    #[instrument(skip(self, new), fields(doc_type = new.doc_type.as_str()))]
    async fn create_document(&self, new: CreateDocument) -> Result<Document, StoreError> {
        let items_json = new
            .items
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::backend(format!("Failed to encode items: {e}")))?;
        let attachments_json = new
            .attachments
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::backend(format!("Failed to encode attachments: {e}")))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::backend(format!("Failed to begin transaction: {e}")))?;

        let serial =
            Self::allocate_serial(&mut tx, new.doc_type.serial_prefix(), new.date.year()).await?;

        let row = sqlx::query(
            r#"
            INSERT INTO documents (document_id, serial_number, doc_type, status, doc_date, due_date,
                                   contact_id, bank_account_id, property_id, project_id,
                                   amount, currency, vat_rate, vat_amount, total_amount,
                                   payment_method, items, attachments)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING document_id, serial_number, doc_type, status, doc_date, due_date,
                      contact_id, bank_account_id, property_id, project_id,
                      amount, currency, vat_rate, vat_amount, total_amount,
                      payment_method, items, journal_entry_id, attachments, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&serial)
        .bind(new.doc_type.as_str())
        .bind(new.status.as_str())
        .bind(new.date)
        .bind(new.due_date)
        .bind(new.contact_id)
        .bind(new.bank_account_id)
        .bind(new.property_id)
        .bind(new.project_id)
        .bind(new.amount)
        .bind(&new.currency)
        .bind(new.vat_rate)
        .bind(new.vat_amount)
        .bind(new.total_amount)
        .bind(new.payment_method.map(|m| m.as_str()))
        .bind(items_json)
        .bind(attachments_json)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StoreError::backend(format!("Failed to insert document: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::backend(format!("Failed to commit document: {e}")))?;

        row_to_document(&row)
    }

    async fn get_document(&self, document_id: Uuid) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT document_id, serial_number, doc_type, status, doc_date, due_date,
                   contact_id, bank_account_id, property_id, project_id,
                   amount, currency, vat_rate, vat_amount, total_amount,
                   payment_method, items, journal_entry_id, attachments, created_utc
            FROM documents
            WHERE document_id = $1
            "#,
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::backend(format!("Failed to get document: {e}")))?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT document_id, serial_number, doc_type, status, doc_date, due_date,
                   contact_id, bank_account_id, property_id, project_id,
                   amount, currency, vat_rate, vat_amount, total_amount,
                   payment_method, items, journal_entry_id, attachments, created_utc
            FROM documents
            WHERE ($1::date IS NULL OR doc_date >= $1)
              AND ($2::date IS NULL OR doc_date <= $2)
              AND ($3 = FALSE OR (journal_entry_id IS NULL
                                  AND status IN ('approved', 'paid')
                                  AND doc_type NOT IN ('quote', 'purchase_order', 'journal', 'other')))
            ORDER BY doc_date, serial_number
            "#,
        )
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.unposted_only)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::backend(format!("Failed to list documents: {e}")))?;

        rows.iter().map(row_to_document).collect()
    }

    async fn link_document_entry(
        &self,
        document_id: Uuid,
        entry_id: Uuid,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE documents SET journal_entry_id = $2 WHERE document_id = $1 AND journal_entry_id IS NULL",
        )
        .bind(document_id)
        .bind(entry_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::backend(format!("Failed to link document: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "document",
                id: document_id,
            });
        }
        Ok(())
    }

    async fn ensure_period(&self, period: FiscalPeriod) -> Result<FiscalPeriod, StoreError> {
        // Unique code constraint turns a concurrent create of the same year
        // into a conflict we resolve by re-reading.
        let inserted = sqlx::query(
            r#"
            INSERT INTO fiscal_periods (period_id, code, start_date, end_date, is_locked)
            VALUES ($1, $2, $3, $4, FALSE)
            ON CONFLICT (code) DO NOTHING
            RETURNING period_id, code, start_date, end_date, is_locked, closed_at, closed_by
            "#,
        )
        .bind(period.period_id)
        .bind(&period.code)
        .bind(period.start_date)
        .bind(period.end_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::backend(format!("Failed to insert period: {e}")))?;

        if let Some(row) = inserted {
            return row_to_period(&row);
        }

        match self.period_for_date(period.start_date).await? {
            Some(existing) => Ok(existing),
            None => Err(StoreError::backend("period insert raced and vanished")),
        }
    }

    async fn get_period(&self, period_id: Uuid) -> Result<Option<FiscalPeriod>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT period_id, code, start_date, end_date, is_locked, closed_at, closed_by
            FROM fiscal_periods
            WHERE period_id = $1
            "#,
        )
        .bind(period_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::backend(format!("Failed to get period: {e}")))?;

        row.as_ref().map(row_to_period).transpose()
    }

    async fn list_periods(&self) -> Result<Vec<FiscalPeriod>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT period_id, code, start_date, end_date, is_locked, closed_at, closed_by
            FROM fiscal_periods
            ORDER BY start_date
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::backend(format!("Failed to list periods: {e}")))?;

        rows.iter().map(row_to_period).collect()
    }

    async fn period_for_date(&self, date: NaiveDate) -> Result<Option<FiscalPeriod>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT period_id, code, start_date, end_date, is_locked, closed_at, closed_by
            FROM fiscal_periods
            WHERE start_date <= $1 AND end_date >= $1
            "#,
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::backend(format!("Failed to find period: {e}")))?;

        row.as_ref().map(row_to_period).transpose()
    }

    async fn lock_period(
        &self,
        period_id: Uuid,
        closed_by: Option<Uuid>,
        closed_at: DateTime<Utc>,
    ) -> Result<FiscalPeriod, StoreError> {
        // One-way flip: the WHERE clause never un-sets an existing lock, and
        // re-locking returns the current row unchanged.
        let row = sqlx::query(
            r#"
            UPDATE fiscal_periods
            SET is_locked = TRUE,
                closed_at = COALESCE(closed_at, $2),
                closed_by = COALESCE(closed_by, $3)
            WHERE period_id = $1
            RETURNING period_id, code, start_date, end_date, is_locked, closed_at, closed_by
            "#,
        )
        .bind(period_id)
        .bind(closed_at)
        .bind(closed_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::backend(format!("Failed to lock period: {e}")))?;

        match row {
            Some(row) => row_to_period(&row),
            None => Err(StoreError::NotFound {
                entity: "fiscal period",
                id: period_id,
            }),
        }
    }

    async fn append_audit(&self, entry: AuditLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (audit_id, ts, action, entity_type, entity_id, user_id, reason, previous_state, new_state)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.audit_id)
        .bind(entry.timestamp)
        .bind(entry.action.as_str())
        .bind(entry.entity_type.as_str())
        .bind(entry.entity_id)
        .bind(entry.user_id)
        .bind(&entry.reason)
        .bind(&entry.previous_state)
        .bind(&entry.new_state)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::backend(format!("Failed to append audit entry: {e}")))?;
        Ok(())
    }

    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditLogEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT audit_id, ts, action, entity_type, entity_id, user_id, reason, previous_state, new_state
            FROM audit_log
            ORDER BY ts DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::backend(format!("Failed to list audit log: {e}")))?;

        rows.iter().map(row_to_audit).collect()
    }
}

enum RetryableError {
    Transient(sqlx::Error),
    Fatal(StoreError),
}

impl PgStore {
    async fn try_create_entry(
        &self,
        new: &NewJournalEntry,
        lines_json: &serde_json::Value,
    ) -> Result<JournalEntry, RetryableError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            RetryableError::Fatal(StoreError::backend(format!(
                "Failed to begin transaction: {e}"
            )))
        })?;

        let serial = Self::allocate_serial(&mut tx, JOURNAL_ENTRY_PREFIX, new.date.year())
            .await
            .map_err(RetryableError::Fatal)?;

        let result = sqlx::query(
            r#"
            INSERT INTO journal_entries (entry_id, serial_number, version, entry_date, lines,
                                         total_debit, total_credit, description_local, description_alt,
                                         document_type, document_id, contact_id, bank_account_id,
                                         property_id, project_id, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING entry_id, serial_number, version, entry_date, lines, total_debit, total_credit,
                      description_local, description_alt, document_type, document_id,
                      contact_id, bank_account_id, property_id, project_id, status, replaced_by, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&serial)
        .bind(new.version)
        .bind(new.date)
        .bind(lines_json)
        .bind(new.total_debit)
        .bind(new.total_credit)
        .bind(&new.meta.description_local)
        .bind(&new.meta.description_alt)
        .bind(new.meta.document_type.map(|t| t.as_str()))
        .bind(new.meta.document_id)
        .bind(new.meta.contact_id)
        .bind(new.meta.bank_account_id)
        .bind(new.meta.property_id)
        .bind(new.meta.project_id)
        .bind(new.meta.status.unwrap_or(EntryStatus::Approved).as_str())
        .fetch_one(&mut *tx)
        .await;

        let row = match result {
            Ok(row) => row,
            Err(e) if is_serialization_failure(&e) => {
                tx.rollback().await.ok();
                return Err(RetryableError::Transient(e));
            }
            Err(e) => {
                tx.rollback().await.ok();
                return Err(RetryableError::Fatal(StoreError::backend(format!(
                    "Failed to insert entry: {e}"
                ))));
            }
        };

        tx.commit().await.map_err(|e| {
            if is_serialization_failure(&e) {
                RetryableError::Transient(e)
            } else {
                RetryableError::Fatal(StoreError::backend(format!("Failed to commit entry: {e}")))
            }
        })?;

        row_to_entry(&row).map_err(RetryableError::Fatal)
    }
}
