//! HTTP API for the ledger engine.
//!
//! Thin handlers: deserialize and validate the request, call the service,
//! map the domain error onto a status code. No business rules live here.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::config::AccountingConfig;
use crate::models::{
    AccountType, CreateAccount, CreateDocument, DocumentItem, DocumentStatus, DocumentType,
    EntryMeta, JournalLine, PaymentMethod,
};
use crate::services::{
    AnomalyDetector, DocumentBridge, Ledger, LedgerError, ReportEngine,
};
use crate::store::EntryFilter;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: AccountingConfig,
    pub ledger: Ledger,
    pub documents: DocumentBridge,
    pub reports: ReportEngine,
    pub anomalies: AnomalyDetector,
}

/// API-facing error wrapper; keeps `LedgerError` free of HTTP concerns.
pub struct ApiError(LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LedgerError::UnbalancedEntry { .. }
            | LedgerError::TooFewLines
            | LedgerError::InvalidLine { .. }
            | LedgerError::InvalidDocument(_)
            | LedgerError::UnknownAccount(_) => StatusCode::BAD_REQUEST,
            LedgerError::PeriodLocked { .. }
            | LedgerError::DuplicateCode(_)
            | LedgerError::AlreadySuperseded(_) => StatusCode::CONFLICT,
            LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
            LedgerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, "Request rejected");
        }
        let body = Json(json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        }));
        (status, body).into_response()
    }
}

/// 422 with field details, mirroring the shape `ApiError` produces.
fn validation_response(errors: validator::ValidationErrors) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({
            "error": "validation failed",
            "kind": "validation",
            "details": errors,
        })),
    )
        .into_response()
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// -- request / query types ---------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAccountRequest {
    #[validate(length(min = 1, max = 16))]
    pub code: String,
    #[validate(length(min = 1, max = 128))]
    pub name_local: String,
    pub name_alt: Option<String>,
    pub account_type: AccountType,
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub sort_order: i32,
}

// Serialize: validator embeds the offending value in its error params.
#[derive(Debug, Serialize, Deserialize)]
pub struct LineInput {
    pub account_id: Uuid,
    #[serde(default)]
    pub debit: Decimal,
    #[serde(default)]
    pub credit: Decimal,
    pub description_local: Option<String>,
    pub description_alt: Option<String>,
}

impl From<LineInput> for JournalLine {
    fn from(input: LineInput) -> Self {
        JournalLine {
            account_id: input.account_id,
            debit: input.debit,
            credit: input.credit,
            description_local: input.description_local,
            description_alt: input.description_alt,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEntryRequest {
    pub date: NaiveDate,
    #[validate(length(min = 2))]
    pub lines: Vec<LineInput>,
    pub description_local: Option<String>,
    pub description_alt: Option<String>,
    pub contact_id: Option<Uuid>,
    pub bank_account_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
}

impl CreateEntryRequest {
    fn into_parts(self) -> (NaiveDate, Vec<JournalLine>, EntryMeta) {
        let meta = EntryMeta {
            description_local: self.description_local,
            description_alt: self.description_alt,
            contact_id: self.contact_id,
            bank_account_id: self.bank_account_id,
            property_id: self.property_id,
            project_id: self.project_id,
            ..Default::default()
        };
        (self.date, self.lines.into_iter().map(Into::into).collect(), meta)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDocumentRequest {
    pub doc_type: DocumentType,
    pub status: Option<DocumentStatus>,
    pub date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub contact_id: Option<Uuid>,
    pub bank_account_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub amount: Decimal,
    #[validate(length(min = 3, max = 3))]
    #[serde(default = "default_currency")]
    pub currency: String,
    pub vat_rate: Option<Decimal>,
    pub vat_amount: Option<Decimal>,
    pub total_amount: Decimal,
    pub payment_method: Option<PaymentMethod>,
    pub items: Option<Vec<DocumentItem>>,
    pub attachments: Option<Vec<String>>,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl From<CreateDocumentRequest> for CreateDocument {
    fn from(req: CreateDocumentRequest) -> Self {
        CreateDocument {
            doc_type: req.doc_type,
            status: req.status.unwrap_or(DocumentStatus::Draft),
            date: req.date,
            due_date: req.due_date,
            contact_id: req.contact_id,
            bank_account_id: req.bank_account_id,
            property_id: req.property_id,
            project_id: req.project_id,
            amount: req.amount,
            currency: req.currency,
            vat_rate: req.vat_rate,
            vat_amount: req.vat_amount,
            total_amount: req.total_amount,
            payment_method: req.payment_method,
            items: req.items,
            attachments: req.attachments,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LockPeriodRequest {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AccountsQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct EntriesQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub contact_id: Option<Uuid>,
    pub bank_account_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub include_superseded: bool,
}

impl From<EntriesQuery> for EntryFilter {
    fn from(q: EntriesQuery) -> Self {
        EntryFilter {
            from: q.from,
            to: q.to,
            contact_id: q.contact_id,
            bank_account_id: q.bank_account_id,
            property_id: q.property_id,
            project_id: q.project_id,
            include_non_current: q.include_superseded,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AsOfQuery {
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct TrialBalanceQuery {
    pub from: Option<NaiveDate>,
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

// -- handlers ------------------------------------------------------------------

async fn list_accounts(
    State(state): State<AppState>,
    Query(query): Query<AccountsQuery>,
) -> ApiResult<Vec<crate::models::Account>> {
    Ok(Json(state.ledger.list_accounts(query.active_only).await?))
}

async fn create_account(
    State(state): State<AppState>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<Response, ApiError> {
    if let Err(errors) = req.validate() {
        return Ok(validation_response(errors));
    }
    let account = state
        .ledger
        .create_account(CreateAccount {
            code: req.code,
            name_local: req.name_local,
            name_alt: req.name_alt,
            account_type: req.account_type,
            parent_id: req.parent_id,
            sort_order: req.sort_order,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(account)).into_response())
}

async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> ApiResult<crate::models::Account> {
    Ok(Json(state.ledger.get_account(account_id).await?))
}

async fn deactivate_account(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> ApiResult<crate::models::Account> {
    Ok(Json(state.ledger.deactivate_account(account_id).await?))
}

async fn account_balance(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    Query(query): Query<AsOfQuery>,
) -> ApiResult<crate::services::AccountBalance> {
    Ok(Json(
        state.reports.account_balance(account_id, query.as_of).await?,
    ))
}

async fn list_entries(
    State(state): State<AppState>,
    Query(query): Query<EntriesQuery>,
) -> ApiResult<Vec<crate::models::JournalEntry>> {
    Ok(Json(state.ledger.entries(&query.into()).await?))
}

async fn get_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
) -> ApiResult<crate::models::JournalEntry> {
    Ok(Json(state.ledger.get_entry(entry_id).await?))
}

async fn post_entry(
    State(state): State<AppState>,
    Json(req): Json<CreateEntryRequest>,
) -> Result<Response, ApiError> {
    if let Err(errors) = req.validate() {
        return Ok(validation_response(errors));
    }
    let (date, lines, meta) = req.into_parts();
    let entry = state.ledger.post_entry(date, lines, meta).await?;
    Ok((StatusCode::CREATED, Json(entry)).into_response())
}

async fn correct_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
    Json(req): Json<CreateEntryRequest>,
) -> Result<Response, ApiError> {
    if let Err(errors) = req.validate() {
        return Ok(validation_response(errors));
    }
    let (date, lines, meta) = req.into_parts();
    let replacement = state.ledger.correct_entry(entry_id, date, lines, meta).await?;
    Ok((StatusCode::CREATED, Json(replacement)).into_response())
}

async fn create_document(
    State(state): State<AppState>,
    Json(req): Json<CreateDocumentRequest>,
) -> Result<Response, ApiError> {
    if let Err(errors) = req.validate() {
        return Ok(validation_response(errors));
    }
    let document = state.documents.create_document(req.into()).await?;
    Ok((StatusCode::CREATED, Json(document)).into_response())
}

async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> ApiResult<crate::models::Document> {
    Ok(Json(state.documents.get_document(document_id).await?))
}

async fn list_documents(
    State(state): State<AppState>,
) -> ApiResult<Vec<crate::models::Document>> {
    Ok(Json(state.documents.documents(&Default::default()).await?))
}

async fn list_unposted_documents(
    State(state): State<AppState>,
) -> ApiResult<Vec<crate::models::Document>> {
    Ok(Json(state.documents.unposted_documents().await?))
}

async fn post_unposted_documents(State(state): State<AppState>) -> ApiResult<serde_json::Value> {
    let posted = state.documents.post_unposted_documents().await?;
    Ok(Json(json!({ "posted": posted })))
}

async fn list_periods(
    State(state): State<AppState>,
) -> ApiResult<Vec<crate::models::FiscalPeriod>> {
    Ok(Json(state.ledger.periods().await?))
}

async fn lock_period(
    State(state): State<AppState>,
    Path(period_id): Path<Uuid>,
    Json(req): Json<LockPeriodRequest>,
) -> ApiResult<crate::models::FiscalPeriod> {
    Ok(Json(state.ledger.lock_period(period_id, req.user_id).await?))
}

async fn trial_balance(
    State(state): State<AppState>,
    Query(query): Query<TrialBalanceQuery>,
) -> ApiResult<crate::services::TrialBalance> {
    Ok(Json(state.reports.trial_balance(query.from, query.as_of).await?))
}

async fn income_statement(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<crate::services::IncomeStatement> {
    Ok(Json(state.reports.income_statement(query.from, query.to).await?))
}

async fn balance_sheet(
    State(state): State<AppState>,
    Query(query): Query<AsOfQuery>,
) -> ApiResult<crate::services::BalanceSheet> {
    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());
    Ok(Json(state.reports.balance_sheet(as_of).await?))
}

async fn cash_flow(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<crate::services::CashFlowStatement> {
    Ok(Json(state.reports.cash_flow(query.from, query.to).await?))
}

async fn account_ledger(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    Query(query): Query<LedgerQuery>,
) -> ApiResult<crate::services::AccountLedger> {
    Ok(Json(
        state
            .reports
            .account_ledger(account_id, query.from, query.to)
            .await?,
    ))
}

async fn bank_ledger(
    State(state): State<AppState>,
    Path(bank_account_id): Path<Uuid>,
    Query(query): Query<LedgerQuery>,
) -> ApiResult<crate::services::DimensionLedger> {
    let filter = EntryFilter {
        from: query.from,
        to: query.to,
        bank_account_id: Some(bank_account_id),
        ..Default::default()
    };
    Ok(Json(state.reports.dimension_ledger(&filter).await?))
}

async fn dimension_ledger(
    State(state): State<AppState>,
    Query(query): Query<EntriesQuery>,
) -> ApiResult<crate::services::DimensionLedger> {
    Ok(Json(state.reports.dimension_ledger(&query.into()).await?))
}

async fn audit_log(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Vec<crate::models::AuditLogEntry>> {
    let limit = query.limit.unwrap_or(100).min(1000);
    Ok(Json(state.ledger.audit_log(limit).await?))
}

async fn anomalies(State(state): State<AppState>) -> ApiResult<Vec<crate::services::Anomaly>> {
    Ok(Json(state.anomalies.scan().await?))
}

/// Domain routes. Health/readiness/metrics are layered on in startup.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/accounts", get(list_accounts).post(create_account))
        .route("/accounts/:id", get(get_account))
        .route("/accounts/:id/deactivate", post(deactivate_account))
        .route("/accounts/:id/balance", get(account_balance))
        .route("/accounts/:id/ledger", get(account_ledger))
        .route("/journal-entries", get(list_entries).post(post_entry))
        .route("/journal-entries/:id", get(get_entry))
        .route("/journal-entries/:id/correct", post(correct_entry))
        .route("/documents", get(list_documents).post(create_document))
        .route("/documents/unposted", get(list_unposted_documents))
        .route("/documents/post-unposted", post(post_unposted_documents))
        .route("/documents/:id", get(get_document))
        .route("/periods", get(list_periods))
        .route("/periods/:id/lock", post(lock_period))
        .route("/reports/trial-balance", get(trial_balance))
        .route("/reports/income-statement", get(income_statement))
        .route("/reports/balance-sheet", get(balance_sheet))
        .route("/reports/cash-flow", get(cash_flow))
        .route("/ledgers/bank/:id", get(bank_ledger))
        .route("/ledgers/dimension", get(dimension_ledger))
        .route("/audit-log", get(audit_log))
        .route("/anomalies", get(anomalies))
        .with_state(state)
}
