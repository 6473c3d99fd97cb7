//! Document-to-ledger bridge.
//!
//! Documents are created first and gain financial effect only when the
//! posting sweep derives a balanced journal entry for them. "Approved but
//! unposted" is therefore a queryable state, recovered by the next sweep,
//! never a silent inconsistency.

use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::models::{
    AuditAction, CreateDocument, Document, DocumentStatus, DocumentType, EntityKind, EntryMeta,
    EntryStatus, JournalLine, PaymentMethod,
};
use crate::store::{DocumentFilter, LedgerStore};

use super::error::LedgerError;
use super::events::{ChangeNotifier, EntityClass};
use super::ledger::Ledger;
use super::metrics::{DOCUMENTS_CREATED_TOTAL, DOCUMENTS_POSTED_TOTAL};

/// Which side the VAT line lands on. Sales VAT is a credit on VAT payable;
/// purchase VAT debits the same account (input VAT offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VatSide {
    Debit,
    Credit,
}

/// Account selection for one side of a derived entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountRule {
    /// A fixed seed-chart code.
    Code(&'static str),
    /// The cash-side account implied by the payment method.
    CashSide,
}

/// Data-driven mapping from document to debit/credit accounts. New document
/// types are configuration here, not new code paths.
#[derive(Debug, Clone, Copy)]
pub struct PostingRule {
    pub debit: AccountRule,
    pub credit: AccountRule,
    pub vat_on: Option<VatSide>,
}

/// Cash-side account code for a payment method. Cheques land on the
/// cheques-receivable clearing account until they clear.
fn cash_side_code(method: Option<PaymentMethod>) -> &'static str {
    match method {
        Some(PaymentMethod::Cash) => "1000",
        Some(PaymentMethod::Cheque) => "1150",
        Some(PaymentMethod::BankTransfer) | Some(PaymentMethod::Card) => "1020",
        Some(PaymentMethod::Other) | None => "1020",
    }
}

/// The mapping table. `None` marks document types that never reach the
/// ledger (quotes, purchase orders) or that are posted directly as manual
/// journal entries.
pub fn posting_rule(doc_type: DocumentType) -> Option<PostingRule> {
    match doc_type {
        DocumentType::Invoice => Some(PostingRule {
            debit: AccountRule::Code("1200"),
            credit: AccountRule::Code("4000"),
            vat_on: Some(VatSide::Credit),
        }),
        DocumentType::Receipt => Some(PostingRule {
            debit: AccountRule::CashSide,
            credit: AccountRule::Code("4000"),
            vat_on: Some(VatSide::Credit),
        }),
        DocumentType::Deposit => Some(PostingRule {
            debit: AccountRule::CashSide,
            credit: AccountRule::Code("2200"),
            vat_on: None,
        }),
        DocumentType::Payment => Some(PostingRule {
            debit: AccountRule::Code("5000"),
            credit: AccountRule::CashSide,
            vat_on: Some(VatSide::Debit),
        }),
        DocumentType::PurchaseInvoice => Some(PostingRule {
            debit: AccountRule::Code("5000"),
            credit: AccountRule::Code("2100"),
            vat_on: Some(VatSide::Debit),
        }),
        DocumentType::CreditNote => Some(PostingRule {
            debit: AccountRule::Code("4000"),
            credit: AccountRule::Code("1200"),
            vat_on: Some(VatSide::Debit),
        }),
        DocumentType::DebitNote => Some(PostingRule {
            debit: AccountRule::Code("1200"),
            credit: AccountRule::Code("4000"),
            vat_on: Some(VatSide::Credit),
        }),
        DocumentType::Quote
        | DocumentType::PurchaseOrder
        | DocumentType::Journal
        | DocumentType::Other => None,
    }
}

/// VAT payable / input VAT account.
const VAT_ACCOUNT: &str = "2300";

/// Accepts business documents and derives their ledger effect.
#[derive(Clone)]
pub struct DocumentBridge {
    store: Arc<dyn LedgerStore>,
    ledger: Ledger,
    notifier: ChangeNotifier,
}

impl DocumentBridge {
    pub fn new(store: Arc<dyn LedgerStore>, ledger: Ledger, notifier: ChangeNotifier) -> Self {
        Self {
            store,
            ledger,
            notifier,
        }
    }

    /// Validate and persist a document. Posting to the ledger is a separate,
    /// explicit step.
    #[instrument(skip(self, input), fields(doc_type = input.doc_type.as_str()))]
    pub async fn create_document(&self, input: CreateDocument) -> Result<Document, LedgerError> {
        input
            .validate_amounts()
            .map_err(LedgerError::InvalidDocument)?;
        if input.amount < Decimal::ZERO || input.total_amount < Decimal::ZERO {
            return Err(LedgerError::InvalidDocument(
                "document amounts must not be negative".into(),
            ));
        }

        let document = self.store.create_document(input).await?;
        DOCUMENTS_CREATED_TOTAL
            .with_label_values(&[document.doc_type.as_str()])
            .inc();
        info!(serial = %document.serial_number, "Document created");
        self.ledger
            .audit(
                AuditAction::Create,
                EntityKind::Document,
                document.document_id,
                None,
                None,
                None,
                Some(json!({
                    "serial_number": document.serial_number,
                    "doc_type": document.doc_type.as_str(),
                    "total_amount": document.total_amount,
                })),
            )
            .await;
        self.notifier.publish(EntityClass::Documents);
        Ok(document)
    }

    pub async fn get_document(&self, document_id: uuid::Uuid) -> Result<Document, LedgerError> {
        self.store
            .get_document(document_id)
            .await?
            .ok_or(LedgerError::NotFound {
                entity: "document",
                id: document_id,
            })
    }

    pub async fn documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>, LedgerError> {
        Ok(self.store.list_documents(filter).await?)
    }

    /// Approved/paid documents of postable types still lacking a journal
    /// entry, the detectable "unposted approved" condition.
    pub async fn unposted_documents(&self) -> Result<Vec<Document>, LedgerError> {
        self.documents(&DocumentFilter {
            unposted_only: true,
            ..Default::default()
        })
        .await
    }

    /// Sweep all unposted approved/paid documents into the ledger. Returns
    /// the number posted; a second sweep with no new documents posts zero.
    /// One failing document is logged and skipped so it cannot block the
    /// rest of the sweep.
    #[instrument(skip(self))]
    pub async fn post_unposted_documents(&self) -> Result<u32, LedgerError> {
        let unposted = self.unposted_documents().await?;
        let mut posted = 0u32;

        for document in unposted {
            match self.post_document(&document).await {
                Ok(true) => posted += 1,
                Ok(false) => {} // non-postable type, left alone
                Err(e) => {
                    warn!(
                        serial = %document.serial_number,
                        error = %e,
                        "Failed to post document, skipping"
                    );
                }
            }
        }

        if posted > 0 {
            info!(posted = posted, "Posted documents to ledger");
            self.notifier.publish(EntityClass::Documents);
        }
        Ok(posted)
    }

    /// Derive and post the entry for one document, then link it.
    async fn post_document(&self, document: &Document) -> Result<bool, LedgerError> {
        let Some(rule) = posting_rule(document.doc_type) else {
            return Ok(false);
        };

        let lines = self.build_lines(document, &rule).await?;
        let meta = EntryMeta {
            description_local: Some(format!(
                "{} {}",
                document.doc_type.as_str(),
                document.serial_number
            )),
            description_alt: None,
            document_type: Some(document.doc_type),
            document_id: Some(document.document_id),
            contact_id: document.contact_id,
            bank_account_id: document.bank_account_id,
            property_id: document.property_id,
            project_id: document.project_id,
            status: Some(match document.status {
                DocumentStatus::Paid => EntryStatus::Paid,
                _ => EntryStatus::Approved,
            }),
        };

        let entry = self.ledger.post_entry(document.date, lines, meta).await?;
        self.store
            .link_document_entry(document.document_id, entry.entry_id)
            .await?;
        DOCUMENTS_POSTED_TOTAL
            .with_label_values(&[document.doc_type.as_str()])
            .inc();
        Ok(true)
    }

    async fn resolve(&self, rule: AccountRule, document: &Document) -> Result<uuid::Uuid, LedgerError> {
        let code = match rule {
            AccountRule::Code(code) => code,
            AccountRule::CashSide => cash_side_code(document.payment_method),
        };
        let account = self
            .store
            .get_account_by_code(code)
            .await?
            .ok_or_else(|| {
                LedgerError::InvalidDocument(format!("posting rule references missing account {code}"))
            })?;
        Ok(account.account_id)
    }

    async fn build_lines(
        &self,
        document: &Document,
        rule: &PostingRule,
    ) -> Result<Vec<JournalLine>, LedgerError> {
        let debit_account = self.resolve(rule.debit, document).await?;
        let credit_account = self.resolve(rule.credit, document).await?;

        let vat = document.vat_amount.unwrap_or(Decimal::ZERO);
        let line = |account_id, debit, credit| JournalLine {
            account_id,
            debit,
            credit,
            description_local: None,
            description_alt: None,
        };

        let mut lines = Vec::with_capacity(3);
        match rule.vat_on {
            Some(side) if vat > Decimal::ZERO => {
                let vat_account = self
                    .store
                    .get_account_by_code(VAT_ACCOUNT)
                    .await?
                    .ok_or_else(|| {
                        LedgerError::InvalidDocument("VAT account missing from chart".into())
                    })?
                    .account_id;
                match side {
                    VatSide::Credit => {
                        // Sales: gross on the debit side, net + VAT credited.
                        lines.push(line(debit_account, document.total_amount, Decimal::ZERO));
                        lines.push(line(credit_account, Decimal::ZERO, document.amount));
                        lines.push(line(vat_account, Decimal::ZERO, vat));
                    }
                    VatSide::Debit => {
                        // Purchases: net + input VAT debited, gross credited.
                        lines.push(line(debit_account, document.amount, Decimal::ZERO));
                        lines.push(line(vat_account, vat, Decimal::ZERO));
                        lines.push(line(credit_account, Decimal::ZERO, document.total_amount));
                    }
                }
            }
            _ => {
                lines.push(line(debit_account, document.total_amount, Decimal::ZERO));
                lines.push(line(credit_account, Decimal::ZERO, document.total_amount));
            }
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_and_purchase_orders_never_post() {
        assert!(posting_rule(DocumentType::Quote).is_none());
        assert!(posting_rule(DocumentType::PurchaseOrder).is_none());
    }

    // The rule table and the unposted-queue filter must agree, or rule-less
    // documents pile up in the queue with no sweep able to clear them.
    #[test]
    fn rule_table_agrees_with_postable_types() {
        let all = [
            DocumentType::Invoice,
            DocumentType::Receipt,
            DocumentType::Quote,
            DocumentType::Deposit,
            DocumentType::Payment,
            DocumentType::Journal,
            DocumentType::CreditNote,
            DocumentType::DebitNote,
            DocumentType::PurchaseInvoice,
            DocumentType::PurchaseOrder,
            DocumentType::Other,
        ];
        for doc_type in all {
            assert_eq!(
                posting_rule(doc_type).is_some(),
                doc_type.posts_to_ledger(),
                "{}",
                doc_type.as_str()
            );
        }
    }

    #[test]
    fn receipt_cash_side_follows_payment_method() {
        assert_eq!(cash_side_code(Some(PaymentMethod::BankTransfer)), "1020");
        assert_eq!(cash_side_code(Some(PaymentMethod::Cheque)), "1150");
        assert_eq!(cash_side_code(Some(PaymentMethod::Cash)), "1000");
        assert_eq!(cash_side_code(None), "1020");
    }

    #[test]
    fn invoice_rule_debits_receivables() {
        let rule = posting_rule(DocumentType::Invoice).unwrap();
        assert_eq!(rule.debit, AccountRule::Code("1200"));
        assert_eq!(rule.credit, AccountRule::Code("4000"));
        assert_eq!(rule.vat_on, Some(VatSide::Credit));
    }

    #[test]
    fn credit_note_reverses_invoice() {
        let invoice = posting_rule(DocumentType::Invoice).unwrap();
        let credit_note = posting_rule(DocumentType::CreditNote).unwrap();
        assert_eq!(invoice.debit, credit_note.credit);
        assert_eq!(invoice.credit, credit_note.debit);
    }
}
