//! Business document model (invoices, receipts, cheques, ...).
//!
//! Documents are the business-facing records the surrounding suite creates;
//! posting derives a balanced journal entry from a document and links the two.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entry::balance_epsilon;

/// Document type. See [`DocumentType::posts_to_ledger`] for which types the
/// posting sweep handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    Receipt,
    Quote,
    Deposit,
    Payment,
    Journal,
    CreditNote,
    DebitNote,
    PurchaseInvoice,
    PurchaseOrder,
    Other,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Receipt => "receipt",
            Self::Quote => "quote",
            Self::Deposit => "deposit",
            Self::Payment => "payment",
            Self::Journal => "journal",
            Self::CreditNote => "credit_note",
            Self::DebitNote => "debit_note",
            Self::PurchaseInvoice => "purchase_invoice",
            Self::PurchaseOrder => "purchase_order",
            Self::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "invoice" => Self::Invoice,
            "receipt" => Self::Receipt,
            "quote" => Self::Quote,
            "deposit" => Self::Deposit,
            "payment" => Self::Payment,
            "journal" => Self::Journal,
            "credit_note" => Self::CreditNote,
            "debit_note" => Self::DebitNote,
            "purchase_invoice" => Self::PurchaseInvoice,
            "purchase_order" => Self::PurchaseOrder,
            _ => Self::Other,
        }
    }

    /// Whether a posting rule exists for this type. Quotes and purchase
    /// orders carry no financial effect; journal and other documents are
    /// posted directly as manual entries, never by the sweep.
    pub fn posts_to_ledger(&self) -> bool {
        !matches!(
            self,
            Self::Quote | Self::PurchaseOrder | Self::Journal | Self::Other
        )
    }

    /// Serial number prefix for this document type.
    pub fn serial_prefix(&self) -> &'static str {
        match self {
            Self::Invoice => "INV",
            Self::Receipt => "RCT",
            Self::Quote => "QTE",
            Self::Deposit => "DEP",
            Self::Payment => "PAY",
            Self::Journal => "JOU",
            Self::CreditNote => "CRN",
            Self::DebitNote => "DBN",
            Self::PurchaseInvoice => "PIN",
            Self::PurchaseOrder => "PON",
            Self::Other => "DOC",
        }
    }
}

/// Document lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Draft,
    Approved,
    Paid,
    Cancelled,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Approved => "approved",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "approved" => Self::Approved,
            "paid" => Self::Paid,
            "cancelled" => Self::Cancelled,
            _ => Self::Draft,
        }
    }

    /// Approved and paid documents are eligible for ledger posting.
    pub fn is_postable(&self) -> bool {
        matches!(self, Self::Approved | Self::Paid)
    }
}

/// How money moved, selecting the cash-side account when posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Cheque,
    Card,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::BankTransfer => "bank_transfer",
            Self::Cheque => "cheque",
            Self::Card => "card",
            Self::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "cash" => Self::Cash,
            "bank_transfer" => Self::BankTransfer,
            "cheque" => Self::Cheque,
            "card" => Self::Card,
            _ => Self::Other,
        }
    }
}

/// Itemized document line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// Business document. `journal_entry_id` is set exactly once, when the
/// document is posted to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: Uuid,
    pub serial_number: String,
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    pub date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub contact_id: Option<Uuid>,
    pub bank_account_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub amount: Decimal,
    pub currency: String,
    pub vat_rate: Option<Decimal>,
    pub vat_amount: Option<Decimal>,
    pub total_amount: Decimal,
    pub payment_method: Option<PaymentMethod>,
    pub items: Option<Vec<DocumentItem>>,
    pub journal_entry_id: Option<Uuid>,
    pub attachments: Option<Vec<String>>,
    pub created_utc: DateTime<Utc>,
}

impl Document {
    /// An approved/paid document of a postable type without a linked entry
    /// is the detectable "unposted approved" condition, recovered by the
    /// posting sweep. Types without a posting rule never count: they would
    /// sit in the queue forever.
    pub fn is_unposted(&self) -> bool {
        self.doc_type.posts_to_ledger()
            && self.status.is_postable()
            && self.journal_entry_id.is_none()
    }
}

/// Input for creating a document.
#[derive(Debug, Clone)]
pub struct CreateDocument {
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    pub date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub contact_id: Option<Uuid>,
    pub bank_account_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub amount: Decimal,
    pub currency: String,
    pub vat_rate: Option<Decimal>,
    pub vat_amount: Option<Decimal>,
    pub total_amount: Decimal,
    pub payment_method: Option<PaymentMethod>,
    pub items: Option<Vec<DocumentItem>>,
    pub attachments: Option<Vec<String>>,
}

impl CreateDocument {
    /// Materialize the persisted document once the store has allocated its
    /// identity and serial number.
    pub fn into_document(
        self,
        document_id: Uuid,
        serial_number: String,
        created_utc: DateTime<Utc>,
    ) -> Document {
        Document {
            document_id,
            serial_number,
            doc_type: self.doc_type,
            status: self.status,
            date: self.date,
            due_date: self.due_date,
            contact_id: self.contact_id,
            bank_account_id: self.bank_account_id,
            property_id: self.property_id,
            project_id: self.project_id,
            amount: self.amount,
            currency: self.currency,
            vat_rate: self.vat_rate,
            vat_amount: self.vat_amount,
            total_amount: self.total_amount,
            payment_method: self.payment_method,
            items: self.items,
            journal_entry_id: None,
            attachments: self.attachments,
            created_utc,
        }
    }

    /// Check document-level invariants: total = amount + vat, and when items
    /// are present the amount equals the item sum (both within tolerance).
    pub fn validate_amounts(&self) -> Result<(), String> {
        let vat = self.vat_amount.unwrap_or(Decimal::ZERO);
        if (self.total_amount - (self.amount + vat)).abs() > balance_epsilon() {
            return Err(format!(
                "total_amount {} does not equal amount {} + vat {}",
                self.total_amount, self.amount, vat
            ));
        }
        if let Some(items) = &self.items {
            let item_sum: Decimal = items.iter().map(|i| i.quantity * i.unit_price).sum();
            if (self.amount - item_sum).abs() > balance_epsilon() {
                return Err(format!(
                    "amount {} does not equal item sum {}",
                    self.amount, item_sum
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_doc() -> CreateDocument {
        CreateDocument {
            doc_type: DocumentType::Invoice,
            status: DocumentStatus::Draft,
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            due_date: None,
            contact_id: None,
            bank_account_id: None,
            property_id: None,
            project_id: None,
            amount: Decimal::new(10000, 2),
            currency: "USD".to_string(),
            vat_rate: None,
            vat_amount: None,
            total_amount: Decimal::new(10000, 2),
            payment_method: None,
            items: None,
            attachments: None,
        }
    }

    #[test]
    fn total_must_equal_amount_plus_vat() {
        let mut doc = base_doc();
        assert!(doc.validate_amounts().is_ok());

        doc.vat_amount = Some(Decimal::new(500, 2));
        assert!(doc.validate_amounts().is_err());

        doc.total_amount = Decimal::new(10500, 2);
        assert!(doc.validate_amounts().is_ok());
    }

    #[test]
    fn items_must_sum_to_amount() {
        let mut doc = base_doc();
        doc.items = Some(vec![
            DocumentItem {
                description: "Rent March".to_string(),
                quantity: Decimal::ONE,
                unit_price: Decimal::new(8000, 2),
            },
            DocumentItem {
                description: "Parking".to_string(),
                quantity: Decimal::TWO,
                unit_price: Decimal::new(1000, 2),
            },
        ]);
        assert!(doc.validate_amounts().is_ok());

        doc.amount = Decimal::new(9000, 2);
        doc.total_amount = Decimal::new(9000, 2);
        assert!(doc.validate_amounts().is_err());
    }
}
