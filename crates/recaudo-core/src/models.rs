//! Domain models for Recaudo

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Quantize a money amount to the canonical two-decimal form.
///
/// Amounts are stored and compared in this form; two values that differ only
/// in scale ("100" vs "100.00") produce the same key and the same stored text.
pub fn quantize(valor: Decimal) -> Decimal {
    let mut q = valor.round_dp(2);
    q.rescale(2);
    q
}

/// A client (payer) identified by their document number
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    /// Uppercase, letters and spaces only
    pub name: String,
    /// Alphanumeric plus hyphen; natural key for imports
    pub dni: String,
    pub created_at: DateTime<Utc>,
}

/// A bank where receipts arrive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bank {
    pub id: i64,
    pub name: String,
}

/// A seller associated with transactions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seller {
    pub id: i64,
    pub name: String,
}

/// A transaction classification (e.g. "SIN DEFINIR")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionType {
    pub id: i64,
    pub name: String,
}

/// Where a receipt originated (transfer channel, teller, credit note...).
/// `effective_days` is the number of business days until funds clear.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSource {
    pub id: i64,
    pub name: String,
    pub effective_days: i64,
}

/// Transaction lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Invoiced,
    Voided,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pendiente",
            Self::Invoiced => "facturado",
            Self::Voided => "anulado",
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pendiente" | "pending" => Ok(Self::Pending),
            "facturado" | "invoiced" => Ok(Self::Invoiced),
            "anulado" | "voided" => Ok(Self::Voided),
            _ => Err(format!("Unknown transaction status: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Receipt approval status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pendiente",
            Self::Approved => "aprobado",
            Self::Rejected => "rechazado",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pendiente" | "pending" => Ok(Self::Pending),
            "aprobado" | "approved" => Ok(Self::Approved),
            "rechazado" | "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown payment status: {}", s)),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A billable sale/charge event that receipts pay toward
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    /// Human-readable id, assigned exactly once right after the first insert
    pub unique_transaction_id: String,
    pub date: NaiveDate,
    pub client_id: Option<i64>,
    pub seller_id: Option<i64>,
    pub transaction_type_id: Option<i64>,
    pub description: Option<String>,
    pub status: TransactionStatus,
    pub invoice_number: Option<String>,
    /// Who attached the invoice number
    pub invoiced_by: Option<String>,
    pub expected_amount: Decimal,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A new transaction before insertion
#[derive(Debug, Clone, Default)]
pub struct NewTransaction {
    pub date: NaiveDate,
    pub client_id: Option<i64>,
    pub seller_id: Option<i64>,
    pub transaction_type_id: Option<i64>,
    pub description: Option<String>,
    pub expected_amount: Decimal,
}

/// An incoming payment record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: i64,
    pub fecha: NaiveDate,
    pub hora: NaiveTime,
    /// Receipt/voucher number as printed by the bank
    pub comprobante: String,
    pub client_id: Option<i64>,
    pub bank_id: i64,
    pub source_id: Option<i64>,
    /// Negative only for credit-note balancing adjustments
    pub valor: Decimal,
    pub payment_status: PaymentStatus,
    /// None means the receipt is a free credit not yet applied anywhere
    pub transaction_id: Option<i64>,
    /// Sibling receipt in a credit-note pair
    pub linked_credit_note: Option<i64>,
    pub description: Option<String>,
    pub uploaded_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// A new receipt before insertion
#[derive(Debug, Clone, Serialize)]
pub struct NewReceipt {
    pub fecha: NaiveDate,
    pub hora: NaiveTime,
    pub comprobante: String,
    pub client_id: Option<i64>,
    pub bank_id: i64,
    pub source_id: Option<i64>,
    pub valor: Decimal,
    pub payment_status: PaymentStatus,
    pub transaction_id: Option<i64>,
    pub description: Option<String>,
    pub uploaded_by: Option<String>,
}

/// How a blocked/overridden save was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptKind {
    /// Exact key collision, hard-blocked
    Duplicate,
    /// Same date/time/bank/amount with a different voucher, overridden
    Similar,
}

impl AttemptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Similar => "similar",
        }
    }
}

impl std::str::FromStr for AttemptKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "duplicate" => Ok(Self::Duplicate),
            "similar" => Ok(Self::Similar),
            _ => Err(format!("Unknown attempt kind: {}", s)),
        }
    }
}

impl std::fmt::Display for AttemptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit trail of a save the duplicate detector blocked or let through
/// with an explicit override
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateAttempt {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
    /// JSON snapshot of the submitted field values
    pub data: String,
    pub kind: AttemptKind,
    pub is_resolved: bool,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// A pending request from an unaffiliated user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequest {
    pub id: i64,
    pub username: String,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn quantize_normalizes_scale() {
        assert_eq!(quantize(dec!(100)).to_string(), "100.00");
        assert_eq!(quantize(dec!(100.1)).to_string(), "100.10");
        assert_eq!(quantize(dec!(100.005)).to_string(), "100.00"); // banker's rounding
        assert_eq!(quantize(dec!(-120.5)).to_string(), "-120.50");
    }

    #[test]
    fn status_round_trips() {
        for s in [
            TransactionStatus::Pending,
            TransactionStatus::Invoiced,
            TransactionStatus::Voided,
        ] {
            assert_eq!(s.as_str().parse::<TransactionStatus>(), Ok(s));
        }
        for s in [
            PaymentStatus::Pending,
            PaymentStatus::Approved,
            PaymentStatus::Rejected,
        ] {
            assert_eq!(s.as_str().parse::<PaymentStatus>(), Ok(s));
        }
    }

    #[test]
    fn status_accepts_english_aliases() {
        assert_eq!(
            "approved".parse::<PaymentStatus>(),
            Ok(PaymentStatus::Approved)
        );
        assert_eq!(
            "invoiced".parse::<TransactionStatus>(),
            Ok(TransactionStatus::Invoiced)
        );
    }
}
