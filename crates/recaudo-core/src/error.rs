//! Error types for Recaudo

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::Receipt;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// An identical receipt already exists. Carries the conflicting key so
    /// callers can show the operator exactly what collided.
    #[error(
        "Duplicate receipt: an identical record already exists (id {existing_id}): \
         {fecha} {hora} voucher {comprobante} bank {bank} amount {valor}"
    )]
    ExactDuplicate {
        existing_id: i64,
        fecha: chrono::NaiveDate,
        hora: chrono::NaiveTime,
        comprobante: String,
        bank: String,
        valor: Decimal,
    },

    /// Receipts matching on date, time, bank and amount exist but the voucher
    /// number differs. Submission may be retried with an explicit override.
    #[error("Similar receipts exist ({} candidate(s)); confirm override to insert anyway", similar.len())]
    SimilarDuplicate { similar: Vec<Receipt> },

    #[error("Referential integrity error: {0}")]
    ReferentialIntegrity(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Protected: {0}")]
    Protected(String),
}

pub type Result<T> = std::result::Result<T, Error>;
