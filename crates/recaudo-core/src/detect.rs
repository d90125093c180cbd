//! Duplicate detection for incoming receipts
//!
//! Two-tier classification, applied only when creating a new receipt:
//! an exact key collision (fecha, hora, comprobante, bank, valor) is a hard
//! block, while a match on everything but the voucher number is a soft block
//! that an operator can override explicitly. Exact collisions are almost
//! always accidental re-submission; same date/bank/amount with a different
//! voucher is common for legitimate bulk deposits but worth a human glance.

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{quantize, AttemptKind, NewReceipt, PaymentStatus, Receipt};

/// A receipt submission as it arrives from an entry form or API
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptSubmission {
    pub fecha: NaiveDate,
    pub hora: NaiveTime,
    pub comprobante: String,
    pub client_id: Option<i64>,
    pub bank_id: i64,
    pub source_id: Option<i64>,
    pub valor: Decimal,
    pub description: Option<String>,
    /// Caller explicitly accepts inserting despite similar receipts
    pub confirm_override: bool,
}

impl ReceiptSubmission {
    fn to_new_receipt(&self, actor: &str) -> NewReceipt {
        NewReceipt {
            fecha: self.fecha,
            hora: self.hora,
            comprobante: self.comprobante.trim().to_string(),
            client_id: self.client_id,
            bank_id: self.bank_id,
            source_id: self.source_id,
            valor: quantize(self.valor),
            payment_status: PaymentStatus::Pending,
            transaction_id: None,
            description: self.description.clone(),
            uploaded_by: Some(actor.to_string()),
        }
    }
}

/// Outcome of classifying a candidate receipt against the store
#[derive(Debug, Clone)]
pub enum DuplicateCheck {
    Unique,
    /// The existing receipt that matches the full key
    Exact(Receipt),
    /// Receipts matching everything but the voucher number
    Similar(Vec<Receipt>),
}

/// Classify a submission without side effects.
///
/// Callers that render a confirmation prompt use this to fetch the similar
/// candidates; [`submit_receipt`] re-runs the same checks when persisting.
pub fn classify(db: &Database, submission: &ReceiptSubmission) -> Result<DuplicateCheck> {
    let valor = quantize(submission.valor);
    let comprobante = submission.comprobante.trim();

    if let Some(existing) = db.find_exact(
        submission.fecha,
        submission.hora,
        comprobante,
        submission.bank_id,
        valor,
    )? {
        return Ok(DuplicateCheck::Exact(existing));
    }

    let similar = db.find_similar(
        submission.fecha,
        submission.hora,
        comprobante,
        submission.bank_id,
        valor,
    )?;
    if similar.is_empty() {
        Ok(DuplicateCheck::Unique)
    } else {
        Ok(DuplicateCheck::Similar(similar))
    }
}

/// Run the full submission protocol: classify, log, persist.
///
/// - Exact duplicate: a `DuplicateAttempt` is logged and the submission is
///   rejected with the conflicting values echoed back.
/// - Similar without override: rejected carrying the candidates; nothing is
///   logged yet, the operator may still correct the data instead.
/// - Similar with override: inserted, and a pre-resolved `DuplicateAttempt`
///   is logged in the same SQL transaction as the insert.
/// - Unique: inserted silently.
pub fn submit_receipt(
    db: &Database,
    submission: &ReceiptSubmission,
    actor: &str,
) -> Result<Receipt> {
    if submission.valor <= Decimal::ZERO {
        return Err(Error::Validation(
            "valor must be positive; negative receipts only arise from credit notes".to_string(),
        ));
    }

    match classify(db, submission)? {
        DuplicateCheck::Exact(existing) => {
            let payload = serde_json::to_string(submission)?;
            let conn = db.conn()?;
            crate::db::duplicates::log_attempt_in(
                &conn,
                actor,
                &payload,
                AttemptKind::Duplicate,
                None,
            )?;
            let bank = db.get_bank(submission.bank_id)?;
            warn!(
                existing_id = existing.id,
                comprobante = %submission.comprobante,
                "exact duplicate receipt blocked"
            );
            Err(Error::ExactDuplicate {
                existing_id: existing.id,
                fecha: submission.fecha,
                hora: submission.hora,
                comprobante: submission.comprobante.trim().to_string(),
                bank: bank.name,
                valor: quantize(submission.valor),
            })
        }
        DuplicateCheck::Similar(similar) if !submission.confirm_override => {
            Err(Error::SimilarDuplicate { similar })
        }
        DuplicateCheck::Similar(similar) => {
            // override: insert and leave a self-resolved audit trail, atomically
            let payload = serde_json::to_string(submission)?;
            let mut conn = db.conn()?;
            let tx = conn.transaction()?;
            let receipt =
                crate::db::receipts::insert_receipt_in(&tx, &submission.to_new_receipt(actor), Some(actor))?;
            crate::db::duplicates::log_attempt_in(
                &tx,
                actor,
                &payload,
                AttemptKind::Similar,
                Some(actor),
            )?;
            tx.commit()?;
            info!(
                receipt_id = receipt.id,
                similar = similar.len(),
                "similar duplicate overridden and inserted"
            );
            Ok(receipt)
        }
        DuplicateCheck::Unique => {
            let mut conn = db.conn()?;
            let tx = conn.transaction()?;
            let receipt =
                crate::db::receipts::insert_receipt_in(&tx, &submission.to_new_receipt(actor), Some(actor))?;
            tx.commit()?;
            Ok(receipt)
        }
    }
}
