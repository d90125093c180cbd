//! Transaction reconciliation: balances, credit application, credit notes
//!
//! `receipts_total` and `difference` are always recomputed on demand since
//! receipts move between transactions asynchronously. Every precondition
//! checked here is re-checked inside the mutating SQL transaction, closing
//! the window between check and use.

use chrono::{Timelike, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use tracing::info;

use crate::db::receipts::{fetch_receipt, insert_receipt_in};
use crate::db::transactions::fetch_transaction;
use crate::db::{history, Database};
use crate::error::{Error, Result};
use crate::models::{quantize, NewReceipt, PaymentStatus, Receipt};
use crate::roles::Role;

/// Bank and source name reserved for generated credit-note receipts
pub const CREDIT_NOTE_SENTINEL: &str = "NOTA DE CREDITO";

fn receipts_total_in(conn: &Connection, transaction_id: i64) -> Result<Decimal> {
    let mut stmt = conn.prepare("SELECT valor FROM receipts WHERE transaction_id = ?")?;
    let amounts = stmt
        .query_map(params![transaction_id], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    amounts
        .iter()
        .map(|s| crate::db::parse_money_strict(s))
        .sum()
}

/// Sum of valor over the receipts linked to a transaction
pub fn receipts_total(db: &Database, transaction_id: i64) -> Result<Decimal> {
    let conn = db.conn()?;
    receipts_total_in(&conn, transaction_id)
}

/// expected_amount minus receipts_total. Positive means underpaid,
/// negative means overpaid (surplus).
pub fn difference(db: &Database, transaction_id: i64) -> Result<Decimal> {
    let conn = db.conn()?;
    let transaction = fetch_transaction(&conn, transaction_id)?;
    let total = receipts_total_in(&conn, transaction_id)?;
    Ok(quantize(transaction.expected_amount - total))
}

/// Outcome of an apply/unlink batch; skipped entries carry the reason
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub applied: Vec<i64>,
    pub skipped: Vec<(i64, String)>,
}

/// Link free approved credits to a transaction.
///
/// Each receipt is re-validated inside the transaction: it must still be
/// unlinked, approved, and belong to the transaction's client. Receipts
/// failing a check are skipped and reported, not fatal.
pub fn apply_credits(
    db: &Database,
    transaction_id: i64,
    receipt_ids: &[i64],
    actor: &str,
) -> Result<ApplyReport> {
    let mut conn = db.conn()?;
    let tx = conn.transaction()?;
    let transaction = fetch_transaction(&tx, transaction_id)?;

    let mut report = ApplyReport::default();
    for &rid in receipt_ids {
        let receipt = match fetch_receipt(&tx, rid) {
            Ok(r) => r,
            Err(Error::NotFound(_)) => {
                report.skipped.push((rid, "receipt not found".to_string()));
                continue;
            }
            Err(e) => return Err(e),
        };

        if let Some(existing) = receipt.transaction_id {
            report
                .skipped
                .push((rid, format!("already applied to transaction {}", existing)));
            continue;
        }
        if receipt.payment_status != PaymentStatus::Approved {
            report
                .skipped
                .push((rid, format!("payment status is {}", receipt.payment_status)));
            continue;
        }
        if transaction.client_id.is_some() && receipt.client_id != transaction.client_id {
            report
                .skipped
                .push((rid, "belongs to a different client".to_string()));
            continue;
        }

        // the IS NULL guard makes concurrent double-application impossible
        let updated = tx.execute(
            "UPDATE receipts SET transaction_id = ?, modified_at = CURRENT_TIMESTAMP \
             WHERE id = ? AND transaction_id IS NULL",
            params![transaction_id, rid],
        )?;
        if updated == 0 {
            report
                .skipped
                .push((rid, "concurrently applied elsewhere".to_string()));
            continue;
        }
        let updated = fetch_receipt(&tx, rid)?;
        history::record_receipt(&tx, &updated, history::HistoryKind::Changed, Some(actor))?;
        report.applied.push(rid);
    }
    tx.commit()?;

    info!(
        transaction_id,
        applied = report.applied.len(),
        skipped = report.skipped.len(),
        "credits applied"
    );
    Ok(report)
}

/// Detach receipts from a transaction, leaving them as free credits owned by
/// the transaction's client (so they are not orphaned).
pub fn unlink_credits(
    db: &Database,
    transaction_id: i64,
    receipt_ids: &[i64],
    actor: &str,
) -> Result<ApplyReport> {
    let mut conn = db.conn()?;
    let tx = conn.transaction()?;
    let transaction = fetch_transaction(&tx, transaction_id)?;

    let mut report = ApplyReport::default();
    for &rid in receipt_ids {
        let receipt = match fetch_receipt(&tx, rid) {
            Ok(r) => r,
            Err(Error::NotFound(_)) => {
                report.skipped.push((rid, "receipt not found".to_string()));
                continue;
            }
            Err(e) => return Err(e),
        };
        if receipt.transaction_id != Some(transaction_id) {
            report
                .skipped
                .push((rid, "not linked to this transaction".to_string()));
            continue;
        }

        tx.execute(
            "UPDATE receipts SET transaction_id = NULL, client_id = COALESCE(?, client_id), \
             modified_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![transaction.client_id, rid],
        )?;
        let updated = fetch_receipt(&tx, rid)?;
        history::record_receipt(&tx, &updated, history::HistoryKind::Changed, Some(actor))?;
        report.applied.push(rid);
    }
    tx.commit()?;
    Ok(report)
}

/// Absorb a transaction's overpayment into a balanced credit-note pair.
///
/// Creates, in one atomic operation: a positive free credit for the client
/// (valor = surplus, no transaction) and a negative adjustment linked to the
/// transaction (bringing its difference to exactly zero). Both use the
/// sentinel bank/source and are cross-linked via `linked_credit_note`.
pub fn generate_credit_note(
    db: &Database,
    transaction_id: i64,
    actor: &str,
    role: Role,
) -> Result<(Receipt, Receipt)> {
    if !matches!(role, Role::Admin | Role::Facturador) {
        return Err(Error::Validation(format!(
            "role {} cannot generate credit notes",
            role
        )));
    }

    // sentinel rows are idempotent get-or-creates, safe outside the pair's tx
    let bank = db.get_or_create_bank(CREDIT_NOTE_SENTINEL)?;
    let source = db.get_or_create_source(CREDIT_NOTE_SENTINEL, 0)?;

    let mut conn = db.conn()?;
    let tx = conn.transaction()?;
    let transaction = fetch_transaction(&tx, transaction_id)?;
    let total = receipts_total_in(&tx, transaction_id)?;
    let diff = quantize(transaction.expected_amount - total);
    if diff >= Decimal::ZERO {
        return Err(Error::Validation(format!(
            "transaction {} has no surplus to reconcile (difference {})",
            transaction.unique_transaction_id, diff
        )));
    }
    let surplus = -diff;

    let now = Utc::now();
    let fecha = now.date_naive();
    let hora = now.time().with_nanosecond(0).unwrap_or_else(|| now.time());
    let uid = &transaction.unique_transaction_id;

    let favor = insert_receipt_in(
        &tx,
        &NewReceipt {
            fecha,
            hora,
            comprobante: format!("NC-FAVOR-{}", uid),
            client_id: transaction.client_id,
            bank_id: bank.id,
            source_id: Some(source.id),
            valor: surplus,
            payment_status: PaymentStatus::Approved,
            transaction_id: None,
            description: Some(format!("Credit note for surplus on {}", uid)),
            uploaded_by: Some(actor.to_string()),
        },
        Some(actor),
    )?;
    let ajuste = insert_receipt_in(
        &tx,
        &NewReceipt {
            fecha,
            hora,
            comprobante: format!("NC-AJUSTE-{}", uid),
            client_id: transaction.client_id,
            bank_id: bank.id,
            source_id: Some(source.id),
            valor: -surplus,
            payment_status: PaymentStatus::Approved,
            transaction_id: Some(transaction_id),
            description: Some(format!("Balancing adjustment for {}", uid)),
            uploaded_by: Some(actor.to_string()),
        },
        Some(actor),
    )?;

    tx.execute(
        "UPDATE receipts SET linked_credit_note = ? WHERE id = ?",
        params![ajuste.id, favor.id],
    )?;
    tx.execute(
        "UPDATE receipts SET linked_credit_note = ? WHERE id = ?",
        params![favor.id, ajuste.id],
    )?;
    let favor = fetch_receipt(&tx, favor.id)?;
    let ajuste = fetch_receipt(&tx, ajuste.id)?;
    history::record_receipt(&tx, &favor, history::HistoryKind::Changed, Some(actor))?;
    history::record_receipt(&tx, &ajuste, history::HistoryKind::Changed, Some(actor))?;
    tx.commit()?;

    info!(
        transaction_id,
        surplus = %surplus,
        favor_id = favor.id,
        ajuste_id = ajuste.id,
        "credit note pair generated"
    );
    Ok((favor, ajuste))
}
