//! Receipt operations

use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use tracing::info;

use super::history::{self, HistoryKind};
use super::{money_text, parse_date, parse_datetime, parse_money, parse_time, Database};
use crate::error::{Error, Result};
use crate::models::{NewReceipt, PaymentStatus, Receipt};
use crate::roles::{can_delete, can_edit_field, Role};

pub(crate) const RECEIPT_COLUMNS: &str = "id, fecha, hora, comprobante, client_id, bank_id, source_id, valor, \
     payment_status, transaction_id, linked_credit_note, description, \
     uploaded_by, created_at, modified_at";

pub(crate) fn row_to_receipt(row: &rusqlite::Row) -> rusqlite::Result<Receipt> {
    let fecha: String = row.get(1)?;
    let hora: String = row.get(2)?;
    let valor: String = row.get(7)?;
    let status: String = row.get(8)?;
    let created_at: String = row.get(13)?;
    let modified_at: String = row.get(14)?;
    Ok(Receipt {
        id: row.get(0)?,
        fecha: parse_date(&fecha),
        hora: parse_time(&hora),
        comprobante: row.get(3)?,
        client_id: row.get(4)?,
        bank_id: row.get(5)?,
        source_id: row.get(6)?,
        valor: parse_money(&valor),
        payment_status: status.parse().unwrap_or(PaymentStatus::Pending),
        transaction_id: row.get(9)?,
        linked_credit_note: row.get(10)?,
        description: row.get(11)?,
        uploaded_by: row.get(12)?,
        created_at: parse_datetime(&created_at),
        modified_at: parse_datetime(&modified_at),
    })
}

pub(crate) fn fetch_receipt(conn: &Connection, id: i64) -> Result<Receipt> {
    conn.query_row(
        &format!("SELECT {} FROM receipts WHERE id = ?", RECEIPT_COLUMNS),
        params![id],
        row_to_receipt,
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("receipt {}", id)))
}

/// Find a receipt matching the full exact-duplicate key
pub(crate) fn find_exact_in(
    conn: &Connection,
    fecha: chrono::NaiveDate,
    hora: chrono::NaiveTime,
    comprobante: &str,
    bank_id: i64,
    valor: Decimal,
) -> Result<Option<Receipt>> {
    let receipt = conn
        .query_row(
            &format!(
                "SELECT {} FROM receipts \
                 WHERE fecha = ? AND hora = ? AND comprobante = ? AND bank_id = ? AND valor = ?",
                RECEIPT_COLUMNS
            ),
            params![
                fecha.to_string(),
                hora.format("%H:%M:%S").to_string(),
                comprobante,
                bank_id,
                money_text(valor),
            ],
            row_to_receipt,
        )
        .optional()?;
    Ok(receipt)
}

/// Insert a receipt and its '+' history row inside the caller's SQL
/// transaction. A collision with the composite uniqueness constraint is
/// mapped back to the exact-duplicate error, echoing the existing row.
pub(crate) fn insert_receipt_in(
    conn: &Connection,
    new: &NewReceipt,
    actor: Option<&str>,
) -> Result<Receipt> {
    let insert = conn.execute(
        r#"
        INSERT INTO receipts
            (fecha, hora, comprobante, client_id, bank_id, source_id, valor,
             payment_status, transaction_id, description, uploaded_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            new.fecha.to_string(),
            new.hora.format("%H:%M:%S").to_string(),
            new.comprobante,
            new.client_id,
            new.bank_id,
            new.source_id,
            money_text(new.valor),
            new.payment_status.as_str(),
            new.transaction_id,
            new.description,
            new.uploaded_by,
        ],
    );

    match insert {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(e, msg))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            // ConstraintViolation also covers foreign-key and CHECK failures;
            // only the composite key counts as a duplicate, so look the
            // conflicting row up before claiming one exists.
            let existing =
                find_exact_in(conn, new.fecha, new.hora, &new.comprobante, new.bank_id, new.valor)?;
            let Some(existing) = existing else {
                return Err(Error::ReferentialIntegrity(format!(
                    "receipt insert rejected: {}",
                    msg.as_deref().unwrap_or("constraint violation")
                )));
            };
            let bank: String = conn
                .query_row(
                    "SELECT name FROM banks WHERE id = ?",
                    params![new.bank_id],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or_default();
            return Err(Error::ExactDuplicate {
                existing_id: existing.id,
                fecha: new.fecha,
                hora: new.hora,
                comprobante: new.comprobante.clone(),
                bank,
                valor: crate::models::quantize(new.valor),
            });
        }
        Err(e) => return Err(e.into()),
    }

    let receipt = fetch_receipt(conn, conn.last_insert_rowid())?;
    history::record_receipt(conn, &receipt, HistoryKind::Created, actor)?;
    Ok(receipt)
}

/// Filters for listing receipts
#[derive(Debug, Clone, Default)]
pub struct ReceiptFilter {
    pub client_id: Option<i64>,
    pub transaction_id: Option<i64>,
    pub status: Option<PaymentStatus>,
    /// Only free credits (no transaction link)
    pub only_unlinked: bool,
}

impl Database {
    /// Insert a receipt directly, bypassing duplicate classification.
    ///
    /// The composite uniqueness constraint still applies; use
    /// [`crate::detect::submit_receipt`] for the full detection protocol.
    pub fn insert_receipt(&self, new: &NewReceipt, actor: &str) -> Result<Receipt> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let receipt = insert_receipt_in(&tx, new, Some(actor))?;
        tx.commit()?;
        Ok(receipt)
    }

    pub fn get_receipt(&self, id: i64) -> Result<Receipt> {
        let conn = self.conn()?;
        fetch_receipt(&conn, id)
    }

    /// List receipts matching the filter, newest first
    pub fn list_receipts(&self, filter: &ReceiptFilter, limit: i64) -> Result<Vec<Receipt>> {
        let conn = self.conn()?;

        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(c) = filter.client_id {
            conditions.push("client_id = ?");
            params.push(Box::new(c));
        }
        if let Some(t) = filter.transaction_id {
            conditions.push("transaction_id = ?");
            params.push(Box::new(t));
        }
        if let Some(s) = filter.status {
            conditions.push("payment_status = ?");
            params.push(Box::new(s.as_str()));
        }
        if filter.only_unlinked {
            conditions.push("transaction_id IS NULL");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        params.push(Box::new(limit));

        let sql = format!(
            "SELECT {} FROM receipts {} ORDER BY fecha DESC, hora DESC, id DESC LIMIT ?",
            RECEIPT_COLUMNS, where_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let receipts = stmt
            .query_map(params_refs.as_slice(), row_to_receipt)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(receipts)
    }

    /// Find the receipt matching the full exact-duplicate key, if any
    pub fn find_exact(
        &self,
        fecha: chrono::NaiveDate,
        hora: chrono::NaiveTime,
        comprobante: &str,
        bank_id: i64,
        valor: Decimal,
    ) -> Result<Option<Receipt>> {
        let conn = self.conn()?;
        find_exact_in(&conn, fecha, hora, comprobante, bank_id, valor)
    }

    /// Receipts matching (fecha, hora, bank, valor) with a different voucher
    /// number; the exact-key case is excluded so it is never double-flagged.
    pub fn find_similar(
        &self,
        fecha: chrono::NaiveDate,
        hora: chrono::NaiveTime,
        comprobante: &str,
        bank_id: i64,
        valor: Decimal,
    ) -> Result<Vec<Receipt>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM receipts \
             WHERE fecha = ? AND hora = ? AND bank_id = ? AND valor = ? AND comprobante <> ?",
            RECEIPT_COLUMNS
        ))?;
        let receipts = stmt
            .query_map(
                params![
                    fecha.to_string(),
                    hora.format("%H:%M:%S").to_string(),
                    bank_id,
                    money_text(valor),
                    comprobante,
                ],
                row_to_receipt,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(receipts)
    }

    /// Change a receipt's approval status (Validador/Admin)
    pub fn set_payment_status(
        &self,
        id: i64,
        status: PaymentStatus,
        actor: &str,
        role: Role,
    ) -> Result<Receipt> {
        if !can_edit_field(role, "payment_status", false) {
            return Err(Error::Validation(format!(
                "role {} cannot change payment status",
                role
            )));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        fetch_receipt(&tx, id)?;
        tx.execute(
            "UPDATE receipts SET payment_status = ?, modified_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![status.as_str(), id],
        )?;
        let updated = fetch_receipt(&tx, id)?;
        history::record_receipt(&tx, &updated, HistoryKind::Changed, Some(actor))?;
        tx.commit()?;
        Ok(updated)
    }

    /// Delete a receipt into the history log.
    ///
    /// Guard: a negative credit-note adjustment must not be deleted once its
    /// positive counterpart has been consumed into another transaction, or
    /// the books would silently lose the balancing leg.
    pub fn delete_receipt(&self, id: i64, actor: &str, role: Role) -> Result<()> {
        if !can_delete(role) {
            return Err(Error::Validation(
                "insufficient permission: delete requires the admin role".to_string(),
            ));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let receipt = fetch_receipt(&tx, id)?;

        if receipt.valor < Decimal::ZERO {
            if let Some(sibling_id) = receipt.linked_credit_note {
                let sibling = fetch_receipt(&tx, sibling_id)?;
                if let Some(consumer) = sibling.transaction_id {
                    let uid: Option<String> = tx
                        .query_row(
                            "SELECT unique_transaction_id FROM transactions WHERE id = ?",
                            params![consumer],
                            |row| row.get(0),
                        )
                        .optional()?;
                    return Err(Error::Validation(format!(
                        "cannot delete adjustment receipt {}: its credit-note counterpart {} \
                         is already applied to transaction {}",
                        id,
                        sibling_id,
                        uid.unwrap_or_else(|| consumer.to_string())
                    )));
                }
            }
        }

        history::record_receipt(&tx, &receipt, HistoryKind::Deleted, Some(actor))?;
        tx.execute("DELETE FROM receipts WHERE id = ?", params![id])?;
        tx.commit()?;

        info!(receipt_id = id, "receipt deleted");
        Ok(())
    }

    /// A client's free approved credits (no transaction link)
    pub fn available_credits(&self, client_id: i64) -> Result<Vec<Receipt>> {
        self.list_receipts(
            &ReceiptFilter {
                client_id: Some(client_id),
                status: Some(PaymentStatus::Approved),
                only_unlinked: true,
                ..Default::default()
            },
            i64::MAX,
        )
    }
}
