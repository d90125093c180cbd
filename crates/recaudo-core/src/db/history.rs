//! Append-only audit history: snapshots, diff, restore, deleted-item views
//!
//! Every create/update/delete of a transaction or receipt appends a row to
//! the entity's history table in the same SQL transaction as the mutation.
//! The snapshot column holds the full entity as JSON, so restore is an
//! upsert of a decoded snapshot under its original primary key.

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use super::{format_datetime, money_text, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Receipt, Transaction};
use crate::roles::{can_delete, Role};

/// Kind of change a history row records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    Created,
    Changed,
    Deleted,
}

impl HistoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "+",
            Self::Changed => "~",
            Self::Deleted => "-",
        }
    }
}

impl std::str::FromStr for HistoryKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "+" => Ok(Self::Created),
            "~" => Ok(Self::Changed),
            "-" => Ok(Self::Deleted),
            _ => Err(format!("Unknown history type: {}", s)),
        }
    }
}

impl std::fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of an entity's history
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub history_id: i64,
    pub original_pk: i64,
    pub kind: HistoryKind,
    pub history_date: chrono::DateTime<chrono::Utc>,
    pub history_user: Option<String>,
    /// Full entity snapshot as JSON
    pub snapshot: String,
}

impl HistoryEntry {
    /// Decode the snapshot back into the entity type
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.snapshot)?)
    }
}

/// A single changed field between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

/// Compare two JSON snapshots field by field.
///
/// Fields are reported in sorted order; a field absent on one side shows up
/// with `None` on that side.
pub fn diff_snapshots(prev: &str, next: &str) -> Result<Vec<FieldChange>> {
    let prev: serde_json::Map<String, serde_json::Value> = serde_json::from_str(prev)?;
    let next: serde_json::Map<String, serde_json::Value> = serde_json::from_str(next)?;

    let mut fields: Vec<&String> = prev.keys().chain(next.keys()).collect();
    fields.sort();
    fields.dedup();

    let render = |v: &serde_json::Value| match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let mut changes = Vec::new();
    for field in fields {
        let old = prev.get(field).map(&render);
        let new = next.get(field).map(&render);
        if old != new {
            changes.push(FieldChange {
                field: field.clone(),
                old,
                new,
            });
        }
    }
    Ok(changes)
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<HistoryEntry> {
    let kind: String = row.get(2)?;
    let date: String = row.get(3)?;
    Ok(HistoryEntry {
        history_id: row.get(0)?,
        original_pk: row.get(1)?,
        kind: kind.parse().unwrap_or(HistoryKind::Changed),
        history_date: parse_datetime(&date),
        history_user: row.get(4)?,
        snapshot: row.get(5)?,
    })
}

const ENTRY_COLUMNS: &str = "history_id, original_pk, history_type, history_date, history_user, snapshot";

fn append(
    conn: &Connection,
    table: &str,
    pk: i64,
    kind: HistoryKind,
    actor: Option<&str>,
    snapshot: &str,
) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO {} (original_pk, history_type, history_user, snapshot) VALUES (?, ?, ?, ?)",
            table
        ),
        params![pk, kind.as_str(), actor, snapshot],
    )?;
    Ok(())
}

/// Append a history row for a transaction, inside the caller's SQL transaction
pub(crate) fn record_transaction(
    conn: &Connection,
    tx: &Transaction,
    kind: HistoryKind,
    actor: Option<&str>,
) -> Result<()> {
    let snapshot = serde_json::to_string(tx)?;
    append(conn, "transactions_history", tx.id, kind, actor, &snapshot)
}

/// Append a history row for a receipt, inside the caller's SQL transaction
pub(crate) fn record_receipt(
    conn: &Connection,
    receipt: &Receipt,
    kind: HistoryKind,
    actor: Option<&str>,
) -> Result<()> {
    let snapshot = serde_json::to_string(receipt)?;
    append(conn, "receipts_history", receipt.id, kind, actor, &snapshot)
}

fn fetch_entry(conn: &Connection, table: &str, history_id: i64) -> Result<HistoryEntry> {
    conn.query_row(
        &format!("SELECT {} FROM {} WHERE history_id = ?", ENTRY_COLUMNS, table),
        params![history_id],
        row_to_entry,
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("history entry {} in {}", history_id, table)))
}

fn list_history(conn: &Connection, table: &str, pk: i64) -> Result<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM {} WHERE original_pk = ? ORDER BY history_id DESC",
        ENTRY_COLUMNS, table
    ))?;
    let entries = stmt
        .query_map(params![pk], row_to_entry)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Latest delete-marker per primary key whose row is not live again.
///
/// The history log keeps old delete markers even after a restore, so the
/// "currently deleted" view must subtract everything that exists live.
fn list_deleted(conn: &Connection, table: &str, live_table: &str) -> Result<Vec<HistoryEntry>> {
    let sql = format!(
        r#"
        SELECT {cols} FROM {table}
        WHERE history_type = '-'
          AND history_id IN (
              SELECT MAX(history_id) FROM {table}
              WHERE history_type = '-'
              GROUP BY original_pk
          )
          AND original_pk NOT IN (SELECT id FROM {live})
        ORDER BY history_date DESC, history_id DESC
        "#,
        cols = ENTRY_COLUMNS,
        table = table,
        live = live_table,
    );
    let mut stmt = conn.prepare(&sql)?;
    let entries = stmt
        .query_map([], row_to_entry)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(entries)
}

impl Database {
    /// Full history of one transaction, newest first
    pub fn transaction_history(&self, pk: i64) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn()?;
        list_history(&conn, "transactions_history", pk)
    }

    /// Full history of one receipt, newest first
    pub fn receipt_history(&self, pk: i64) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn()?;
        list_history(&conn, "receipts_history", pk)
    }

    /// Transactions that are deleted and have not been restored
    pub fn deleted_transactions(&self) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn()?;
        list_deleted(&conn, "transactions_history", "transactions")
    }

    /// Receipts that are deleted and have not been restored
    pub fn deleted_receipts(&self) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn()?;
        list_deleted(&conn, "receipts_history", "receipts")
    }

    /// Restore a receipt from a history snapshot.
    ///
    /// The snapshot's parent transaction (if any) must still exist: a receipt
    /// cannot be restored into a dangling reference.
    pub fn restore_receipt(&self, history_id: i64, actor: &str, role: Role) -> Result<Receipt> {
        if !can_delete(role) {
            return Err(Error::Validation(
                "insufficient permission: restore requires the admin role".to_string(),
            ));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let entry = fetch_entry(&tx, "receipts_history", history_id)?;
        let receipt: Receipt = entry.decode()?;

        if let Some(parent) = receipt.transaction_id {
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT id FROM transactions WHERE id = ?",
                    params![parent],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(Error::ReferentialIntegrity(format!(
                    "cannot restore receipt {}: parent transaction {} no longer exists",
                    receipt.id, parent
                )));
            }
        }

        // INSERT OR REPLACE resolves conflicts on any unique constraint, so a
        // snapshot whose composite key now belongs to a different live receipt
        // would silently delete that receipt. Refuse instead.
        let holder: Option<i64> = tx
            .query_row(
                "SELECT id FROM receipts \
                 WHERE fecha = ? AND hora = ? AND comprobante = ? AND bank_id = ? AND valor = ? \
                   AND id <> ?",
                params![
                    receipt.fecha.to_string(),
                    receipt.hora.format("%H:%M:%S").to_string(),
                    receipt.comprobante,
                    receipt.bank_id,
                    money_text(receipt.valor),
                    receipt.id,
                ],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(holder) = holder {
            return Err(Error::Validation(format!(
                "cannot restore receipt {}: its date/time/voucher/bank/amount key \
                 is now held by live receipt {}",
                receipt.id, holder
            )));
        }

        tx.execute(
            r#"
            INSERT OR REPLACE INTO receipts
                (id, fecha, hora, comprobante, client_id, bank_id, source_id, valor,
                 payment_status, transaction_id, linked_credit_note, description,
                 uploaded_by, created_at, modified_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                receipt.id,
                receipt.fecha.to_string(),
                receipt.hora.format("%H:%M:%S").to_string(),
                receipt.comprobante,
                receipt.client_id,
                receipt.bank_id,
                receipt.source_id,
                money_text(receipt.valor),
                receipt.payment_status.as_str(),
                receipt.transaction_id,
                receipt.linked_credit_note,
                receipt.description,
                receipt.uploaded_by,
                format_datetime(receipt.created_at),
                format_datetime(receipt.modified_at),
            ],
        )?;

        record_receipt(&tx, &receipt, HistoryKind::Created, Some(actor))?;
        tx.commit()?;

        info!(receipt_id = receipt.id, history_id, "receipt restored");
        Ok(receipt)
    }

    /// Restore a transaction from a history snapshot
    pub fn restore_transaction(
        &self,
        history_id: i64,
        actor: &str,
        role: Role,
    ) -> Result<Transaction> {
        if !can_delete(role) {
            return Err(Error::Validation(
                "insufficient permission: restore requires the admin role".to_string(),
            ));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let entry = fetch_entry(&tx, "transactions_history", history_id)?;
        let transaction: Transaction = entry.decode()?;

        tx.execute(
            r#"
            INSERT OR REPLACE INTO transactions
                (id, unique_transaction_id, date, client_id, seller_id,
                 transaction_type_id, description, status, invoice_number,
                 invoiced_by, expected_amount, created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                transaction.id,
                transaction.unique_transaction_id,
                transaction.date.to_string(),
                transaction.client_id,
                transaction.seller_id,
                transaction.transaction_type_id,
                transaction.description,
                transaction.status.as_str(),
                transaction.invoice_number,
                transaction.invoiced_by,
                money_text(transaction.expected_amount),
                transaction.created_by,
                format_datetime(transaction.created_at),
            ],
        )?;

        record_transaction(&tx, &transaction, HistoryKind::Created, Some(actor))?;
        tx.commit()?;

        info!(transaction_id = transaction.id, history_id, "transaction restored");
        Ok(transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_reports_changed_fields_sorted() {
        let prev = r#"{"valor":"100.00","comprobante":"A1","client_id":null}"#;
        let next = r#"{"valor":"120.00","comprobante":"A1","client_id":7}"#;
        let changes = diff_snapshots(prev, next).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].field, "client_id");
        assert_eq!(changes[0].old.as_deref(), Some("null"));
        assert_eq!(changes[0].new.as_deref(), Some("7"));
        assert_eq!(changes[1].field, "valor");
        assert_eq!(changes[1].old.as_deref(), Some("100.00"));
    }

    #[test]
    fn diff_handles_missing_fields() {
        let changes = diff_snapshots(r#"{"a":1}"#, r#"{"b":2}"#).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].field, "a");
        assert_eq!(changes[0].new, None);
        assert_eq!(changes[1].field, "b");
        assert_eq!(changes[1].old, None);
    }

    #[test]
    fn history_kind_round_trips() {
        for kind in [HistoryKind::Created, HistoryKind::Changed, HistoryKind::Deleted] {
            assert_eq!(kind.as_str().parse::<HistoryKind>(), Ok(kind));
        }
    }
}
