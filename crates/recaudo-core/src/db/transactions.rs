//! Transaction operations

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use super::history::{self, HistoryKind};
use super::{money_text, parse_date, parse_datetime, parse_money, Database};
use crate::error::{Error, Result};
use crate::models::{NewTransaction, Transaction, TransactionStatus};
use crate::roles::{can_create, can_delete, can_edit_field, Role};

const TRANSACTION_COLUMNS: &str = "id, unique_transaction_id, date, client_id, seller_id, \
     transaction_type_id, description, status, invoice_number, invoiced_by, \
     expected_amount, created_by, created_at";

pub(crate) fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
    let date: String = row.get(2)?;
    let status: String = row.get(7)?;
    let expected: String = row.get(10)?;
    let created_at: String = row.get(12)?;
    Ok(Transaction {
        id: row.get(0)?,
        unique_transaction_id: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        date: parse_date(&date),
        client_id: row.get(3)?,
        seller_id: row.get(4)?,
        transaction_type_id: row.get(5)?,
        description: row.get(6)?,
        status: status.parse().unwrap_or(TransactionStatus::Pending),
        invoice_number: row.get(8)?,
        invoiced_by: row.get(9)?,
        expected_amount: parse_money(&expected),
        created_by: row.get(11)?,
        created_at: parse_datetime(&created_at),
    })
}

pub(crate) fn fetch_transaction(conn: &Connection, id: i64) -> Result<Transaction> {
    conn.query_row(
        &format!("SELECT {} FROM transactions WHERE id = ?", TRANSACTION_COLUMNS),
        params![id],
        row_to_transaction,
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("transaction {}", id)))
}

/// Uppercase initials from a username ("ana.maria" -> "AM"), at most three
fn initials(username: &str) -> String {
    let letters: String = username
        .split(|c: char| !c.is_alphanumeric())
        .filter_map(|part| part.chars().next())
        .take(3)
        .collect();
    if letters.is_empty() {
        "XX".to_string()
    } else {
        letters.to_uppercase()
    }
}

/// Fields of a transaction that may be changed after creation
#[derive(Debug, Clone, Default)]
pub struct TransactionUpdate {
    pub date: Option<NaiveDate>,
    pub client_id: Option<Option<i64>>,
    pub seller_id: Option<Option<i64>>,
    pub transaction_type_id: Option<Option<i64>>,
    pub description: Option<Option<String>>,
    pub expected_amount: Option<Decimal>,
}

impl TransactionUpdate {
    fn touched_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.date.is_some() {
            fields.push("date");
        }
        if self.client_id.is_some() {
            fields.push("client_id");
        }
        if self.seller_id.is_some() {
            fields.push("seller_id");
        }
        if self.transaction_type_id.is_some() {
            fields.push("transaction_type_id");
        }
        if self.description.is_some() {
            fields.push("description");
        }
        if self.expected_amount.is_some() {
            fields.push("expected_amount");
        }
        fields
    }
}

impl Database {
    /// Create a transaction with its human-readable unique id.
    ///
    /// Two-phase: the row is inserted first to obtain the generated primary
    /// key, then the id `{YYYYMMDD}-{initials}-{pk}-{random}` is written back
    /// to that single column. Both steps share one SQL transaction.
    pub fn create_transaction(
        &self,
        new: &NewTransaction,
        actor: &str,
        role: Role,
    ) -> Result<Transaction> {
        if !can_create(role) {
            return Err(Error::Validation(format!(
                "role {} cannot create transactions",
                role
            )));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO transactions
                (date, client_id, seller_id, transaction_type_id, description,
                 status, expected_amount, created_by)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                new.date.to_string(),
                new.client_id,
                new.seller_id,
                new.transaction_type_id,
                new.description,
                TransactionStatus::Pending.as_str(),
                money_text(new.expected_amount),
                actor,
            ],
        )?;
        let pk = tx.last_insert_rowid();

        let suffix = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
        let uid = format!(
            "{}-{}-{}-{}",
            new.date.format("%Y%m%d"),
            initials(actor),
            pk,
            suffix
        );
        tx.execute(
            "UPDATE transactions SET unique_transaction_id = ? WHERE id = ?",
            params![uid, pk],
        )?;

        let transaction = fetch_transaction(&tx, pk)?;
        history::record_transaction(&tx, &transaction, HistoryKind::Created, Some(actor))?;
        tx.commit()?;

        info!(transaction_id = pk, uid = %transaction.unique_transaction_id, "transaction created");
        Ok(transaction)
    }

    pub fn get_transaction(&self, id: i64) -> Result<Transaction> {
        let conn = self.conn()?;
        fetch_transaction(&conn, id)
    }

    /// Look up a transaction by its human-readable id
    pub fn get_transaction_by_uid(&self, uid: &str) -> Result<Transaction> {
        self.conn()?
            .query_row(
                &format!(
                    "SELECT {} FROM transactions WHERE unique_transaction_id = ?",
                    TRANSACTION_COLUMNS
                ),
                params![uid],
                row_to_transaction,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("transaction {}", uid)))
    }

    /// List transactions, optionally filtered by status and client
    pub fn list_transactions(
        &self,
        status: Option<TransactionStatus>,
        client_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;

        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(s) = status {
            conditions.push("status = ?");
            params.push(Box::new(s.as_str()));
        }
        if let Some(c) = client_id {
            conditions.push("client_id = ?");
            params.push(Box::new(c));
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        params.push(Box::new(limit));

        let sql = format!(
            "SELECT {} FROM transactions {} ORDER BY date DESC, id DESC LIMIT ?",
            TRANSACTION_COLUMNS, where_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let transactions = stmt
            .query_map(params_refs.as_slice(), row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(transactions)
    }

    /// Update mutable transaction fields, enforcing per-field capabilities
    pub fn update_transaction(
        &self,
        id: i64,
        changes: &TransactionUpdate,
        actor: &str,
        role: Role,
    ) -> Result<Transaction> {
        for field in changes.touched_fields() {
            if !can_edit_field(role, field, false) {
                return Err(Error::Validation(format!(
                    "role {} cannot edit field {}",
                    role, field
                )));
            }
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        // ensure it exists before building the update
        fetch_transaction(&tx, id)?;

        if let Some(date) = changes.date {
            tx.execute(
                "UPDATE transactions SET date = ? WHERE id = ?",
                params![date.to_string(), id],
            )?;
        }
        if let Some(ref client_id) = changes.client_id {
            tx.execute(
                "UPDATE transactions SET client_id = ? WHERE id = ?",
                params![client_id, id],
            )?;
        }
        if let Some(ref seller_id) = changes.seller_id {
            tx.execute(
                "UPDATE transactions SET seller_id = ? WHERE id = ?",
                params![seller_id, id],
            )?;
        }
        if let Some(ref type_id) = changes.transaction_type_id {
            tx.execute(
                "UPDATE transactions SET transaction_type_id = ? WHERE id = ?",
                params![type_id, id],
            )?;
        }
        if let Some(ref description) = changes.description {
            tx.execute(
                "UPDATE transactions SET description = ? WHERE id = ?",
                params![description, id],
            )?;
        }
        if let Some(amount) = changes.expected_amount {
            tx.execute(
                "UPDATE transactions SET expected_amount = ? WHERE id = ?",
                params![money_text(amount), id],
            )?;
        }

        let updated = fetch_transaction(&tx, id)?;
        history::record_transaction(&tx, &updated, HistoryKind::Changed, Some(actor))?;
        tx.commit()?;
        Ok(updated)
    }

    /// Attach an invoice number, moving the transaction to Invoiced.
    ///
    /// Only valid from Pending; the status machine is one-directional.
    pub fn set_invoice(
        &self,
        id: i64,
        invoice_number: &str,
        actor: &str,
        role: Role,
    ) -> Result<Transaction> {
        if !can_edit_field(role, "invoice_number", false) {
            return Err(Error::Validation(format!(
                "role {} cannot set invoice fields",
                role
            )));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let current = fetch_transaction(&tx, id)?;
        if current.status != TransactionStatus::Pending {
            return Err(Error::Validation(format!(
                "transaction {} is {}, only pending transactions can be invoiced",
                current.unique_transaction_id, current.status
            )));
        }

        tx.execute(
            "UPDATE transactions SET status = ?, invoice_number = ?, invoiced_by = ? WHERE id = ?",
            params![
                TransactionStatus::Invoiced.as_str(),
                invoice_number,
                actor,
                id
            ],
        )?;
        let updated = fetch_transaction(&tx, id)?;
        history::record_transaction(&tx, &updated, HistoryKind::Changed, Some(actor))?;
        tx.commit()?;

        info!(transaction_id = id, invoice_number, "transaction invoiced");
        Ok(updated)
    }

    /// Void a pending transaction
    pub fn void_transaction(&self, id: i64, actor: &str, role: Role) -> Result<Transaction> {
        if !can_edit_field(role, "status", false) {
            return Err(Error::Validation(format!(
                "role {} cannot change transaction status",
                role
            )));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let current = fetch_transaction(&tx, id)?;
        if current.status != TransactionStatus::Pending {
            return Err(Error::Validation(format!(
                "transaction {} is {}, only pending transactions can be voided",
                current.unique_transaction_id, current.status
            )));
        }

        tx.execute(
            "UPDATE transactions SET status = ? WHERE id = ?",
            params![TransactionStatus::Voided.as_str(), id],
        )?;
        let updated = fetch_transaction(&tx, id)?;
        history::record_transaction(&tx, &updated, HistoryKind::Changed, Some(actor))?;
        tx.commit()?;
        Ok(updated)
    }

    /// Delete a transaction into the history log.
    ///
    /// Linked receipts are detached (transaction_id set NULL by the schema),
    /// becoming free credits again.
    pub fn delete_transaction(&self, id: i64, actor: &str, role: Role) -> Result<()> {
        if !can_delete(role) {
            return Err(Error::Validation(
                "insufficient permission: delete requires the admin role".to_string(),
            ));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let current = fetch_transaction(&tx, id)?;
        history::record_transaction(&tx, &current, HistoryKind::Deleted, Some(actor))?;
        tx.execute("DELETE FROM transactions WHERE id = ?", params![id])?;
        tx.commit()?;

        info!(transaction_id = id, "transaction deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initials_from_usernames() {
        assert_eq!(initials("ana.maria"), "AM");
        assert_eq!(initials("jperez"), "J");
        assert_eq!(initials("juan_carlos_gomez"), "JCG");
        assert_eq!(initials("---"), "XX");
    }
}
