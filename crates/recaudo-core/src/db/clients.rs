//! Client operations and normalization

use regex::Regex;
use rusqlite::{params, OptionalExtension};
use rust_decimal::Decimal;
use tracing::info;

use super::{parse_datetime, parse_money_strict, Database};
use crate::error::{Error, Result};
use crate::models::Client;

/// Uppercase a client name and strip everything but letters and spaces
pub fn normalize_name(name: &str) -> Result<String> {
    let upper = name.trim().to_uppercase();
    let re = Regex::new(r"[^A-ZÁÉÍÓÚÑÜ\s]")?;
    let cleaned = re.replace_all(&upper, "");
    Ok(cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Strip a document number to alphanumeric characters and hyphens
pub fn normalize_dni(dni: &str) -> Result<String> {
    let re = Regex::new(r"[^A-Za-z0-9\-]")?;
    Ok(re.replace_all(dni.trim(), "").to_string())
}

fn row_to_client(row: &rusqlite::Row) -> rusqlite::Result<Client> {
    let created_at: String = row.get(3)?;
    Ok(Client {
        id: row.get(0)?,
        name: row.get(1)?,
        dni: row.get(2)?,
        created_at: parse_datetime(&created_at),
    })
}

const CLIENT_COLUMNS: &str = "id, name, dni, created_at";

impl Database {
    /// Get a client by dni or create it, normalizing both fields.
    /// Returns the client and whether it was created.
    pub fn get_or_create_client(&self, name: &str, dni: &str) -> Result<(Client, bool)> {
        let name = normalize_name(name)?;
        let dni = normalize_dni(dni)?;
        if dni.is_empty() {
            return Err(Error::Validation("client dni must not be empty".to_string()));
        }

        let conn = self.conn()?;
        let existing = conn
            .query_row(
                &format!("SELECT {} FROM clients WHERE dni = ?", CLIENT_COLUMNS),
                params![dni],
                row_to_client,
            )
            .optional()?;
        if let Some(client) = existing {
            return Ok((client, false));
        }

        conn.execute(
            "INSERT INTO clients (name, dni) VALUES (?, ?)",
            params![name, dni],
        )?;
        let client = conn.query_row(
            &format!("SELECT {} FROM clients WHERE id = ?", CLIENT_COLUMNS),
            params![conn.last_insert_rowid()],
            row_to_client,
        )?;
        info!(client_id = client.id, dni = %client.dni, "client created");
        Ok((client, true))
    }

    pub fn get_client(&self, id: i64) -> Result<Client> {
        self.conn()?
            .query_row(
                &format!("SELECT {} FROM clients WHERE id = ?", CLIENT_COLUMNS),
                params![id],
                row_to_client,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("client {}", id)))
    }

    pub fn get_client_by_dni(&self, dni: &str) -> Result<Client> {
        let dni = normalize_dni(dni)?;
        self.conn()?
            .query_row(
                &format!("SELECT {} FROM clients WHERE dni = ?", CLIENT_COLUMNS),
                params![dni],
                row_to_client,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("client with dni {}", dni)))
    }

    pub fn list_clients(&self, limit: i64) -> Result<Vec<Client>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM clients ORDER BY name LIMIT ?",
            CLIENT_COLUMNS
        ))?;
        let clients = stmt
            .query_map(params![limit], row_to_client)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(clients)
    }

    /// Substring search over name and dni (case-insensitive)
    pub fn search_clients(&self, query: &str) -> Result<Vec<Client>> {
        let conn = self.conn()?;
        let pattern = format!("%{}%", query.trim());
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM clients \
             WHERE name LIKE ? COLLATE NOCASE OR dni LIKE ? COLLATE NOCASE \
             ORDER BY name",
            CLIENT_COLUMNS
        ))?;
        let clients = stmt
            .query_map(params![pattern, pattern], row_to_client)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(clients)
    }

    /// Sum of the client's approved receipts with no transaction link
    pub fn available_balance(&self, client_id: i64) -> Result<Decimal> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT valor FROM receipts \
             WHERE client_id = ? AND payment_status = 'aprobado' AND transaction_id IS NULL",
        )?;
        let amounts = stmt
            .query_map(params![client_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        amounts.iter().map(|s| parse_money_strict(s)).sum()
    }

    /// Delete a client; refused while transactions or receipts reference it
    pub fn delete_client(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let referenced: i64 = conn.query_row(
            "SELECT (SELECT COUNT(*) FROM transactions WHERE client_id = ?1) \
                  + (SELECT COUNT(*) FROM receipts WHERE client_id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        if referenced > 0 {
            return Err(Error::Protected(format!(
                "client {} is referenced by {} record(s)",
                id, referenced
            )));
        }
        let deleted = conn.execute("DELETE FROM clients WHERE id = ?", params![id])?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("client {}", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_normalization() {
        assert_eq!(normalize_name("  Pérez & Cía. 123 ").unwrap(), "PÉREZ CÍA");
        assert_eq!(normalize_name("maria lopez").unwrap(), "MARIA LOPEZ");
    }

    #[test]
    fn dni_normalization() {
        assert_eq!(normalize_dni(" 900.123.456-7 ").unwrap(), "900123456-7");
        assert_eq!(normalize_dni("CC 1.020").unwrap(), "CC1020");
    }
}
