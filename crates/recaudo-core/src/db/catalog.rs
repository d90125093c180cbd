//! Lookup-table operations: banks, sellers, transaction types, sources
//!
//! All names are uppercased on write and unique per table. Deletes are
//! protected while any live row references the entry.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::Database;
use crate::error::{Error, Result};
use crate::models::{Bank, Seller, TransactionSource, TransactionType};

/// Which name-only lookup table an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Bank,
    Seller,
    TransactionType,
}

impl CatalogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bank => "bank",
            Self::Seller => "seller",
            Self::TransactionType => "transaction-type",
        }
    }

    fn table(&self) -> &'static str {
        match self {
            Self::Bank => "banks",
            Self::Seller => "sellers",
            Self::TransactionType => "transaction_types",
        }
    }

    /// (referencing table, column) used for delete protection
    fn references(&self) -> (&'static str, &'static str) {
        match self {
            Self::Bank => ("receipts", "bank_id"),
            Self::Seller => ("transactions", "seller_id"),
            Self::TransactionType => ("transactions", "transaction_type_id"),
        }
    }
}

impl std::str::FromStr for CatalogKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bank" | "banks" => Ok(Self::Bank),
            "seller" | "sellers" => Ok(Self::Seller),
            "transaction-type" | "transaction-types" | "type" | "types" => {
                Ok(Self::TransactionType)
            }
            _ => Err(format!("Unknown catalog kind: {}", s)),
        }
    }
}

impl std::fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An entry of one of the name-only lookup tables
#[derive(Debug, Clone)]
pub struct CatalogItem {
    pub id: i64,
    pub name: String,
}

fn get_or_create_named(conn: &Connection, table: &str, name: &str) -> Result<CatalogItem> {
    let name = name.trim().to_uppercase();
    if name.is_empty() {
        return Err(Error::Validation(format!("{} name must not be empty", table)));
    }

    let existing: Option<(i64, String)> = conn
        .query_row(
            &format!("SELECT id, name FROM {} WHERE name = ?", table),
            params![name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    if let Some((id, name)) = existing {
        return Ok(CatalogItem { id, name });
    }

    conn.execute(&format!("INSERT INTO {} (name) VALUES (?)", table), params![name])?;
    debug!(table, %name, "catalog entry created");
    Ok(CatalogItem {
        id: conn.last_insert_rowid(),
        name,
    })
}

impl Database {
    /// Get or create an entry of a name-only lookup table
    pub fn catalog_get_or_create(&self, kind: CatalogKind, name: &str) -> Result<CatalogItem> {
        let conn = self.conn()?;
        get_or_create_named(&conn, kind.table(), name)
    }

    pub fn catalog_list(&self, kind: CatalogKind) -> Result<Vec<CatalogItem>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT id, name FROM {} ORDER BY name", kind.table()))?;
        let items = stmt
            .query_map([], |row| {
                Ok(CatalogItem {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn catalog_rename(&self, kind: CatalogKind, id: i64, new_name: &str) -> Result<()> {
        let name = new_name.trim().to_uppercase();
        let updated = self.conn()?.execute(
            &format!("UPDATE {} SET name = ? WHERE id = ?", kind.table()),
            params![name, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("{} {}", kind, id)));
        }
        Ok(())
    }

    /// Delete a lookup entry; refused while referenced
    pub fn catalog_delete(&self, kind: CatalogKind, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let (ref_table, ref_column) = kind.references();
        let referenced: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {} = ?", ref_table, ref_column),
            params![id],
            |row| row.get(0),
        )?;
        if referenced > 0 {
            return Err(Error::Protected(format!(
                "{} {} is referenced by {} record(s)",
                kind, id, referenced
            )));
        }
        let deleted = conn.execute(
            &format!("DELETE FROM {} WHERE id = ?", kind.table()),
            params![id],
        )?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("{} {}", kind, id)));
        }
        Ok(())
    }

    /// Get or create a bank by name
    pub fn get_or_create_bank(&self, name: &str) -> Result<Bank> {
        let item = self.catalog_get_or_create(CatalogKind::Bank, name)?;
        Ok(Bank {
            id: item.id,
            name: item.name,
        })
    }

    pub fn get_bank(&self, id: i64) -> Result<Bank> {
        self.conn()?
            .query_row(
                "SELECT id, name FROM banks WHERE id = ?",
                params![id],
                |row| {
                    Ok(Bank {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("bank {}", id)))
    }

    pub fn get_or_create_seller(&self, name: &str) -> Result<Seller> {
        let item = self.catalog_get_or_create(CatalogKind::Seller, name)?;
        Ok(Seller {
            id: item.id,
            name: item.name,
        })
    }

    pub fn get_or_create_transaction_type(&self, name: &str) -> Result<TransactionType> {
        let item = self.catalog_get_or_create(CatalogKind::TransactionType, name)?;
        Ok(TransactionType {
            id: item.id,
            name: item.name,
        })
    }

    /// Get or create a transaction source; `effective_days` only applies on
    /// creation, use [`Database::set_source_effective_days`] to change it.
    pub fn get_or_create_source(&self, name: &str, effective_days: i64) -> Result<TransactionSource> {
        let name = name.trim().to_uppercase();
        if name.is_empty() {
            return Err(Error::Validation("source name must not be empty".to_string()));
        }

        let conn = self.conn()?;
        let existing = conn
            .query_row(
                "SELECT id, name, effective_days FROM transaction_sources WHERE name = ?",
                params![name],
                row_to_source,
            )
            .optional()?;
        if let Some(source) = existing {
            return Ok(source);
        }

        conn.execute(
            "INSERT INTO transaction_sources (name, effective_days) VALUES (?, ?)",
            params![name, effective_days],
        )?;
        Ok(TransactionSource {
            id: conn.last_insert_rowid(),
            name,
            effective_days,
        })
    }

    pub fn get_source(&self, id: i64) -> Result<TransactionSource> {
        self.conn()?
            .query_row(
                "SELECT id, name, effective_days FROM transaction_sources WHERE id = ?",
                params![id],
                row_to_source,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("transaction source {}", id)))
    }

    pub fn list_sources(&self) -> Result<Vec<TransactionSource>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, name, effective_days FROM transaction_sources ORDER BY name")?;
        let sources = stmt
            .query_map([], row_to_source)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sources)
    }

    pub fn set_source_effective_days(&self, id: i64, effective_days: i64) -> Result<()> {
        let updated = self.conn()?.execute(
            "UPDATE transaction_sources SET effective_days = ? WHERE id = ?",
            params![effective_days, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("transaction source {}", id)));
        }
        Ok(())
    }

    /// Delete a transaction source; refused while receipts reference it
    pub fn delete_source(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let referenced: i64 = conn.query_row(
            "SELECT COUNT(*) FROM receipts WHERE source_id = ?",
            params![id],
            |row| row.get(0),
        )?;
        if referenced > 0 {
            return Err(Error::Protected(format!(
                "transaction source {} is referenced by {} receipt(s)",
                id, referenced
            )));
        }
        let deleted = conn.execute("DELETE FROM transaction_sources WHERE id = ?", params![id])?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("transaction source {}", id)));
        }
        Ok(())
    }
}

fn row_to_source(row: &rusqlite::Row) -> rusqlite::Result<TransactionSource> {
    Ok(TransactionSource {
        id: row.get(0)?,
        name: row.get(1)?,
        effective_days: row.get(2)?,
    })
}
