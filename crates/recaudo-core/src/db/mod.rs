//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `access` - Access requests and user role assignments
//! - `catalog` - Lookup tables (banks, sellers, sources, transaction types)
//! - `clients` - Client CRUD, normalization and balances
//! - `duplicates` - Duplicate attempt audit log
//! - `history` - Append-only history, diff, restore, deleted-item views
//! - `receipts` - Receipt CRUD and credit queries
//! - `transactions` - Transaction CRUD and the two-phase unique id

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rust_decimal::Decimal;

use crate::error::Result;

mod access;
mod catalog;
mod clients;
pub(crate) mod duplicates;
pub(crate) mod history;
pub(crate) mod receipts;
pub(crate) mod transactions;

#[cfg(test)]
mod tests;

pub use catalog::{CatalogItem, CatalogKind};
pub use history::{diff_snapshots, FieldChange, HistoryEntry, HistoryKind};
pub use receipts::ReceiptFilter;
pub use transactions::TransactionUpdate;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Format a timestamp the way SQLite's CURRENT_TIMESTAMP does
pub(crate) fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Parse a stored "YYYY-MM-DD" date column
pub(crate) fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_else(|_| Utc::now().date_naive())
}

/// Parse a stored "HH:MM:SS" (or "HH:MM") time column
pub(crate) fn parse_time(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .unwrap_or_else(|_| NaiveTime::MIN)
}

/// Parse a stored money column (TEXT, always written 2-dp quantized).
///
/// Row mappers cannot propagate an error, so a corrupted value falls back to
/// zero with a warning; summing paths use [`parse_money_strict`] instead.
pub(crate) fn parse_money(s: &str) -> Decimal {
    s.parse().unwrap_or_else(|_| {
        tracing::warn!(valor = s, "unparseable money value, treating as zero");
        Decimal::ZERO
    })
}

/// Like [`parse_money`] but propagates instead of folding to zero; balance
/// and reconciliation sums must not silently absorb corrupted rows.
pub(crate) fn parse_money_strict(s: &str) -> crate::error::Result<Decimal> {
    s.parse()
        .map_err(|_| crate::error::Error::Parse(format!("invalid money value: {:?}", s)))
}

/// Money amount in its canonical stored text form
pub(crate) fn money_text(valor: Decimal) -> String {
    crate::models::quantize(valor).to_string()
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool, running migrations on open
    pub fn new(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });
        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` so every pooled
    /// connection sees the same database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = format!("/tmp/recaudo_test_{}_{}.db", std::process::id(), id);

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- WAL mode: better concurrency, readers don't block writers
            PRAGMA journal_mode = WAL;

            -- Synchronous NORMAL: good balance of safety and performance
            PRAGMA synchronous = NORMAL;

            -- Clients (payers), dni is the natural key used by imports
            CREATE TABLE IF NOT EXISTS clients (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                dni TEXT NOT NULL UNIQUE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Lookup tables, unique by uppercase name
            CREATE TABLE IF NOT EXISTS banks (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS sellers (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS transaction_types (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            );

            -- Receipt origin channel; effective_days = business days to clear
            CREATE TABLE IF NOT EXISTS transaction_sources (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                effective_days INTEGER NOT NULL DEFAULT 0
            );

            -- Billable transactions
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                unique_transaction_id TEXT UNIQUE,
                date TEXT NOT NULL,
                client_id INTEGER REFERENCES clients(id),
                seller_id INTEGER REFERENCES sellers(id),
                transaction_type_id INTEGER REFERENCES transaction_types(id),
                description TEXT,
                status TEXT NOT NULL DEFAULT 'pendiente',
                invoice_number TEXT,
                invoiced_by TEXT,
                expected_amount TEXT NOT NULL DEFAULT '0.00',
                created_by TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_client ON transactions(client_id);
            CREATE INDEX IF NOT EXISTS idx_transactions_status ON transactions(status);

            -- Receipts; valor is stored as 2-dp quantized TEXT so the
            -- composite uniqueness key compares exactly
            CREATE TABLE IF NOT EXISTS receipts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fecha TEXT NOT NULL,
                hora TEXT NOT NULL,
                comprobante TEXT NOT NULL,
                client_id INTEGER REFERENCES clients(id),
                bank_id INTEGER NOT NULL REFERENCES banks(id),
                source_id INTEGER REFERENCES transaction_sources(id),
                valor TEXT NOT NULL,
                payment_status TEXT NOT NULL DEFAULT 'pendiente',
                transaction_id INTEGER REFERENCES transactions(id) ON DELETE SET NULL,
                linked_credit_note INTEGER REFERENCES receipts(id) ON DELETE SET NULL,
                description TEXT,
                uploaded_by TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                modified_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(fecha, hora, comprobante, bank_id, valor)
            );

            CREATE INDEX IF NOT EXISTS idx_receipts_transaction ON receipts(transaction_id);
            CREATE INDEX IF NOT EXISTS idx_receipts_client ON receipts(client_id);

            -- Duplicate detector audit trail
            CREATE TABLE IF NOT EXISTS duplicate_attempts (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                data TEXT NOT NULL,
                kind TEXT NOT NULL,
                is_resolved INTEGER NOT NULL DEFAULT 0,
                resolved_by TEXT,
                resolved_at DATETIME
            );

            -- Pending access requests, one per username
            CREATE TABLE IF NOT EXISTS access_requests (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                approved INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Role assignments produced by access approval
            CREATE TABLE IF NOT EXISTS user_roles (
                username TEXT PRIMARY KEY,
                role TEXT NOT NULL,
                assigned_by TEXT,
                assigned_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Append-only audit history, one table per tracked entity.
            -- history_type: '+' create, '~' update, '-' delete
            CREATE TABLE IF NOT EXISTS transactions_history (
                history_id INTEGER PRIMARY KEY,
                original_pk INTEGER NOT NULL,
                history_type TEXT NOT NULL CHECK (history_type IN ('+', '~', '-')),
                history_date DATETIME DEFAULT CURRENT_TIMESTAMP,
                history_user TEXT,
                snapshot TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_history_pk
                ON transactions_history(original_pk);

            CREATE TABLE IF NOT EXISTS receipts_history (
                history_id INTEGER PRIMARY KEY,
                original_pk INTEGER NOT NULL,
                history_type TEXT NOT NULL CHECK (history_type IN ('+', '~', '-')),
                history_date DATETIME DEFAULT CURRENT_TIMESTAMP,
                history_user TEXT,
                snapshot TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_receipts_history_pk
                ON receipts_history(original_pk);

            -- Default transaction type expected by data entry
            INSERT OR IGNORE INTO transaction_types (name) VALUES ('SIN DEFINIR');
            "#,
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod mod_tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn migrations_are_idempotent() {
        let db = Database::in_memory().unwrap();
        db.run_migrations().unwrap();
        db.run_migrations().unwrap();
    }

    #[test]
    fn money_text_is_canonical() {
        assert_eq!(money_text(dec!(100)), "100.00");
        assert_eq!(money_text(dec!(0.5)), "0.50");
        assert_eq!(parse_money("120.00"), dec!(120.00));
    }

    #[test]
    fn strict_money_parsing_rejects_garbage() {
        assert_eq!(parse_money_strict("120.00").unwrap(), dec!(120.00));
        assert!(parse_money_strict("1,5").is_err());
        assert_eq!(parse_money("1,5"), Decimal::ZERO);
    }

    #[test]
    fn time_parsing_accepts_short_form() {
        assert_eq!(parse_time("09:00").to_string(), "09:00:00");
        assert_eq!(parse_time("09:00:30").to_string(), "09:00:30");
    }
}
