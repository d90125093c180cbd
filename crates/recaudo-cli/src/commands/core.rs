//! Core commands (init, status)

use std::path::Path;

use anyhow::Result;
use recaudo_core::Database;

use super::open_db;

pub fn cmd_init(db_path: &Path) -> Result<()> {
    let db = open_db(db_path)?;
    println!("✅ Database initialized at {}", db.path());
    println!("   Next steps:");
    println!("   recaudo import clients --file clientes.csv");
    println!("   recaudo import receipts --file abonos.csv");
    Ok(())
}

pub fn cmd_status(db: &Database) -> Result<()> {
    let conn = db.conn()?;
    let count = |sql: &str| -> Result<i64> {
        Ok(conn.query_row(sql, [], |row| row.get::<_, i64>(0))?)
    };

    let clients = count("SELECT COUNT(*) FROM clients")?;
    let receipts = count("SELECT COUNT(*) FROM receipts")?;
    let free_credits = count(
        "SELECT COUNT(*) FROM receipts \
         WHERE payment_status = 'aprobado' AND transaction_id IS NULL",
    )?;
    let transactions = count("SELECT COUNT(*) FROM transactions")?;
    let pending = count("SELECT COUNT(*) FROM transactions WHERE status = 'pendiente'")?;
    let unresolved = count("SELECT COUNT(*) FROM duplicate_attempts WHERE is_resolved = 0")?;
    let access = count("SELECT COUNT(*) FROM access_requests")?;

    println!();
    println!("📊 Recaudo Status");
    println!("   ─────────────────────────────────────────");
    println!("   Database: {}", db.path());
    println!();
    println!("   Clients:           {}", clients);
    println!("   Receipts:          {}  ({} free credits)", receipts, free_credits);
    println!("   Transactions:      {}  ({} pending)", transactions, pending);
    if unresolved > 0 {
        println!("   ⚠️  Unresolved duplicate attempts: {}", unresolved);
    }
    if access > 0 {
        println!("   🔑 Pending access requests: {}", access);
    }
    println!();
    Ok(())
}
