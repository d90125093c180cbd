//! Audit history commands (log, deleted, restore)

use anyhow::{bail, Result};
use recaudo_core::db::{diff_snapshots, HistoryEntry, HistoryKind};
use recaudo_core::models::{Receipt, Transaction};
use recaudo_core::roles::Role;
use recaudo_core::Database;

enum Entity {
    Transactions,
    Receipts,
}

fn parse_entity(s: &str) -> Result<Entity> {
    match s.to_lowercase().as_str() {
        "transaction" | "transactions" => Ok(Entity::Transactions),
        "receipt" | "receipts" => Ok(Entity::Receipts),
        other => bail!("Unknown entity {:?} (use transactions or receipts)", other),
    }
}

fn kind_label(kind: HistoryKind) -> &'static str {
    match kind {
        HistoryKind::Created => "created",
        HistoryKind::Changed => "changed",
        HistoryKind::Deleted => "deleted",
    }
}

fn print_log(entries: &[HistoryEntry]) {
    // entries come newest first; diff each change against its predecessor
    for (i, entry) in entries.iter().enumerate() {
        println!(
            "   [{}] {}  {}  by {}",
            entry.history_id,
            entry.history_date.format("%Y-%m-%d %H:%M:%S"),
            kind_label(entry.kind),
            entry.history_user.as_deref().unwrap_or("?")
        );
        if entry.kind == HistoryKind::Changed {
            if let Some(prev) = entries.get(i + 1) {
                if let Ok(changes) = diff_snapshots(&prev.snapshot, &entry.snapshot) {
                    for c in changes {
                        println!(
                            "        {}: {} → {}",
                            c.field,
                            c.old.as_deref().unwrap_or("-"),
                            c.new.as_deref().unwrap_or("-")
                        );
                    }
                }
            }
        }
    }
}

pub fn cmd_history_log(db: &Database, entity: &str, id: i64) -> Result<()> {
    let entries = match parse_entity(entity)? {
        Entity::Transactions => db.transaction_history(id)?,
        Entity::Receipts => db.receipt_history(id)?,
    };
    if entries.is_empty() {
        println!("No history for {} {}.", entity, id);
        return Ok(());
    }
    println!();
    println!("📜 History of {} {}", entity, id);
    print_log(&entries);
    Ok(())
}

pub fn cmd_history_deleted(db: &Database, entity: &str) -> Result<()> {
    match parse_entity(entity)? {
        Entity::Transactions => {
            let entries = db.deleted_transactions()?;
            if entries.is_empty() {
                println!("No deleted transactions.");
                return Ok(());
            }
            println!();
            println!("🗑️  Deleted transactions (restore with 'recaudo history restore transactions <history_id>')");
            for entry in &entries {
                let tx: Transaction = entry.decode()?;
                println!(
                    "   [{}] {}  {}  deleted {} by {}",
                    entry.history_id,
                    tx.unique_transaction_id,
                    tx.date,
                    entry.history_date.format("%Y-%m-%d %H:%M:%S"),
                    entry.history_user.as_deref().unwrap_or("?")
                );
            }
        }
        Entity::Receipts => {
            let entries = db.deleted_receipts()?;
            if entries.is_empty() {
                println!("No deleted receipts.");
                return Ok(());
            }
            println!();
            println!("🗑️  Deleted receipts (restore with 'recaudo history restore receipts <history_id>')");
            for entry in &entries {
                let r: Receipt = entry.decode()?;
                println!(
                    "   [{}] receipt {}  {} {}  ${}  deleted {} by {}",
                    entry.history_id,
                    r.id,
                    r.fecha,
                    r.comprobante,
                    r.valor,
                    entry.history_date.format("%Y-%m-%d %H:%M:%S"),
                    entry.history_user.as_deref().unwrap_or("?")
                );
            }
        }
    }
    Ok(())
}

pub fn cmd_history_restore(
    db: &Database,
    entity: &str,
    history_id: i64,
    user: &str,
    role: Role,
) -> Result<()> {
    match parse_entity(entity)? {
        Entity::Transactions => {
            let tx = db.restore_transaction(history_id, user, role)?;
            println!("✅ Transaction {} restored", tx.unique_transaction_id);
        }
        Entity::Receipts => {
            let r = db.restore_receipt(history_id, user, role)?;
            println!("✅ Receipt {} restored ({} ${})", r.id, r.comprobante, r.valor);
        }
    }
    Ok(())
}
