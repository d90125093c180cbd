//! Duplicate-attempt review commands

use std::path::Path;

use anyhow::{Context, Result};
use recaudo_core::Database;

pub fn cmd_duplicates_list(db: &Database, all: bool) -> Result<()> {
    let attempts = db.list_duplicate_attempts(!all)?;
    if attempts.is_empty() {
        if all {
            println!("No duplicate attempts recorded.");
        } else {
            println!("✅ No unresolved duplicate attempts.");
        }
        return Ok(());
    }

    println!();
    println!("👯 Duplicate attempts");
    for a in &attempts {
        let mark = if a.is_resolved {
            format!("resolved by {}", a.resolved_by.as_deref().unwrap_or("?"))
        } else {
            "UNRESOLVED".to_string()
        };
        println!(
            "   [{}] {}  {}  by {}  ({})",
            a.id,
            a.created_at.format("%Y-%m-%d %H:%M:%S"),
            a.kind,
            a.username,
            mark
        );
        // the stored payload is JSON; re-render it so hand-edited rows
        // still print something readable
        let data = serde_json::from_str::<serde_json::Value>(&a.data)
            .map(|v| v.to_string())
            .unwrap_or_else(|_| a.data.clone());
        println!("        {}", data);
    }
    println!();
    println!("   {} attempt(s)", attempts.len());
    Ok(())
}

pub fn cmd_duplicates_resolve(db: &Database, id: i64, user: &str) -> Result<()> {
    db.resolve_duplicate_attempt(id, user)?;
    println!("✅ Attempt {} marked reviewed", id);
    Ok(())
}

pub fn cmd_duplicates_export(db: &Database, output: Option<&Path>) -> Result<()> {
    let csv = db.export_duplicate_attempts_csv()?;
    match output {
        Some(path) => {
            std::fs::write(path, &csv)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("✅ Attempt log exported to {}", path.display());
        }
        None => print!("{}", csv),
    }
    Ok(())
}
