//! Lookup-table commands (banks, sellers, types, sources)

use anyhow::Result;
use recaudo_core::db::CatalogKind;
use recaudo_core::Database;

fn parse_kind(kind: &str) -> Result<CatalogKind> {
    kind.parse().map_err(|e: String| anyhow::anyhow!(e))
}

pub fn cmd_catalog_list(db: &Database, kind: &str) -> Result<()> {
    let kind = parse_kind(kind)?;
    let items = db.catalog_list(kind)?;
    if items.is_empty() {
        println!("No {} entries.", kind);
        return Ok(());
    }
    println!();
    for item in &items {
        println!("   [{}] {}", item.id, item.name);
    }
    println!();
    println!("   {} {} entrie(s)", items.len(), kind);
    Ok(())
}

pub fn cmd_catalog_add(db: &Database, kind: &str, name: &str) -> Result<()> {
    let kind = parse_kind(kind)?;
    let item = db.catalog_get_or_create(kind, name)?;
    println!("✅ {} [{}] {}", kind, item.id, item.name);
    Ok(())
}

pub fn cmd_catalog_rename(db: &Database, kind: &str, id: i64, name: &str) -> Result<()> {
    let kind = parse_kind(kind)?;
    db.catalog_rename(kind, id, name)?;
    println!("✅ {} {} renamed to {}", kind, id, name.trim().to_uppercase());
    Ok(())
}

pub fn cmd_catalog_delete(db: &Database, kind: &str, id: i64) -> Result<()> {
    let kind = parse_kind(kind)?;
    db.catalog_delete(kind, id)?;
    println!("🗑️  {} {} deleted", kind, id);
    Ok(())
}

pub fn cmd_sources_list(db: &Database) -> Result<()> {
    let sources = db.list_sources()?;
    if sources.is_empty() {
        println!("No origin channels.");
        return Ok(());
    }
    println!();
    for s in &sources {
        println!("   [{}] {}  ({} business days to clear)", s.id, s.name, s.effective_days);
    }
    Ok(())
}

pub fn cmd_sources_add(db: &Database, name: &str, effective_days: i64) -> Result<()> {
    let source = db.get_or_create_source(name, effective_days)?;
    println!(
        "✅ Source [{}] {} ({} business days)",
        source.id, source.name, source.effective_days
    );
    Ok(())
}

pub fn cmd_sources_set_days(db: &Database, id: i64, days: i64) -> Result<()> {
    db.set_source_effective_days(id, days)?;
    println!("✅ Source {} now clears in {} business days", id, days);
    Ok(())
}

pub fn cmd_sources_delete(db: &Database, id: i64) -> Result<()> {
    db.delete_source(id)?;
    println!("🗑️  Source {} deleted", id);
    Ok(())
}
