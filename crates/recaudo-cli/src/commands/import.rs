//! Bulk CSV import and export commands

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use recaudo_core::export::ReceiptExportOptions;
use recaudo_core::{import, Database};

pub fn cmd_import_receipts(db: &Database, file: &Path, user: &str) -> Result<()> {
    let reader = File::open(file)
        .with_context(|| format!("Failed to open {}", file.display()))?;
    let batch = import::parse_receipt_rows(reader)?;

    println!("📥 Importing {} row(s) from {}", batch.rows.len(), file.display());
    let report = import::import_receipts(db, &batch, user)?;

    println!();
    println!("   Processed:  {}", report.processed);
    println!("   Created:    {}", report.created);
    println!("   Duplicates: {}", report.duplicates);
    if !report.errors.is_empty() {
        println!("   ⚠️  Rows skipped with errors: {}", report.errors.len());
        for e in &report.errors {
            println!("      row {}: {}", e.row_number, e.message);
        }
    }
    Ok(())
}

pub fn cmd_import_clients(db: &Database, file: &Path) -> Result<()> {
    let reader = File::open(file)
        .with_context(|| format!("Failed to open {}", file.display()))?;
    let (rows, errors) = import::parse_client_rows(reader)?;

    println!("📥 Loading {} client(s) from {}", rows.len(), file.display());
    let report = import::import_clients(db, &rows, errors)?;

    println!();
    println!("   Created: {}", report.created);
    println!("   Already known: {}", report.skipped);
    if !report.errors.is_empty() {
        println!("   ⚠️  Rows skipped with errors: {}", report.errors.len());
        for e in &report.errors {
            println!("      row {}: {}", e.row_number, e.message);
        }
    }
    Ok(())
}

pub fn cmd_export_receipts(
    db: &Database,
    output: Option<&Path>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    client_dni: Option<&str>,
) -> Result<()> {
    let client_id = match client_dni {
        Some(dni) => Some(db.get_client_by_dni(dni)?.id),
        None => None,
    };
    let csv = db.export_receipts_csv(&ReceiptExportOptions {
        from,
        to,
        client_id,
    })?;

    match output {
        Some(path) => {
            std::fs::write(path, &csv)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            let rows = csv.lines().count().saturating_sub(1);
            println!("✅ Exported {} receipt(s) to {}", rows, path.display());
        }
        None => print!("{}", csv),
    }
    Ok(())
}
