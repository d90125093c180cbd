//! Receipt commands (submit, list, show, status, delete)

use anyhow::{bail, Result};
use chrono::{Datelike, NaiveDate, NaiveTime};
use recaudo_core::calendar::{colombian_fixed_holidays, effective_date};
use recaudo_core::db::ReceiptFilter;
use recaudo_core::detect::{submit_receipt, ReceiptSubmission};
use recaudo_core::models::{PaymentStatus, Receipt};
use recaudo_core::roles::Role;
use recaudo_core::{Database, Error};
use rust_decimal::Decimal;

use super::truncate;

fn parse_hora(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| anyhow::anyhow!("Invalid time {:?} (use HH:MM or HH:MM:SS)", s))
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_receipts_submit(
    db: &Database,
    fecha: NaiveDate,
    hora: &str,
    comprobante: &str,
    bank: &str,
    client_dni: Option<&str>,
    source: Option<&str>,
    valor: Decimal,
    description: Option<&str>,
    confirm_override: bool,
    user: &str,
) -> Result<()> {
    let hora = parse_hora(hora)?;
    let bank = db.get_or_create_bank(bank)?;
    let client_id = match client_dni {
        Some(dni) => Some(db.get_client_by_dni(dni)?.id),
        None => None,
    };
    let source_id = match source {
        Some(name) => Some(db.get_or_create_source(name, 0)?.id),
        None => None,
    };

    let submission = ReceiptSubmission {
        fecha,
        hora,
        comprobante: comprobante.to_string(),
        client_id,
        bank_id: bank.id,
        source_id,
        valor,
        description: description.map(|s| s.to_string()),
        confirm_override,
    };

    match submit_receipt(db, &submission, user) {
        Ok(receipt) => {
            println!(
                "✅ Receipt {} saved: {} {} {} ${}",
                receipt.id, receipt.fecha, receipt.comprobante, bank.name, receipt.valor
            );
            Ok(())
        }
        Err(Error::ExactDuplicate {
            existing_id,
            comprobante,
            bank,
            valor,
            ..
        }) => {
            println!("❌ Exact duplicate of receipt {}: {} {} ${}", existing_id, comprobante, bank, valor);
            println!("   The attempt was logged for review (recaudo duplicates list).");
            bail!("receipt not saved");
        }
        Err(Error::SimilarDuplicate { similar }) => {
            println!("⚠️  {} similar receipt(s) on the same date, time, bank and amount:", similar.len());
            for r in &similar {
                println!("   #{}  {} {}  comprobante {}  ${}", r.id, r.fecha, r.hora, r.comprobante, r.valor);
            }
            println!("   Re-run with --confirm-override to save anyway.");
            bail!("receipt not saved");
        }
        Err(e) => Err(e.into()),
    }
}

pub fn cmd_receipts_list(
    db: &Database,
    status: Option<&str>,
    client_dni: Option<&str>,
    transaction_id: Option<i64>,
    only_unlinked: bool,
    limit: i64,
) -> Result<()> {
    let status = status
        .map(|s| s.parse::<PaymentStatus>())
        .transpose()
        .map_err(|e| anyhow::anyhow!(e))?;
    let client_id = match client_dni {
        Some(dni) => Some(db.get_client_by_dni(dni)?.id),
        None => None,
    };

    let receipts = db.list_receipts(
        &ReceiptFilter {
            client_id,
            transaction_id,
            status,
            only_unlinked,
        },
        limit,
    )?;
    if receipts.is_empty() {
        println!("No receipts found.");
        return Ok(());
    }

    println!();
    println!(
        "   {:>5}  {:<10} {:<8} {:<14} {:>12}  {:<9}  {}",
        "id", "fecha", "hora", "comprobante", "valor", "estado", "transaccion"
    );
    for r in &receipts {
        let tx = r
            .transaction_id
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "   {:>5}  {:<10} {:<8} {:<14} {:>12}  {:<9}  {}",
            r.id,
            r.fecha.to_string(),
            r.hora.to_string(),
            truncate(&r.comprobante, 14),
            r.valor.to_string(),
            r.payment_status.to_string(),
            tx
        );
    }
    println!();
    println!("   {} receipt(s)", receipts.len());
    Ok(())
}

pub fn cmd_receipts_show(db: &Database, id: i64) -> Result<()> {
    let receipt = db.get_receipt(id)?;
    print_receipt(db, &receipt)?;
    Ok(())
}

fn print_receipt(db: &Database, r: &Receipt) -> Result<()> {
    let bank = db.get_bank(r.bank_id)?;

    println!();
    println!("🧾 Receipt {}", r.id);
    println!("   Fecha:        {} {}", r.fecha, r.hora);
    println!("   Comprobante:  {}", r.comprobante);
    println!("   Banco:        {}", bank.name);
    println!("   Valor:        ${}", r.valor);
    println!("   Estado:       {}", r.payment_status);
    if let Some(client_id) = r.client_id {
        let client = db.get_client(client_id)?;
        println!("   Cliente:      {} ({})", client.name, client.dni);
    }
    if let Some(source_id) = r.source_id {
        let source = db.get_source(source_id)?;
        println!("   Origen:       {}", source.name);
        if source.effective_days > 0 {
            let mut holidays = colombian_fixed_holidays(r.fecha.year());
            holidays.extend(colombian_fixed_holidays(r.fecha.year() + 1));
            let clears = effective_date(r.fecha, source.effective_days, &holidays);
            println!("   Efectivo:     {} ({} business days)", clears, source.effective_days);
        }
    }
    if let Some(tx_id) = r.transaction_id {
        let tx = db.get_transaction(tx_id)?;
        println!("   Transaccion:  {} ({})", tx.unique_transaction_id, tx.status);
    }
    if let Some(sibling) = r.linked_credit_note {
        println!("   Nota credito: linked to receipt {}", sibling);
    }
    if let Some(ref desc) = r.description {
        println!("   Nota:         {}", desc);
    }
    if let Some(ref who) = r.uploaded_by {
        println!("   Cargado por:  {}", who);
    }
    Ok(())
}

pub fn cmd_receipts_status(
    db: &Database,
    id: i64,
    status: &str,
    user: &str,
    role: Role,
) -> Result<()> {
    let status: PaymentStatus = status.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let receipt = db.set_payment_status(id, status, user, role)?;
    println!("✅ Receipt {} is now {}", receipt.id, receipt.payment_status);
    Ok(())
}

pub fn cmd_receipts_delete(db: &Database, id: i64, user: &str, role: Role) -> Result<()> {
    db.delete_receipt(id, user, role)?;
    println!("🗑️  Receipt {} deleted (recoverable via history restore)", id);
    Ok(())
}
