//! Transaction commands (create, list, show, update, invoice, void, delete)

use anyhow::Result;
use chrono::NaiveDate;
use recaudo_core::db::TransactionUpdate;
use recaudo_core::models::{NewTransaction, Transaction, TransactionStatus};
use recaudo_core::roles::Role;
use recaudo_core::{reconcile, Database};
use rust_decimal::Decimal;

use super::truncate;

#[allow(clippy::too_many_arguments)]
pub fn cmd_transactions_create(
    db: &Database,
    date: NaiveDate,
    client_dni: Option<&str>,
    seller: Option<&str>,
    transaction_type: Option<&str>,
    description: Option<&str>,
    expected: Decimal,
    user: &str,
    role: Role,
) -> Result<()> {
    let client_id = match client_dni {
        Some(dni) => Some(db.get_client_by_dni(dni)?.id),
        None => None,
    };
    let seller_id = match seller {
        Some(name) => Some(db.get_or_create_seller(name)?.id),
        None => None,
    };
    let transaction_type_id = match transaction_type {
        Some(name) => Some(db.get_or_create_transaction_type(name)?.id),
        None => None,
    };

    let tx = db.create_transaction(
        &NewTransaction {
            date,
            client_id,
            seller_id,
            transaction_type_id,
            description: description.map(|s| s.to_string()),
            expected_amount: expected,
        },
        user,
        role,
    )?;

    println!("✅ Transaction created: {}", tx.unique_transaction_id);
    println!("   id {}  expected ${}", tx.id, tx.expected_amount);
    Ok(())
}

pub fn cmd_transactions_list(
    db: &Database,
    status: Option<&str>,
    client_dni: Option<&str>,
    limit: i64,
) -> Result<()> {
    let status = status
        .map(|s| s.parse::<TransactionStatus>())
        .transpose()
        .map_err(|e| anyhow::anyhow!(e))?;
    let client_id = match client_dni {
        Some(dni) => Some(db.get_client_by_dni(dni)?.id),
        None => None,
    };

    let transactions = db.list_transactions(status, client_id, limit)?;
    if transactions.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    println!();
    println!(
        "   {:>5}  {:<24} {:<10} {:>12}  {:<10}  {}",
        "id", "unique id", "date", "expected", "status", "invoice"
    );
    for t in &transactions {
        println!(
            "   {:>5}  {:<24} {:<10} {:>12}  {:<10}  {}",
            t.id,
            truncate(&t.unique_transaction_id, 24),
            t.date.to_string(),
            t.expected_amount.to_string(),
            t.status.to_string(),
            t.invoice_number.as_deref().unwrap_or("-")
        );
    }
    println!();
    println!("   {} transaction(s)", transactions.len());
    Ok(())
}

/// Accepts either a numeric id or a unique transaction id
fn resolve_transaction(db: &Database, reference: &str) -> Result<Transaction> {
    match reference.parse::<i64>() {
        Ok(id) => Ok(db.get_transaction(id)?),
        Err(_) => Ok(db.get_transaction_by_uid(reference)?),
    }
}

pub fn cmd_transactions_show(db: &Database, reference: &str) -> Result<()> {
    let tx = resolve_transaction(db, reference)?;
    let total = reconcile::receipts_total(db, tx.id)?;
    let difference = reconcile::difference(db, tx.id)?;

    println!();
    println!("📄 Transaction {}", tx.unique_transaction_id);
    println!("   Id:          {}", tx.id);
    println!("   Date:        {}", tx.date);
    println!("   Status:      {}", tx.status);
    if let Some(client_id) = tx.client_id {
        let client = db.get_client(client_id)?;
        println!("   Client:      {} ({})", client.name, client.dni);
    }
    if let Some(ref number) = tx.invoice_number {
        println!(
            "   Invoice:     {} (by {})",
            number,
            tx.invoiced_by.as_deref().unwrap_or("?")
        );
    }
    if let Some(ref desc) = tx.description {
        println!("   Description: {}", desc);
    }
    println!("   Expected:    ${}", tx.expected_amount);
    println!("   Received:    ${}", total);
    println!("   Difference:  ${}", difference);
    Ok(())
}

pub fn cmd_transactions_update(
    db: &Database,
    id: i64,
    date: Option<NaiveDate>,
    description: Option<&str>,
    expected: Option<Decimal>,
    user: &str,
    role: Role,
) -> Result<()> {
    let tx = db.update_transaction(
        id,
        &TransactionUpdate {
            date,
            description: description.map(|s| Some(s.to_string())),
            expected_amount: expected,
            ..Default::default()
        },
        user,
        role,
    )?;
    println!("✅ Transaction {} updated", tx.unique_transaction_id);
    Ok(())
}

pub fn cmd_transactions_invoice(
    db: &Database,
    id: i64,
    number: &str,
    user: &str,
    role: Role,
) -> Result<()> {
    let tx = db.set_invoice(id, number, user, role)?;
    println!(
        "✅ Transaction {} invoiced as {}",
        tx.unique_transaction_id,
        tx.invoice_number.as_deref().unwrap_or(number)
    );
    Ok(())
}

pub fn cmd_transactions_void(db: &Database, id: i64, user: &str, role: Role) -> Result<()> {
    let tx = db.void_transaction(id, user, role)?;
    println!("✅ Transaction {} voided", tx.unique_transaction_id);
    Ok(())
}

pub fn cmd_transactions_delete(db: &Database, id: i64, user: &str, role: Role) -> Result<()> {
    db.delete_transaction(id, user, role)?;
    println!("🗑️  Transaction {} deleted; its receipts are free credits again", id);
    Ok(())
}
