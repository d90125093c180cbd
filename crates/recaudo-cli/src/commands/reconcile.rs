//! Reconciliation commands (status, apply, unlink, credit-note)

use anyhow::Result;
use recaudo_core::db::ReceiptFilter;
use recaudo_core::roles::Role;
use recaudo_core::{reconcile, Database};
use rust_decimal::Decimal;

pub fn cmd_reconcile_status(db: &Database, transaction_id: i64) -> Result<()> {
    let tx = db.get_transaction(transaction_id)?;
    let total = reconcile::receipts_total(db, transaction_id)?;
    let difference = reconcile::difference(db, transaction_id)?;

    println!();
    println!("⚖️  {}", tx.unique_transaction_id);
    println!("   Expected:   ${}", tx.expected_amount);
    println!("   Received:   ${}", total);
    println!("   Difference: ${}", difference);
    if difference > Decimal::ZERO {
        println!("   → underpaid by ${}", difference);
    } else if difference < Decimal::ZERO {
        println!("   → overpaid by ${}; run 'recaudo reconcile credit-note {}'", -difference, transaction_id);
    } else {
        println!("   → balanced");
    }

    let linked = db.list_receipts(
        &ReceiptFilter {
            transaction_id: Some(transaction_id),
            ..Default::default()
        },
        i64::MAX,
    )?;
    if !linked.is_empty() {
        println!();
        println!("   Linked receipts:");
        for r in &linked {
            println!("   #{}  {} {}  ${}", r.id, r.fecha, r.comprobante, r.valor);
        }
    }
    Ok(())
}

fn print_report(report: &reconcile::ApplyReport, verb: &str) {
    for id in &report.applied {
        println!("   ✅ receipt {} {}", id, verb);
    }
    for (id, reason) in &report.skipped {
        println!("   ⚠️  receipt {} skipped: {}", id, reason);
    }
}

pub fn cmd_reconcile_apply(
    db: &Database,
    transaction_id: i64,
    receipt_ids: &[i64],
    user: &str,
) -> Result<()> {
    let report = reconcile::apply_credits(db, transaction_id, receipt_ids, user)?;
    print_report(&report, "applied");
    let difference = reconcile::difference(db, transaction_id)?;
    println!("   Difference is now ${}", difference);
    Ok(())
}

pub fn cmd_reconcile_unlink(
    db: &Database,
    transaction_id: i64,
    receipt_ids: &[i64],
    user: &str,
) -> Result<()> {
    let report = reconcile::unlink_credits(db, transaction_id, receipt_ids, user)?;
    print_report(&report, "detached");
    Ok(())
}

pub fn cmd_reconcile_credit_note(
    db: &Database,
    transaction_id: i64,
    user: &str,
    role: Role,
) -> Result<()> {
    let (favor, ajuste) = reconcile::generate_credit_note(db, transaction_id, user, role)?;
    println!("✅ Credit note pair generated:");
    println!("   {}  ${}  (free credit for the client)", favor.comprobante, favor.valor);
    println!("   {}  ${}  (balancing adjustment)", ajuste.comprobante, ajuste.valor);
    Ok(())
}
