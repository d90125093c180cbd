//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::io::Write;

use chrono::NaiveDate;
use recaudo_core::roles::Role;
use recaudo_core::Database;
use rust_decimal_macros::dec;

use crate::commands::{self, resolve_role, truncate};

fn setup_test_db() -> Database {
    Database::in_memory().unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn submit(db: &Database, comprobante: &str, override_similar: bool) -> anyhow::Result<()> {
    commands::cmd_receipts_submit(
        db,
        date(2024, 1, 10),
        "09:00",
        comprobante,
        "BANCOLOMBIA",
        None,
        None,
        dec!(100.00),
        None,
        override_similar,
        "tester",
    )
}

// ========== Receipts Command Tests ==========

#[test]
fn test_cmd_receipts_submit_and_duplicate() {
    let db = setup_test_db();
    assert!(submit(&db, "A1", false).is_ok());

    // exact re-submission is refused and leaves an audit row
    assert!(submit(&db, "A1", false).is_err());
    assert_eq!(db.list_duplicate_attempts(true).unwrap().len(), 1);

    // same key except the voucher: refused without the override flag
    assert!(submit(&db, "A2", false).is_err());
    assert!(submit(&db, "A2", true).is_ok());
}

#[test]
fn test_cmd_receipts_submit_rejects_bad_time() {
    let db = setup_test_db();
    let result = commands::cmd_receipts_submit(
        &db,
        date(2024, 1, 10),
        "morning",
        "A1",
        "BANCOLOMBIA",
        None,
        None,
        dec!(10.00),
        None,
        false,
        "tester",
    );
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("Invalid time"));
}

#[test]
fn test_cmd_receipts_status_flow() {
    let db = setup_test_db();
    submit(&db, "A1", false).unwrap();
    let id = db
        .list_receipts(&Default::default(), 1)
        .unwrap()
        .first()
        .unwrap()
        .id;

    assert!(
        commands::cmd_receipts_status(&db, id, "digitando", "val", Role::Validador).is_err()
    );
    assert!(commands::cmd_receipts_status(&db, id, "aprobado", "val", Role::Validador).is_ok());
}

// ========== Transactions Command Tests ==========

#[test]
fn test_cmd_transactions_create_and_invoice() {
    let db = setup_test_db();
    commands::cmd_clients_add(&db, "Acme SA", "900-1").unwrap();
    commands::cmd_transactions_create(
        &db,
        date(2024, 2, 1),
        Some("900-1"),
        Some("vendedor uno"),
        Some("servicios"),
        None,
        dec!(500.00),
        "admin",
        Role::Admin,
    )
    .unwrap();

    let txs = db.list_transactions(None, None, 10).unwrap();
    assert_eq!(txs.len(), 1);
    let tx = &txs[0];
    assert!(tx.unique_transaction_id.starts_with("20240201-"));

    commands::cmd_transactions_invoice(&db, tx.id, "F-100", "fac", Role::Facturador).unwrap();
    // show works with both the numeric id and the unique id
    commands::cmd_transactions_show(&db, &tx.id.to_string()).unwrap();
    commands::cmd_transactions_show(&db, &tx.unique_transaction_id).unwrap();
}

// ========== Catalog Command Tests ==========

#[test]
fn test_cmd_catalog_roundtrip() {
    let db = setup_test_db();
    commands::cmd_catalog_add(&db, "bank", "davivienda").unwrap();
    let banks = db.catalog_list(recaudo_core::db::CatalogKind::Bank).unwrap();
    assert_eq!(banks.len(), 1);
    assert_eq!(banks[0].name, "DAVIVIENDA");

    commands::cmd_catalog_rename(&db, "bank", banks[0].id, "bbva").unwrap();
    commands::cmd_catalog_delete(&db, "bank", banks[0].id).unwrap();
    assert!(commands::cmd_catalog_list(&db, "sofa").is_err());
}

#[test]
fn test_cmd_sources() {
    let db = setup_test_db();
    commands::cmd_sources_add(&db, "pse", 2).unwrap();
    let sources = db.list_sources().unwrap();
    assert_eq!(sources[0].effective_days, 2);
    commands::cmd_sources_set_days(&db, sources[0].id, 3).unwrap();
    assert_eq!(db.get_source(sources[0].id).unwrap().effective_days, 3);
}

// ========== Import Command Tests ==========

#[test]
fn test_cmd_import_receipts_from_file() {
    let db = setup_test_db();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "FECHA;HORA;#COMPROBANTE;BANCO LLEGADA;VALOR").unwrap();
    writeln!(file, "10/01/2024;09:00;A1;BANCOLOMBIA;100,00").unwrap();
    writeln!(file, "10/01/2024;09:05;A2;BANCOLOMBIA;200,00").unwrap();
    file.flush().unwrap();

    commands::cmd_import_receipts(&db, file.path(), "loader").unwrap();
    assert_eq!(db.list_receipts(&Default::default(), 10).unwrap().len(), 2);

    // importing the same file again creates nothing
    commands::cmd_import_receipts(&db, file.path(), "loader").unwrap();
    assert_eq!(db.list_receipts(&Default::default(), 10).unwrap().len(), 2);
}

// ========== Shared Utility Tests ==========

#[test]
fn test_resolve_role() {
    let db = setup_test_db();

    // explicit flag wins
    assert_eq!(
        resolve_role(&db, "ana", Some("validador")).unwrap(),
        Role::Validador
    );
    assert!(resolve_role(&db, "ana", Some("auditor")).is_err());

    // no assignment: single-operator default
    assert_eq!(resolve_role(&db, "ana", None).unwrap(), Role::Admin);

    // stored assignment is honored
    let (request, _) = db.request_access("ana").unwrap();
    db.approve_access_request(request.id, Role::Digitador, "admin", Role::Admin)
        .unwrap();
    assert_eq!(resolve_role(&db, "ana", None).unwrap(), Role::Digitador);
}

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a-very-long-voucher-number", 10), "a-very-...");
}
