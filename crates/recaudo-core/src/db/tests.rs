//! Integration tests across the storage layer and engines

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::{Database, ReceiptFilter};
use crate::detect::{classify, submit_receipt, DuplicateCheck, ReceiptSubmission};
use crate::error::Error;
use crate::models::{AttemptKind, NewReceipt, NewTransaction, PaymentStatus, TransactionStatus};
use crate::reconcile;
use crate::roles::Role;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn submission(db: &Database, comprobante: &str, valor: Decimal) -> ReceiptSubmission {
    let bank = db.get_or_create_bank("BANCOLOMBIA").unwrap();
    ReceiptSubmission {
        fecha: date(2024, 1, 10),
        hora: time(9, 0),
        comprobante: comprobante.to_string(),
        client_id: None,
        bank_id: bank.id,
        source_id: None,
        valor,
        description: None,
        confirm_override: false,
    }
}

fn approved_credit(db: &Database, client_id: i64, comprobante: &str, valor: Decimal) -> i64 {
    let bank = db.get_or_create_bank("BANCOLOMBIA").unwrap();
    db.insert_receipt(
        &NewReceipt {
            fecha: date(2024, 1, 10),
            hora: time(9, 0),
            comprobante: comprobante.to_string(),
            client_id: Some(client_id),
            bank_id: bank.id,
            source_id: None,
            valor,
            payment_status: PaymentStatus::Approved,
            transaction_id: None,
            description: None,
            uploaded_by: None,
        },
        "tester",
    )
    .unwrap()
    .id
}

fn new_transaction(db: &Database, client_id: Option<i64>, expected: Decimal) -> i64 {
    db.create_transaction(
        &NewTransaction {
            date: date(2024, 1, 15),
            client_id,
            expected_amount: expected,
            ..Default::default()
        },
        "admin",
        Role::Admin,
    )
    .unwrap()
    .id
}

#[test]
fn exact_duplicate_blocks_and_logs() {
    let db = Database::in_memory().unwrap();

    submit_receipt(&db, &submission(&db, "A1", dec!(100.00)), "ana").unwrap();
    let err = submit_receipt(&db, &submission(&db, "A1", dec!(100.00)), "ana").unwrap_err();

    match err {
        Error::ExactDuplicate {
            existing_id,
            comprobante,
            bank,
            valor,
            ..
        } => {
            assert!(existing_id > 0);
            assert_eq!(comprobante, "A1");
            assert_eq!(bank, "BANCOLOMBIA");
            assert_eq!(valor, dec!(100.00));
        }
        other => panic!("expected ExactDuplicate, got {:?}", other),
    }

    // no second row, one logged attempt
    assert_eq!(db.list_receipts(&ReceiptFilter::default(), 100).unwrap().len(), 1);
    let attempts = db.list_duplicate_attempts(false).unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].kind, AttemptKind::Duplicate);
    assert!(!attempts[0].is_resolved);
    assert_eq!(attempts[0].username, "ana");
}

#[test]
fn quantization_catches_rescaled_duplicates() {
    let db = Database::in_memory().unwrap();
    submit_receipt(&db, &submission(&db, "A1", dec!(100)), "ana").unwrap();
    // "100" and "100.00" are the same money
    let err = submit_receipt(&db, &submission(&db, "A1", dec!(100.00)), "ana").unwrap_err();
    assert!(matches!(err, Error::ExactDuplicate { .. }));
}

#[test]
fn similar_warns_then_allows_with_override() {
    let db = Database::in_memory().unwrap();
    submit_receipt(&db, &submission(&db, "A1", dec!(100.00)), "ana").unwrap();

    // same date/time/bank/amount, different voucher: soft block
    let err = submit_receipt(&db, &submission(&db, "A2", dec!(100.00)), "ana").unwrap_err();
    match err {
        Error::SimilarDuplicate { similar } => {
            assert_eq!(similar.len(), 1);
            assert_eq!(similar[0].comprobante, "A1");
        }
        other => panic!("expected SimilarDuplicate, got {:?}", other),
    }
    // nothing logged for the un-overridden rejection
    assert!(db.list_duplicate_attempts(false).unwrap().is_empty());

    // override: inserted plus a self-resolved attempt
    let mut sub = submission(&db, "A2", dec!(100.00));
    sub.confirm_override = true;
    submit_receipt(&db, &sub, "ana").unwrap();

    assert_eq!(db.list_receipts(&ReceiptFilter::default(), 100).unwrap().len(), 2);
    let attempts = db.list_duplicate_attempts(false).unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].kind, AttemptKind::Similar);
    assert!(attempts[0].is_resolved);
    assert_eq!(attempts[0].resolved_by.as_deref(), Some("ana"));
}

#[test]
fn classify_is_side_effect_free() {
    let db = Database::in_memory().unwrap();
    submit_receipt(&db, &submission(&db, "A1", dec!(100.00)), "ana").unwrap();

    let check = classify(&db, &submission(&db, "A2", dec!(100.00))).unwrap();
    assert!(matches!(check, DuplicateCheck::Similar(_)));
    let check = classify(&db, &submission(&db, "A1", dec!(100.00))).unwrap();
    assert!(matches!(check, DuplicateCheck::Exact(_)));
    let check = classify(&db, &submission(&db, "B9", dec!(55.00))).unwrap();
    assert!(matches!(check, DuplicateCheck::Unique));

    assert!(db.list_duplicate_attempts(false).unwrap().is_empty());
    assert_eq!(db.list_receipts(&ReceiptFilter::default(), 100).unwrap().len(), 1);
}

#[test]
fn negative_submission_is_rejected() {
    let db = Database::in_memory().unwrap();
    let err = submit_receipt(&db, &submission(&db, "A1", dec!(-5.00)), "ana").unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn unique_transaction_id_two_phase() {
    let db = Database::in_memory().unwrap();
    let tx = db
        .create_transaction(
            &NewTransaction {
                date: date(2024, 3, 5),
                expected_amount: dec!(500.00),
                ..Default::default()
            },
            "ana.maria",
            Role::Digitador,
        )
        .unwrap();

    assert!(tx.unique_transaction_id.starts_with("20240305-AM-"));
    assert!(tx
        .unique_transaction_id
        .contains(&format!("-{}-", tx.id)));
    assert_eq!(tx.status, TransactionStatus::Pending);
    // id survives updates untouched
    let updated = db
        .update_transaction(
            tx.id,
            &super::TransactionUpdate {
                expected_amount: Some(dec!(600.00)),
                ..Default::default()
            },
            "admin",
            Role::Admin,
        )
        .unwrap();
    assert_eq!(updated.unique_transaction_id, tx.unique_transaction_id);
}

#[test]
fn credit_note_balances_the_transaction() {
    let db = Database::in_memory().unwrap();
    let (client, _) = db.get_or_create_client("ACME SA", "900-1").unwrap();
    let tx_id = new_transaction(&db, Some(client.id), dec!(500.00));

    let rid = approved_credit(&db, client.id, "P1", dec!(620.00));
    reconcile::apply_credits(&db, tx_id, &[rid], "admin").unwrap();
    assert_eq!(reconcile::difference(&db, tx_id).unwrap(), dec!(-120.00));

    let (favor, ajuste) =
        reconcile::generate_credit_note(&db, tx_id, "admin", Role::Admin).unwrap();

    assert_eq!(favor.valor, dec!(120.00));
    assert_eq!(ajuste.valor, dec!(-120.00));
    assert_eq!(favor.valor + ajuste.valor, Decimal::ZERO);
    assert_eq!(favor.transaction_id, None);
    assert_eq!(ajuste.transaction_id, Some(tx_id));
    assert_eq!(favor.linked_credit_note, Some(ajuste.id));
    assert_eq!(ajuste.linked_credit_note, Some(favor.id));
    assert_eq!(reconcile::difference(&db, tx_id).unwrap(), Decimal::ZERO);

    // no surplus anymore
    let err = reconcile::generate_credit_note(&db, tx_id, "admin", Role::Admin).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn apply_credit_rechecks_preconditions() {
    let db = Database::in_memory().unwrap();
    let (client, _) = db.get_or_create_client("ACME SA", "900-1").unwrap();
    let tx_a = new_transaction(&db, Some(client.id), dec!(100.00));
    let tx_b = new_transaction(&db, Some(client.id), dec!(100.00));
    let rid = approved_credit(&db, client.id, "P1", dec!(100.00));

    let first = reconcile::apply_credits(&db, tx_a, &[rid], "admin").unwrap();
    assert_eq!(first.applied, vec![rid]);

    // second application is skipped, the credit stays on tx_a
    let second = reconcile::apply_credits(&db, tx_b, &[rid], "admin").unwrap();
    assert!(second.applied.is_empty());
    assert_eq!(second.skipped.len(), 1);
    assert_eq!(db.get_receipt(rid).unwrap().transaction_id, Some(tx_a));
}

#[test]
fn apply_credit_skips_wrong_client_and_unapproved() {
    let db = Database::in_memory().unwrap();
    let (acme, _) = db.get_or_create_client("ACME SA", "900-1").unwrap();
    let (other, _) = db.get_or_create_client("OTRA LTDA", "900-2").unwrap();
    let tx_id = new_transaction(&db, Some(acme.id), dec!(100.00));

    let foreign = approved_credit(&db, other.id, "P1", dec!(50.00));
    let bank = db.get_or_create_bank("BANCOLOMBIA").unwrap();
    let pending = db
        .insert_receipt(
            &NewReceipt {
                fecha: date(2024, 1, 11),
                hora: time(9, 0),
                comprobante: "P2".to_string(),
                client_id: Some(acme.id),
                bank_id: bank.id,
                source_id: None,
                valor: dec!(30.00),
                payment_status: PaymentStatus::Pending,
                transaction_id: None,
                description: None,
                uploaded_by: None,
            },
            "tester",
        )
        .unwrap()
        .id;

    let report = reconcile::apply_credits(&db, tx_id, &[foreign, pending], "admin").unwrap();
    assert!(report.applied.is_empty());
    assert_eq!(report.skipped.len(), 2);
}

#[test]
fn unlink_returns_credit_to_client() {
    let db = Database::in_memory().unwrap();
    let (client, _) = db.get_or_create_client("ACME SA", "900-1").unwrap();
    let tx_id = new_transaction(&db, Some(client.id), dec!(100.00));
    let rid = approved_credit(&db, client.id, "P1", dec!(100.00));
    reconcile::apply_credits(&db, tx_id, &[rid], "admin").unwrap();

    let report = reconcile::unlink_credits(&db, tx_id, &[rid], "admin").unwrap();
    assert_eq!(report.applied, vec![rid]);
    let receipt = db.get_receipt(rid).unwrap();
    assert_eq!(receipt.transaction_id, None);
    assert_eq!(receipt.client_id, Some(client.id));

    assert_eq!(db.available_balance(client.id).unwrap(), dec!(100.00));
}

#[test]
fn adjustment_delete_guard() {
    let db = Database::in_memory().unwrap();
    let (client, _) = db.get_or_create_client("ACME SA", "900-1").unwrap();
    let tx_id = new_transaction(&db, Some(client.id), dec!(500.00));
    let rid = approved_credit(&db, client.id, "P1", dec!(620.00));
    reconcile::apply_credits(&db, tx_id, &[rid], "admin").unwrap();
    let (favor, ajuste) =
        reconcile::generate_credit_note(&db, tx_id, "admin", Role::Admin).unwrap();

    // while the favor credit is free, the adjustment may be deleted
    // (not doing it here: first consume the credit and watch the guard)
    let other_tx = new_transaction(&db, Some(client.id), dec!(120.00));
    reconcile::apply_credits(&db, other_tx, &[favor.id], "admin").unwrap();

    let err = db.delete_receipt(ajuste.id, "admin", Role::Admin).unwrap_err();
    match err {
        Error::Validation(msg) => assert!(msg.contains("counterpart")),
        other => panic!("expected Validation, got {:?}", other),
    }
}

#[test]
fn restore_receipt_requires_live_parent() {
    let db = Database::in_memory().unwrap();
    let (client, _) = db.get_or_create_client("ACME SA", "900-1").unwrap();
    let tx_id = new_transaction(&db, Some(client.id), dec!(100.00));
    let rid = approved_credit(&db, client.id, "P1", dec!(100.00));
    reconcile::apply_credits(&db, tx_id, &[rid], "admin").unwrap();

    db.delete_receipt(rid, "admin", Role::Admin).unwrap();
    db.delete_transaction(tx_id, "admin", Role::Admin).unwrap();

    let deleted = db.deleted_receipts().unwrap();
    assert_eq!(deleted.len(), 1);
    let history_id = deleted[0].history_id;

    // parent is gone: restore refused
    let err = db.restore_receipt(history_id, "admin", Role::Admin).unwrap_err();
    assert!(matches!(err, Error::ReferentialIntegrity(_)));

    // restore the transaction first, then the receipt
    let deleted_tx = db.deleted_transactions().unwrap();
    assert_eq!(deleted_tx.len(), 1);
    db.restore_transaction(deleted_tx[0].history_id, "admin", Role::Admin)
        .unwrap();
    let restored = db.restore_receipt(history_id, "admin", Role::Admin).unwrap();
    assert_eq!(restored.id, rid);
    assert_eq!(restored.transaction_id, Some(tx_id));

    // both deleted lists reconcile to empty
    assert!(db.deleted_receipts().unwrap().is_empty());
    assert!(db.deleted_transactions().unwrap().is_empty());
}

#[test]
fn restore_requires_admin() {
    let db = Database::in_memory().unwrap();
    let err = db.restore_receipt(1, "ana", Role::Digitador).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn history_records_every_mutation() {
    let db = Database::in_memory().unwrap();
    let tx_id = new_transaction(&db, None, dec!(100.00));
    db.set_invoice(tx_id, "F-001", "facturador", Role::Facturador)
        .unwrap();

    let history = db.transaction_history(tx_id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].kind, super::HistoryKind::Changed);
    assert_eq!(history[1].kind, super::HistoryKind::Created);

    let changes =
        super::history::diff_snapshots(&history[1].snapshot, &history[0].snapshot).unwrap();
    let fields: Vec<&str> = changes.iter().map(|c| c.field.as_str()).collect();
    assert!(fields.contains(&"status"));
    assert!(fields.contains(&"invoice_number"));
}

#[test]
fn invoice_only_from_pending() {
    let db = Database::in_memory().unwrap();
    let tx_id = new_transaction(&db, None, dec!(100.00));
    db.void_transaction(tx_id, "admin", Role::Admin).unwrap();

    let err = db
        .set_invoice(tx_id, "F-001", "facturador", Role::Facturador)
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn role_gates_on_storage_operations() {
    let db = Database::in_memory().unwrap();
    let err = db
        .create_transaction(
            &NewTransaction {
                date: date(2024, 1, 1),
                ..Default::default()
            },
            "validador",
            Role::Validador,
        )
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let tx_id = new_transaction(&db, None, dec!(10.00));
    let err = db
        .update_transaction(
            tx_id,
            &super::TransactionUpdate {
                expected_amount: Some(dec!(20.00)),
                ..Default::default()
            },
            "digitador",
            Role::Digitador,
        )
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn payment_status_validation_flow() {
    let db = Database::in_memory().unwrap();
    let receipt = submit_receipt(&db, &submission(&db, "A1", dec!(80.00)), "ana").unwrap();
    assert_eq!(receipt.payment_status, PaymentStatus::Pending);

    let err = db
        .set_payment_status(receipt.id, PaymentStatus::Approved, "ana", Role::Digitador)
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let updated = db
        .set_payment_status(receipt.id, PaymentStatus::Approved, "val", Role::Validador)
        .unwrap();
    assert_eq!(updated.payment_status, PaymentStatus::Approved);
}

#[test]
fn deleting_transaction_frees_its_receipts() {
    let db = Database::in_memory().unwrap();
    let (client, _) = db.get_or_create_client("ACME SA", "900-1").unwrap();
    let tx_id = new_transaction(&db, Some(client.id), dec!(100.00));
    let rid = approved_credit(&db, client.id, "P1", dec!(100.00));
    reconcile::apply_credits(&db, tx_id, &[rid], "admin").unwrap();

    db.delete_transaction(tx_id, "admin", Role::Admin).unwrap();
    assert_eq!(db.get_receipt(rid).unwrap().transaction_id, None);
}

#[test]
fn catalog_protected_deletes() {
    let db = Database::in_memory().unwrap();
    let receipt = submit_receipt(&db, &submission(&db, "A1", dec!(10.00)), "ana").unwrap();

    let err = db
        .catalog_delete(super::CatalogKind::Bank, receipt.bank_id)
        .unwrap_err();
    assert!(matches!(err, Error::Protected(_)));

    let unused = db.get_or_create_bank("DAVIVIENDA").unwrap();
    db.catalog_delete(super::CatalogKind::Bank, unused.id).unwrap();
}

#[test]
fn client_delete_protected_while_referenced() {
    let db = Database::in_memory().unwrap();
    let (client, _) = db.get_or_create_client("ACME SA", "900-1").unwrap();
    new_transaction(&db, Some(client.id), dec!(10.00));
    assert!(matches!(db.delete_client(client.id), Err(Error::Protected(_))));
}

#[test]
fn access_request_lifecycle() {
    let db = Database::in_memory().unwrap();
    let (request, created) = db.request_access("nuevo").unwrap();
    assert!(created);
    let (_, created_again) = db.request_access("nuevo").unwrap();
    assert!(!created_again);

    // only admins decide
    let err = db
        .approve_access_request(request.id, Role::Digitador, "val", Role::Validador)
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let username = db
        .approve_access_request(request.id, Role::Digitador, "admin", Role::Admin)
        .unwrap();
    assert_eq!(username, "nuevo");
    assert_eq!(db.role_of("nuevo").unwrap(), Some(Role::Digitador));
    assert!(db.list_access_requests().unwrap().is_empty());

    let (denied, _) = db.request_access("otro").unwrap();
    db.deny_access_request(denied.id, Role::Admin).unwrap();
    assert_eq!(db.role_of("otro").unwrap(), None);
}

#[test]
fn duplicate_attempt_resolution() {
    let db = Database::in_memory().unwrap();
    submit_receipt(&db, &submission(&db, "A1", dec!(10.00)), "ana").unwrap();
    let _ = submit_receipt(&db, &submission(&db, "A1", dec!(10.00)), "ana");

    let unresolved = db.list_duplicate_attempts(true).unwrap();
    assert_eq!(unresolved.len(), 1);
    db.resolve_duplicate_attempt(unresolved[0].id, "admin").unwrap();
    assert!(db.list_duplicate_attempts(true).unwrap().is_empty());
    assert_eq!(db.list_duplicate_attempts(false).unwrap().len(), 1);
}

#[test]
fn fk_violation_is_not_a_duplicate() {
    let db = Database::in_memory().unwrap();
    let bank = db.get_or_create_bank("BANCOLOMBIA").unwrap();

    let err = db
        .insert_receipt(
            &NewReceipt {
                fecha: date(2024, 1, 10),
                hora: time(9, 0),
                comprobante: "A1".to_string(),
                client_id: Some(9999),
                bank_id: bank.id,
                source_id: None,
                valor: dec!(100.00),
                payment_status: PaymentStatus::Pending,
                transaction_id: None,
                description: None,
                uploaded_by: None,
            },
            "ana",
        )
        .unwrap_err();
    assert!(matches!(err, Error::ReferentialIntegrity(_)));

    // the composite key still maps to the duplicate error
    submit_receipt(&db, &submission(&db, "A1", dec!(100.00)), "ana").unwrap();
    let existing = db.list_receipts(&ReceiptFilter::default(), 1).unwrap()[0].id;
    let err = submit_receipt(&db, &submission(&db, "A1", dec!(100.00)), "ana").unwrap_err();
    assert!(matches!(err, Error::ExactDuplicate { existing_id, .. } if existing_id == existing));
}

#[test]
fn restore_refuses_key_held_by_live_receipt() {
    let db = Database::in_memory().unwrap();
    let old = submit_receipt(&db, &submission(&db, "A1", dec!(100.00)), "ana").unwrap();
    db.delete_receipt(old.id, "admin", Role::Admin).unwrap();

    // a fresh receipt now owns the same date/time/voucher/bank/amount key
    let fresh = submit_receipt(&db, &submission(&db, "A1", dec!(100.00)), "ana").unwrap();

    let marker = &db.deleted_receipts().unwrap()[0];
    let err = db
        .restore_receipt(marker.history_id, "admin", Role::Admin)
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(db.get_receipt(fresh.id).unwrap().comprobante, "A1");
}

#[test]
fn corrupted_amount_surfaces_as_parse_error() {
    let db = Database::in_memory().unwrap();
    let (client, _) = db.get_or_create_client("ACME SA", "900-1").unwrap();
    let tx_id = new_transaction(&db, Some(client.id), dec!(100.00));
    let rid = approved_credit(&db, client.id, "P1", dec!(100.00));
    reconcile::apply_credits(&db, tx_id, &[rid], "admin").unwrap();
    assert_eq!(reconcile::receipts_total(&db, tx_id).unwrap(), dec!(100.00));

    db.conn()
        .unwrap()
        .execute("UPDATE receipts SET valor = 'garbage' WHERE id = ?", [rid])
        .unwrap();
    assert!(matches!(
        reconcile::receipts_total(&db, tx_id),
        Err(Error::Parse(_))
    ));

    let free = approved_credit(&db, client.id, "P2", dec!(50.00));
    db.conn()
        .unwrap()
        .execute("UPDATE receipts SET valor = '1,5' WHERE id = ?", [free])
        .unwrap();
    assert!(matches!(db.available_balance(client.id), Err(Error::Parse(_))));
}

#[test]
fn export_receipts_includes_transaction_columns() {
    let db = Database::in_memory().unwrap();
    let (client, _) = db.get_or_create_client("ACME SA", "900-1").unwrap();
    let tx_id = new_transaction(&db, Some(client.id), dec!(100.00));
    let rid = approved_credit(&db, client.id, "P1", dec!(100.00));
    reconcile::apply_credits(&db, tx_id, &[rid], "admin").unwrap();

    let csv = db
        .export_receipts_csv(&crate::export::ReceiptExportOptions::default())
        .unwrap();
    let uid = db.get_transaction(tx_id).unwrap().unique_transaction_id;
    assert!(csv.starts_with("fecha,"));
    assert!(csv.contains("ACME SA"));
    assert!(csv.contains(&uid));
}
