//! Bulk receipt import: CSV parsing and batch-level de-duplication
//!
//! Rows are parsed tolerantly (dd/mm/yyyy or ISO dates, decimal comma,
//! `;` or `,` delimiter sniffed from the header) with per-row errors that
//! never abort the batch. De-duplication runs in two stages: first within
//! the batch itself (first occurrence wins), then against the store via a
//! coarse pre-filter on the batch's dates and voucher numbers. Surviving
//! rows are inserted in one SQL transaction.

use std::collections::{HashMap, HashSet};
use std::io::Read;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use tracing::info;

use crate::db::receipts::insert_receipt_in;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{quantize, NewReceipt, PaymentStatus};

/// One parsed receipt row from a bulk file
#[derive(Debug, Clone)]
pub struct ReceiptRow {
    pub row_number: usize,
    pub fecha: NaiveDate,
    pub hora: NaiveTime,
    pub comprobante: String,
    pub bank: String,
    pub valor: Decimal,
}

/// A row the parser could not convert
#[derive(Debug, Clone)]
pub struct RowError {
    pub row_number: usize,
    pub message: String,
}

/// Result of parsing a bulk file
#[derive(Debug, Clone, Default)]
pub struct ParsedBatch {
    pub rows: Vec<ReceiptRow>,
    pub errors: Vec<RowError>,
}

/// Result of importing a batch
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub processed: usize,
    pub created: usize,
    pub duplicates: usize,
    pub errors: Vec<RowError>,
}

fn parse_date_flex(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .or_else(|_| NaiveDate::parse_from_str(s, "%d-%m-%Y"))
        .ok()
}

fn parse_time_flex(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

/// Parse an amount tolerating currency signs, spaces, thousands separators
/// and the decimal comma ("$ 1.234,56" -> 1234.56)
fn parse_amount(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '$')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let has_dot = cleaned.contains('.');
    let has_comma = cleaned.contains(',');
    let normalized = match (has_dot, has_comma) {
        (true, true) => {
            // the later separator is the decimal one
            if cleaned.rfind('.') > cleaned.rfind(',') {
                cleaned.replace(',', "")
            } else {
                cleaned.replace('.', "").replace(',', ".")
            }
        }
        (false, true) => cleaned.replace(',', "."),
        _ => cleaned,
    };
    normalized.parse().ok()
}

fn header_index(headers: &csv::StringRecord, needle: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().to_uppercase().contains(needle))
}

/// Parse a bulk receipt CSV with header
/// `FECHA;HORA;#COMPROBANTE;BANCO LLEGADA;VALOR` (delimiter sniffed).
pub fn parse_receipt_rows<R: Read>(mut reader: R) -> Result<ParsedBatch> {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;

    let delimiter = sniff_delimiter(&content);
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = csv_reader.headers()?.clone();
    let fecha_idx = header_index(&headers, "FECHA");
    let hora_idx = header_index(&headers, "HORA");
    let comprobante_idx = header_index(&headers, "COMPROBANTE");
    let bank_idx = header_index(&headers, "BANCO");
    let valor_idx = header_index(&headers, "VALOR");
    let (fecha_idx, hora_idx, comprobante_idx, bank_idx, valor_idx) =
        match (fecha_idx, hora_idx, comprobante_idx, bank_idx, valor_idx) {
            (Some(f), Some(h), Some(c), Some(b), Some(v)) => (f, h, c, b, v),
            _ => {
                return Err(Error::Parse(format!(
                    "missing expected columns (FECHA, HORA, COMPROBANTE, BANCO, VALOR) in header: {}",
                    headers.iter().collect::<Vec<_>>().join(", ")
                )))
            }
        };

    let mut batch = ParsedBatch::default();
    for (i, record) in csv_reader.records().enumerate() {
        let row_number = i + 2; // 1-based, after the header line
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                batch.errors.push(RowError {
                    row_number,
                    message: format!("unreadable row: {}", e),
                });
                continue;
            }
        };
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let field = |idx: usize| record.get(idx).unwrap_or("").trim().to_string();
        let fecha = parse_date_flex(&field(fecha_idx));
        let hora = parse_time_flex(&field(hora_idx));
        let comprobante = field(comprobante_idx);
        let bank = field(bank_idx);
        let valor = parse_amount(&field(valor_idx));

        match (fecha, hora, valor) {
            (Some(fecha), Some(hora), Some(valor)) if !comprobante.is_empty() && !bank.is_empty() => {
                batch.rows.push(ReceiptRow {
                    row_number,
                    fecha,
                    hora,
                    comprobante,
                    bank,
                    valor,
                });
            }
            (None, _, _) => batch.errors.push(RowError {
                row_number,
                message: format!("invalid date: {:?}", field(fecha_idx)),
            }),
            (_, None, _) => batch.errors.push(RowError {
                row_number,
                message: format!("invalid time: {:?}", field(hora_idx)),
            }),
            (_, _, None) => batch.errors.push(RowError {
                row_number,
                message: format!("invalid amount: {:?}", field(valor_idx)),
            }),
            _ => batch.errors.push(RowError {
                row_number,
                message: "missing voucher number or bank".to_string(),
            }),
        }
    }
    Ok(batch)
}

fn sniff_delimiter(content: &str) -> u8 {
    match content.lines().next() {
        Some(header) if header.contains(';') => b';',
        _ => b',',
    }
}

type DedupKey = (NaiveDate, NaiveTime, String, i64, String);

fn key_of(fecha: NaiveDate, hora: NaiveTime, comprobante: &str, bank_id: i64, valor: Decimal) -> DedupKey {
    (
        fecha,
        hora,
        comprobante.trim().to_string(),
        bank_id,
        quantize(valor).to_string(),
    )
}

/// Import a parsed batch, de-duplicating within the batch and against the
/// store, then bulk-inserting in one SQL transaction.
///
/// Importing the same file twice creates zero rows on the second run.
pub fn import_receipts(db: &Database, batch: &ParsedBatch, uploader: &str) -> Result<ImportReport> {
    let mut report = ImportReport {
        processed: batch.rows.len() + batch.errors.len(),
        errors: batch.errors.clone(),
        ..Default::default()
    };

    // resolve banks up front; idempotent, shared across runs
    let mut bank_ids: HashMap<String, i64> = HashMap::new();
    for row in &batch.rows {
        if !bank_ids.contains_key(&row.bank) {
            let bank = db.get_or_create_bank(&row.bank)?;
            bank_ids.insert(row.bank.clone(), bank.id);
        }
    }

    // stage 1: intra-batch de-duplication, first occurrence wins
    let mut seen: HashSet<DedupKey> = HashSet::new();
    let mut unique_rows: Vec<(&ReceiptRow, i64, DedupKey)> = Vec::new();
    for row in &batch.rows {
        let bank_id = bank_ids[&row.bank];
        let key = key_of(row.fecha, row.hora, &row.comprobante, bank_id, row.valor);
        if seen.insert(key.clone()) {
            unique_rows.push((row, bank_id, key));
        } else {
            report.duplicates += 1;
        }
    }

    // stage 2: coarse pre-filter against the store, then exact key exclusion
    let existing = existing_keys(db, &unique_rows)?;

    let mut conn = db.conn()?;
    let tx = conn.transaction()?;
    for (row, bank_id, key) in unique_rows {
        if existing.contains(&key) {
            report.duplicates += 1;
            continue;
        }
        let new = NewReceipt {
            fecha: row.fecha,
            hora: row.hora,
            comprobante: row.comprobante.trim().to_string(),
            client_id: None,
            bank_id,
            source_id: None,
            valor: quantize(row.valor),
            payment_status: PaymentStatus::Pending,
            transaction_id: None,
            description: None,
            uploaded_by: Some(uploader.to_string()),
        };
        match insert_receipt_in(&tx, &new, Some(uploader)) {
            Ok(_) => report.created += 1,
            // uniqueness backstop: raced with a concurrent writer
            Err(Error::ExactDuplicate { .. }) => report.duplicates += 1,
            Err(e) => return Err(e),
        }
    }
    tx.commit()?;

    info!(
        processed = report.processed,
        created = report.created,
        duplicates = report.duplicates,
        errors = report.errors.len(),
        "receipt import complete"
    );
    Ok(report)
}

fn existing_keys(
    db: &Database,
    rows: &[(&ReceiptRow, i64, DedupKey)],
) -> Result<HashSet<DedupKey>> {
    if rows.is_empty() {
        return Ok(HashSet::new());
    }

    let mut fechas: Vec<String> = rows.iter().map(|(r, _, _)| r.fecha.to_string()).collect();
    fechas.sort();
    fechas.dedup();
    let mut comprobantes: Vec<String> = rows
        .iter()
        .map(|(r, _, _)| r.comprobante.trim().to_string())
        .collect();
    comprobantes.sort();
    comprobantes.dedup();

    let placeholders = |n: usize| vec!["?"; n].join(", ");
    let sql = format!(
        "SELECT fecha, hora, comprobante, bank_id, valor FROM receipts \
         WHERE fecha IN ({}) AND comprobante IN ({})",
        placeholders(fechas.len()),
        placeholders(comprobantes.len())
    );

    let conn = db.conn()?;
    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::ToSql> = fechas
        .iter()
        .chain(comprobantes.iter())
        .map(|s| s as &dyn rusqlite::ToSql)
        .collect();

    let keys = stmt
        .query_map(params.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(keys
        .into_iter()
        .map(|(fecha, hora, comprobante, bank_id, valor)| {
            (
                crate::db::parse_date(&fecha),
                crate::db::parse_time(&hora),
                comprobante,
                bank_id,
                valor,
            )
        })
        .collect())
}

/// One parsed client row from a bulk file
#[derive(Debug, Clone)]
pub struct ClientRow {
    pub row_number: usize,
    pub name: String,
    pub dni: String,
}

/// Result of a bulk client load
#[derive(Debug, Clone, Default)]
pub struct ClientImportReport {
    pub created: usize,
    pub skipped: usize,
    pub errors: Vec<RowError>,
}

/// Parse a client CSV with NOMBRE/NAME and DNI columns (delimiter sniffed)
pub fn parse_client_rows<R: Read>(mut reader: R) -> Result<(Vec<ClientRow>, Vec<RowError>)> {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(&content))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = csv_reader.headers()?.clone();
    let name_idx = header_index(&headers, "NOMBRE").or_else(|| header_index(&headers, "NAME"));
    let dni_idx = header_index(&headers, "DNI")
        .or_else(|| header_index(&headers, "DOCUMENTO"))
        .or_else(|| header_index(&headers, "NIT"));
    let (name_idx, dni_idx) = match (name_idx, dni_idx) {
        (Some(n), Some(d)) => (n, d),
        _ => {
            return Err(Error::Parse(
                "missing expected columns (NOMBRE/NAME, DNI) in header".to_string(),
            ))
        }
    };

    let mut rows = Vec::new();
    let mut errors = Vec::new();
    for (i, record) in csv_reader.records().enumerate() {
        let row_number = i + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                errors.push(RowError {
                    row_number,
                    message: format!("unreadable row: {}", e),
                });
                continue;
            }
        };
        let name = record.get(name_idx).unwrap_or("").trim().to_string();
        let dni = record.get(dni_idx).unwrap_or("").trim().to_string();
        if name.is_empty() && dni.is_empty() {
            continue;
        }
        if dni.is_empty() {
            errors.push(RowError {
                row_number,
                message: "missing dni".to_string(),
            });
            continue;
        }
        rows.push(ClientRow {
            row_number,
            name,
            dni,
        });
    }
    Ok((rows, errors))
}

/// Load clients by dni, creating the missing ones
pub fn import_clients(
    db: &Database,
    rows: &[ClientRow],
    errors: Vec<RowError>,
) -> Result<ClientImportReport> {
    let mut report = ClientImportReport {
        errors,
        ..Default::default()
    };
    for row in rows {
        match db.get_or_create_client(&row.name, &row.dni) {
            Ok((_, true)) => report.created += 1,
            Ok((_, false)) => report.skipped += 1,
            Err(Error::Validation(message)) => {
                report.errors.push(RowError {
                    row_number: row.row_number,
                    message,
                });
            }
            Err(e) => return Err(e),
        }
    }
    info!(
        created = report.created,
        skipped = report.skipped,
        errors = report.errors.len(),
        "client load complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn amount_parsing_formats() {
        assert_eq!(parse_amount("100.50"), Some(dec!(100.50)));
        assert_eq!(parse_amount("100,50"), Some(dec!(100.50)));
        assert_eq!(parse_amount("$ 1.234,56"), Some(dec!(1234.56)));
        assert_eq!(parse_amount("1,234.56"), Some(dec!(1234.56)));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn date_and_time_formats() {
        assert_eq!(
            parse_date_flex("10/01/2024"),
            NaiveDate::from_ymd_opt(2024, 1, 10)
        );
        assert_eq!(
            parse_date_flex("2024-01-10"),
            NaiveDate::from_ymd_opt(2024, 1, 10)
        );
        assert_eq!(parse_date_flex("2024/13/40"), None);
        assert_eq!(parse_time_flex("09:00"), NaiveTime::from_hms_opt(9, 0, 0));
    }

    #[test]
    fn parses_semicolon_delimited_file() {
        let csv = "FECHA;HORA;#COMPROBANTE;BANCO LLEGADA;VALOR\n\
                   10/01/2024;09:00;A1;BANCOLOMBIA;100,00\n\
                   11/01/2024;10:30;B2;DAVIVIENDA;250.000,50\n";
        let batch = parse_receipt_rows(csv.as_bytes()).unwrap();
        assert_eq!(batch.rows.len(), 2);
        assert!(batch.errors.is_empty());
        assert_eq!(batch.rows[0].comprobante, "A1");
        assert_eq!(batch.rows[0].valor, dec!(100.00));
        assert_eq!(batch.rows[1].valor, dec!(250000.50));
    }

    #[test]
    fn collects_row_errors_without_aborting() {
        let csv = "FECHA,HORA,#COMPROBANTE,BANCO LLEGADA,VALOR\n\
                   notadate,09:00,A1,BANCOLOMBIA,100\n\
                   10/01/2024,09:00,A2,BANCOLOMBIA,nope\n\
                   10/01/2024,09:00,A3,BANCOLOMBIA,100\n";
        let batch = parse_receipt_rows(csv.as_bytes()).unwrap();
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.errors.len(), 2);
        assert_eq!(batch.errors[0].row_number, 2);
        assert!(batch.errors[0].message.contains("invalid date"));
    }

    #[test]
    fn rejects_unrecognized_header() {
        let csv = "A,B,C\n1,2,3\n";
        assert!(matches!(
            parse_receipt_rows(csv.as_bytes()),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn intra_batch_first_wins() {
        let db = Database::in_memory().unwrap();
        let csv = "FECHA;HORA;#COMPROBANTE;BANCO LLEGADA;VALOR\n\
                   10/01/2024;09:00;A1;BANCOLOMBIA;100,00\n\
                   10/01/2024;09:00;A1;BANCOLOMBIA;100.00\n";
        let batch = parse_receipt_rows(csv.as_bytes()).unwrap();
        let report = import_receipts(&db, &batch, "loader").unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.duplicates, 1);
    }

    #[test]
    fn import_is_idempotent() {
        let db = Database::in_memory().unwrap();
        let csv = "FECHA;HORA;#COMPROBANTE;BANCO LLEGADA;VALOR\n\
                   10/01/2024;09:00;A1;BANCOLOMBIA;100,00\n\
                   10/01/2024;09:05;A2;BANCOLOMBIA;200,00\n";
        let batch = parse_receipt_rows(csv.as_bytes()).unwrap();

        let first = import_receipts(&db, &batch, "loader").unwrap();
        assert_eq!(first.created, 2);
        assert_eq!(first.duplicates, 0);

        let second = import_receipts(&db, &batch, "loader").unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.duplicates, 2);
    }

    #[test]
    fn client_load_creates_and_skips() {
        let db = Database::in_memory().unwrap();
        let csv = "NOMBRE,DNI\nMaria Lopez,900.123-4\nMaria Lopez,9001234\n";
        let (rows, errors) = parse_client_rows(csv.as_bytes()).unwrap();
        assert!(errors.is_empty());
        let report = import_clients(&db, &rows, errors).unwrap();
        // second row normalizes to a different dni (hyphen kept), so both create
        assert_eq!(report.created + report.skipped, 2);

        let again = import_clients(&db, &rows, Vec::new()).unwrap();
        assert_eq!(again.created, 0);
        assert_eq!(again.skipped, 2);
    }
}
