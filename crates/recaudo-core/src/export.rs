//! Read-only CSV exports for reporting

use chrono::NaiveDate;

use crate::db::Database;
use crate::error::Result;

/// Filters for the receipt export
#[derive(Debug, Clone, Default)]
pub struct ReceiptExportOptions {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub client_id: Option<i64>,
}

impl Database {
    /// Receipt-level export joined with client, bank, source and the parent
    /// transaction. Returns the CSV as a string; callers decide the sink.
    pub fn export_receipts_csv(&self, opts: &ReceiptExportOptions) -> Result<String> {
        let conn = self.conn()?;

        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(from) = opts.from {
            conditions.push("r.fecha >= ?");
            params.push(Box::new(from.to_string()));
        }
        if let Some(to) = opts.to {
            conditions.push("r.fecha <= ?");
            params.push(Box::new(to.to_string()));
        }
        if let Some(client_id) = opts.client_id {
            conditions.push("r.client_id = ?");
            params.push(Box::new(client_id));
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            r#"
            SELECT r.fecha, r.hora, r.comprobante,
                   COALESCE(c.name, ''), b.name, COALESCE(s.name, ''),
                   r.valor, r.payment_status,
                   COALESCE(t.unique_transaction_id, ''), COALESCE(t.status, ''),
                   COALESCE(t.invoice_number, '')
            FROM receipts r
            JOIN banks b ON b.id = r.bank_id
            LEFT JOIN clients c ON c.id = r.client_id
            LEFT JOIN transaction_sources s ON s.id = r.source_id
            LEFT JOIN transactions t ON t.id = r.transaction_id
            {}
            ORDER BY r.fecha, r.hora, r.id
            "#,
            where_clause
        );

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt
            .query_map(params_refs.as_slice(), |row| {
                Ok([
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, String>(9)?,
                    row.get::<_, String>(10)?,
                ])
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([
            "fecha",
            "hora",
            "comprobante",
            "cliente",
            "banco",
            "origen",
            "valor",
            "estado_abono",
            "transaccion",
            "estado_transaccion",
            "factura",
        ])?;
        for row in rows {
            writer.write_record(&row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| crate::error::Error::Parse(format!("csv writer: {}", e)))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Duplicate-attempt history export for audit review
    pub fn export_duplicate_attempts_csv(&self) -> Result<String> {
        let attempts = self.list_duplicate_attempts(false)?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([
            "id",
            "username",
            "created_at",
            "kind",
            "is_resolved",
            "resolved_by",
            "resolved_at",
            "data",
        ])?;
        for a in attempts {
            writer.write_record([
                a.id.to_string(),
                a.username,
                a.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                a.kind.to_string(),
                a.is_resolved.to_string(),
                a.resolved_by.unwrap_or_default(),
                a.resolved_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default(),
                a.data,
            ])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| crate::error::Error::Parse(format!("csv writer: {}", e)))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
