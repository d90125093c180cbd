//! Duplicate-attempt audit log

use rusqlite::{params, Connection};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{AttemptKind, DuplicateAttempt};

const ATTEMPT_COLUMNS: &str =
    "id, username, created_at, data, kind, is_resolved, resolved_by, resolved_at";

fn row_to_attempt(row: &rusqlite::Row) -> rusqlite::Result<DuplicateAttempt> {
    let created_at: String = row.get(2)?;
    let kind: String = row.get(4)?;
    let resolved_at: Option<String> = row.get(7)?;
    Ok(DuplicateAttempt {
        id: row.get(0)?,
        username: row.get(1)?,
        created_at: parse_datetime(&created_at),
        data: row.get(3)?,
        kind: kind.parse().unwrap_or(AttemptKind::Duplicate),
        is_resolved: row.get(5)?,
        resolved_by: row.get(6)?,
        resolved_at: resolved_at.map(|s| parse_datetime(&s)),
    })
}

/// Log an attempt inside the caller's SQL transaction.
///
/// When `resolved_by` is set the attempt is written pre-resolved, which is
/// how an explicit similar-duplicate override leaves its audit trail.
pub(crate) fn log_attempt_in(
    conn: &Connection,
    username: &str,
    data_json: &str,
    kind: AttemptKind,
    resolved_by: Option<&str>,
) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO duplicate_attempts (username, data, kind, is_resolved, resolved_by, resolved_at)
        VALUES (?1, ?2, ?3, ?4, ?5, CASE WHEN ?5 IS NOT NULL THEN CURRENT_TIMESTAMP END)
        "#,
        params![username, data_json, kind.as_str(), resolved_by.is_some(), resolved_by],
    )?;
    Ok(conn.last_insert_rowid())
}

impl Database {
    /// List duplicate attempts, newest first
    pub fn list_duplicate_attempts(&self, only_unresolved: bool) -> Result<Vec<DuplicateAttempt>> {
        let conn = self.conn()?;
        let where_clause = if only_unresolved {
            "WHERE is_resolved = 0"
        } else {
            ""
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM duplicate_attempts {} ORDER BY id DESC",
            ATTEMPT_COLUMNS, where_clause
        ))?;
        let attempts = stmt
            .query_map([], row_to_attempt)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(attempts)
    }

    /// Mark an attempt reviewed
    pub fn resolve_duplicate_attempt(&self, id: i64, actor: &str) -> Result<()> {
        let updated = self.conn()?.execute(
            "UPDATE duplicate_attempts \
             SET is_resolved = 1, resolved_by = ?, resolved_at = CURRENT_TIMESTAMP \
             WHERE id = ?",
            params![actor, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("duplicate attempt {}", id)));
        }
        Ok(())
    }
}
