//! Access requests and role assignments
//!
//! An unaffiliated user gets a pending access request on first sight.
//! Approval assigns a role and consumes the request; denial just consumes it.

use rusqlite::{params, OptionalExtension};
use tracing::info;

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::AccessRequest;
use crate::roles::Role;

const REQUEST_COLUMNS: &str = "id, username, approved, created_at";

fn row_to_request(row: &rusqlite::Row) -> rusqlite::Result<AccessRequest> {
    let created_at: String = row.get(3)?;
    Ok(AccessRequest {
        id: row.get(0)?,
        username: row.get(1)?,
        approved: row.get(2)?,
        created_at: parse_datetime(&created_at),
    })
}

impl Database {
    /// Get or create the pending request for `username`.
    /// Returns the request and whether it was created by this call.
    pub fn request_access(&self, username: &str) -> Result<(AccessRequest, bool)> {
        let username = username.trim();
        if username.is_empty() {
            return Err(Error::Validation("username must not be empty".to_string()));
        }

        let conn = self.conn()?;
        let existing = conn
            .query_row(
                &format!("SELECT {} FROM access_requests WHERE username = ?", REQUEST_COLUMNS),
                params![username],
                row_to_request,
            )
            .optional()?;
        if let Some(request) = existing {
            return Ok((request, false));
        }

        conn.execute(
            "INSERT INTO access_requests (username) VALUES (?)",
            params![username],
        )?;
        let request = conn.query_row(
            &format!("SELECT {} FROM access_requests WHERE id = ?", REQUEST_COLUMNS),
            params![conn.last_insert_rowid()],
            row_to_request,
        )?;
        info!(username, "access request created");
        Ok((request, true))
    }

    pub fn list_access_requests(&self) -> Result<Vec<AccessRequest>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM access_requests ORDER BY created_at",
            REQUEST_COLUMNS
        ))?;
        let requests = stmt
            .query_map([], row_to_request)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(requests)
    }

    /// Approve a request: assign the role and consume the request row
    pub fn approve_access_request(
        &self,
        id: i64,
        role: Role,
        actor: &str,
        actor_role: Role,
    ) -> Result<String> {
        if actor_role != Role::Admin {
            return Err(Error::Validation(
                "insufficient permission: approval requires the admin role".to_string(),
            ));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let username: Option<String> = tx
            .query_row(
                "SELECT username FROM access_requests WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let username =
            username.ok_or_else(|| Error::NotFound(format!("access request {}", id)))?;

        tx.execute(
            "INSERT OR REPLACE INTO user_roles (username, role, assigned_by) VALUES (?, ?, ?)",
            params![username, role.as_str(), actor],
        )?;
        tx.execute("DELETE FROM access_requests WHERE id = ?", params![id])?;
        tx.commit()?;

        info!(username = %username, role = %role, "access request approved");
        Ok(username)
    }

    /// Deny a request: just consume it
    pub fn deny_access_request(&self, id: i64, actor_role: Role) -> Result<()> {
        if actor_role != Role::Admin {
            return Err(Error::Validation(
                "insufficient permission: denial requires the admin role".to_string(),
            ));
        }
        let deleted = self
            .conn()?
            .execute("DELETE FROM access_requests WHERE id = ?", params![id])?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("access request {}", id)));
        }
        Ok(())
    }

    /// Role assigned to a user, if any
    pub fn role_of(&self, username: &str) -> Result<Option<Role>> {
        let role: Option<String> = self
            .conn()?
            .query_row(
                "SELECT role FROM user_roles WHERE username = ?",
                params![username],
                |row| row.get(0),
            )
            .optional()?;
        Ok(role.and_then(|r| r.parse().ok()))
    }
}
