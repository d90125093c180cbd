//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `access` - Access request and role assignment commands
//! - `catalog` - Lookup table commands (banks, sellers, types, sources)
//! - `clients` - Client commands (add, list, search, balance)
//! - `core` - Core commands (init, status) and shared utilities (open_db)
//! - `duplicates` - Duplicate-attempt review commands
//! - `history` - Audit history commands (log, deleted, restore)
//! - `import` - Bulk CSV import and export commands
//! - `receipts` - Receipt commands (submit, list, status, delete)
//! - `reconcile` - Reconciliation commands (status, apply, credit-note)
//! - `transactions` - Transaction commands (create, invoice, void, delete)

pub mod access;
pub mod catalog;
pub mod clients;
pub mod core;
pub mod duplicates;
pub mod history;
pub mod import;
pub mod receipts;
pub mod reconcile;
pub mod transactions;

// Re-export command functions for main.rs
pub use access::*;
pub use catalog::*;
pub use clients::*;
pub use core::*;
pub use duplicates::*;
pub use history::*;
pub use import::*;
pub use receipts::*;
pub use reconcile::*;
pub use transactions::*;

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use recaudo_core::roles::Role;
use recaudo_core::Database;

/// Open (and migrate) the database at `db_path`
pub fn open_db(db_path: &Path) -> Result<Database> {
    let path = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    Database::new(path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))
}

/// Resolve the role a command runs under.
///
/// An explicit --role wins, then the role assigned to the user in the
/// database. A user with neither gets admin: a fresh single-operator
/// database has no assignments yet and must be bootstrappable.
pub fn resolve_role(db: &Database, user: &str, explicit: Option<&str>) -> Result<Role> {
    if let Some(name) = explicit {
        return name.parse().map_err(|e: String| anyhow!(e));
    }
    if let Some(role) = db.role_of(user)? {
        tracing::debug!(user, role = %role, "using assigned role");
        return Ok(role);
    }
    tracing::debug!(user, "no role assignment, defaulting to admin");
    Ok(Role::Admin)
}

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max.saturating_sub(3)])
    }
}
