//! Recaudo core library
//!
//! Back-office engine for incoming payment records ("abonos"): entity store,
//! duplicate detection, transaction reconciliation with credit-note pairs,
//! append-only audit history with restore, and bulk CSV import.

pub mod calendar;
pub mod db;
pub mod detect;
pub mod error;
pub mod export;
pub mod import;
pub mod models;
pub mod reconcile;
pub mod roles;

pub use db::Database;
pub use error::{Error, Result};
