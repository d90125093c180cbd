//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

/// Recaudo - Receipt tracking and reconciliation back office
#[derive(Parser)]
#[command(name = "recaudo")]
#[command(about = "Track bank receipts, catch duplicates, reconcile transactions", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "recaudo.db", global = true)]
    pub db: PathBuf,

    /// Username recorded as the actor on every change
    #[arg(long, default_value = "cli", global = true)]
    pub user: String,

    /// Act under an explicit role (admin, digitador, facturador, validador)
    ///
    /// Defaults to the role assigned to --user, or admin when the
    /// database has no role assignments yet.
    #[arg(long, global = true)]
    pub role: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Show database status and record counts
    Status,

    /// Bulk-load data from CSV files
    Import {
        #[command(subcommand)]
        source: ImportSource,
    },

    /// Manage receipts (submit, list, approve, delete)
    Receipts {
        #[command(subcommand)]
        action: ReceiptsAction,
    },

    /// Manage transactions (create, list, invoice, void, delete)
    Transactions {
        #[command(subcommand)]
        action: TransactionsAction,
    },

    /// Balance transactions against receipts
    Reconcile {
        #[command(subcommand)]
        action: ReconcileAction,
    },

    /// Audit history: change logs, deleted items, restore
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Review the duplicate-attempt audit log
    Duplicates {
        #[command(subcommand)]
        action: Option<DuplicatesAction>,
    },

    /// Manage lookup tables (banks, sellers, types, sources)
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Manage clients
    Clients {
        #[command(subcommand)]
        action: ClientsAction,
    },

    /// Manage access requests and role assignments
    Access {
        #[command(subcommand)]
        action: AccessAction,
    },

    /// Export data to CSV
    Export {
        #[command(subcommand)]
        export_type: ExportType,
    },
}

#[derive(Subcommand)]
pub enum ImportSource {
    /// Import receipts from a bank CSV (FECHA;HORA;#COMPROBANTE;BANCO;VALOR)
    Receipts {
        /// CSV file to import
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Load clients from a CSV with NOMBRE and DNI columns
    Clients {
        /// CSV file to import
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum ReceiptsAction {
    /// Submit a single receipt through duplicate detection
    Submit {
        /// Receipt date (YYYY-MM-DD)
        #[arg(long)]
        fecha: NaiveDate,

        /// Receipt time (HH:MM or HH:MM:SS)
        #[arg(long)]
        hora: String,

        /// Voucher number as printed by the bank
        #[arg(long)]
        comprobante: String,

        /// Bank name (created if missing)
        #[arg(long)]
        bank: String,

        /// Client document number
        #[arg(long)]
        client: Option<String>,

        /// Origin channel name (created if missing)
        #[arg(long)]
        source: Option<String>,

        /// Amount, decimal point (e.g. 1234.56)
        #[arg(long)]
        valor: Decimal,

        #[arg(long)]
        description: Option<String>,

        /// Save even if similar receipts exist
        #[arg(long)]
        confirm_override: bool,
    },

    /// List receipts, newest first
    List {
        /// Filter by payment status (pendiente, aprobado, rechazado)
        #[arg(long)]
        status: Option<String>,

        /// Filter by client document number
        #[arg(long)]
        client: Option<String>,

        /// Filter by transaction id
        #[arg(long)]
        transaction: Option<i64>,

        /// Only free credits (no transaction link)
        #[arg(long)]
        unlinked: bool,

        #[arg(long, default_value = "50")]
        limit: i64,
    },

    /// Show one receipt in full
    Show {
        id: i64,
    },

    /// Set a receipt's payment status (Validador/Admin)
    Status {
        id: i64,
        /// pendiente, aprobado or rechazado
        status: String,
    },

    /// Delete a receipt into the history log (Admin)
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum TransactionsAction {
    /// Create a transaction
    Create {
        /// Transaction date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,

        /// Client document number
        #[arg(long)]
        client: Option<String>,

        /// Seller name (created if missing)
        #[arg(long)]
        seller: Option<String>,

        /// Transaction type name (created if missing)
        #[arg(long = "type")]
        transaction_type: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Expected amount to be covered by receipts
        #[arg(long, default_value = "0")]
        expected: Decimal,
    },

    /// List transactions
    List {
        /// Filter by status (pendiente, facturado, anulado)
        #[arg(long)]
        status: Option<String>,

        /// Filter by client document number
        #[arg(long)]
        client: Option<String>,

        #[arg(long, default_value = "50")]
        limit: i64,
    },

    /// Show one transaction by numeric id or unique id
    Show {
        reference: String,
    },

    /// Update mutable fields of a transaction
    Update {
        id: i64,

        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        expected: Option<Decimal>,
    },

    /// Attach an invoice number, moving the transaction to facturado
    Invoice {
        id: i64,
        /// Invoice number
        number: String,
    },

    /// Void a pending transaction
    Void {
        id: i64,
    },

    /// Delete a transaction into the history log (Admin)
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum ReconcileAction {
    /// Show a transaction's balance: expected, received, difference
    Status {
        transaction: i64,
    },

    /// Apply free approved credits to a transaction
    Apply {
        transaction: i64,
        /// Receipt ids to link
        #[arg(required = true)]
        receipts: Vec<i64>,
    },

    /// Detach receipts from a transaction, back to free credits
    Unlink {
        transaction: i64,
        /// Receipt ids to detach
        #[arg(required = true)]
        receipts: Vec<i64>,
    },

    /// Absorb an overpayment into a balanced credit-note pair
    CreditNote {
        transaction: i64,
    },
}

#[derive(Subcommand)]
pub enum HistoryAction {
    /// Change log of one entity
    Log {
        /// transactions or receipts
        entity: String,
        id: i64,
    },

    /// Deleted items that have not been restored
    Deleted {
        /// transactions or receipts
        entity: String,
    },

    /// Restore an entity from a history snapshot (Admin)
    Restore {
        /// transactions or receipts
        entity: String,
        history_id: i64,
    },
}

#[derive(Subcommand)]
pub enum DuplicatesAction {
    /// List duplicate attempts (unresolved only by default)
    List {
        /// Include resolved attempts
        #[arg(long)]
        all: bool,
    },

    /// Mark an attempt reviewed
    Resolve {
        id: i64,
    },

    /// Export the full attempt log to CSV
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum CatalogAction {
    /// List entries of a lookup table (bank, seller, type)
    List {
        kind: String,
    },

    /// Add an entry to a lookup table
    Add {
        kind: String,
        name: String,
    },

    /// Rename an entry
    Rename {
        kind: String,
        id: i64,
        name: String,
    },

    /// Delete an entry (refused while referenced)
    Delete {
        kind: String,
        id: i64,
    },

    /// List origin channels with their clearing days
    Sources,

    /// Add an origin channel
    SourceAdd {
        name: String,
        /// Business days until funds clear
        #[arg(long, default_value = "0")]
        effective_days: i64,
    },

    /// Change an origin channel's clearing days
    SourceDays {
        id: i64,
        days: i64,
    },

    /// Delete an origin channel (refused while referenced)
    SourceDelete {
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum ClientsAction {
    /// Add a client (name and document number are normalized)
    Add {
        name: String,
        dni: String,
    },

    /// List clients
    List {
        #[arg(long, default_value = "100")]
        limit: i64,
    },

    /// Search clients by name or document number
    Search {
        query: String,
    },

    /// Show a client's free credit balance and the receipts behind it
    Balance {
        /// Client document number
        dni: String,
    },

    /// Delete a client (refused while referenced)
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum AccessAction {
    /// File an access request for a username
    Request {
        username: String,
    },

    /// List pending access requests
    List,

    /// Approve a request, assigning a role (Admin)
    Approve {
        id: i64,
        /// admin, digitador, facturador or validador
        role: String,
    },

    /// Deny a request (Admin)
    Deny {
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum ExportType {
    /// Export receipts joined with clients, banks and transactions
    Receipts {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only receipts on or after this date
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Only receipts on or before this date
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Filter by client document number
        #[arg(long)]
        client: Option<String>,
    },
}
