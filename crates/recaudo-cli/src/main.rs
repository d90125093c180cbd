//! Recaudo CLI - Receipt tracking and reconciliation back office
//!
//! Usage:
//!   recaudo init                          Initialize database
//!   recaudo import receipts --file CSV    Bulk-load receipts with dedup
//!   recaudo receipts submit ...           Submit one receipt through detection
//!   recaudo reconcile status 42           Show a transaction's balance

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    if let Commands::Init = cli.command {
        return commands::cmd_init(&cli.db);
    }

    let db = commands::open_db(&cli.db)?;
    let role = commands::resolve_role(&db, &cli.user, cli.role.as_deref())?;
    let user = cli.user.as_str();

    match cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::Status => commands::cmd_status(&db),
        Commands::Import { source } => match source {
            ImportSource::Receipts { file } => commands::cmd_import_receipts(&db, &file, user),
            ImportSource::Clients { file } => commands::cmd_import_clients(&db, &file),
        },
        Commands::Receipts { action } => match action {
            ReceiptsAction::Submit {
                fecha,
                hora,
                comprobante,
                bank,
                client,
                source,
                valor,
                description,
                confirm_override,
            } => commands::cmd_receipts_submit(
                &db,
                fecha,
                &hora,
                &comprobante,
                &bank,
                client.as_deref(),
                source.as_deref(),
                valor,
                description.as_deref(),
                confirm_override,
                user,
            ),
            ReceiptsAction::List {
                status,
                client,
                transaction,
                unlinked,
                limit,
            } => commands::cmd_receipts_list(
                &db,
                status.as_deref(),
                client.as_deref(),
                transaction,
                unlinked,
                limit,
            ),
            ReceiptsAction::Show { id } => commands::cmd_receipts_show(&db, id),
            ReceiptsAction::Status { id, status } => {
                commands::cmd_receipts_status(&db, id, &status, user, role)
            }
            ReceiptsAction::Delete { id } => commands::cmd_receipts_delete(&db, id, user, role),
        },
        Commands::Transactions { action } => match action {
            TransactionsAction::Create {
                date,
                client,
                seller,
                transaction_type,
                description,
                expected,
            } => commands::cmd_transactions_create(
                &db,
                date,
                client.as_deref(),
                seller.as_deref(),
                transaction_type.as_deref(),
                description.as_deref(),
                expected,
                user,
                role,
            ),
            TransactionsAction::List {
                status,
                client,
                limit,
            } => commands::cmd_transactions_list(&db, status.as_deref(), client.as_deref(), limit),
            TransactionsAction::Show { reference } => {
                commands::cmd_transactions_show(&db, &reference)
            }
            TransactionsAction::Update {
                id,
                date,
                description,
                expected,
            } => commands::cmd_transactions_update(
                &db,
                id,
                date,
                description.as_deref(),
                expected,
                user,
                role,
            ),
            TransactionsAction::Invoice { id, number } => {
                commands::cmd_transactions_invoice(&db, id, &number, user, role)
            }
            TransactionsAction::Void { id } => commands::cmd_transactions_void(&db, id, user, role),
            TransactionsAction::Delete { id } => {
                commands::cmd_transactions_delete(&db, id, user, role)
            }
        },
        Commands::Reconcile { action } => match action {
            ReconcileAction::Status { transaction } => {
                commands::cmd_reconcile_status(&db, transaction)
            }
            ReconcileAction::Apply {
                transaction,
                receipts,
            } => commands::cmd_reconcile_apply(&db, transaction, &receipts, user),
            ReconcileAction::Unlink {
                transaction,
                receipts,
            } => commands::cmd_reconcile_unlink(&db, transaction, &receipts, user),
            ReconcileAction::CreditNote { transaction } => {
                commands::cmd_reconcile_credit_note(&db, transaction, user, role)
            }
        },
        Commands::History { action } => match action {
            HistoryAction::Log { entity, id } => commands::cmd_history_log(&db, &entity, id),
            HistoryAction::Deleted { entity } => commands::cmd_history_deleted(&db, &entity),
            HistoryAction::Restore { entity, history_id } => {
                commands::cmd_history_restore(&db, &entity, history_id, user, role)
            }
        },
        Commands::Duplicates { action } => match action {
            None | Some(DuplicatesAction::List { all: false }) => {
                commands::cmd_duplicates_list(&db, false)
            }
            Some(DuplicatesAction::List { all }) => commands::cmd_duplicates_list(&db, all),
            Some(DuplicatesAction::Resolve { id }) => {
                commands::cmd_duplicates_resolve(&db, id, user)
            }
            Some(DuplicatesAction::Export { output }) => {
                commands::cmd_duplicates_export(&db, output.as_deref())
            }
        },
        Commands::Catalog { action } => match action {
            CatalogAction::List { kind } => commands::cmd_catalog_list(&db, &kind),
            CatalogAction::Add { kind, name } => commands::cmd_catalog_add(&db, &kind, &name),
            CatalogAction::Rename { kind, id, name } => {
                commands::cmd_catalog_rename(&db, &kind, id, &name)
            }
            CatalogAction::Delete { kind, id } => commands::cmd_catalog_delete(&db, &kind, id),
            CatalogAction::Sources => commands::cmd_sources_list(&db),
            CatalogAction::SourceAdd {
                name,
                effective_days,
            } => commands::cmd_sources_add(&db, &name, effective_days),
            CatalogAction::SourceDays { id, days } => commands::cmd_sources_set_days(&db, id, days),
            CatalogAction::SourceDelete { id } => commands::cmd_sources_delete(&db, id),
        },
        Commands::Clients { action } => match action {
            ClientsAction::Add { name, dni } => commands::cmd_clients_add(&db, &name, &dni),
            ClientsAction::List { limit } => commands::cmd_clients_list(&db, limit),
            ClientsAction::Search { query } => commands::cmd_clients_search(&db, &query),
            ClientsAction::Balance { dni } => commands::cmd_clients_balance(&db, &dni),
            ClientsAction::Delete { id } => commands::cmd_clients_delete(&db, id),
        },
        Commands::Access { action } => match action {
            AccessAction::Request { username } => commands::cmd_access_request(&db, &username),
            AccessAction::List => commands::cmd_access_list(&db),
            AccessAction::Approve { id, role: assigned } => {
                commands::cmd_access_approve(&db, id, &assigned, user, role)
            }
            AccessAction::Deny { id } => commands::cmd_access_deny(&db, id, role),
        },
        Commands::Export { export_type } => match export_type {
            ExportType::Receipts {
                output,
                from,
                to,
                client,
            } => commands::cmd_export_receipts(&db, output.as_deref(), from, to, client.as_deref()),
        },
    }
}
