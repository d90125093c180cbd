//! Client commands (add, list, search, balance, delete)

use anyhow::Result;
use recaudo_core::models::Client;
use recaudo_core::Database;

pub fn cmd_clients_add(db: &Database, name: &str, dni: &str) -> Result<()> {
    let (client, created) = db.get_or_create_client(name, dni)?;
    if created {
        println!("✅ Client [{}] {} ({})", client.id, client.name, client.dni);
    } else {
        println!("Already known: [{}] {} ({})", client.id, client.name, client.dni);
    }
    Ok(())
}

fn print_clients(clients: &[Client]) {
    for c in clients {
        println!("   [{}] {}  {}", c.id, c.dni, c.name);
    }
    println!();
    println!("   {} client(s)", clients.len());
}

pub fn cmd_clients_list(db: &Database, limit: i64) -> Result<()> {
    let clients = db.list_clients(limit)?;
    if clients.is_empty() {
        println!("No clients. Load some with: recaudo import clients --file clientes.csv");
        return Ok(());
    }
    println!();
    print_clients(&clients);
    Ok(())
}

pub fn cmd_clients_search(db: &Database, query: &str) -> Result<()> {
    let clients = db.search_clients(query)?;
    if clients.is_empty() {
        println!("No clients match {:?}.", query);
        return Ok(());
    }
    println!();
    print_clients(&clients);
    Ok(())
}

pub fn cmd_clients_balance(db: &Database, dni: &str) -> Result<()> {
    let client = db.get_client_by_dni(dni)?;
    let balance = db.available_balance(client.id)?;
    let credits = db.available_credits(client.id)?;

    println!();
    println!("💳 {} ({})", client.name, client.dni);
    println!("   Free credit balance: ${}", balance);
    if !credits.is_empty() {
        println!("   Backed by:");
        for r in &credits {
            println!("   #{}  {} {}  ${}", r.id, r.fecha, r.comprobante, r.valor);
        }
    }
    Ok(())
}

pub fn cmd_clients_delete(db: &Database, id: i64) -> Result<()> {
    db.delete_client(id)?;
    println!("🗑️  Client {} deleted", id);
    Ok(())
}
