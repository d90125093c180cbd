//! Access request and role assignment commands

use anyhow::Result;
use recaudo_core::roles::Role;
use recaudo_core::Database;

pub fn cmd_access_request(db: &Database, username: &str) -> Result<()> {
    let (request, created) = db.request_access(username)?;
    if created {
        println!("✅ Access request [{}] filed for {}", request.id, request.username);
    } else {
        println!("Request [{}] for {} is already pending", request.id, request.username);
    }
    Ok(())
}

pub fn cmd_access_list(db: &Database) -> Result<()> {
    let requests = db.list_access_requests()?;
    if requests.is_empty() {
        println!("No pending access requests.");
        return Ok(());
    }
    println!();
    println!("🔑 Pending access requests");
    for r in &requests {
        println!(
            "   [{}] {}  requested {}",
            r.id,
            r.username,
            r.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

pub fn cmd_access_approve(
    db: &Database,
    id: i64,
    role: &str,
    user: &str,
    user_role: Role,
) -> Result<()> {
    let role: Role = role.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let username = db.approve_access_request(id, role, user, user_role)?;
    println!("✅ {} approved as {}", username, role);
    Ok(())
}

pub fn cmd_access_deny(db: &Database, id: i64, user_role: Role) -> Result<()> {
    db.deny_access_request(id, user_role)?;
    println!("✅ Request {} denied", id);
    Ok(())
}
