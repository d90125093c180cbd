//! Role-based capability checks
//!
//! Field-level permissions are a pure function of (role, field, is_new) so
//! the storage layer and any presentation layer evaluate exactly the same
//! rules. Admin can touch everything; the other roles are narrow by design:
//! Digitador enters new records, Facturador attaches invoices, Validador
//! approves or rejects payments.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Digitador,
    Facturador,
    Validador,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Digitador => "digitador",
            Self::Facturador => "facturador",
            Self::Validador => "validador",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "digitador" => Ok(Self::Digitador),
            "facturador" => Ok(Self::Facturador),
            "validador" => Ok(Self::Validador),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether `role` may create transactions/receipts at all.
pub fn can_create(role: Role) -> bool {
    matches!(role, Role::Admin | Role::Digitador)
}

/// Whether `role` may set `field` on an entity.
///
/// `is_new` distinguishes initial data entry from later edits: identity and
/// amount fields are frozen after creation for everyone but admin.
pub fn can_edit_field(role: Role, field: &str, is_new: bool) -> bool {
    if role == Role::Admin {
        return true;
    }
    match field {
        // invoice lifecycle belongs to Facturador, and only post-creation
        "invoice_number" | "invoiced_by" | "status" => role == Role::Facturador && !is_new,
        // approval belongs to Validador, at any point
        "payment_status" => role == Role::Validador,
        // everything else is data entry: Digitador, creation time only
        _ => role == Role::Digitador && is_new,
    }
}

/// Whether `role` may delete tracked entities or restore them from history.
pub fn can_delete(role: Role) -> bool {
    role == Role::Admin
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_edits_everything() {
        for field in ["fecha", "valor", "invoice_number", "payment_status"] {
            assert!(can_edit_field(Role::Admin, field, false));
        }
    }

    #[test]
    fn digitador_only_creates() {
        assert!(can_create(Role::Digitador));
        assert!(can_edit_field(Role::Digitador, "valor", true));
        assert!(!can_edit_field(Role::Digitador, "valor", false));
        assert!(!can_edit_field(Role::Digitador, "invoice_number", false));
    }

    #[test]
    fn facturador_owns_invoice_fields() {
        assert!(can_edit_field(Role::Facturador, "invoice_number", false));
        assert!(can_edit_field(Role::Facturador, "status", false));
        assert!(!can_edit_field(Role::Facturador, "invoice_number", true));
        assert!(!can_edit_field(Role::Facturador, "expected_amount", false));
        assert!(!can_create(Role::Facturador));
    }

    #[test]
    fn validador_owns_payment_status() {
        assert!(can_edit_field(Role::Validador, "payment_status", false));
        assert!(!can_edit_field(Role::Validador, "valor", false));
        assert!(!can_delete(Role::Validador));
    }

    #[test]
    fn role_parsing() {
        assert_eq!("Facturador".parse::<Role>(), Ok(Role::Facturador));
        assert!("auditor".parse::<Role>().is_err());
    }
}
