//! Session-related types for admin authentication.

use serde::{Deserialize, Serialize};

use pizzaria_core::{AdminRole, AdminUserId, Email};

use super::AdminUser;

/// Session-stored admin identity.
///
/// Minimal data stored in the session to identify the logged-in operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentAdmin {
    /// Operator's database ID.
    pub id: AdminUserId,
    /// Operator's email address.
    pub email: Email,
    /// Display name, also written to status history as `changed_by`.
    pub name: String,
    /// Permission level.
    pub role: AdminRole,
}

impl From<&AdminUser> for CurrentAdmin {
    fn from(user: &AdminUser) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
        }
    }
}

/// Session keys for admin authentication data.
pub mod keys {
    /// Key for storing the current logged-in operator.
    pub const CURRENT_ADMIN: &str = "current_admin";
}
