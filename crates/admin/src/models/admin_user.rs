//! Back-office operator accounts.

use chrono::{DateTime, Utc};
use serde::Serialize;

use pizzaria_core::{AdminRole, AdminUserId, Email};

/// An operator who can sign in to the back office.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AdminUser {
    pub id: AdminUserId,
    pub email: Email,
    pub name: String,
    pub role: AdminRole,
    /// Deactivated operators cannot sign in.
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl AdminUser {
    /// Returns `true` if the operator may change settings and see reports.
    #[must_use]
    pub const fn can_manage(&self) -> bool {
        self.role.can_manage()
    }
}
