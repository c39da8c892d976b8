//! Admin user repository for database operations.

use sqlx::PgPool;
use tracing::instrument;

use pizzaria_core::{AdminRole, AdminUserId, Email};

use super::{RepositoryError, conflict_on_unique};
use crate::models::AdminUser;

const ADMIN_COLUMNS: &str = "id, email, name, role, active, created_at";

#[derive(sqlx::FromRow)]
struct AdminWithHash {
    #[sqlx(flatten)]
    admin: AdminUser,
    password_hash: String,
}

/// Repository for admin user database operations.
pub struct AdminUserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AdminUserRepository<'a> {
    /// Create a new admin user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List all operators, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<AdminUser>, RepositoryError> {
        let users = sqlx::query_as::<_, AdminUser>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admin.admin_user ORDER BY created_at DESC"
        ))
        .fetch_all(self.pool)
        .await?;
        Ok(users)
    }

    /// Get an operator by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self), fields(admin_id = %id))]
    pub async fn get_by_id(&self, id: AdminUserId) -> Result<Option<AdminUser>, RepositoryError> {
        let user = sqlx::query_as::<_, AdminUser>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admin.admin_user WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(user)
    }

    /// Get an active operator and their password hash by email, for login.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self, email))]
    pub async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(AdminUser, String)>, RepositoryError> {
        let row = sqlx::query_as::<_, AdminWithHash>(&format!(
            "SELECT {ADMIN_COLUMNS}, password_hash FROM admin.admin_user \
             WHERE email = $1 AND active"
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(|r| (r.admin, r.password_hash)))
    }

    /// Create an operator with a hashed password.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email is already in use.
    #[instrument(skip(self, email, password_hash))]
    pub async fn create(
        &self,
        email: &Email,
        name: &str,
        role: AdminRole,
        password_hash: &str,
    ) -> Result<AdminUser, RepositoryError> {
        sqlx::query_as::<_, AdminUser>(&format!(
            r"
            INSERT INTO admin.admin_user (email, name, role, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING {ADMIN_COLUMNS}
            "
        ))
        .bind(email)
        .bind(name)
        .bind(role)
        .bind(password_hash)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "e-mail já cadastrado"))
    }

    /// Activate or deactivate an operator.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the operator does not exist.
    #[instrument(skip(self), fields(admin_id = %id))]
    pub async fn set_active(&self, id: AdminUserId, active: bool) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE admin.admin_user SET active = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(active)
        .execute(self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
