//! Operator authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during operator authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] pizzaria_core::EmailError),

    /// Wrong password, unknown email or deactivated account.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Operator already exists.
    #[error("admin user already exists")]
    UserAlreadyExists,

    /// Name left blank.
    #[error("name is required")]
    MissingName,

    /// Password too weak.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
