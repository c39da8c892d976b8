//! Operator account commands.
//!
//! The first owner account is created here; later accounts can be added by
//! an owner through the back office.

use std::io::BufRead;

use pizzaria_admin::services::{AdminAuthService, AuthError};
use pizzaria_core::AdminRole;

use super::{CommandError, connect};

/// Errors that can occur during operator commands.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    /// Invalid role.
    #[error("Invalid role: {0}. Valid roles: dono, gerente, atendente")]
    InvalidRole(String),

    #[error("Could not read password: {0}")]
    Stdin(#[from] std::io::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Parse a role as typed on the command line.
fn parse_role(role: &str) -> Result<AdminRole, AdminError> {
    role.trim()
        .to_lowercase()
        .parse()
        .map_err(|_| AdminError::InvalidRole(role.to_owned()))
}

fn read_password() -> Result<String, AdminError> {
    tracing::info!("Password (one line on stdin):");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

/// Create an operator with an initial password.
pub async fn create_user(
    email: &str,
    name: &str,
    role: &str,
    password: Option<String>,
) -> Result<(), AdminError> {
    let role = parse_role(role)?;
    let password = match password {
        Some(password) => password,
        None => read_password()?,
    };

    let pool = connect().await?;
    let user = AdminAuthService::new(&pool)
        .create_user(email, name, role, &password)
        .await?;

    tracing::info!(
        "Operator created! ID: {}, Email: {}, Role: {}",
        user.id,
        user.email,
        user.role
    );
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role_accepts_wire_names() {
        assert_eq!(parse_role("dono").unwrap(), AdminRole::Owner);
        assert_eq!(parse_role(" Gerente ").unwrap(), AdminRole::Manager);
        assert!(matches!(parse_role("admin"), Err(AdminError::InvalidRole(_))));
    }
}
