//! Operator accounts. Managers can list; only owners add or deactivate.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::instrument;

use pizzaria_core::{AdminRole, AdminUserId};

use crate::db::AdminUserRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireManager;
use crate::models::{AdminUser, CurrentAdmin};
use crate::services::AdminAuthService;
use crate::state::AppState;

/// Body of a new operator.
#[derive(Debug, Deserialize)]
pub struct NewAdminForm {
    pub email: String,
    pub name: String,
    pub role: AdminRole,
    pub password: String,
}

/// Body of an activation toggle.
#[derive(Debug, Deserialize)]
pub struct ActiveForm {
    pub active: bool,
}

fn require_owner(admin: &CurrentAdmin) -> Result<()> {
    if admin.role == AdminRole::Owner {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "apenas o dono gerencia operadores".to_string(),
        ))
    }
}

/// All operators.
pub async fn list(
    State(state): State<AppState>,
    RequireManager(_admin): RequireManager,
) -> Result<Json<Vec<AdminUser>>> {
    Ok(Json(AdminUserRepository::new(state.pool()).list_all().await?))
}

/// Add an operator with an initial password.
#[instrument(skip(state, admin, form), fields(admin_id = %admin.id, role = %form.role))]
pub async fn create(
    State(state): State<AppState>,
    RequireManager(admin): RequireManager,
    Json(form): Json<NewAdminForm>,
) -> Result<(StatusCode, Json<AdminUser>)> {
    require_owner(&admin)?;
    let user = AdminAuthService::new(state.pool())
        .create_user(&form.email, &form.name, form.role, &form.password)
        .await?;
    tracing::info!(new_admin_id = %user.id, "operator created");
    Ok((StatusCode::CREATED, Json(user)))
}

/// Activate or deactivate an operator. Owners cannot lock themselves out.
#[instrument(skip(state, admin), fields(admin_id = %admin.id, target = %id))]
pub async fn set_active(
    State(state): State<AppState>,
    RequireManager(admin): RequireManager,
    Path(id): Path<AdminUserId>,
    Json(form): Json<ActiveForm>,
) -> Result<StatusCode> {
    require_owner(&admin)?;
    if id == admin.id && !form.active {
        return Err(AppError::BadRequest(
            "você não pode desativar a própria conta".to_string(),
        ));
    }
    AdminUserRepository::new(state.pool())
        .set_active(id, form.active)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pizzaria_core::Email;

    use super::*;

    fn admin(role: AdminRole) -> CurrentAdmin {
        CurrentAdmin {
            id: AdminUserId::new(1),
            email: Email::parse("gerente@pizzaria.com").unwrap(),
            name: "Gerente".to_string(),
            role,
        }
    }

    #[test]
    fn test_only_owner_manages_operators() {
        assert!(require_owner(&admin(AdminRole::Owner)).is_ok());
        assert!(matches!(
            require_owner(&admin(AdminRole::Manager)),
            Err(AppError::Forbidden(_))
        ));
    }
}
