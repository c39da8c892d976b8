//! Operator login and logout.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::{Layout, MessageQuery, redirect_with_error};
use crate::error::{clear_sentry_user, set_sentry_user};
use crate::filters;
use crate::middleware::{clear_current_admin, set_current_admin};
use crate::models::{AdminUser, CurrentAdmin};
use crate::services::{AdminAuthService, AuthError};
use crate::state::AppState;

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub layout: Layout,
    pub error: Option<String>,
    pub success: Option<String>,
}

/// User-facing message for a failed login.
fn login_message(error: &AuthError) -> &'static str {
    match error {
        AuthError::InvalidCredentials | AuthError::InvalidEmail(_) => "E-mail ou senha incorretos.",
        _ => "Não foi possível entrar agora. Tente novamente.",
    }
}

fn current_admin(user: &AdminUser) -> CurrentAdmin {
    CurrentAdmin {
        id: user.id,
        email: user.email.clone(),
        name: user.name.clone(),
        role: user.role,
    }
}

/// Display the login page.
pub async fn login_page(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<MessageQuery>,
) -> impl IntoResponse {
    LoginTemplate {
        layout: Layout::load(&state, &session).await,
        error: query.error,
        success: query.success,
    }
}

/// Handle login form submission.
#[instrument(skip(state, session, form))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let user = match AdminAuthService::new(state.pool())
        .login(&form.email, &form.password)
        .await
    {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(error = %e, "admin login failed");
            return redirect_with_error("/auth/login", login_message(&e)).into_response();
        }
    };

    // A fresh session id on privilege change.
    if let Err(e) = session.cycle_id().await {
        tracing::error!(error = %e, "failed to rotate session id");
    }
    if let Err(e) = set_current_admin(&session, &current_admin(&user)).await {
        tracing::error!(error = %e, "failed to set session");
        return redirect_with_error("/auth/login", "Sessão indisponível, tente novamente.")
            .into_response();
    }

    set_sentry_user(&user.id, Some(user.email.as_str()));
    tracing::info!(admin_id = %user.id, role = %user.role, "operator logged in");
    Redirect::to("/").into_response()
}

/// Logout and clear session.
pub async fn logout(session: Session) -> Redirect {
    if let Err(e) = clear_current_admin(&session).await {
        tracing::warn!(error = %e, "failed to clear session on logout");
    }
    clear_sentry_user();
    Redirect::to("/auth/login?success=Sess%C3%A3o+encerrada.")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_login_message_does_not_reveal_which_field_failed() {
        assert_eq!(
            login_message(&AuthError::InvalidCredentials),
            login_message(&AuthError::InvalidEmail(pizzaria_core::EmailError::Empty))
        );
        assert_ne!(
            login_message(&AuthError::PasswordHash),
            login_message(&AuthError::InvalidCredentials)
        );
    }
}
