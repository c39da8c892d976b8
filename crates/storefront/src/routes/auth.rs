//! Authentication route handlers.
//!
//! Handles login, registration and logout with email + password. The session
//! cart survives login so a guest can fill the cart first and sign in at
//! checkout.

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

use super::{Layout, redirect_with_error};
use crate::error::{add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::filters;
use crate::middleware::auth::safe_next;
use crate::middleware::{clear_current_customer, set_current_customer};
use crate::models::{CurrentCustomer, Customer};
use crate::services::auth::{AuthError, AuthService, Registration};
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub next: Option<String>,
}

/// Registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(default)]
    pub next: Option<String>,
}

// =============================================================================
// Query Types
// =============================================================================

/// Query parameters for the login and register pages.
#[derive(Debug, Default, Deserialize)]
pub struct AuthQuery {
    pub error: Option<String>,
    pub success: Option<String>,
    pub next: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub layout: Layout,
    pub error: Option<String>,
    pub success: Option<String>,
    pub next: String,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub layout: Layout,
    pub error: Option<String>,
    pub next: String,
}

// =============================================================================
// Helpers
// =============================================================================

/// Page to return to with the `next` target preserved.
fn form_path(page: &str, next: &str) -> String {
    if next == "/" {
        page.to_string()
    } else {
        let encoded: String = url::form_urlencoded::byte_serialize(next.as_bytes()).collect();
        format!("{page}?next={encoded}")
    }
}

/// Store the customer in the session and tag Sentry events with them.
async fn sign_in(
    session: &Session,
    customer: &Customer,
) -> Result<(), tower_sessions::session::Error> {
    let current = CurrentCustomer {
        id: customer.id,
        name: customer.name.clone(),
        email: customer.email.clone(),
    };
    set_current_customer(session, &current).await?;
    set_sentry_user(&customer.id, Some(customer.email.as_str()));
    Ok(())
}

/// User-facing message for an authentication failure.
fn auth_message(error: &AuthError) -> String {
    match error {
        AuthError::InvalidCredentials => "E-mail ou senha incorretos.".to_string(),
        AuthError::UserAlreadyExists => "Já existe uma conta com este e-mail.".to_string(),
        AuthError::MissingName => "Informe seu nome.".to_string(),
        AuthError::WeakPassword(reason) => reason.clone(),
        AuthError::InvalidEmail(e) => e.to_string(),
        AuthError::InvalidPhone(e) => e.to_string(),
        AuthError::Repository(_) | AuthError::PasswordHash => {
            "Não foi possível concluir agora. Tente novamente.".to_string()
        }
    }
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page.
pub async fn login_page(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<AuthQuery>,
) -> impl IntoResponse {
    LoginTemplate {
        layout: Layout::load(&state, &session).await,
        error: query.error,
        success: query.success,
        next: safe_next(query.next.as_deref()).to_string(),
    }
}

/// Handle login form submission.
#[instrument(skip(state, session, form))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let next = safe_next(form.next.as_deref()).to_string();

    let customer = match AuthService::new(state.pool())
        .login(&form.email, &form.password)
        .await
    {
        Ok(customer) => customer,
        Err(e) => {
            tracing::warn!(error = %e, "login failed");
            return redirect_with_error(&form_path("/auth/login", &next), &auth_message(&e))
                .into_response();
        }
    };

    if let Err(e) = sign_in(&session, &customer).await {
        tracing::error!(error = %e, "failed to set session");
        return redirect_with_error("/auth/login", "Sessão indisponível, tente novamente.")
            .into_response();
    }

    add_breadcrumb("auth", "Customer logged in", None);
    tracing::info!(customer_id = %customer.id, "customer logged in");
    Redirect::to(&next).into_response()
}

// =============================================================================
// Registration Routes
// =============================================================================

/// Display the registration page.
pub async fn register_page(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<AuthQuery>,
) -> impl IntoResponse {
    RegisterTemplate {
        layout: Layout::load(&state, &session).await,
        error: query.error,
        next: safe_next(query.next.as_deref()).to_string(),
    }
}

/// Handle registration form submission. The new customer is logged in
/// immediately.
#[instrument(skip(state, session, form))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Response {
    let next = safe_next(form.next.as_deref()).to_string();
    let back = form_path("/auth/register", &next);

    if form.password != form.password_confirm {
        return redirect_with_error(&back, "As senhas não conferem.").into_response();
    }

    let registration = Registration {
        name: &form.name,
        email: &form.email,
        phone: &form.phone,
        password: &form.password,
    };
    let customer = match AuthService::new(state.pool()).register(registration).await {
        Ok(customer) => customer,
        Err(e) => {
            tracing::warn!(error = %e, "registration failed");
            return redirect_with_error(&back, &auth_message(&e)).into_response();
        }
    };

    if let Err(e) = sign_in(&session, &customer).await {
        tracing::error!(error = %e, "failed to set session after registration");
        return Redirect::to("/auth/login?success=Conta+criada.+Entre+com+sua+senha.")
            .into_response();
    }

    tracing::info!(customer_id = %customer.id, "customer registered");
    Redirect::to(&next).into_response()
}

// =============================================================================
// Logout
// =============================================================================

/// Handle logout. The cart stays in the session.
pub async fn logout(session: Session) -> Response {
    if let Err(e) = clear_current_customer(&session).await {
        tracing::error!(error = %e, "failed to clear session");
    }
    clear_sentry_user();

    Redirect::to("/").into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_form_path_keeps_next() {
        assert_eq!(form_path("/auth/login", "/"), "/auth/login");
        assert_eq!(
            form_path("/auth/login", "/checkout"),
            "/auth/login?next=%2Fcheckout"
        );
    }

    #[test]
    fn test_auth_messages_hide_internals() {
        let message = auth_message(&AuthError::PasswordHash);
        assert!(!message.contains("hash"));
        assert_eq!(
            auth_message(&AuthError::InvalidCredentials),
            "E-mail ou senha incorretos."
        );
    }

    #[test]
    fn test_login_form_next_is_optional() {
        let form: LoginForm = serde_json::from_value(serde_json::json!({
            "email": "a@b.com",
            "password": "segredo123",
        }))
        .unwrap();
        assert_eq!(form.next, None);
    }
}
