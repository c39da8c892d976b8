//! Authentication extractors for the back office.
//!
//! Page requests without a session are redirected to the login form; API
//! requests (`/api/...`) get a bare 401 so the board script can react.

use axum::{
    extract::{FromRequestParts, OriginalUri},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::models::{CurrentAdmin, session_keys};

/// Extractor that requires a signed-in operator.
pub struct RequireAdminAuth(pub CurrentAdmin);

/// Rejection for the auth extractors.
#[derive(Debug, PartialEq, Eq)]
pub enum AdminAuthRejection {
    /// Redirect to login page (for page requests).
    RedirectToLogin,
    /// Unauthorized response (for API requests).
    Unauthorized,
    /// Signed in, but the role cannot do this.
    Forbidden,
}

impl IntoResponse for AdminAuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to("/auth/login").into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                "Apenas gerentes e donos podem acessar este recurso",
            )
                .into_response(),
        }
    }
}

fn missing_session(parts: &Parts) -> AdminAuthRejection {
    // Nested routers see the path without their prefix.
    let path = parts
        .extensions
        .get::<OriginalUri>()
        .map_or_else(|| parts.uri.path(), |uri| uri.0.path());
    if path.starts_with("/api/") {
        AdminAuthRejection::Unauthorized
    } else {
        AdminAuthRejection::RedirectToLogin
    }
}

async fn current_admin(parts: &Parts) -> Option<CurrentAdmin> {
    let session = parts.extensions.get::<Session>()?;
    session
        .get::<CurrentAdmin>(session_keys::CURRENT_ADMIN)
        .await
        .ok()
        .flatten()
}

impl<S> FromRequestParts<S> for RequireAdminAuth
where
    S: Send + Sync,
{
    type Rejection = AdminAuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let admin = current_admin(parts)
            .await
            .ok_or_else(|| missing_session(parts))?;
        Ok(Self(admin))
    }
}

/// Extractor that optionally gets the current operator.
pub struct OptionalAdminAuth(pub Option<CurrentAdmin>);

impl<S> FromRequestParts<S> for OptionalAdminAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(current_admin(parts).await))
    }
}

/// Extractor that requires a manager or owner: settings, reports, cash
/// closing and fiscal cancellation.
pub struct RequireManager(pub CurrentAdmin);

impl<S> FromRequestParts<S> for RequireManager
where
    S: Send + Sync,
{
    type Rejection = AdminAuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let admin = current_admin(parts)
            .await
            .ok_or_else(|| missing_session(parts))?;
        if !admin.role.can_manage() {
            return Err(AdminAuthRejection::Forbidden);
        }
        Ok(Self(admin))
    }
}

/// Store the signed-in operator in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_admin(
    session: &Session,
    admin: &CurrentAdmin,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::CURRENT_ADMIN, admin).await
}

/// Clear the operator from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_admin(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CurrentAdmin>(session_keys::CURRENT_ADMIN)
        .await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(path: &str) -> Parts {
        Request::builder().uri(path).body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_missing_session_on_page_redirects() {
        let mut parts = parts("/kanban");
        let rejection = RequireAdminAuth::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert_eq!(rejection, AdminAuthRejection::RedirectToLogin);
    }

    #[tokio::test]
    async fn test_missing_session_on_api_is_unauthorized() {
        let mut parts = parts("/api/orders/1/move");
        let rejection = RequireManager::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert_eq!(rejection, AdminAuthRejection::Unauthorized);
        assert_eq!(
            rejection.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_nested_api_route_is_unauthorized() {
        let mut parts = parts("/board");
        parts
            .extensions
            .insert(OriginalUri("/api/board".parse().unwrap()));
        let rejection = RequireAdminAuth::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert_eq!(rejection, AdminAuthRejection::Unauthorized);
    }

    #[tokio::test]
    async fn test_optional_auth_without_session_is_none() {
        let mut parts = parts("/auth/login");
        let OptionalAdminAuth(admin) = OptionalAdminAuth::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert!(admin.is_none());
    }
}
