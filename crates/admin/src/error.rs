//! Unified error handling for the back office.
//!
//! Handlers return `Result<T, AppError>`. Server-side failures are captured
//! to Sentry before the response is built; clients only ever see the
//! public message.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use pizzaria_core::cash::CashError;
use pizzaria_core::delivery::DeliveryFeeError;
use pizzaria_core::kanban::TransitionError;
use pizzaria_core::loyalty::LoyaltyError;

use crate::db::RepositoryError;
use crate::services::{AuthError, FiscalError, MoveError, NotificationError};

/// Application-level error type for the back office.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Board move rejected.
    #[error("Move error: {0}")]
    Move(#[from] MoveError),

    /// Cash register rule violated.
    #[error("Cash error: {0}")]
    Cash(#[from] CashError),

    /// Loyalty settings or redemption rejected.
    #[error("Loyalty error: {0}")]
    Loyalty(#[from] LoyaltyError),

    /// Delivery zone rejected.
    #[error("Delivery zone error: {0}")]
    DeliveryFee(#[from] DeliveryFeeError),

    /// WhatsApp provider call failed.
    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    /// NFC-e provider call failed.
    #[error("Fiscal error: {0}")]
    Fiscal(#[from] FiscalError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operator is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Operator lacks permission.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        Self::Move(MoveError::Transition(err))
    }
}

const fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Conflict(_) => StatusCode::CONFLICT,
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(err) => repository_status(err),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::InvalidEmail(_)
                | AuthError::MissingName
                | AuthError::WeakPassword(_) => StatusCode::BAD_REQUEST,
                AuthError::Repository(_) | AuthError::PasswordHash => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Move(err) => match err {
                MoveError::Transition(TransitionError::NotFound(_)) => StatusCode::NOT_FOUND,
                MoveError::Transition(TransitionError::StatusMismatch { .. }) => {
                    StatusCode::CONFLICT
                }
                MoveError::Transition(_)
                | MoveError::PickupNotDeliverable
                | MoveError::CourierRequired => StatusCode::UNPROCESSABLE_ENTITY,
                MoveError::Repository(err) => repository_status(err),
            },
            Self::Cash(CashError::AlreadyOpen) => StatusCode::CONFLICT,
            Self::Cash(_) | Self::Loyalty(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::DeliveryFee(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Notification(err) => match err {
                NotificationError::Repository(err) => repository_status(err),
                NotificationError::NotConfigured | NotificationError::InvalidPhone => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                NotificationError::Http(_) | NotificationError::Api { .. } => {
                    StatusCode::BAD_GATEWAY
                }
            },
            Self::Fiscal(err) => match err {
                FiscalError::Repository(err) => repository_status(err),
                FiscalError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                FiscalError::InProgress => StatusCode::CONFLICT,
                FiscalError::Disabled
                | FiscalError::NotConfigured
                | FiscalError::OrderNotFinished
                | FiscalError::NotAuthorized
                | FiscalError::ReasonTooShort => StatusCode::UNPROCESSABLE_ENTITY,
                FiscalError::Http(_) | FiscalError::Api { .. } => StatusCode::BAD_GATEWAY,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the operator.
    #[must_use]
    pub fn public_message(&self) -> String {
        if self.status().is_server_error() {
            return "Erro interno do servidor".to_string();
        }
        match self {
            Self::Database(RepositoryError::NotFound)
            | Self::Move(MoveError::Repository(RepositoryError::NotFound)) => {
                "Não encontrado".to_string()
            }
            Self::Database(RepositoryError::Conflict(msg))
            | Self::Move(MoveError::Repository(RepositoryError::Conflict(msg))) => msg.clone(),
            Self::Auth(AuthError::InvalidCredentials) => "E-mail ou senha inválidos".to_string(),
            Self::Auth(AuthError::UserAlreadyExists) => {
                "Já existe um operador com este e-mail".to_string()
            }
            Self::Auth(AuthError::MissingName) => "Informe o nome".to_string(),
            Self::Auth(AuthError::InvalidEmail(e)) => e.to_string(),
            Self::Auth(AuthError::WeakPassword(msg)) | Self::BadRequest(msg) => msg.clone(),
            Self::Move(err) => err.to_string(),
            Self::Cash(err) => err.to_string(),
            Self::Loyalty(err) => err.to_string(),
            Self::DeliveryFee(err) => err.to_string(),
            Self::Fiscal(err) => err.to_string(),
            Self::Notification(NotificationError::NotConfigured) => {
                "API do WhatsApp não configurada".to_string()
            }
            Self::Notification(NotificationError::InvalidPhone) => {
                "Telefone do cliente inválido".to_string()
            }
            Self::Notification(_) => "Falha ao enviar mensagem pelo WhatsApp".to_string(),
            Self::NotFound(what) => format!("Não encontrado: {what}"),
            Self::Unauthorized(_) => "Faça login para continuar".to_string(),
            Self::Forbidden(_) => "Sem permissão para esta ação".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors and provider outages to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Admin request error"
            );
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for the signed-in operator.
pub fn set_sentry_user(admin_user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(admin_user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
mod tests {
    use pizzaria_core::{CashEntryKind, OrderId, OrderStatus};

    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("pedido 12".to_string());
        assert_eq!(err.to_string(), "Not found: pedido 12");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Forbidden("test".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::Cash(CashError::AlreadyOpen)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::Cash(CashError::CashOnly {
                kind: CashEntryKind::Withdrawal
            })),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            get_status(AppError::Fiscal(FiscalError::InProgress)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_move_errors_map_to_client_statuses() {
        assert_eq!(
            get_status(AppError::from(TransitionError::NotAllowed {
                from: OrderStatus::Finished,
                to: OrderStatus::Cancelled,
            })),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            get_status(AppError::from(TransitionError::NotFound(OrderId::new(3)))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Move(MoveError::Repository(RepositoryError::Conflict(
                "alterado".to_string()
            )))),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_public_messages() {
        let err = AppError::Move(MoveError::CourierRequired);
        assert_eq!(err.public_message(), "atribua um motoboy antes de enviar o pedido");

        let err = AppError::Move(MoveError::Repository(RepositoryError::Conflict(
            "recarregue o quadro".to_string(),
        )));
        assert_eq!(err.public_message(), "recarregue o quadro");

        let err = AppError::Internal("connection string postgres://...".to_string());
        assert_eq!(err.public_message(), "Erro interno do servidor");
    }
}
