//! WhatsApp status notifications.
//!
//! The provider endpoint and token live in `notification_config`. A message
//! is `POST`ed as JSON with a bearer token:
//!
//! ```json
//! { "phone": "5511987654321", "message": "..." }
//! ```
//!
//! Every attempt, successful or not, is appended to `notification_history`.

use secrecy::ExposeSecret;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use pizzaria_core::{NotificationStatus, OrderId, OrderStatus, Phone};

use crate::db::notifications::{NotificationConfig, NotificationRecord};
use crate::db::orders::OrderContact;
use crate::db::{NotificationRepository, RepositoryError};

/// Errors that can occur when sending a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Notifications are enabled but the URL or token is missing.
    #[error("WhatsApp API not configured")]
    NotConfigured,

    /// The stored customer phone does not parse.
    #[error("invalid customer phone")]
    InvalidPhone,

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Serialize)]
struct OutgoingMessage<'a> {
    phone: &'a str,
    message: &'a str,
}

/// Customer-facing text for an order reaching `status`.
#[must_use]
pub fn status_message(store_name: &str, order_id: OrderId, customer_name: &str, status: OrderStatus) -> String {
    let first_name = customer_name.split_whitespace().next().unwrap_or(customer_name);
    match status {
        OrderStatus::Pending => format!(
            "Olá, {first_name}! Recebemos seu pedido #{order_id} na {store_name}. Já já ele entra em preparo."
        ),
        OrderStatus::Preparing => format!(
            "Olá, {first_name}! Seu pedido #{order_id} está sendo preparado. 🍕"
        ),
        OrderStatus::OutForDelivery => format!(
            "Olá, {first_name}! Seu pedido #{order_id} saiu para entrega e logo chega até você."
        ),
        OrderStatus::Finished => format!(
            "Pedido #{order_id} finalizado. Obrigado pela preferência, {first_name}! Equipe {store_name}."
        ),
        OrderStatus::Cancelled => format!(
            "Olá, {first_name}. Seu pedido #{order_id} foi cancelado. Em caso de dúvida, fale com a {store_name}."
        ),
    }
}

/// Sends WhatsApp messages and keeps the history.
pub struct Notifier<'a> {
    history: NotificationRepository<'a>,
    http: &'a reqwest::Client,
    store_name: &'a str,
}

impl<'a> Notifier<'a> {
    /// Create a notifier using the shared HTTP client.
    #[must_use]
    pub const fn new(pool: &'a PgPool, http: &'a reqwest::Client, store_name: &'a str) -> Self {
        Self {
            history: NotificationRepository::new(pool),
            http,
            store_name,
        }
    }

    /// Tell the customer their order reached `status`, if that status is
    /// configured to notify. Returns the history row, or `None` when nothing
    /// was due.
    ///
    /// Provider failures are recorded as `falhou` rows, not returned.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::Repository` if the config cannot be read
    /// or the history row cannot be written.
    #[instrument(skip(self, order), fields(order_id = %order.id, status = %status))]
    pub async fn order_status(
        &self,
        order: &OrderContact,
        status: OrderStatus,
    ) -> Result<Option<NotificationRecord>, NotificationError> {
        let config = self.history.config().await?;
        if !config.notifies(status) {
            return Ok(None);
        }

        let message = status_message(self.store_name, order.id, &order.customer_name, status);
        let outcome = match order.phone() {
            Some(phone) => self.send(&config, &phone, &message).await,
            None => Err(NotificationError::InvalidPhone),
        };

        let record = self.record(Some(order.id), &order.customer_phone, &message, outcome).await?;
        Ok(Some(record))
    }

    /// Send a free-form test message, ignoring which statuses are enabled.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::Repository` if the history row cannot be
    /// written.
    #[instrument(skip(self, phone))]
    pub async fn test(&self, phone: &Phone) -> Result<NotificationRecord, NotificationError> {
        let config = self.history.config().await?;
        let message = format!("Mensagem de teste da {}.", self.store_name);
        let outcome = self.send(&config, phone, &message).await;
        self.record(None, &phone.to_string(), &message, outcome).await
    }

    async fn record(
        &self,
        order_id: Option<OrderId>,
        phone: &str,
        message: &str,
        outcome: Result<(), NotificationError>,
    ) -> Result<NotificationRecord, NotificationError> {
        let (status, error) = match outcome {
            Ok(()) => (NotificationStatus::Sent, None),
            Err(e) => {
                tracing::warn!(error = %e, "WhatsApp message not delivered");
                (NotificationStatus::Failed, Some(e.to_string()))
            }
        };
        let record = self
            .history
            .record(order_id, phone, message, status, error.as_deref())
            .await?;
        Ok(record)
    }

    async fn send(
        &self,
        config: &NotificationConfig,
        phone: &Phone,
        message: &str,
    ) -> Result<(), NotificationError> {
        let (Some(url), Some(token)) = (config.api_url.as_deref(), config.api_token.as_ref()) else {
            return Err(NotificationError::NotConfigured);
        };

        let number = phone.whatsapp_number();
        let response = self
            .http
            .post(url)
            .bearer_auth(token.expose_secret())
            .json(&OutgoingMessage {
                phone: &number,
                message,
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(NotificationError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_message_uses_first_name_and_order_number() {
        let text = status_message(
            "Pizzaria Bella",
            OrderId::new(42),
            "Maria da Silva",
            OrderStatus::OutForDelivery,
        );
        assert!(text.starts_with("Olá, Maria!"));
        assert!(text.contains("#42"));
        assert!(text.contains("saiu para entrega"));
    }

    #[test]
    fn test_every_status_has_a_message() {
        for &status in OrderStatus::ALL {
            let text = status_message("Bella", OrderId::new(1), "Ana", status);
            assert!(text.contains("#1"), "{status}: {text}");
        }
    }

    #[test]
    fn test_blank_name_does_not_panic() {
        let text = status_message("Bella", OrderId::new(7), "", OrderStatus::Finished);
        assert!(text.contains("#7"));
    }

    #[test]
    fn test_disabled_config_never_notifies() {
        let config = NotificationConfig::default();
        assert!(!config.notifies(OrderStatus::Finished));

        let enabled = NotificationConfig {
            enabled: true,
            ..NotificationConfig::default()
        };
        assert!(enabled.notifies(OrderStatus::Finished));
        assert!(!enabled.notifies(OrderStatus::Pending));
    }
}
