//! NFC-e emission through the configured fiscal provider.
//!
//! The provider takes one JSON document per receipt at `{api_url}/nfce`
//! and answers synchronously with the SEFAZ outcome. Cancellation goes to
//! `{api_url}/nfce/{access_key}/cancelamento`.

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use pizzaria_core::{FiscalEnvironment, FiscalReceiptStatus, Money, OrderId, OrderStatus, PaymentMethod};

use crate::db::fiscal::{FiscalConfig, FiscalReceipt};
use crate::db::orders::Ticket;
use crate::db::{FiscalRepository, OrderRepository, RepositoryError};

/// Minimum length SEFAZ accepts for a cancellation reason.
pub const MIN_CANCEL_REASON: usize = 15;

/// Errors that can occur when emitting or cancelling a receipt.
#[derive(Debug, Error)]
pub enum FiscalError {
    /// Emission is switched off in settings.
    #[error("emissão de NFC-e desativada")]
    Disabled,

    /// Enabled but the URL or token is missing.
    #[error("API fiscal não configurada")]
    NotConfigured,

    /// The order does not exist.
    #[error("pedido #{0} não encontrado")]
    OrderNotFound(OrderId),

    /// Only finished orders get a receipt.
    #[error("só pedidos finalizados podem ter NFC-e")]
    OrderNotFinished,

    /// Another emission for the same order is in flight.
    #[error("emissão em andamento para este pedido")]
    InProgress,

    /// Cancellation needs an authorized receipt.
    #[error("nenhuma NFC-e autorizada para este pedido")]
    NotAuthorized,

    /// Cancellation reason too short.
    #[error("justificativa deve ter pelo menos {MIN_CANCEL_REASON} caracteres")]
    ReasonTooShort,

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

#[derive(Debug, Serialize)]
struct ReceiptRequest<'a> {
    referencia: String,
    ambiente: FiscalEnvironment,
    cliente: &'a str,
    forma_pagamento: &'static str,
    itens: Vec<ReceiptItem>,
    valor_produtos: Money,
    valor_frete: Money,
    valor_desconto: Money,
    valor_total: Money,
}

#[derive(Debug, Serialize)]
struct ReceiptItem {
    descricao: String,
    quantidade: i32,
    valor_unitario: Money,
    valor_total: Money,
}

#[derive(Debug, Deserialize)]
struct ReceiptResponse {
    status: String,
    chave: Option<String>,
    numero: Option<String>,
    serie: Option<String>,
    mensagem: Option<String>,
}

#[derive(Debug, Serialize)]
struct CancelRequest<'a> {
    justificativa: &'a str,
}

/// SEFAZ payment codes (tPag).
const fn payment_code(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Cash => "01",
        PaymentMethod::CreditCard => "03",
        PaymentMethod::DebitCard => "04",
        PaymentMethod::MealVoucher => "11",
        PaymentMethod::Pix => "17",
    }
}

fn receipt_request(ticket: &Ticket, environment: FiscalEnvironment) -> ReceiptRequest<'_> {
    let order = &ticket.order;
    ReceiptRequest {
        referencia: format!("pedido-{}", order.id),
        ambiente: environment,
        cliente: &order.customer_name,
        forma_pagamento: payment_code(order.payment_method),
        itens: ticket
            .items
            .iter()
            .map(|line| ReceiptItem {
                descricao: line.title(),
                quantidade: line.quantity,
                valor_unitario: line.unit_price,
                valor_total: line.line_total,
            })
            .collect(),
        valor_produtos: order.subtotal,
        valor_frete: order.delivery_fee,
        valor_desconto: order.discount,
        valor_total: order.total,
    }
}

/// Emits and cancels NFC-e receipts.
pub struct FiscalService<'a> {
    receipts: FiscalRepository<'a>,
    orders: OrderRepository<'a>,
    http: &'a reqwest::Client,
}

impl<'a> FiscalService<'a> {
    /// Create a fiscal service using the shared HTTP client.
    #[must_use]
    pub const fn new(pool: &'a PgPool, http: &'a reqwest::Client) -> Self {
        Self {
            receipts: FiscalRepository::new(pool),
            orders: OrderRepository::new(pool),
            http,
        }
    }

    /// Emit the receipt of a finished order.
    ///
    /// Idempotent: an order that already has an authorized (or cancelled)
    /// receipt gets that receipt back without calling the provider. A
    /// provider rejection is stored and returned as a `rejeitada` receipt;
    /// the order can be emitted again later.
    ///
    /// # Errors
    ///
    /// Returns `FiscalError::InProgress` while another emission holds the
    /// order, `FiscalError::Http`/`Api` on transport failures (the receipt
    /// is left `rejeitada` so it can be retried), and the configuration and
    /// order-state errors.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn emit(&self, order_id: OrderId) -> Result<FiscalReceipt, FiscalError> {
        let config = self.receipts.config().await?;
        let (url, token) = endpoint(&config)?;

        let ticket = self
            .orders
            .ticket(order_id)
            .await?
            .ok_or(FiscalError::OrderNotFound(order_id))?;
        if ticket.order.status != OrderStatus::Finished {
            return Err(FiscalError::OrderNotFinished);
        }

        if self.receipts.claim(order_id, config.environment).await?.is_none() {
            return match self.receipts.receipt_for(order_id).await? {
                Some(existing)
                    if matches!(
                        existing.status,
                        FiscalReceiptStatus::Authorized | FiscalReceiptStatus::Cancelled
                    ) =>
                {
                    Ok(existing)
                }
                _ => Err(FiscalError::InProgress),
            };
        }

        let body = receipt_request(&ticket, config.environment);
        let outcome: Result<ReceiptResponse, FiscalError> = async {
            let response = self
                .http
                .post(format!("{}/nfce", url.trim_end_matches('/')))
                .bearer_auth(token)
                .json(&body)
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(FiscalError::Api {
                    status: status.as_u16(),
                    message,
                });
            }
            Ok(response.json::<ReceiptResponse>().await?)
        }
        .await;

        match outcome {
            Ok(ReceiptResponse {
                status,
                chave: Some(access_key),
                numero,
                serie,
                ..
            }) if status == FiscalReceiptStatus::Authorized.as_str() => {
                tracing::info!(access_key = %access_key, "NFC-e authorized");
                Ok(self
                    .receipts
                    .authorize(order_id, &access_key, numero.as_deref(), serie.as_deref())
                    .await?)
            }
            Ok(response) => {
                let reason = response
                    .mensagem
                    .unwrap_or_else(|| format!("status {}", response.status));
                tracing::warn!(reason = %reason, "NFC-e rejected");
                Ok(self.receipts.reject(order_id, &reason).await?)
            }
            Err(e) => {
                tracing::warn!(error = %e, "NFC-e emission failed");
                self.receipts.reject(order_id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    /// Cancel an authorized receipt with the provider.
    ///
    /// # Errors
    ///
    /// Returns `FiscalError::NotAuthorized` if there is no authorized
    /// receipt, `FiscalError::ReasonTooShort` for a short justification, and
    /// `FiscalError::Http`/`Api` if the provider refuses.
    #[instrument(skip(self, reason), fields(order_id = %order_id))]
    pub async fn cancel(&self, order_id: OrderId, reason: &str) -> Result<FiscalReceipt, FiscalError> {
        let reason = reason.trim();
        if reason.chars().count() < MIN_CANCEL_REASON {
            return Err(FiscalError::ReasonTooShort);
        }

        let config = self.receipts.config().await?;
        let (url, token) = endpoint(&config)?;

        let receipt = self
            .receipts
            .receipt_for(order_id)
            .await?
            .filter(|r| r.status == FiscalReceiptStatus::Authorized)
            .ok_or(FiscalError::NotAuthorized)?;
        let access_key = receipt.access_key.ok_or(FiscalError::NotAuthorized)?;

        let response = self
            .http
            .post(format!(
                "{}/nfce/{access_key}/cancelamento",
                url.trim_end_matches('/')
            ))
            .bearer_auth(token)
            .json(&CancelRequest {
                justificativa: reason,
            })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(FiscalError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let cancelled = self.receipts.mark_cancelled(order_id).await.map_err(|e| match e {
            RepositoryError::Conflict(_) => FiscalError::NotAuthorized,
            other => FiscalError::Repository(other),
        })?;
        Ok(cancelled)
    }
}

fn endpoint(config: &FiscalConfig) -> Result<(&str, &str), FiscalError> {
    if !config.enabled {
        return Err(FiscalError::Disabled);
    }
    match (config.api_url.as_deref(), config.api_token.as_ref()) {
        (Some(url), Some(token)) if !url.is_empty() => Ok((url, token.expose_secret())),
        _ => Err(FiscalError::NotConfigured),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use secrecy::SecretString;

    use pizzaria_core::Fulfillment;
    use pizzaria_core::order::OrderLine;

    use crate::db::orders::TicketOrder;

    use super::*;

    fn ticket() -> Ticket {
        Ticket {
            order: TicketOrder {
                id: OrderId::new(31),
                status: OrderStatus::Finished,
                customer_name: "João".to_string(),
                customer_phone: "11987654321".to_string(),
                fulfillment: Fulfillment::Delivery,
                payment_method: PaymentMethod::Pix,
                address_text: Some("Rua A, 10".to_string()),
                subtotal: Money::from_cents(8000),
                delivery_fee: Money::from_cents(700),
                discount: Money::from_cents(1000),
                total: Money::from_cents(7700),
                change_for: None,
                notes: None,
                created_at: Utc::now(),
            },
            items: vec![OrderLine {
                order_id: OrderId::new(31),
                product_name: "Calabresa".to_string(),
                size: "Grande".to_string(),
                flavors: Vec::new(),
                add_ons: Vec::new(),
                stuffed_crust: None,
                quantity: 2,
                unit_price: Money::from_cents(4000),
                line_total: Money::from_cents(8000),
                notes: None,
            }],
            history: Vec::new(),
        }
    }

    #[test]
    fn test_request_carries_totals_and_items() {
        let ticket = ticket();
        let body = receipt_request(&ticket, FiscalEnvironment::Homologation);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["referencia"], "pedido-31");
        assert_eq!(json["ambiente"], "homologacao");
        assert_eq!(json["forma_pagamento"], "17");
        assert_eq!(json["itens"].as_array().unwrap().len(), 1);
        assert_eq!(json["itens"][0]["quantidade"], 2);
    }

    #[test]
    fn test_endpoint_requires_enabled_and_complete_config() {
        let mut config = FiscalConfig::default();
        assert!(matches!(endpoint(&config), Err(FiscalError::Disabled)));

        config.enabled = true;
        assert!(matches!(endpoint(&config), Err(FiscalError::NotConfigured)));

        config.api_url = Some("https://nfce.example.com/v2".to_string());
        config.api_token = Some(SecretString::from("token"));
        let (url, token) = endpoint(&config).unwrap();
        assert_eq!(url, "https://nfce.example.com/v2");
        assert_eq!(token, "token");
    }

    #[test]
    fn test_provider_response_parses() {
        let response: ReceiptResponse = serde_json::from_str(
            r#"{"status":"autorizada","chave":"35240512345678000199650010000000011000000010","numero":"1","serie":"1"}"#,
        )
        .unwrap();
        assert_eq!(response.status, "autorizada");
        assert!(response.mensagem.is_none());
    }
}
