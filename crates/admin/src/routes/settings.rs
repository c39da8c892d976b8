//! Settings: delivery zones and provider configuration.
//!
//! Provider tokens are write-only. Reads report whether one is stored; a
//! save with a blank token keeps the stored one.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use pizzaria_core::delivery::DeliveryFeeZone;
use pizzaria_core::{DeliveryZoneId, FiscalEnvironment, OrderStatus};

use crate::db::delivery_zones::ZoneInput;
use crate::db::fiscal::FiscalConfig;
use crate::db::notifications::NotificationConfig;
use crate::db::{DeliveryZoneRepository, FiscalRepository, NotificationRepository};
use crate::error::{AppError, Result};
use crate::middleware::{RequireAdminAuth, RequireManager};
use crate::state::AppState;

// =============================================================================
// Provider settings
// =============================================================================

/// Fiscal provider settings as shown to operators.
#[derive(Debug, Serialize)]
pub struct FiscalSettings {
    pub enabled: bool,
    pub api_url: Option<String>,
    pub has_token: bool,
    pub environment: FiscalEnvironment,
}

impl From<FiscalConfig> for FiscalSettings {
    fn from(config: FiscalConfig) -> Self {
        Self {
            enabled: config.enabled,
            api_url: config.api_url,
            has_token: config.api_token.is_some(),
            environment: config.environment,
        }
    }
}

/// Body of a fiscal settings save.
#[derive(Debug, Deserialize)]
pub struct FiscalSettingsForm {
    pub enabled: bool,
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    pub environment: FiscalEnvironment,
}

/// WhatsApp settings as shown to operators.
#[derive(Debug, Serialize)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub api_url: Option<String>,
    pub has_token: bool,
    pub notify_statuses: Vec<OrderStatus>,
}

impl From<NotificationConfig> for NotificationSettings {
    fn from(config: NotificationConfig) -> Self {
        Self {
            enabled: config.enabled,
            api_url: config.api_url,
            has_token: config.api_token.is_some(),
            notify_statuses: config.notify_statuses,
        }
    }
}

/// Body of a WhatsApp settings save.
#[derive(Debug, Deserialize)]
pub struct NotificationSettingsForm {
    pub enabled: bool,
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    #[serde(default)]
    pub notify_statuses: Vec<OrderStatus>,
}

fn blank_to_none(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Normalize a provider URL: blank means unset, anything else must be an
/// absolute http(s) URL. Trailing slashes are dropped so paths can be
/// appended.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for malformed URLs.
pub fn provider_url(value: Option<&str>) -> Result<Option<String>> {
    let Some(raw) = blank_to_none(value) else {
        return Ok(None);
    };
    let parsed = url::Url::parse(raw)
        .map_err(|_| AppError::BadRequest(format!("URL inválida: {raw}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::BadRequest("URL deve usar http ou https".to_string()));
    }
    Ok(Some(raw.trim_end_matches('/').to_string()))
}

/// Current fiscal provider settings.
pub async fn fiscal(
    State(state): State<AppState>,
    RequireManager(_admin): RequireManager,
) -> Result<Json<FiscalSettings>> {
    let config = FiscalRepository::new(state.pool()).config().await?;
    Ok(Json(config.into()))
}

/// Save fiscal provider settings.
#[instrument(skip(state, admin, form), fields(admin_id = %admin.id))]
pub async fn save_fiscal(
    State(state): State<AppState>,
    RequireManager(admin): RequireManager,
    Json(form): Json<FiscalSettingsForm>,
) -> Result<Json<FiscalSettings>> {
    let api_url = provider_url(form.api_url.as_deref())?;
    if form.enabled && api_url.is_none() {
        return Err(AppError::BadRequest(
            "informe a URL da API fiscal para ativar a emissão".to_string(),
        ));
    }

    let repo = FiscalRepository::new(state.pool());
    repo.save_config(
        form.enabled,
        api_url.as_deref(),
        blank_to_none(form.api_token.as_deref()),
        form.environment,
    )
    .await?;
    tracing::info!(enabled = form.enabled, environment = %form.environment, "fiscal settings saved");
    Ok(Json(repo.config().await?.into()))
}

/// Current WhatsApp settings.
pub async fn notifications(
    State(state): State<AppState>,
    RequireManager(_admin): RequireManager,
) -> Result<Json<NotificationSettings>> {
    let config = NotificationRepository::new(state.pool()).config().await?;
    Ok(Json(config.into()))
}

/// Save WhatsApp settings.
#[instrument(skip(state, admin, form), fields(admin_id = %admin.id))]
pub async fn save_notifications(
    State(state): State<AppState>,
    RequireManager(admin): RequireManager,
    Json(mut form): Json<NotificationSettingsForm>,
) -> Result<Json<NotificationSettings>> {
    let api_url = provider_url(form.api_url.as_deref())?;
    if form.enabled && api_url.is_none() {
        return Err(AppError::BadRequest(
            "informe a URL da API do WhatsApp para ativar as notificações".to_string(),
        ));
    }
    form.notify_statuses.sort_by_key(|s| s.as_str());
    form.notify_statuses.dedup();

    let repo = NotificationRepository::new(state.pool());
    repo.save_config(
        form.enabled,
        api_url.as_deref(),
        blank_to_none(form.api_token.as_deref()),
        &form.notify_statuses,
    )
    .await?;
    tracing::info!(enabled = form.enabled, "notification settings saved");
    Ok(Json(repo.config().await?.into()))
}

// =============================================================================
// Delivery zones
// =============================================================================

fn check_zone(input: &ZoneInput) -> Result<()> {
    if input.name.trim().is_empty() {
        return Err(AppError::BadRequest("informe o nome da zona".to_string()));
    }
    input.validate()?;
    if input.fee.is_negative()
        || input.min_order.is_some_and(|m| m.is_negative())
        || input.free_above.is_some_and(|m| m.is_negative())
    {
        return Err(AppError::BadRequest("valores não podem ser negativos".to_string()));
    }
    if input.estimated_minutes <= 0 {
        return Err(AppError::BadRequest(
            "tempo estimado deve ser maior que zero".to_string(),
        ));
    }
    Ok(())
}

/// All delivery zones.
pub async fn zones(
    State(state): State<AppState>,
    RequireAdminAuth(_admin): RequireAdminAuth,
) -> Result<Json<Vec<DeliveryFeeZone>>> {
    Ok(Json(DeliveryZoneRepository::new(state.pool()).list().await?))
}

/// Add a zone.
pub async fn create_zone(
    State(state): State<AppState>,
    RequireManager(_admin): RequireManager,
    Json(input): Json<ZoneInput>,
) -> Result<(StatusCode, Json<DeliveryFeeZone>)> {
    check_zone(&input)?;
    let zone = DeliveryZoneRepository::new(state.pool()).create(&input).await?;
    Ok((StatusCode::CREATED, Json(zone)))
}

/// Replace a zone.
pub async fn update_zone(
    State(state): State<AppState>,
    RequireManager(_admin): RequireManager,
    Path(id): Path<DeliveryZoneId>,
    Json(input): Json<ZoneInput>,
) -> Result<Json<DeliveryFeeZone>> {
    check_zone(&input)?;
    let zone = DeliveryZoneRepository::new(state.pool())
        .update(id, &input)
        .await?;
    Ok(Json(zone))
}

/// Remove a zone.
pub async fn delete_zone(
    State(state): State<AppState>,
    RequireManager(_admin): RequireManager,
    Path(id): Path<DeliveryZoneId>,
) -> Result<StatusCode> {
    DeliveryZoneRepository::new(state.pool()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pizzaria_core::Money;
    use secrecy::SecretString;

    use super::*;

    #[test]
    fn test_provider_url_normalization() {
        assert_eq!(provider_url(None).unwrap(), None);
        assert_eq!(provider_url(Some("  ")).unwrap(), None);
        assert_eq!(
            provider_url(Some("https://api.example.com/v2/")).unwrap().as_deref(),
            Some("https://api.example.com/v2")
        );
        assert!(provider_url(Some("ftp://example.com")).is_err());
        assert!(provider_url(Some("not a url")).is_err());
    }

    #[test]
    fn test_settings_never_expose_the_token() {
        let config = FiscalConfig {
            enabled: true,
            api_url: Some("https://nfce.example.com".to_string()),
            api_token: Some(SecretString::from("s3cr3t-token")),
            environment: FiscalEnvironment::Production,
        };
        let json = serde_json::to_string(&FiscalSettings::from(config)).unwrap();
        assert!(json.contains("\"has_token\":true"));
        assert!(!json.contains("s3cr3t"));
    }

    #[test]
    fn test_zone_form_rejects_reversed_range() {
        let input: ZoneInput = serde_json::from_str(
            r#"{"name":"Centro","cep_start":"01399-999","cep_end":"01000-000","fee":"5.00",
                "min_order":null,"free_above":null,"estimated_minutes":40,"active":true}"#,
        )
        .unwrap();
        assert!(matches!(check_zone(&input), Err(AppError::DeliveryFee(_))));
    }

    #[test]
    fn test_zone_form_accepts_valid_zone() {
        let input = ZoneInput {
            name: "Centro".to_string(),
            cep_start: "01000-000".parse().unwrap(),
            cep_end: "01399-999".parse().unwrap(),
            fee: Money::from_cents(500),
            min_order: Some(Money::from_cents(3000)),
            free_above: None,
            estimated_minutes: 40,
            active: true,
        };
        assert!(check_zone(&input).is_ok());

        let mut slow = input;
        slow.estimated_minutes = 0;
        assert!(matches!(check_zone(&slow), Err(AppError::BadRequest(_))));
    }
}
