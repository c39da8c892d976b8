//! Loyalty program: points earned per order and reward redemption.

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::{Money, RewardId};

/// Errors raised by loyalty operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LoyaltyError {
    /// The program is switched off.
    #[error("programa de fidelidade desativado")]
    Disabled,
    /// Not enough points for the reward.
    #[error("saldo insuficiente: {balance} pontos, necessário {cost}")]
    InsufficientPoints {
        /// Customer balance.
        balance: i32,
        /// Reward cost.
        cost: i32,
    },
    /// Reward is no longer offered.
    #[error("recompensa indisponível")]
    RewardInactive,
    /// Invalid configuration value.
    #[error("configuração inválida: {0}")]
    InvalidConfig(&'static str),
}

/// Program settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct LoyaltyConfig {
    /// Whether points are earned and rewards redeemable.
    pub enabled: bool,
    /// Points earned per real spent.
    pub points_per_real: Decimal,
    /// Orders below this total earn nothing.
    pub min_order_value: Money,
    /// A balance with no point movement for this many days expires.
    pub points_expiry_days: Option<i32>,
}

impl Default for LoyaltyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            points_per_real: Decimal::ONE,
            min_order_value: Money::ZERO,
            points_expiry_days: None,
        }
    }
}

impl LoyaltyConfig {
    /// Points earned by an order with this total:
    /// `floor(total × points_per_real)` when enabled and above the minimum.
    #[must_use]
    pub fn points_for(&self, order_total: Money) -> i32 {
        if !self.enabled || order_total < self.min_order_value || order_total.is_negative() {
            return 0;
        }
        (order_total.amount() * self.points_per_real)
            .floor()
            .to_i32()
            .unwrap_or(i32::MAX)
    }

    /// Balances whose last movement is older than this expire. `None`
    /// when the program is off or points never expire.
    #[must_use]
    pub fn expiry_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.enabled {
            return None;
        }
        let days = self.points_expiry_days.filter(|d| *d > 0)?;
        Some(now - TimeDelta::days(i64::from(days)))
    }

    /// Check settings before saving.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::InvalidConfig`] naming the bad field.
    pub fn validate(&self) -> Result<(), LoyaltyError> {
        if self.points_per_real.is_sign_negative() {
            return Err(LoyaltyError::InvalidConfig("pontos por real"));
        }
        if self.min_order_value.is_negative() {
            return Err(LoyaltyError::InvalidConfig("pedido mínimo"));
        }
        if self.points_expiry_days.is_some_and(|d| d <= 0) {
            return Err(LoyaltyError::InvalidConfig("validade dos pontos"));
        }
        Ok(())
    }
}

/// Reward offered in exchange for points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Reward {
    /// Reward id.
    pub id: RewardId,
    /// Display name.
    pub name: String,
    /// Description shown to customers.
    pub description: Option<String>,
    /// Points needed.
    pub points_cost: i32,
    /// Amount taken off the order total when redeemed at checkout.
    pub discount: Money,
    /// Whether it can be redeemed.
    pub active: bool,
}

/// Balance after redeeming `reward`.
///
/// # Errors
///
/// Returns [`LoyaltyError`] if the program is off, the reward is inactive
/// or the balance is too low.
pub fn redeem(config: &LoyaltyConfig, balance: i32, reward: &Reward) -> Result<i32, LoyaltyError> {
    if !config.enabled {
        return Err(LoyaltyError::Disabled);
    }
    if !reward.active {
        return Err(LoyaltyError::RewardInactive);
    }
    if balance < reward.points_cost {
        return Err(LoyaltyError::InsufficientPoints {
            balance,
            cost: reward.points_cost,
        });
    }
    Ok(balance - reward.points_cost)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> LoyaltyConfig {
        LoyaltyConfig {
            enabled: true,
            points_per_real: Decimal::new(15, 1),
            min_order_value: Money::from_cents(3000),
            points_expiry_days: Some(180),
        }
    }

    fn reward(cost: i32) -> Reward {
        Reward {
            id: RewardId::new(1),
            name: "Refrigerante 2L".to_owned(),
            description: None,
            points_cost: cost,
            discount: Money::from_cents(1000),
            active: true,
        }
    }

    #[test]
    fn test_points_are_floored() {
        // 45.99 * 1.5 = 68.985
        assert_eq!(config().points_for(Money::from_cents(4599)), 68);
        assert_eq!(config().points_for(Money::from_cents(3000)), 45);
    }

    #[test]
    fn test_no_points_below_minimum_or_disabled() {
        assert_eq!(config().points_for(Money::from_cents(2999)), 0);
        let off = LoyaltyConfig {
            enabled: false,
            ..config()
        };
        assert_eq!(off.points_for(Money::from_cents(10_000)), 0);
    }

    #[test]
    fn test_redeem() {
        assert_eq!(redeem(&config(), 120, &reward(100)), Ok(20));
        assert_eq!(
            redeem(&config(), 50, &reward(100)),
            Err(LoyaltyError::InsufficientPoints {
                balance: 50,
                cost: 100
            })
        );
        let mut inactive = reward(10);
        inactive.active = false;
        assert_eq!(redeem(&config(), 50, &inactive), Err(LoyaltyError::RewardInactive));
        assert_eq!(
            redeem(&LoyaltyConfig::default(), 500, &reward(10)),
            Err(LoyaltyError::Disabled)
        );
    }

    #[test]
    fn test_validate_config() {
        assert!(config().validate().is_ok());
        let bad = LoyaltyConfig {
            points_expiry_days: Some(0),
            ..config()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_expiry_cutoff() {
        let now = Utc::now();
        assert_eq!(
            config().expiry_cutoff(now),
            Some(now - TimeDelta::days(180))
        );

        let never = LoyaltyConfig {
            points_expiry_days: None,
            ..config()
        };
        assert_eq!(never.expiry_cutoff(now), None);

        let off = LoyaltyConfig {
            enabled: false,
            ..config()
        };
        assert_eq!(off.expiry_cutoff(now), None);
    }
}
