//! Delivery fee zones keyed by CEP range.

use serde::{Deserialize, Serialize};

use crate::{Cep, DeliveryZoneId, Money};

/// Errors returned when quoting a delivery.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryFeeError {
    /// No active zone covers the CEP.
    #[error("não entregamos no CEP {0}")]
    NotCovered(Cep),
    /// The subtotal is below the zone minimum.
    #[error("pedido mínimo para esta região é {minimum}")]
    BelowMinimum {
        /// Zone minimum.
        minimum: Money,
        /// Cart subtotal.
        subtotal: Money,
    },
    /// A zone whose start CEP is after its end CEP.
    #[error("faixa de CEP inválida: {start} a {end}")]
    InvalidRange {
        /// First CEP.
        start: Cep,
        /// Last CEP.
        end: Cep,
    },
}

/// A delivery region covering an inclusive CEP range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct DeliveryFeeZone {
    /// Zone id.
    pub id: DeliveryZoneId,
    /// Neighbourhood or region name.
    pub name: String,
    /// First CEP in the range.
    pub cep_start: Cep,
    /// Last CEP in the range.
    pub cep_end: Cep,
    /// Fee charged for this zone.
    pub fee: Money,
    /// Minimum subtotal accepted, if any.
    pub min_order: Option<Money>,
    /// Subtotal from which delivery is free, if any.
    pub free_above: Option<Money>,
    /// Estimated delivery time shown at checkout.
    pub estimated_minutes: i32,
    /// Inactive zones are ignored by lookups.
    pub active: bool,
}

impl DeliveryFeeZone {
    /// Returns `true` if `cep` falls inside this zone's range.
    #[must_use]
    pub fn contains(&self, cep: &Cep) -> bool {
        (self.cep_start.as_u32()..=self.cep_end.as_u32()).contains(&cep.as_u32())
    }

    fn width(&self) -> u32 {
        self.cep_end.as_u32().saturating_sub(self.cep_start.as_u32())
    }

    /// Check that the range is well-formed.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryFeeError::InvalidRange`] if start is after end.
    pub fn validate(&self) -> Result<(), DeliveryFeeError> {
        if self.cep_start.as_u32() > self.cep_end.as_u32() {
            return Err(DeliveryFeeError::InvalidRange {
                start: self.cep_start.clone(),
                end: self.cep_end.clone(),
            });
        }
        Ok(())
    }

    /// Quote a delivery for a cart subtotal.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryFeeError::BelowMinimum`] when the subtotal does not
    /// reach the zone minimum.
    pub fn quote(&self, subtotal: Money) -> Result<DeliveryQuote, DeliveryFeeError> {
        if let Some(minimum) = self.min_order
            && subtotal < minimum
        {
            return Err(DeliveryFeeError::BelowMinimum { minimum, subtotal });
        }

        let free = self.free_above.is_some_and(|threshold| subtotal >= threshold);
        Ok(DeliveryQuote {
            zone_id: self.id,
            zone_name: self.name.clone(),
            fee: if free { Money::ZERO } else { self.fee },
            free,
            estimated_minutes: self.estimated_minutes,
        })
    }
}

/// Fee and estimate for a specific cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryQuote {
    /// Zone the quote came from.
    pub zone_id: DeliveryZoneId,
    /// Zone name.
    pub zone_name: String,
    /// Fee to charge.
    pub fee: Money,
    /// Whether the free-delivery threshold applied.
    pub free: bool,
    /// Estimated delivery time.
    pub estimated_minutes: i32,
}

/// Find the active zone covering `cep`. When ranges overlap the narrowest
/// one wins.
#[must_use]
pub fn find_zone<'a>(zones: &'a [DeliveryFeeZone], cep: &Cep) -> Option<&'a DeliveryFeeZone> {
    zones
        .iter()
        .filter(|z| z.active && z.contains(cep))
        .min_by_key(|z| (z.width(), z.id))
}

/// Look up the zone for `cep` and quote it.
///
/// # Errors
///
/// Returns [`DeliveryFeeError::NotCovered`] or
/// [`DeliveryFeeError::BelowMinimum`].
pub fn quote(
    zones: &[DeliveryFeeZone],
    cep: &Cep,
    subtotal: Money,
) -> Result<DeliveryQuote, DeliveryFeeError> {
    find_zone(zones, cep)
        .ok_or_else(|| DeliveryFeeError::NotCovered(cep.clone()))?
        .quote(subtotal)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn zone(id: i32, start: &str, end: &str, fee: i64) -> DeliveryFeeZone {
        DeliveryFeeZone {
            id: DeliveryZoneId::new(id),
            name: format!("Zona {id}"),
            cep_start: Cep::parse(start).unwrap(),
            cep_end: Cep::parse(end).unwrap(),
            fee: Money::from_cents(fee),
            min_order: None,
            free_above: None,
            estimated_minutes: 40,
            active: true,
        }
    }

    #[test]
    fn test_find_zone_prefers_narrowest() {
        let zones = [
            zone(1, "01000-000", "01999-999", 800),
            zone(2, "01300-000", "01399-999", 500),
        ];
        let cep = Cep::parse("01310-100").unwrap();
        assert_eq!(find_zone(&zones, &cep).unwrap().id, DeliveryZoneId::new(2));

        let edge = Cep::parse("01999-999").unwrap();
        assert_eq!(find_zone(&zones, &edge).unwrap().id, DeliveryZoneId::new(1));
    }

    #[test]
    fn test_inactive_and_uncovered() {
        let mut inactive = zone(1, "01000-000", "01999-999", 800);
        inactive.active = false;
        let cep = Cep::parse("01310-100").unwrap();
        assert_eq!(
            quote(&[inactive], &cep, Money::from_cents(5000)),
            Err(DeliveryFeeError::NotCovered(cep))
        );
    }

    #[test]
    fn test_minimum_and_free_threshold() {
        let mut z = zone(1, "01000-000", "01999-999", 800);
        z.min_order = Some(Money::from_cents(3000));
        z.free_above = Some(Money::from_cents(10_000));

        assert!(matches!(
            z.quote(Money::from_cents(2999)),
            Err(DeliveryFeeError::BelowMinimum { .. })
        ));
        let paid = z.quote(Money::from_cents(5000)).unwrap();
        assert_eq!(paid.fee, Money::from_cents(800));
        assert!(!paid.free);
        let free = z.quote(Money::from_cents(10_000)).unwrap();
        assert_eq!(free.fee, Money::ZERO);
        assert!(free.free);
    }

    #[test]
    fn test_validate_range() {
        let bad = zone(1, "02000-000", "01000-000", 0);
        assert!(matches!(bad.validate(), Err(DeliveryFeeError::InvalidRange { .. })));
        assert!(zone(1, "01000-000", "01000-000", 0).validate().is_ok());
    }
}
