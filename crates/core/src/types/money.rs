//! Monetary amounts in Brazilian reais.
//!
//! Amounts are stored as [`Decimal`] and rounded to cents after every
//! arithmetic derivation, so repeated add-on or quantity changes never
//! accumulate drift.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Mul, Neg, Sub};
use core::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Money`] amount.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The input string is empty.
    #[error("valor não pode ser vazio")]
    Empty,
    /// The input is not a number.
    #[error("valor inválido: {0}")]
    Invalid(String),
    /// The amount is negative where only non-negative values are accepted.
    #[error("valor não pode ser negativo")]
    Negative,
}

/// An amount of money in BRL.
///
/// ## Examples
///
/// ```
/// use pizzaria_core::Money;
///
/// let price = Money::parse("R$ 1.234,56").unwrap();
/// assert_eq!(price.to_string(), "R$ 1.234,56");
///
/// let total = Money::parse("30").unwrap() + Money::parse("5,00").unwrap();
/// assert_eq!(total, Money::from_cents(3500));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Zero reais.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wrap a decimal amount, rounding it to cents.
    #[must_use]
    pub fn new(amount: Decimal) -> Self {
        Self(round2(amount))
    }

    /// Build an amount from an integer number of cents.
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// The amount as an integer number of cents.
    #[must_use]
    pub fn cents(&self) -> i64 {
        (round2(self.0) * Decimal::ONE_HUNDRED)
            .trunc()
            .to_i64()
            .unwrap_or_default()
    }

    /// Returns `true` if the amount is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns `true` if the amount is below zero.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Multiply by a quantity, rounding the result to cents.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(round2(self.0 * Decimal::from(quantity)))
    }

    /// Subtract, flooring at zero.
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        let diff = round2(self.0 - other.0);
        if diff.is_sign_negative() {
            Self::ZERO
        } else {
            Self(diff)
        }
    }

    /// Parse a user-entered amount.
    ///
    /// Accepts plain decimals (`35`, `35.5`), Brazilian formatting
    /// (`35,50`, `1.234,56`) and an optional `R$` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Empty`] or [`MoneyError::Invalid`] when the input
    /// is not a number.
    pub fn parse(input: &str) -> Result<Self, MoneyError> {
        let trimmed = input.trim();
        let without_symbol = trimmed
            .strip_prefix("R$")
            .unwrap_or(trimmed)
            .trim();
        if without_symbol.is_empty() {
            return Err(MoneyError::Empty);
        }

        let normalized = if without_symbol.contains(',') {
            // Brazilian format: '.' groups thousands, ',' separates cents.
            without_symbol.replace('.', "").replace(',', ".")
        } else {
            without_symbol.to_owned()
        };

        if normalized
            .chars()
            .any(|c| !(c.is_ascii_digit() || c == '.' || c == '-'))
        {
            return Err(MoneyError::Invalid(input.to_owned()));
        }

        let amount = Decimal::from_str(&normalized)
            .map_err(|_| MoneyError::Invalid(input.to_owned()))?;
        Ok(Self::new(amount))
    }

    /// Parse a price: like [`Money::parse`] but rejects negative values.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Negative`] for amounts below zero.
    pub fn parse_price(input: &str) -> Result<Self, MoneyError> {
        let money = Self::parse(input)?;
        if money.is_negative() {
            return Err(MoneyError::Negative);
        }
        Ok(money)
    }

    /// Plain two-decimal representation without currency symbol (`1234.56`),
    /// used in CSV exports and provider payloads.
    #[must_use]
    pub fn to_plain_string(&self) -> String {
        format!("{:.2}", round2(self.0))
    }
}

/// Round half away from zero to two decimal places.
fn round2(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plain = format!("{:.2}", round2(self.0).abs());
        let (int_part, cents) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

        let digits: Vec<char> = int_part.chars().collect();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.iter().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(*c);
        }

        let sign = if self.is_negative() { "-" } else { "" };
        write!(f, "{sign}R$ {grouped},{cents}")
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self::new(amount)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(round2(self.0 + rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(round2(self.0 - rhs.0))
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Mul<u32> for Money {
    type Output = Self;

    fn mul(self, rhs: u32) -> Self::Output {
        self.times(rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Money {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Money {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let amount = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::new(amount))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Money {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_brazilian_formats() {
        assert_eq!(Money::parse("35").unwrap(), Money::from_cents(3500));
        assert_eq!(Money::parse("35.5").unwrap(), Money::from_cents(3550));
        assert_eq!(Money::parse("35,50").unwrap(), Money::from_cents(3550));
        assert_eq!(Money::parse("R$ 1.234,56").unwrap(), Money::from_cents(123_456));
        assert_eq!(Money::parse("  R$12,00 ").unwrap(), Money::from_cents(1200));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(Money::parse(""), Err(MoneyError::Empty));
        assert_eq!(Money::parse("R$"), Err(MoneyError::Empty));
        assert!(matches!(Money::parse("12a"), Err(MoneyError::Invalid(_))));
        assert!(matches!(Money::parse("1,2,3"), Err(MoneyError::Invalid(_))));
    }

    #[test]
    fn test_parse_price_rejects_negative() {
        assert_eq!(Money::parse_price("-1,00"), Err(MoneyError::Negative));
        assert!(Money::parse("-1,00").unwrap().is_negative());
    }

    #[test]
    fn test_parse_rounds_to_cents() {
        assert_eq!(Money::parse("10.005").unwrap(), Money::from_cents(1001));
        assert_eq!(Money::parse("10.004").unwrap(), Money::from_cents(1000));
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(0).to_string(), "R$ 0,00");
        assert_eq!(Money::from_cents(3500).to_string(), "R$ 35,00");
        assert_eq!(Money::from_cents(123_456_789).to_string(), "R$ 1.234.567,89");
        assert_eq!((-Money::from_cents(250)).to_string(), "-R$ 2,50");
    }

    #[test]
    fn test_arithmetic_stays_at_cents() {
        let third = Money::new(Decimal::ONE / Decimal::from(3));
        assert_eq!(third, Money::from_cents(33));
        assert_eq!(third * 3, Money::from_cents(99));

        let sum: Money = [Money::from_cents(10), Money::from_cents(20)].iter().sum();
        assert_eq!(sum, Money::from_cents(30));
    }

    #[test]
    fn test_saturating_sub() {
        assert_eq!(
            Money::from_cents(500).saturating_sub(Money::from_cents(800)),
            Money::ZERO
        );
        assert_eq!(
            Money::from_cents(800).saturating_sub(Money::from_cents(500)),
            Money::from_cents(300)
        );
    }

    #[test]
    fn test_cents_and_plain_string() {
        assert_eq!(Money::from_cents(10_550).cents(), 10_550);
        assert_eq!(Money::from_cents(10_550).to_plain_string(), "105.50");
    }
}
