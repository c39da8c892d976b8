//! Brazilian postal codes (CEP).

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Cep`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CepError {
    /// The input string is empty.
    #[error("CEP não pode ser vazio")]
    Empty,
    /// The input does not have exactly 8 digits.
    #[error("CEP deve ter 8 dígitos")]
    InvalidLength,
    /// The input contains characters other than digits, `-`, `.` or spaces.
    #[error("CEP contém caracteres inválidos")]
    InvalidCharacters,
}

/// A CEP, stored as its 8 bare digits.
///
/// ```
/// use pizzaria_core::Cep;
///
/// let cep = Cep::parse("01310-100").unwrap();
/// assert_eq!(cep.as_str(), "01310100");
/// assert_eq!(cep.to_string(), "01310-100");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cep(String);

impl Cep {
    /// Parse a CEP from user input.
    ///
    /// # Errors
    ///
    /// Returns a [`CepError`] if the input is empty, has invalid characters
    /// or does not contain exactly 8 digits.
    pub fn parse(input: &str) -> Result<Self, CepError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CepError::Empty);
        }
        if trimmed
            .chars()
            .any(|c| !(c.is_ascii_digit() || matches!(c, '-' | '.' | ' ')))
        {
            return Err(CepError::InvalidCharacters);
        }

        let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
        if digits.len() != 8 {
            return Err(CepError::InvalidLength);
        }
        Ok(Self(digits))
    }

    /// The 8 bare digits.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value, used for range comparisons against delivery zones.
    #[must_use]
    pub fn as_u32(&self) -> u32 {
        self.0.parse().unwrap_or_default()
    }
}

impl fmt::Display for Cep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = self.0.get(..5).unwrap_or_default();
        let tail = self.0.get(5..).unwrap_or_default();
        write!(f, "{head}-{tail}")
    }
}

impl TryFrom<String> for Cep {
    type Error = CepError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Cep> for String {
    fn from(cep: Cep) -> Self {
        cep.0
    }
}

impl std::str::FromStr for Cep {
    type Err = CepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Cep {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Cep {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(&s)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Cep {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formats() {
        assert_eq!(Cep::parse("01310-100").unwrap().as_str(), "01310100");
        assert_eq!(Cep::parse("01.310-100").unwrap().as_str(), "01310100");
        assert_eq!(Cep::parse(" 01310100 ").unwrap().as_str(), "01310100");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Cep::parse(""), Err(CepError::Empty));
        assert_eq!(Cep::parse("0131-100"), Err(CepError::InvalidLength));
        assert_eq!(Cep::parse("01310-10a"), Err(CepError::InvalidCharacters));
    }

    #[test]
    fn test_numeric_value_keeps_leading_zero_order() {
        let low = Cep::parse("01000-000").unwrap();
        let high = Cep::parse("09999-999").unwrap();
        assert!(low.as_u32() < high.as_u32());
        assert_eq!(low.as_u32(), 1_000_000);
    }
}
