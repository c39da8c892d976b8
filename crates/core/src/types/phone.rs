//! Brazilian phone numbers.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Phone`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    /// The input has no digits.
    #[error("telefone não pode ser vazio")]
    Empty,
    /// Wrong number of digits once punctuation is removed.
    #[error("telefone deve ter 10 ou 11 dígitos (com DDD), recebido {0}")]
    InvalidLength(usize),
    /// The area code (DDD) is not in the 11-99 range.
    #[error("DDD inválido: {0}")]
    InvalidAreaCode(String),
    /// An 11-digit number that is not a mobile number.
    #[error("celular com 11 dígitos deve começar com 9 após o DDD")]
    InvalidMobilePrefix,
    /// The input contains characters other than digits and common separators.
    #[error("telefone contém caracteres inválidos")]
    InvalidCharacters,
}

/// A Brazilian phone number with area code, stored as bare digits.
///
/// ## Constraints
///
/// - 10 digits (landline) or 11 digits (mobile) after stripping `()`, `-`,
///   spaces, dots and a leading `+55`
/// - Area code between 11 and 99
/// - Mobile numbers have `9` right after the area code
///
/// ## Examples
///
/// ```
/// use pizzaria_core::Phone;
///
/// let phone = Phone::parse("(11) 98765-4321").unwrap();
/// assert_eq!(phone.as_str(), "11987654321");
/// assert_eq!(phone.to_string(), "(11) 98765-4321");
/// assert_eq!(phone.whatsapp_number(), "5511987654321");
///
/// assert!(Phone::parse("1234").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Phone(String);

impl Phone {
    /// Parse a phone number from user input.
    ///
    /// # Errors
    ///
    /// Returns a [`PhoneError`] describing the first violated constraint.
    pub fn parse(input: &str) -> Result<Self, PhoneError> {
        if input
            .chars()
            .any(|c| !(c.is_ascii_digit() || matches!(c, '(' | ')' | '-' | ' ' | '.' | '+')))
        {
            return Err(PhoneError::InvalidCharacters);
        }

        let mut digits: String = input.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Err(PhoneError::Empty);
        }

        // Country code is optional on input.
        if input.trim_start().starts_with('+') || digits.len() == 13 {
            if let Some(rest) = digits.strip_prefix("55") {
                digits = rest.to_owned();
            }
        }

        if digits.len() != 10 && digits.len() != 11 {
            return Err(PhoneError::InvalidLength(digits.len()));
        }

        let area_code = digits.get(..2).unwrap_or_default();
        if area_code.starts_with('0') {
            return Err(PhoneError::InvalidAreaCode(area_code.to_owned()));
        }

        if digits.len() == 11 && digits.as_bytes().get(2) != Some(&b'9') {
            return Err(PhoneError::InvalidMobilePrefix);
        }

        Ok(Self(digits))
    }

    /// The bare digits, area code included.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The two-digit area code.
    #[must_use]
    pub fn area_code(&self) -> &str {
        self.0.get(..2).unwrap_or_default()
    }

    /// Returns `true` for 11-digit mobile numbers.
    #[must_use]
    pub fn is_mobile(&self) -> bool {
        self.0.len() == 11
    }

    /// Number in the international form expected by WhatsApp gateways.
    #[must_use]
    pub fn whatsapp_number(&self) -> String {
        format!("55{}", self.0)
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let split = if self.is_mobile() { 7 } else { 6 };
        let area = self.0.get(..2).unwrap_or_default();
        let prefix = self.0.get(2..split).unwrap_or_default();
        let suffix = self.0.get(split..).unwrap_or_default();
        write!(f, "({area}) {prefix}-{suffix}")
    }
}

impl TryFrom<String> for Phone {
    type Error = PhoneError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Phone> for String {
    fn from(phone: Phone) -> Self {
        phone.0
    }
}

impl std::str::FromStr for Phone {
    type Err = PhoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Phone {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Phone {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(&s)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Phone {
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
    fn test_parse_mobile_and_landline() {
        assert_eq!(Phone::parse("11987654321").unwrap().as_str(), "11987654321");
        assert_eq!(Phone::parse("(21) 3333-4444").unwrap().as_str(), "2133334444");
        assert_eq!(Phone::parse("+55 11 98765-4321").unwrap().as_str(), "11987654321");
    }

    #[test]
    fn test_parse_invalid_length() {
        assert_eq!(Phone::parse("98765-4321"), Err(PhoneError::InvalidLength(9)));
        assert_eq!(Phone::parse(""), Err(PhoneError::Empty));
    }

    #[test]
    fn test_parse_invalid_area_code_and_prefix() {
        assert!(matches!(
            Phone::parse("0198765432"),
            Err(PhoneError::InvalidAreaCode(_))
        ));
        assert_eq!(
            Phone::parse("11887654321"),
            Err(PhoneError::InvalidMobilePrefix)
        );
    }

    #[test]
    fn test_parse_invalid_characters() {
        assert_eq!(
            Phone::parse("11 9876a4321"),
            Err(PhoneError::InvalidCharacters)
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Phone::parse("11987654321").unwrap().to_string(),
            "(11) 98765-4321"
        );
        assert_eq!(
            Phone::parse("2133334444").unwrap().to_string(),
            "(21) 3333-4444"
        );
    }

    #[test]
    fn test_serde_validates() {
        let phone: Phone = serde_json::from_str("\"(11) 98765-4321\"").unwrap();
        assert_eq!(serde_json::to_string(&phone).unwrap(), "\"11987654321\"");
        assert!(serde_json::from_str::<Phone>("\"123\"").is_err());
    }
}
