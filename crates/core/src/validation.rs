//! Form-facing validation results.
//!
//! Forms validate field by field before anything is sent to the database.
//! Each check returns a [`FieldValidation`] that serializes to
//! `{"valid": bool, "error": string|null}` for inline feedback.

use serde::Serialize;

use crate::{Cep, Email, Money, Phone};

/// Outcome of validating a single form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldValidation {
    /// Whether the value is acceptable.
    pub valid: bool,
    /// User-facing message when invalid.
    pub error: Option<String>,
}

impl FieldValidation {
    /// A passing validation.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    /// A failing validation with a message.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(message.into()),
        }
    }

    /// Collapse a typed parse result into a field validation.
    pub fn from_result<T, E: std::fmt::Display>(result: &Result<T, E>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(e) => Self::invalid(e.to_string()),
        }
    }
}

/// Validate a phone number field.
#[must_use]
pub fn validate_phone(input: &str) -> FieldValidation {
    FieldValidation::from_result(&Phone::parse(input))
}

/// Validate a CEP field.
#[must_use]
pub fn validate_cep(input: &str) -> FieldValidation {
    FieldValidation::from_result(&Cep::parse(input))
}

/// Validate an email field.
#[must_use]
pub fn validate_email(input: &str) -> FieldValidation {
    FieldValidation::from_result(&Email::parse(input))
}

/// Validate a non-negative money field.
#[must_use]
pub fn validate_money(input: &str) -> FieldValidation {
    FieldValidation::from_result(&Money::parse_price(input))
}

/// Validate a required free-text field.
#[must_use]
pub fn validate_required(input: &str, field: &str) -> FieldValidation {
    if input.trim().is_empty() {
        FieldValidation::invalid(format!("{field} é obrigatório"))
    } else {
        FieldValidation::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_fields() {
        assert_eq!(validate_phone("(11) 98765-4321"), FieldValidation::ok());
        assert_eq!(validate_cep("01310-100"), FieldValidation::ok());
        assert_eq!(validate_email("a@b.com"), FieldValidation::ok());
        assert_eq!(validate_money("12,50"), FieldValidation::ok());
    }

    #[test]
    fn test_invalid_fields_carry_message() {
        let result = validate_cep("123");
        assert!(!result.valid);
        assert_eq!(result.error.as_deref(), Some("CEP deve ter 8 dígitos"));

        assert!(!validate_money("-3").valid);
        assert!(!validate_email("x").valid);
        assert!(!validate_phone("abc").valid);
    }

    #[test]
    fn test_required() {
        assert!(!validate_required("  ", "Nome").valid);
        assert_eq!(
            validate_required("", "Nome").error.as_deref(),
            Some("Nome é obrigatório")
        );
        assert!(validate_required("Ana", "Nome").valid);
    }
}
