//! Customer and address types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pizzaria_core::validation::{FieldValidation, validate_cep, validate_required};
use pizzaria_core::{AddressId, Cep, CustomerId, Email, Phone};

/// A registered customer.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub email: Email,
    pub phone: Phone,
    /// Current loyalty balance.
    pub loyalty_points: i32,
    pub created_at: DateTime<Utc>,
}

/// A saved delivery address.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Address {
    pub id: AddressId,
    pub customer_id: CustomerId,
    pub label: String,
    pub street: String,
    pub number: String,
    pub complement: Option<String>,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub cep: Cep,
    pub reference: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl Address {
    /// Single-line rendering used on checkout and order pages.
    #[must_use]
    pub fn one_line(&self) -> String {
        let complement = self
            .complement
            .as_deref()
            .map(|c| format!(" - {c}"))
            .unwrap_or_default();
        format!(
            "{}, {}{complement} - {}, {}/{} - CEP {}",
            self.street, self.number, self.neighborhood, self.city, self.state, self.cep
        )
    }
}

/// Address form as posted by the account page.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressForm {
    #[serde(default)]
    pub label: String,
    pub street: String,
    pub number: String,
    #[serde(default)]
    pub complement: String,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub cep: String,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub is_default: Option<String>,
}

/// A validated address ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAddress {
    pub label: String,
    pub street: String,
    pub number: String,
    pub complement: Option<String>,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub cep: Cep,
    pub reference: Option<String>,
    pub is_default: bool,
}

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl AddressForm {
    /// Validate every field, returning the first failure.
    ///
    /// # Errors
    ///
    /// Returns the failing [`FieldValidation`] keyed by field name.
    pub fn validate(&self) -> Result<NewAddress, (&'static str, FieldValidation)> {
        for (field, label, value) in [
            ("street", "Rua", &self.street),
            ("number", "Número", &self.number),
            ("neighborhood", "Bairro", &self.neighborhood),
            ("city", "Cidade", &self.city),
        ] {
            let check = validate_required(value, label);
            if !check.valid {
                return Err((field, check));
            }
        }

        let state = self.state.trim().to_uppercase();
        if state.len() != 2 || !state.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(("state", FieldValidation::invalid("UF deve ter 2 letras")));
        }

        let cep = Cep::parse(&self.cep).map_err(|_| ("cep", validate_cep(&self.cep)))?;

        Ok(NewAddress {
            label: optional(&self.label).unwrap_or_else(|| "Casa".to_string()),
            street: self.street.trim().to_string(),
            number: self.number.trim().to_string(),
            complement: optional(&self.complement),
            neighborhood: self.neighborhood.trim().to_string(),
            city: self.city.trim().to_string(),
            state,
            cep,
            reference: optional(&self.reference),
            is_default: self.is_default.is_some(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn form() -> AddressForm {
        AddressForm {
            label: String::new(),
            street: "Av. Paulista".to_string(),
            number: "1000".to_string(),
            complement: " ap 12 ".to_string(),
            neighborhood: "Bela Vista".to_string(),
            city: "São Paulo".to_string(),
            state: "sp".to_string(),
            cep: "01310-100".to_string(),
            reference: String::new(),
            is_default: Some("on".to_string()),
        }
    }

    #[test]
    fn test_validate_normalizes_fields() {
        let address = form().validate().unwrap();
        assert_eq!(address.label, "Casa");
        assert_eq!(address.state, "SP");
        assert_eq!(address.cep.as_str(), "01310100");
        assert_eq!(address.complement.as_deref(), Some("ap 12"));
        assert!(address.reference.is_none());
        assert!(address.is_default);
    }

    #[test]
    fn test_validate_reports_field() {
        let mut bad = form();
        bad.cep = "1234".to_string();
        let (field, check) = bad.validate().unwrap_err();
        assert_eq!(field, "cep");
        assert!(!check.valid);

        let mut bad = form();
        bad.street = "  ".to_string();
        assert_eq!(bad.validate().unwrap_err().0, "street");

        let mut bad = form();
        bad.state = "São".to_string();
        assert_eq!(bad.validate().unwrap_err().0, "state");
    }
}
