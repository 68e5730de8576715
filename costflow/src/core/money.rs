//! Currency-tagged monetary amounts stored as integer minor units.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ValidationError;

/// A monetary amount in minor units (e.g. cents) with an ISO currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in minor units.
    pub minor_units: i64,
    /// ISO 4217 currency code.
    pub currency: String,
}

impl Money {
    /// Creates an amount from minor units.
    #[must_use]
    pub fn from_minor(minor_units: i64, currency: impl Into<String>) -> Self {
        Self {
            minor_units,
            currency: currency.into(),
        }
    }

    /// Creates an amount from whole currency units.
    #[must_use]
    pub fn from_major(amount: i64, currency: impl Into<String>) -> Self {
        Self::from_minor(amount.saturating_mul(100), currency)
    }

    /// Creates a zero amount.
    #[must_use]
    pub fn zero(currency: impl Into<String>) -> Self {
        Self::from_minor(0, currency)
    }

    /// Returns true if the amount is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.minor_units == 0
    }

    /// Returns the amount in major units as a float.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_major(&self) -> f64 {
        self.minor_units as f64 / 100.0
    }

    /// Adds another amount of the same currency.
    pub fn checked_add(&self, other: &Self) -> Result<Self, ValidationError> {
        if self.currency != other.currency {
            return Err(ValidationError::new(format!(
                "cannot add {} to {}",
                other.currency, self.currency
            ))
            .with_field("currency"));
        }
        Ok(Self::from_minor(
            self.minor_units.saturating_add(other.minor_units),
            self.currency.clone(),
        ))
    }

    /// Proportion `(self * permille / 1000)`, rounded toward zero.
    #[must_use]
    pub fn scaled_permille(&self, permille: i64) -> Self {
        Self::from_minor(
            self.minor_units.saturating_mul(permille) / 1000,
            self.currency.clone(),
        )
    }

    /// Clamps the amount into `[0, ceiling]`.
    #[must_use]
    pub fn clamp_to(&self, ceiling: i64) -> Self {
        Self::from_minor(self.minor_units.clamp(0, ceiling.max(0)), self.currency.clone())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.minor_units < 0 { "-" } else { "" };
        let abs = self.minor_units.unsigned_abs();
        let whole = abs / 100;
        let cents = abs % 100;

        let digits = whole.to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }

        write!(f, "{sign}{grouped}.{cents:02} {}", self.currency)
    }
}
