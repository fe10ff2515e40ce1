//! Donation form validation.

use rust_decimal::{prelude::ToPrimitive, Decimal};

use super::types::DonationInput;
use crate::api::handlers::{auth::valid_email, error::ValidationError};

/// Fractional digits the gateway accepts (kobo).
const CURRENCY_SCALE: u32 = 2;

/// Donation fields that passed validation, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidDonation {
    pub name: String,
    pub email: String,
    pub amount: Decimal,
    pub cause_id: i64,
}

/// Largest storable amount: `NUMERIC(12,2)`.
fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999, CURRENCY_SCALE)
}

/// Validate a donation form; `cause_exists` reports whether `cause_id` is known.
///
/// # Errors
/// Returns every failing field at once.
pub fn validate_donation(
    input: &DonationInput,
    cause_exists: bool,
) -> Result<ValidDonation, ValidationError> {
    let mut errors = ValidationError::new();

    let name = input.name.trim();
    if name.is_empty() {
        errors.add("name", "Name is required");
    }

    let email = input.email.trim();
    if email.is_empty() {
        errors.add("email", "Email is required");
    } else if !valid_email(email) {
        errors.add("email", "Enter a valid email address");
    }

    let amount = match input.amount {
        None => {
            errors.add("amount", "Amount is required");
            None
        }
        Some(amount) if amount <= Decimal::ZERO => {
            errors.add("amount", "Amount must be greater than zero");
            None
        }
        Some(amount) if amount.normalize().scale() > CURRENCY_SCALE => {
            errors.add("amount", "Amount must have at most 2 decimal places");
            None
        }
        Some(amount) if amount > max_amount() => {
            errors.add("amount", "Amount is too large");
            None
        }
        Some(amount) => {
            let mut amount = amount.normalize();
            amount.rescale(CURRENCY_SCALE);
            Some(amount)
        }
    };

    match input.cause_id {
        None => errors.add("cause", "Cause is required"),
        Some(_) if !cause_exists => errors.add("cause", "Cause does not exist"),
        Some(_) => {}
    }

    errors.into_result()?;

    match (amount, input.cause_id) {
        (Some(amount), Some(cause_id)) => Ok(ValidDonation {
            name: name.to_string(),
            email: email.to_string(),
            amount,
            cause_id,
        }),
        _ => Err(ValidationError::field("amount", "Amount is required")),
    }
}

/// Convert a validated amount to gateway minor units (kobo).
#[must_use]
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED).trunc().to_i64()
}
