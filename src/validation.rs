//! Normalization of quantities, dates and codes arriving from outside the crate.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::errors::ServiceError;

/// Longest batch or recall code accepted
pub const MAX_CODE_LEN: usize = 64;

/// Largest quantity a `DECIMAL(16, 4)` column holds
pub fn max_quantity() -> Decimal {
    Decimal::new(9_999_999_999_999_999, 4)
}

/// Parses a non-negative decimal quantity.
///
/// Accepts plain decimal notation only; thousands separators, exponents and
/// words like `NaN` or `inf` are rejected.
pub fn parse_quantity(input: &str) -> Result<Decimal, ServiceError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::ValidationError(
            "Quantity cannot be empty".to_string(),
        ));
    }

    let value = Decimal::from_str(trimmed).map_err(|e| {
        ServiceError::ValidationError(format!("Invalid quantity '{}': {}", trimmed, e))
    })?;

    if value.is_sign_negative() && !value.is_zero() {
        return Err(ServiceError::ValidationError(format!(
            "Quantity cannot be negative, got: {}",
            value
        )));
    }

    if value > max_quantity() {
        return Err(ServiceError::ValidationError(format!(
            "Quantity {} exceeds the maximum of {}",
            value,
            max_quantity()
        )));
    }

    Ok(value.normalize())
}

/// Parses `YYYY-MM-DD`, falling back to the UK `DD/MM/YYYY` form.
pub fn parse_date(input: &str) -> Result<NaiveDate, ServiceError> {
    let trimmed = input.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%d/%m/%Y"))
        .map_err(|e| ServiceError::ValidationError(format!("Invalid date '{}': {}", trimmed, e)))
}

/// Trims and upper-cases a batch or recall code, rejecting anything outside
/// `[A-Z0-9-_/]`.
pub fn normalize_code(input: &str) -> Result<String, ServiceError> {
    let code = input.trim().to_uppercase();

    if code.is_empty() {
        return Err(ServiceError::ValidationError(
            "Code cannot be empty".to_string(),
        ));
    }
    if code.len() > MAX_CODE_LEN {
        return Err(ServiceError::ValidationError(format!(
            "Code '{}' exceeds {} characters",
            code, MAX_CODE_LEN
        )));
    }
    if let Some(bad) = code
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/')))
    {
        return Err(ServiceError::ValidationError(format!(
            "Code '{}' contains invalid character '{}'",
            code, bad
        )));
    }

    Ok(code)
}
