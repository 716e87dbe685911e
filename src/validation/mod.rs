use bigdecimal::BigDecimal;
use std::fmt;
use uuid::Uuid;

pub const CURRENCY_CODE_LEN: usize = 3;
pub const DESCRIPTION_MAX_LEN: usize = 500;
pub const REASON_MAX_LEN: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

/// Currency is an opaque ISO-style code: exactly three uppercase ASCII
/// letters. No whitelist; the ledger never converts between currencies.
pub fn validate_currency(currency: &str) -> ValidationResult {
    let currency = sanitize_string(currency);

    if currency.len() != CURRENCY_CODE_LEN {
        return Err(ValidationError::new(
            "currency",
            format!("must be exactly {} characters", CURRENCY_CODE_LEN),
        ));
    }

    if !currency.chars().all(|ch| ch.is_ascii_uppercase()) {
        return Err(ValidationError::new(
            "currency",
            "must contain only uppercase ASCII letters",
        ));
    }

    Ok(())
}

pub fn validate_positive_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    Ok(())
}

/// Fee must stay inside `0 <= fee <= amount` so the derived net amount can
/// never go negative.
pub fn validate_fee(fee: &BigDecimal, amount: &BigDecimal) -> ValidationResult {
    if fee < &BigDecimal::from(0) {
        return Err(ValidationError::new("fee", "must not be negative"));
    }

    if fee > amount {
        return Err(ValidationError::new("fee", "must not exceed the amount"));
    }

    Ok(())
}

pub fn validate_distinct_parties(from_user: Uuid, to_user: Uuid) -> ValidationResult {
    if from_user == to_user {
        return Err(ValidationError::new(
            "to_user",
            "cannot transact with yourself",
        ));
    }

    Ok(())
}
