//! Field-level input validation for the lifecycle surface.

use std::fmt;

use crate::domain::event::EventType;
use crate::domain::transaction::{MAX_TTL_MINUTES, MIN_TTL_MINUTES};

pub const REFERENCE_MAX_LEN: usize = 64;

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

pub fn validate_reference(reference: &str) -> ValidationResult {
    if reference.trim().is_empty() {
        return Err(ValidationError::new("ref", "must not be empty"));
    }
    if reference.len() > REFERENCE_MAX_LEN {
        return Err(ValidationError::new(
            "ref",
            format!("must be at most {} characters", REFERENCE_MAX_LEN),
        ));
    }
    if reference.chars().any(char::is_control) {
        return Err(ValidationError::new("ref", "must not contain control characters"));
    }

    Ok(())
}

pub fn validate_amount(amount: i64) -> ValidationResult {
    if amount < 1 {
        return Err(ValidationError::new("amount", "must be at least 1"));
    }

    Ok(())
}

pub fn validate_ttl_minutes(ttl_minutes: i64) -> ValidationResult {
    if !(MIN_TTL_MINUTES..=MAX_TTL_MINUTES).contains(&ttl_minutes) {
        return Err(ValidationError::new(
            "ttl_minutes",
            format!(
                "must be between {} and {}",
                MIN_TTL_MINUTES, MAX_TTL_MINUTES
            ),
        ));
    }

    Ok(())
}

pub fn validate_endpoint_url(value: &str) -> ValidationResult {
    let parsed = url::Url::parse(value)
        .map_err(|_| ValidationError::new("url", "must be a valid URL"))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ValidationError::new("url", "must use http or https"));
    }

    Ok(())
}

pub fn validate_event_names(events: &[String]) -> ValidationResult {
    if events.is_empty() {
        return Err(ValidationError::new("events", "must not be empty"));
    }

    for name in events {
        if !EventType::ALL.iter().any(|e| e.as_str() == name) {
            return Err(ValidationError::new(
                "events",
                format!("unknown event type: {}", name),
            ));
        }
    }

    Ok(())
}
