//! Payload validation
//!
//! Outgoing payloads are checked before they are sent, so a malformed
//! request fails with [`ValidationError`] instead of a backend error.

use thiserror::Error;
use url::Url;

/// A field that failed validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
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

/// Implemented by every payload sent to the backend
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

pub const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn required(field: &'static str, value: &str, max_len: usize) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    max_length(field, trimmed, max_len)
}

pub(crate) fn max_length(field: &'static str, value: &str, max_len: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }
    Ok(())
}

pub(crate) fn optional_max_length(
    field: &'static str,
    value: &Option<String>,
    max_len: usize,
) -> Result<(), ValidationError> {
    match value {
        Some(value) => max_length(field, value, max_len),
        None => Ok(()),
    }
}

/// Absolute http(s) URL
pub(crate) fn optional_url(field: &'static str, value: &Option<String>) -> Result<(), ValidationError> {
    let Some(value) = value else {
        return Ok(());
    };
    match Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(()),
        Ok(_) => Err(ValidationError::new(field, "must be an http or https URL")),
        Err(e) => Err(ValidationError::new(field, format!("invalid URL: {}", e))),
    }
}

pub(crate) fn email(value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("email", "must be a valid email address"))
    }
}

pub(crate) fn password(value: &str) -> Result<(), ValidationError> {
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::new(
            "password",
            format!("must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    Ok(())
}
