//! Field checks shared by the services.

/// A rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Trims `value` and checks that its length in characters is within `min..=max`.
pub fn required_text(
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len < min {
        if min == 1 {
            return Err(ValidationError::new(field, "must not be empty"));
        }
        return Err(ValidationError::new(
            field,
            format!("must be at least {min} characters"),
        ));
    }
    if len > max {
        return Err(ValidationError::new(
            field,
            format!("must be at most {max} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Like [`required_text`] but an absent or blank value yields `None`.
pub fn optional_text(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => required_text(field, text, 1, max).map(Some),
    }
}

pub fn positive_cents(field: &'static str, cents: i64) -> Result<i64, ValidationError> {
    if cents <= 0 {
        return Err(ValidationError::new(field, "must be greater than zero"));
    }
    Ok(cents)
}
