//! Field validation that reports every violated rule at once.
//!
//! Forms are checked rule by rule into a [`FieldErrors`] accumulator; a form is only
//! rejected after all of its fields have been looked at.

use std::fmt;

use serde::Serialize;
use ts_rs::TS;
use utoipa::ToSchema;
use validator::ValidateEmail;

use crate::error::AppError;

/// A single violated rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema, TS)]
#[ts(export)]
pub struct FieldError {
    /// Form field name (e.g. `password_confirmation`).
    pub field: String,
    /// Machine-readable rule identifier: `blank`, `too_short`, `too_long`, `invalid`,
    /// `taken` or `confirmation`.
    pub code: String,
    /// Full, user-facing sentence (e.g. "Name can't be blank").
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    errors: Vec<FieldError>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, code: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            code: code.to_string(),
            message: message.into(),
        });
    }

    pub fn blank(&mut self, field: &str, label: &str) {
        self.add(field, "blank", format!("{} can't be blank", label));
    }

    pub fn too_short(&mut self, field: &str, label: &str, min: usize) {
        self.add(
            field,
            "too_short",
            format!("{} is too short (minimum is {} characters)", label, min),
        );
    }

    pub fn too_long(&mut self, field: &str, label: &str, max: usize) {
        self.add(
            field,
            "too_long",
            format!("{} is too long (maximum is {} characters)", label, max),
        );
    }

    pub fn invalid(&mut self, field: &str, label: &str) {
        self.add(field, "invalid", format!("{} is invalid", label));
    }

    pub fn taken(&mut self, field: &str, label: &str) {
        self.add(field, "taken", format!("{} has already been taken", label));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter()
    }

    /// True when `field` failed with rule `code`.
    pub fn has(&self, field: &str, code: &str) -> bool {
        self.errors
            .iter()
            .any(|e| e.field == field && e.code == code)
    }

    pub fn messages(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.message.as_str()).collect()
    }

    /// `Ok(())` when nothing was recorded, otherwise the whole set as one error.
    pub fn into_result(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.messages().join("; "))
    }
}

pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Presence plus character-length bounds. A blank value is reported as blank and, when a
/// minimum applies, as too short as well.
pub fn check_text(
    errors: &mut FieldErrors,
    field: &str,
    label: &str,
    value: &str,
    min: Option<usize>,
    max: usize,
) {
    let len = value.trim().chars().count();
    if len == 0 {
        errors.blank(field, label);
    }
    if let Some(min) = min {
        if len < min {
            errors.too_short(field, label, min);
        }
    }
    if len > max {
        errors.too_long(field, label, max);
    }
}

/// Presence and RFC-shaped address.
pub fn check_email(errors: &mut FieldErrors, field: &str, label: &str, value: &str) {
    let value = value.trim().to_string();
    if value.is_empty() {
        errors.blank(field, label);
    } else if !value.validate_email() {
        errors.invalid(field, label);
    }
}

/// Emails compare case-insensitively and are stored in this form.
pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}
