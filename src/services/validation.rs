//! Field-level form validation errors

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Errors keyed by form field name.
///
/// Serializes as a map so templates can look up `errors.password` and list
/// its messages next to the field. Errors not tied to a field go under
/// [`FieldErrors::FORM`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// Key for errors that concern the whole form
    pub const FORM: &'static str = "__all__";

    pub fn new() -> Self {
        Self::default()
    }

    /// Single error on one field
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    /// Record `message` on `field` when it is blank; returns the trimmed value
    pub fn require<'a>(&mut self, field: &str, value: &'a str) -> &'a str {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            self.add(field, "This field is required.");
        }
        trimmed
    }

    /// Record an error when `value` is longer than `max` characters
    pub fn max_len(&mut self, field: &str, value: &str, max: usize) {
        let len = value.chars().count();
        if len > max {
            self.add(
                field,
                format!(
                    "Ensure this value has at most {} characters (it has {}).",
                    max, len
                ),
            );
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// `Ok(())` when no errors were recorded
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                first = false;
                if field == Self::FORM {
                    write!(f, "{}", message)?;
                } else {
                    write!(f, "{}: {}", field, message)?;
                }
            }
        }
        Ok(())
    }
}

/// Rough email shape check: one `@`, non-empty local part, dotted domain.
pub fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}
