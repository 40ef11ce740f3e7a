//! Form decoding helpers
//!
//! Urlencoded forms are decoded into ordered name/value pairs so repeated
//! fields (interests, categories) survive. Multipart forms additionally carry
//! uploaded files.

use axum::extract::Multipart;
use axum::http::{header, HeaderMap};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::api::responses::AppError;
use crate::services::{FieldErrors, IncomingFile};

/// Submitted form fields in request order
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct FormFields(Vec<(String, String)>);

impl FormFields {
    /// First value of `name`, or an empty string
    pub fn get(&self, name: &str) -> &str {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .unwrap_or_default()
    }

    /// Every value of `name`
    pub fn all(&self, name: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
            .collect()
    }

    /// Checkbox state; any non-empty value other than "false"/"off" counts
    pub fn checked(&self, name: &str) -> bool {
        let value = self.get(name);
        !value.is_empty() && value != "false" && value != "off"
    }

    /// Fields as a JSON object for re-rendering a form, minus `skip`
    pub fn to_json(&self, skip: &[&str]) -> Value {
        let mut map = Map::new();
        for (key, value) in &self.0 {
            if skip.contains(&key.as_str()) || map.contains_key(key) {
                continue;
            }
            map.insert(key.clone(), Value::String(value.clone()));
        }
        Value::Object(map)
    }

    fn push(&mut self, name: String, value: String) {
        self.0.push((name, value));
    }
}

/// A decoded multipart form
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: FormFields,
    files: Vec<(String, IncomingFile)>,
}

impl MultipartForm {
    /// File submitted under `name`; empty file inputs are absent
    pub fn file(&self, name: &str) -> Option<&IncomingFile> {
        self.files.iter().find(|(key, _)| key == name).map(|(_, file)| file)
    }
}

/// Read every part of a multipart body
pub async fn read_multipart(mut multipart: Multipart) -> Result<MultipartForm, AppError> {
    let mut form = MultipartForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read form: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;
                // Browsers submit an unnamed empty part for an untouched file input.
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                form.files.push((
                    name,
                    IncomingFile {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    },
                ));
            }
            None => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read form: {}", e)))?;
                form.fields.push(name, value);
            }
        }
    }

    Ok(form)
}

/// Field errors as a template value
pub fn errors_json(errors: &FieldErrors) -> Value {
    serde_json::to_value(errors).unwrap_or_else(|_| Value::Object(Map::new()))
}

/// Only same-site absolute paths are followed after login
pub fn safe_next(next: &str) -> Option<&str> {
    let next = next.trim();
    (next.starts_with('/')
        && !next.starts_with("//")
        && !next.contains('\\')
        && !next.chars().any(char::is_control))
        .then_some(next)
}

/// Path of the Referer header when it points back at this host
pub fn referer_path(headers: &HeaderMap) -> Option<String> {
    let referer = headers.get(header::REFERER)?.to_str().ok()?;
    if let Some(path) = safe_next(referer) {
        return Some(path.to_string());
    }

    let host = headers.get(header::HOST)?.to_str().ok()?;
    let rest = referer
        .strip_prefix("http://")
        .or_else(|| referer.strip_prefix("https://"))?;
    let path = rest.strip_prefix(host)?;
    if path.is_empty() {
        return Some("/".to_string());
    }
    safe_next(path).map(str::to_string)
}
