//! Category service
//!
//! Categories are created on demand from the names typed into the pin form.
//! Names are normalized (whitespace collapsed, title-cased) before lookup, so
//! "street  ART" and "Street Art" land on the same row.

use crate::db::repositories::CategoryRepository;
use crate::models::{normalize_name, Category};
use anyhow::Context;
use std::sync::Arc;

/// Maximum category name length
pub const MAX_CATEGORY_NAME_LEN: usize = 50;

/// Error types for category service operations
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>) -> Self {
        Self { repo }
    }

    /// All categories ordered by name
    pub async fn list(&self) -> Result<Vec<Category>, CategoryServiceError> {
        Ok(self.repo.list().await.context("Failed to list categories")?)
    }

    /// Categories attached to a pin
    pub async fn for_pin(&self, pin_id: i64) -> Result<Vec<Category>, CategoryServiceError> {
        Ok(self
            .repo
            .list_for_pin(pin_id)
            .await
            .context("Failed to list pin categories")?)
    }

    /// Look up or create the categories named in `raw`.
    ///
    /// Each entry may hold several comma-separated names. Blank names are
    /// skipped and duplicates collapse to one category, in first-seen order.
    pub async fn resolve(&self, raw: &[String]) -> Result<Vec<Category>, CategoryServiceError> {
        let names = split_names(raw);
        if let Some(long) = names.iter().find(|n| n.chars().count() > MAX_CATEGORY_NAME_LEN) {
            return Err(CategoryServiceError::ValidationError(format!(
                "Category '{}' is longer than {} characters.",
                long, MAX_CATEGORY_NAME_LEN
            )));
        }

        let mut categories = Vec::with_capacity(names.len());
        for name in names {
            let category = self
                .repo
                .get_or_create(&Category::new(&name))
                .await
                .with_context(|| format!("Failed to resolve category '{}'", name))?;
            categories.push(category);
        }
        Ok(categories)
    }
}

/// Normalized, de-duplicated names from form values
pub fn split_names(raw: &[String]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in raw.iter().flat_map(|value| value.split(',')).map(normalize_name) {
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}
