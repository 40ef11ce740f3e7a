//! Category repository
//!
//! Database operations for categories and the pin/category association.

use crate::db::DynDatabasePool;
use crate::models::Category;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Get category by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    /// Get category by its normalized name
    async fn get_by_name(&self, name: &str) -> Result<Option<Category>>;

    /// Insert the category unless one with the same name exists, then
    /// return the stored row
    async fn get_or_create(&self, category: &Category) -> Result<Category>;

    /// List all categories by name
    async fn list(&self) -> Result<Vec<Category>>;

    /// Categories attached to a pin
    async fn list_for_pin(&self, pin_id: i64) -> Result<Vec<Category>>;
}

/// SQLx-based category repository implementation
pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    /// Create a new SQLx category repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let row = sqlx::query("SELECT id, name, created_at FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get category by ID")?;
        Ok(row.as_ref().map(row_to_category))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Category>> {
        get_category_by_name(self.pool.sqlite(), name).await
    }

    async fn get_or_create(&self, category: &Category) -> Result<Category> {
        let pool = self.pool.sqlite();
        sqlx::query("INSERT OR IGNORE INTO categories (name, created_at) VALUES (?, ?)")
            .bind(&category.name)
            .bind(category.created_at)
            .execute(pool)
            .await
            .context("Failed to create category")?;

        get_category_by_name(pool, &category.name)
            .await?
            .with_context(|| format!("Category '{}' missing after insert", category.name))
    }

    async fn list(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query("SELECT id, name, created_at FROM categories ORDER BY name")
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list categories")?;
        Ok(rows.iter().map(row_to_category).collect())
    }

    async fn list_for_pin(&self, pin_id: i64) -> Result<Vec<Category>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.name, c.created_at
            FROM categories c
            JOIN pin_categories pc ON pc.category_id = c.id
            WHERE pc.pin_id = ?
            ORDER BY c.name
            "#,
        )
        .bind(pin_id)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list pin categories")?;
        Ok(rows.iter().map(row_to_category).collect())
    }
}

async fn get_category_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Category>> {
    let row = sqlx::query("SELECT id, name, created_at FROM categories WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to get category by name")?;
    Ok(row.as_ref().map(row_to_category))
}

fn row_to_category(row: &sqlx::sqlite::SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        created_at: row.get("created_at"),
    }
}
