//! Saved pin repository
//!
//! Bookmarks of pins by users. The `(user_id, pin_id)` pair is unique in
//! the schema; inserts use `INSERT OR IGNORE` so concurrent saves settle on a
//! single row.

use crate::db::DynDatabasePool;
use crate::models::SavedPin;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

/// Saved pin repository trait
#[async_trait]
pub trait SavedPinRepository: Send + Sync {
    /// Bookmark a pin. Returns false if it was already saved.
    async fn save(&self, user_id: i64, pin_id: i64) -> Result<bool>;

    /// Remove a bookmark. Returns false if there was none.
    async fn unsave(&self, user_id: i64, pin_id: i64) -> Result<bool>;

    /// The bookmark row, if any
    async fn find(&self, user_id: i64, pin_id: i64) -> Result<Option<SavedPin>>;
}

/// SQLx-based saved pin repository implementation
pub struct SqlxSavedPinRepository {
    pool: DynDatabasePool,
}

impl SqlxSavedPinRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SavedPinRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SavedPinRepository for SqlxSavedPinRepository {
    async fn save(&self, user_id: i64, pin_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO saved_pins (user_id, pin_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(pin_id)
        .bind(Utc::now())
        .execute(self.pool.sqlite())
        .await
        .context("Failed to save pin")?;
        Ok(result.rows_affected() > 0)
    }

    async fn unsave(&self, user_id: i64, pin_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM saved_pins WHERE user_id = ? AND pin_id = ?")
            .bind(user_id)
            .bind(pin_id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to unsave pin")?;
        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, user_id: i64, pin_id: i64) -> Result<Option<SavedPin>> {
        let row = sqlx::query(
            "SELECT id, user_id, pin_id, created_at FROM saved_pins WHERE user_id = ? AND pin_id = ?",
        )
        .bind(user_id)
        .bind(pin_id)
        .fetch_optional(self.pool.sqlite())
        .await
        .context("Failed to get saved pin")?;

        Ok(row.map(|row| SavedPin {
            id: row.get("id"),
            user_id: row.get("user_id"),
            pin_id: row.get("pin_id"),
            created_at: row.get("created_at"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> (DynDatabasePool, SqlxSavedPinRepository, i64, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.unwrap();
        let sqlite = pool.sqlite();
        let user = sqlx::query("INSERT INTO users (username, email, password_hash) VALUES ('u', 'u@x.io', 'h')")
            .execute(sqlite)
            .await
            .unwrap()
            .last_insert_rowid();
        let pin = sqlx::query("INSERT INTO pins (user_id, title, pin_file) VALUES (?, 't', 'f')")
            .bind(user)
            .execute(sqlite)
            .await
            .unwrap()
            .last_insert_rowid();
        (pool.clone(), SqlxSavedPinRepository::new(pool), user, pin)
    }

    #[tokio::test]
    async fn test_save_twice_keeps_one_row() {
        let (pool, repo, user, pin) = setup().await;
        assert!(repo.save(user, pin).await.unwrap());
        assert!(!repo.save(user, pin).await.unwrap());

        let count: i64 = sqlx::query("SELECT COUNT(*) FROM saved_pins")
            .fetch_one(pool.sqlite())
            .await
            .unwrap()
            .get(0);
        assert_eq!(count, 1);
        assert!(repo.find(user, pin).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unsave() {
        let (_pool, repo, user, pin) = setup().await;
        assert!(!repo.unsave(user, pin).await.unwrap());
        repo.save(user, pin).await.unwrap();
        assert!(repo.unsave(user, pin).await.unwrap());
        assert!(repo.find(user, pin).await.unwrap().is_none());
    }
}
