//! User profile repository

use crate::db::DynDatabasePool;
use crate::models::{PictureKind, UpdateProfileInput, UserProfile};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Profile repository trait
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Profile of a user, if one was ever created
    async fn get(&self, user_id: i64) -> Result<Option<UserProfile>>;

    /// Fetch the profile, creating an empty one first if needed
    async fn get_or_create(&self, user_id: i64) -> Result<UserProfile>;

    /// Update the text fields of a profile
    async fn update(&self, user_id: i64, input: &UpdateProfileInput) -> Result<UserProfile>;

    /// Point a picture slot at a stored file
    async fn set_picture(&self, user_id: i64, kind: PictureKind, path: &str) -> Result<()>;
}

/// SQLx-based profile repository implementation
pub struct SqlxProfileRepository {
    pool: DynDatabasePool,
}

impl SqlxProfileRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ProfileRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ProfileRepository for SqlxProfileRepository {
    async fn get(&self, user_id: i64) -> Result<Option<UserProfile>> {
        get_profile(self.pool.sqlite(), user_id).await
    }

    async fn get_or_create(&self, user_id: i64) -> Result<UserProfile> {
        let pool = self.pool.sqlite();
        sqlx::query("INSERT OR IGNORE INTO user_profiles (user_id, updated_at) VALUES (?, ?)")
            .bind(user_id)
            .bind(Utc::now())
            .execute(pool)
            .await
            .context("Failed to create profile")?;

        get_profile(pool, user_id)
            .await?
            .with_context(|| format!("Profile for user {} vanished after creation", user_id))
    }

    async fn update(&self, user_id: i64, input: &UpdateProfileInput) -> Result<UserProfile> {
        self.get_or_create(user_id).await?;
        sqlx::query(
            r#"
            UPDATE user_profiles
            SET about = ?, website = ?, country = ?, language = ?, updated_at = ?
            WHERE user_id = ?
            "#,
        )
        .bind(&input.about)
        .bind(&input.website)
        .bind(&input.country)
        .bind(&input.language)
        .bind(Utc::now())
        .bind(user_id)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to update profile")?;

        self.get_or_create(user_id).await
    }

    async fn set_picture(&self, user_id: i64, kind: PictureKind, path: &str) -> Result<()> {
        self.get_or_create(user_id).await?;
        let sql = match kind {
            PictureKind::Profile => {
                "UPDATE user_profiles SET profile_picture = ?, updated_at = ? WHERE user_id = ?"
            }
            PictureKind::Cover => {
                "UPDATE user_profiles SET cover_picture = ?, updated_at = ? WHERE user_id = ?"
            }
        };
        sqlx::query(sql)
            .bind(path)
            .bind(Utc::now())
            .bind(user_id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to set profile picture")?;
        Ok(())
    }
}

async fn get_profile(pool: &SqlitePool, user_id: i64) -> Result<Option<UserProfile>> {
    let row = sqlx::query("SELECT * FROM user_profiles WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get profile")?;

    Ok(row.map(|row| UserProfile {
        user_id: row.get("user_id"),
        about: row.get("about"),
        profile_picture: row.get("profile_picture"),
        cover_picture: row.get("cover_picture"),
        website: row.get("website"),
        country: row.get("country"),
        language: row.get("language"),
        updated_at: row.get("updated_at"),
    }))
}
