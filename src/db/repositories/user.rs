//! User repository
//!
//! Database operations for accounts, the follow graph and user interests.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite

use crate::db::DynDatabasePool;
use crate::models::{Gender, User, UserStats};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by username
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Get user by email (case-insensitive)
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Persist names, gender, activation flag and password hash
    async fn update(&self, user: &User) -> Result<User>;

    /// Users whose username or email contains `term`, excluding `exclude_id`
    async fn search(&self, term: &str, exclude_id: Option<i64>) -> Result<Vec<User>>;

    /// Add a follow edge. Returns false if it already existed.
    async fn follow(&self, follower_id: i64, followed_id: i64) -> Result<bool>;

    /// Remove a follow edge. Returns false if there was none.
    async fn unfollow(&self, follower_id: i64, followed_id: i64) -> Result<bool>;

    /// Check whether `follower_id` follows `followed_id`
    async fn is_following(&self, follower_id: i64, followed_id: i64) -> Result<bool>;

    /// Users following `user_id`
    async fn followers(&self, user_id: i64) -> Result<Vec<User>>;

    /// Users `user_id` follows
    async fn following(&self, user_id: i64) -> Result<Vec<User>>;

    /// Follow and pin counters for a profile page
    async fn stats(&self, user_id: i64) -> Result<UserStats>;

    /// Replace the user's interest categories
    async fn set_interests(&self, user_id: i64, category_ids: &[i64]) -> Result<()>;

    /// IDs of the user's interest categories
    async fn interest_ids(&self, user_id: i64) -> Result<Vec<i64>>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        create_user(self.pool.sqlite(), user).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get user by ID")?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get user by username")?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ? COLLATE NOCASE")
            .bind(email)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get user by email")?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn update(&self, user: &User) -> Result<User> {
        update_user(self.pool.sqlite(), user).await
    }

    async fn search(&self, term: &str, exclude_id: Option<i64>) -> Result<Vec<User>> {
        search_users(self.pool.sqlite(), term, exclude_id).await
    }

    async fn follow(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO user_follows (follower_id, followed_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(follower_id)
        .bind(followed_id)
        .bind(Utc::now())
        .execute(self.pool.sqlite())
        .await
        .context("Failed to follow user")?;
        Ok(result.rows_affected() > 0)
    }

    async fn unfollow(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM user_follows WHERE follower_id = ? AND followed_id = ?")
                .bind(follower_id)
                .bind(followed_id)
                .execute(self.pool.sqlite())
                .await
                .context("Failed to unfollow user")?;
        Ok(result.rows_affected() > 0)
    }

    async fn is_following(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM user_follows WHERE follower_id = ? AND followed_id = ?",
        )
        .bind(follower_id)
        .bind(followed_id)
        .fetch_optional(self.pool.sqlite())
        .await
        .context("Failed to check follow")?;
        Ok(row.is_some())
    }

    async fn followers(&self, user_id: i64) -> Result<Vec<User>> {
        list_connections(
            self.pool.sqlite(),
            "SELECT u.* FROM users u JOIN user_follows f ON f.follower_id = u.id \
             WHERE f.followed_id = ? ORDER BY f.created_at DESC",
            user_id,
        )
        .await
    }

    async fn following(&self, user_id: i64) -> Result<Vec<User>> {
        list_connections(
            self.pool.sqlite(),
            "SELECT u.* FROM users u JOIN user_follows f ON f.followed_id = u.id \
             WHERE f.follower_id = ? ORDER BY f.created_at DESC",
            user_id,
        )
        .await
    }

    async fn stats(&self, user_id: i64) -> Result<UserStats> {
        get_user_stats(self.pool.sqlite(), user_id).await
    }

    async fn set_interests(&self, user_id: i64, category_ids: &[i64]) -> Result<()> {
        let mut tx = self.pool.sqlite().begin().await?;
        sqlx::query("DELETE FROM user_interests WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear interests")?;
        for category_id in category_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO user_interests (user_id, category_id) VALUES (?, ?)",
            )
            .bind(user_id)
            .bind(*category_id)
            .execute(&mut *tx)
            .await
            .context("Failed to add interest")?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn interest_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT category_id FROM user_interests WHERE user_id = ? ORDER BY category_id",
        )
        .bind(user_id)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list interests")?;
        Ok(rows.iter().map(|row| row.get("category_id")).collect())
    }
}

async fn create_user(pool: &SqlitePool, user: &User) -> Result<User> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, first_name, last_name, gender,
                           is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(user.gender.code())
    .bind(user.is_active)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    let mut created = user.clone();
    created.id = result.last_insert_rowid();
    Ok(created)
}

async fn update_user(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();
    sqlx::query(
        r#"
        UPDATE users
        SET first_name = ?, last_name = ?, gender = ?, is_active = ?, password_hash = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(user.gender.code())
    .bind(user.is_active)
    .bind(&user.password_hash)
    .bind(now)
    .bind(user.id)
    .execute(pool)
    .await
    .context("Failed to update user")?;

    let mut updated = user.clone();
    updated.updated_at = now;
    Ok(updated)
}

async fn search_users(pool: &SqlitePool, term: &str, exclude_id: Option<i64>) -> Result<Vec<User>> {
    let pattern = format!("%{}%", escape_like(term));
    let rows = sqlx::query(
        r#"
        SELECT * FROM users
        WHERE (username LIKE ? ESCAPE '\' OR email LIKE ? ESCAPE '\')
          AND is_active = 1
          AND id <> ?
        ORDER BY username
        "#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(exclude_id.unwrap_or(0))
    .fetch_all(pool)
    .await
    .context("Failed to search users")?;

    rows.iter().map(row_to_user).collect()
}

async fn list_connections(pool: &SqlitePool, sql: &str, user_id: i64) -> Result<Vec<User>> {
    let rows = sqlx::query(sql)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to list connections")?;
    rows.iter().map(row_to_user).collect()
}

async fn get_user_stats(pool: &SqlitePool, user_id: i64) -> Result<UserStats> {
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM user_follows WHERE followed_id = ?1) AS followers,
            (SELECT COUNT(*) FROM user_follows WHERE follower_id = ?1) AS following,
            (SELECT COUNT(*) FROM pins WHERE user_id = ?1 AND is_private = 1) AS private_pins,
            (SELECT COUNT(*) FROM pins WHERE user_id = ?1 AND is_private = 0) AS public_pins
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .context("Failed to count user stats")?;

    let private_pins: i64 = row.get("private_pins");
    let public_pins: i64 = row.get("public_pins");
    Ok(UserStats {
        followers: row.get("followers"),
        following: row.get("following"),
        private_pins,
        public_pins,
        total_pins: private_pins + public_pins,
    })
}

/// Escape LIKE wildcards so user input matches literally
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let gender_code: String = row.get("gender");
    let gender = Gender::from_str(&gender_code)
        .with_context(|| format!("Invalid gender in database: {}", gender_code))?;

    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        gender,
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxUserRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxUserRepository::new(pool.clone());
        (pool, repo)
    }

    async fn create_test_user(repo: &SqlxUserRepository, username: &str) -> User {
        let user = User::new(
            username.to_string(),
            format!("{}@example.com", username),
            "hash".to_string(),
            "test",
            "user",
        );
        repo.create(&user).await.expect("Failed to create user")
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let (_pool, repo) = setup_test_repo().await;
        let created = create_test_user(&repo, "alice").await;
        assert!(created.id > 0);

        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "alice");
        assert_eq!(by_id.first_name, "Test");
        assert_eq!(by_id.gender, Gender::NotSpecified);

        let by_email = repo.get_by_email("ALICE@example.com").await.unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(created.id));
        assert!(repo.get_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let (_pool, repo) = setup_test_repo().await;
        create_test_user(&repo, "alice").await;
        let dup = User::new("alice".into(), "other@example.com".into(), "h".into(), "", "");
        assert!(repo.create(&dup).await.is_err());
    }

    #[tokio::test]
    async fn test_update_user() {
        let (_pool, repo) = setup_test_repo().await;
        let mut user = create_test_user(&repo, "alice").await;
        user.gender = Gender::Female;
        user.is_active = false;
        repo.update(&user).await.unwrap();

        let fetched = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(fetched.gender, Gender::Female);
        assert!(!fetched.is_active);
    }

    #[tokio::test]
    async fn test_search_excludes_self_and_matches_email() {
        let (_pool, repo) = setup_test_repo().await;
        let alice = create_test_user(&repo, "alice").await;
        create_test_user(&repo, "alicia").await;
        create_test_user(&repo, "bob").await;

        let found = repo.search("ALI", Some(alice.id)).await.unwrap();
        let names: Vec<_> = found.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["alicia"]);

        let found = repo.search("bob@example", None).await.unwrap();
        assert_eq!(found.len(), 1);

        // Wildcards in the term are literal.
        assert!(repo.search("%", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_follow_is_idempotent() {
        let (_pool, repo) = setup_test_repo().await;
        let alice = create_test_user(&repo, "alice").await;
        let bob = create_test_user(&repo, "bob").await;

        assert!(repo.follow(alice.id, bob.id).await.unwrap());
        assert!(!repo.follow(alice.id, bob.id).await.unwrap());
        assert!(repo.is_following(alice.id, bob.id).await.unwrap());
        assert!(!repo.is_following(bob.id, alice.id).await.unwrap());

        let followers = repo.followers(bob.id).await.unwrap();
        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].id, alice.id);
        assert_eq!(repo.following(alice.id).await.unwrap().len(), 1);

        assert!(repo.unfollow(alice.id, bob.id).await.unwrap());
        assert!(!repo.unfollow(alice.id, bob.id).await.unwrap());
        assert!(repo.followers(bob.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stats_counts() {
        let (pool, repo) = setup_test_repo().await;
        let alice = create_test_user(&repo, "alice").await;
        let bob = create_test_user(&repo, "bob").await;
        repo.follow(bob.id, alice.id).await.unwrap();

        for private in [true, false, false] {
            sqlx::query("INSERT INTO pins (user_id, title, pin_file, is_private) VALUES (?, 't', 'f', ?)")
                .bind(alice.id)
                .bind(private)
                .execute(pool.sqlite())
                .await
                .unwrap();
        }

        let stats = repo.stats(alice.id).await.unwrap();
        assert_eq!(
            stats,
            UserStats {
                followers: 1,
                following: 0,
                private_pins: 1,
                public_pins: 2,
                total_pins: 3,
            }
        );
    }

    #[tokio::test]
    async fn test_set_interests_replaces() {
        let (pool, repo) = setup_test_repo().await;
        let alice = create_test_user(&repo, "alice").await;
        for name in ["Art", "Food", "Travel"] {
            sqlx::query("INSERT INTO categories (name) VALUES (?)")
                .bind(name)
                .execute(pool.sqlite())
                .await
                .unwrap();
        }

        repo.set_interests(alice.id, &[1, 2]).await.unwrap();
        assert_eq!(repo.interest_ids(alice.id).await.unwrap(), vec![1, 2]);
        repo.set_interests(alice.id, &[3]).await.unwrap();
        assert_eq!(repo.interest_ids(alice.id).await.unwrap(), vec![3]);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("a_b%c\\"), "a\\_b\\%c\\\\");
    }
}
