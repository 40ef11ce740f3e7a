//! Pin repository
//!
//! Database operations for pins and their categories. Listings are built
//! with [`PinQuery`] so that every one of them is visibility-scoped.

use crate::db::query::PinQuery;
use crate::db::DynDatabasePool;
use crate::models::{Pin, PinStatus, PinView};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Pin repository trait
#[async_trait]
pub trait PinRepository: Send + Sync {
    /// Insert a pin and attach its categories
    async fn create(&self, pin: &Pin, category_ids: &[i64]) -> Result<Pin>;

    /// Get a pin by ID regardless of visibility
    async fn get_by_id(&self, id: i64) -> Result<Option<Pin>>;

    /// Get a pin with owner name and saved flag for `viewer`, regardless
    /// of visibility
    async fn get_view(&self, id: i64, viewer: Option<i64>) -> Result<Option<PinView>>;

    /// Run a visibility-scoped listing
    async fn find(&self, query: &PinQuery) -> Result<Vec<PinView>>;

    /// IDs of the categories attached to a pin
    async fn category_ids(&self, pin_id: i64) -> Result<Vec<i64>>;
}

/// SQLx-based pin repository implementation
pub struct SqlxPinRepository {
    pool: DynDatabasePool,
}

impl SqlxPinRepository {
    /// Create a new SQLx pin repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PinRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PinRepository for SqlxPinRepository {
    async fn create(&self, pin: &Pin, category_ids: &[i64]) -> Result<Pin> {
        create_pin(self.pool.sqlite(), pin, category_ids).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Pin>> {
        let row = sqlx::query("SELECT * FROM pins WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get pin by ID")?;
        Ok(row.as_ref().map(row_to_pin))
    }

    async fn get_view(&self, id: i64, viewer: Option<i64>) -> Result<Option<PinView>> {
        let row = sqlx::query(
            r#"
            SELECT p.*, u.username AS username,
                   EXISTS (SELECT 1 FROM saved_pins sp WHERE sp.pin_id = p.id AND sp.user_id = ?)
                       AS is_saved
            FROM pins p JOIN users u ON u.id = p.user_id
            WHERE p.id = ?
            "#,
        )
        .bind(viewer.unwrap_or(0))
        .bind(id)
        .fetch_optional(self.pool.sqlite())
        .await
        .context("Failed to get pin")?;
        Ok(row.as_ref().map(row_to_pin_view))
    }

    async fn find(&self, query: &PinQuery) -> Result<Vec<PinView>> {
        let mut builder = query.build();
        let rows = builder
            .build()
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list pins")?;
        Ok(rows.iter().map(row_to_pin_view).collect())
    }

    async fn category_ids(&self, pin_id: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query("SELECT category_id FROM pin_categories WHERE pin_id = ?")
            .bind(pin_id)
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list pin categories")?;
        Ok(rows.iter().map(|row| row.get("category_id")).collect())
    }
}

async fn create_pin(pool: &SqlitePool, pin: &Pin, category_ids: &[i64]) -> Result<Pin> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO pins (user_id, title, about, alter_text, destination_link, pin_file,
                          status, is_idea, is_private, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(pin.user_id)
    .bind(&pin.title)
    .bind(&pin.about)
    .bind(&pin.alter_text)
    .bind(&pin.destination_link)
    .bind(&pin.pin_file)
    .bind(pin.status.as_i64())
    .bind(pin.is_idea)
    .bind(pin.is_private)
    .bind(pin.created_at)
    .bind(pin.updated_at)
    .execute(&mut *tx)
    .await
    .context("Failed to create pin")?;

    let pin_id = result.last_insert_rowid();
    for category_id in category_ids {
        sqlx::query("INSERT OR IGNORE INTO pin_categories (pin_id, category_id) VALUES (?, ?)")
            .bind(pin_id)
            .bind(*category_id)
            .execute(&mut *tx)
            .await
            .context("Failed to attach pin category")?;
    }

    tx.commit().await?;

    let mut created = pin.clone();
    created.id = pin_id;
    Ok(created)
}

fn row_to_pin(row: &sqlx::sqlite::SqliteRow) -> Pin {
    let status: i64 = row.get("status");
    Pin {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        about: row.get("about"),
        alter_text: row.get("alter_text"),
        destination_link: row.get("destination_link"),
        pin_file: row.get("pin_file"),
        status: PinStatus::from_i64(status),
        is_idea: row.get("is_idea"),
        is_private: row.get("is_private"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_pin_view(row: &sqlx::sqlite::SqliteRow) -> PinView {
    let is_saved: i64 = row.get("is_saved");
    PinView {
        pin: row_to_pin(row),
        username: row.get("username"),
        is_saved: is_saved != 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::query::{PinFilter, SEARCH_LIMIT};
    use crate::db::{create_test_pool, migrations};
    use chrono::{Duration, Utc};

    struct Fixture {
        pool: DynDatabasePool,
        repo: SqlxPinRepository,
        alice: i64,
        bob: i64,
        art: i64,
        food: i64,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.unwrap();
        let sqlite = pool.sqlite();
        let mut users = Vec::new();
        for name in ["alice", "bob"] {
            let id = sqlx::query("INSERT INTO users (username, email, password_hash) VALUES (?, ?, 'h')")
                .bind(name)
                .bind(format!("{}@example.com", name))
                .execute(sqlite)
                .await
                .unwrap()
                .last_insert_rowid();
            users.push(id);
        }
        let mut categories = Vec::new();
        for name in ["Art", "Food"] {
            let id = sqlx::query("INSERT INTO categories (name) VALUES (?)")
                .bind(name)
                .execute(sqlite)
                .await
                .unwrap()
                .last_insert_rowid();
            categories.push(id);
        }
        Fixture {
            repo: SqlxPinRepository::new(pool.clone()),
            pool,
            alice: users[0],
            bob: users[1],
            art: categories[0],
            food: categories[1],
        }
    }

    fn new_pin(user_id: i64, title: &str, is_private: bool) -> Pin {
        let now = Utc::now();
        Pin {
            id: 0,
            user_id,
            title: title.to_string(),
            about: String::new(),
            alter_text: String::new(),
            destination_link: String::new(),
            pin_file: format!("pins/{}.png", title),
            status: PinStatus::Uploaded,
            is_idea: false,
            is_private,
            created_at: now,
            updated_at: now,
        }
    }

    async fn save(pool: &DynDatabasePool, user_id: i64, pin_id: i64) {
        sqlx::query("INSERT INTO saved_pins (user_id, pin_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(pin_id)
            .execute(pool.sqlite())
            .await
            .unwrap();
    }

    fn titles(views: &[PinView]) -> Vec<&str> {
        views.iter().map(|v| v.pin.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_private_pin_visible_only_to_owner() {
        let f = setup().await;
        f.repo.create(&new_pin(f.alice, "secret", true), &[f.art]).await.unwrap();
        f.repo.create(&new_pin(f.alice, "public", false), &[f.art]).await.unwrap();

        let as_alice = f.repo.find(&PinQuery::new(Some(f.alice))).await.unwrap();
        let as_bob = f.repo.find(&PinQuery::new(Some(f.bob))).await.unwrap();
        let anonymous = f.repo.find(&PinQuery::new(None)).await.unwrap();

        assert_eq!(titles(&as_alice), vec!["public", "secret"]);
        assert_eq!(titles(&as_bob), vec!["public"]);
        assert_eq!(titles(&anonymous), vec!["public"]);
    }

    #[tokio::test]
    async fn test_is_saved_without_duplicate_rows() {
        let f = setup().await;
        let pin = f.repo.create(&new_pin(f.alice, "shared", false), &[f.art, f.food]).await.unwrap();
        save(&f.pool, f.alice, pin.id).await;
        save(&f.pool, f.bob, pin.id).await;

        let query = PinQuery::new(Some(f.bob)).filter(PinFilter::CategoryIn(vec![f.art, f.food]));
        let views = f.repo.find(&query).await.unwrap();
        assert_eq!(views.len(), 1);
        assert!(views[0].is_saved);
        assert_eq!(views[0].username, "alice");

        let anonymous = f.repo.find(&PinQuery::new(None)).await.unwrap();
        assert_eq!(anonymous.len(), 1);
        assert!(!anonymous[0].is_saved);
    }

    #[tokio::test]
    async fn test_category_name_filter_with_limit() {
        let f = setup().await;
        for i in 0..(SEARCH_LIMIT + 5) {
            f.repo
                .create(&new_pin(f.bob, &format!("art{}", i), false), &[f.art])
                .await
                .unwrap();
        }
        f.repo.create(&new_pin(f.bob, "lunch", false), &[f.food]).await.unwrap();

        let query = PinQuery::new(Some(f.alice))
            .filter(PinFilter::CategoryName("Art".into()))
            .limit(SEARCH_LIMIT);
        let views = f.repo.find(&query).await.unwrap();
        assert_eq!(views.len() as i64, SEARCH_LIMIT);
        assert!(views.iter().all(|v| v.pin.title.starts_with("art")));
    }

    #[tokio::test]
    async fn test_created_on_filter() {
        let f = setup().await;
        let mut old = new_pin(f.alice, "old", false);
        old.created_at = Utc::now() - Duration::days(3);
        f.repo.create(&old, &[]).await.unwrap();
        f.repo.create(&new_pin(f.alice, "fresh", false), &[]).await.unwrap();

        let query = PinQuery::new(None).filter(PinFilter::CreatedOn(Utc::now().date_naive()));
        let views = f.repo.find(&query).await.unwrap();
        assert_eq!(titles(&views), vec!["fresh"]);
    }

    #[tokio::test]
    async fn test_home_feed_includes_follows_and_interests() {
        let f = setup().await;
        let sqlite = f.pool.sqlite();
        let carol = sqlx::query("INSERT INTO users (username, email, password_hash) VALUES ('carol', 'c@x.io', 'h')")
            .execute(sqlite)
            .await
            .unwrap()
            .last_insert_rowid();

        f.repo.create(&new_pin(f.alice, "mine", false), &[]).await.unwrap();
        f.repo.create(&new_pin(f.bob, "followed", false), &[]).await.unwrap();
        f.repo.create(&new_pin(f.bob, "followed-private", true), &[]).await.unwrap();
        f.repo.create(&new_pin(carol, "interesting", false), &[f.food]).await.unwrap();
        f.repo.create(&new_pin(carol, "unrelated", false), &[f.art]).await.unwrap();

        sqlx::query("INSERT INTO user_follows (follower_id, followed_id) VALUES (?, ?)")
            .bind(f.alice)
            .bind(f.bob)
            .execute(sqlite)
            .await
            .unwrap();
        sqlx::query("INSERT INTO user_interests (user_id, category_id) VALUES (?, ?)")
            .bind(f.alice)
            .bind(f.food)
            .execute(sqlite)
            .await
            .unwrap();

        let query = PinQuery::new(Some(f.alice)).filter(PinFilter::HomeFeed(f.alice));
        let mut got = titles(&f.repo.find(&query).await.unwrap())
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        got.sort();
        assert_eq!(got, vec!["followed", "interesting", "mine"]);
    }

    #[tokio::test]
    async fn test_get_view_and_exclude() {
        let f = setup().await;
        let pin = f.repo.create(&new_pin(f.alice, "one", true), &[f.art]).await.unwrap();
        f.repo.create(&new_pin(f.alice, "two", false), &[f.art]).await.unwrap();

        // Direct lookup ignores visibility; callers authorize afterwards.
        let view = f.repo.get_view(pin.id, Some(f.bob)).await.unwrap().unwrap();
        assert!(view.pin.is_private);
        assert!(!view.is_saved);
        assert_eq!(f.repo.category_ids(pin.id).await.unwrap(), vec![f.art]);

        let query = PinQuery::new(Some(f.alice)).filter(PinFilter::Exclude(pin.id));
        assert_eq!(titles(&f.repo.find(&query).await.unwrap()), vec!["two"]);
        assert!(f.repo.get_by_id(9999).await.unwrap().is_none());
    }
}
