//! Pin service
//!
//! Pin creation, detail pages with suggestions, save/unsave and the feeds.
//! Every listing is built with [`PinQuery`], so the visibility rule and the
//! `is_saved` flag are applied the same way everywhere.

use crate::db::query::{PinFilter, PinQuery, SEARCH_LIMIT};
use crate::db::repositories::{PinRepository, SavedPinRepository};
use crate::models::{
    normalize_name, Category, CreatePinInput, Pin, PinStatus, PinView, User, MAX_ABOUT_LEN,
    MAX_LINK_LEN, MAX_TITLE_LEN,
};
use crate::services::access::{authorize, Access, Policy};
use crate::services::category::{CategoryService, CategoryServiceError};
use crate::services::uploads::{IncomingFile, UploadError, UploadStore};
use crate::services::validation::FieldErrors;
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Cap on suggested pins shown under a pin
pub const SUGGESTION_LIMIT: i64 = 30;
/// Cap on pins in the home feed
pub const FEED_LIMIT: i64 = 100;

/// Error types for pin service operations
#[derive(Debug, thiserror::Error)]
pub enum PinServiceError {
    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("Pin not found: {0}")]
    NotFound(i64),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<FieldErrors> for PinServiceError {
    fn from(errors: FieldErrors) -> Self {
        PinServiceError::ValidationError(errors)
    }
}

/// A pin detail page
#[derive(Debug, Clone, Serialize)]
pub struct PinDetail {
    pub pin: PinView,
    pub categories: Vec<Category>,
    /// Visible pins sharing a category with this one
    pub suggested: Vec<PinView>,
}

pub struct PinService {
    pin_repo: Arc<dyn PinRepository>,
    saved_repo: Arc<dyn SavedPinRepository>,
    categories: Arc<CategoryService>,
    uploads: UploadStore,
}

impl PinService {
    pub fn new(
        pin_repo: Arc<dyn PinRepository>,
        saved_repo: Arc<dyn SavedPinRepository>,
        categories: Arc<CategoryService>,
        uploads: UploadStore,
    ) -> Self {
        Self {
            pin_repo,
            saved_repo,
            categories,
            uploads,
        }
    }

    /// Create a pin owned by `owner` from form fields and an uploaded image.
    ///
    /// The image is only written once the fields have passed validation.
    pub async fn create(
        &self,
        owner: &User,
        input: CreatePinInput,
        file: Option<&IncomingFile>,
    ) -> Result<Pin, PinServiceError> {
        let mut errors = FieldErrors::new();
        let title = errors.require("title", &input.title).to_string();
        errors.max_len("title", &title, MAX_TITLE_LEN);
        let about = errors.require("about", &input.about).to_string();
        errors.max_len("about", &about, MAX_ABOUT_LEN);

        let destination_link = input.destination_link.trim().to_string();
        errors.max_len("destination_link", &destination_link, MAX_LINK_LEN);
        if !destination_link.is_empty() && !is_http_url(&destination_link) {
            errors.add("destination_link", "Enter a valid URL.");
        }

        if crate::services::category::split_names(&input.categories).is_empty() {
            errors.add("category", "This field is required.");
        }
        if file.is_none() {
            errors.add("pin_file", "This field is required.");
        }
        errors.into_result()?;

        let categories = match self.categories.resolve(&input.categories).await {
            Ok(categories) => categories,
            Err(CategoryServiceError::ValidationError(message)) => {
                return Err(FieldErrors::single("category", message).into())
            }
            Err(CategoryServiceError::InternalError(e)) => return Err(e.into()),
        };

        let Some(file) = file else {
            return Err(FieldErrors::single("pin_file", "This field is required.").into());
        };
        let pin_file = match self.uploads.store_pin(file).await {
            Ok(path) => path,
            Err(UploadError::Storage(e)) => return Err(e.into()),
            Err(e) => return Err(FieldErrors::single("pin_file", e.to_string()).into()),
        };

        let now = Utc::now();
        let pin = Pin {
            id: 0,
            user_id: owner.id,
            title,
            about,
            alter_text: input.alter_text.trim().to_string(),
            destination_link,
            pin_file,
            status: PinStatus::Uploaded,
            is_idea: input.is_idea,
            is_private: input.is_private,
            created_at: now,
            updated_at: now,
        };
        let category_ids: Vec<i64> = categories.iter().map(|c| c.id).collect();
        let pin = self
            .pin_repo
            .create(&pin, &category_ids)
            .await
            .context("Failed to create pin")?;

        tracing::info!("{} created pin {} ({})", owner.username, pin.id, pin.pin_file);
        Ok(pin)
    }

    /// Load a pin the viewer is allowed to see
    pub async fn get_visible(&self, viewer: Option<&User>, id: i64) -> Result<Pin, PinServiceError> {
        let pin = self
            .pin_repo
            .get_by_id(id)
            .await
            .context("Failed to get pin")?
            .ok_or(PinServiceError::NotFound(id))?;
        match authorize(viewer, &pin, Policy::OwnerOrPublic) {
            Access::Allow => Ok(pin),
            Access::Deny(reason) => Err(PinServiceError::Forbidden(reason)),
        }
    }

    /// Pin detail with its categories and suggested pins
    pub async fn detail(&self, viewer: Option<&User>, id: i64) -> Result<PinDetail, PinServiceError> {
        self.get_visible(viewer, id).await?;
        let viewer_id = viewer.map(|u| u.id);

        let pin = self
            .pin_repo
            .get_view(id, viewer_id)
            .await
            .context("Failed to get pin")?
            .ok_or(PinServiceError::NotFound(id))?;
        let categories = self
            .categories
            .for_pin(id)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;

        let query = PinQuery::new(viewer_id)
            .filter(PinFilter::CategoryIn(categories.iter().map(|c| c.id).collect()))
            .filter(PinFilter::Exclude(id))
            .limit(SUGGESTION_LIMIT);
        let suggested = self.find(&query).await?;

        Ok(PinDetail {
            pin,
            categories,
            suggested,
        })
    }

    /// Save the pin for `user`, or unsave it if already saved.
    ///
    /// Returns whether the pin is saved afterwards.
    pub async fn toggle_save(&self, user: &User, pin_id: i64) -> Result<bool, PinServiceError> {
        self.get_visible(Some(user), pin_id).await?;

        if self
            .saved_repo
            .unsave(user.id, pin_id)
            .await
            .context("Failed to unsave pin")?
        {
            tracing::debug!("{} unsaved pin {}", user.username, pin_id);
            return Ok(false);
        }
        self.saved_repo
            .save(user.id, pin_id)
            .await
            .context("Failed to save pin")?;
        tracing::debug!("{} saved pin {}", user.username, pin_id);
        Ok(true)
    }

    /// Pins in the category named by `term` (case-insensitive), newest first
    pub async fn search_by_category(
        &self,
        viewer: Option<&User>,
        term: &str,
    ) -> Result<Vec<PinView>, PinServiceError> {
        let name = normalize_name(term);
        if name.is_empty() {
            return Ok(Vec::new());
        }
        let query = PinQuery::new(viewer.map(|u| u.id))
            .filter(PinFilter::CategoryName(name))
            .limit(SEARCH_LIMIT);
        self.find(&query).await
    }

    /// Pins created today (UTC), optionally in one category
    pub async fn today(
        &self,
        viewer: Option<&User>,
        category: Option<&str>,
    ) -> Result<Vec<PinView>, PinServiceError> {
        self.created_on(viewer, Utc::now().date_naive(), category).await
    }

    pub async fn created_on(
        &self,
        viewer: Option<&User>,
        date: NaiveDate,
        category: Option<&str>,
    ) -> Result<Vec<PinView>, PinServiceError> {
        let mut query = PinQuery::new(viewer.map(|u| u.id)).filter(PinFilter::CreatedOn(date));
        if let Some(name) = category.map(normalize_name).filter(|n| !n.is_empty()) {
            query = query.filter(PinFilter::CategoryName(name));
        }
        self.find(&query).await
    }

    /// Own pins, pins of followed users and pins in the viewer's interests;
    /// recent public pins for anonymous visitors
    pub async fn home_feed(&self, viewer: Option<&User>) -> Result<Vec<PinView>, PinServiceError> {
        let query = match viewer {
            Some(user) => PinQuery::new(Some(user.id)).filter(PinFilter::HomeFeed(user.id)),
            None => PinQuery::new(None),
        };
        self.find(&query.limit(FEED_LIMIT)).await
    }

    /// Pins owned by `owner_id` that the viewer may see
    pub async fn user_pins(&self, viewer: Option<&User>, owner_id: i64) -> Result<Vec<PinView>, PinServiceError> {
        let query = PinQuery::new(viewer.map(|u| u.id)).filter(PinFilter::Owner(owner_id));
        self.find(&query).await
    }

    /// Pins saved by `user_id` that the viewer may see
    pub async fn saved_pins(&self, viewer: Option<&User>, user_id: i64) -> Result<Vec<PinView>, PinServiceError> {
        let query = PinQuery::new(viewer.map(|u| u.id)).filter(PinFilter::SavedBy(user_id));
        self.find(&query).await
    }

    async fn find(&self, query: &PinQuery) -> Result<Vec<PinView>, PinServiceError> {
        Ok(self.pin_repo.find(query).await.context("Failed to list pins")?)
    }
}

fn is_http_url(link: &str) -> bool {
    let rest = link
        .strip_prefix("http://")
        .or_else(|| link.strip_prefix("https://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
            !host.is_empty() && !link.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadConfig;
    use crate::db::repositories::{
        CategoryRepository, SqlxCategoryRepository, SqlxPinRepository, SqlxSavedPinRepository,
        SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use tempfile::TempDir;

    struct Fixture {
        pool: DynDatabasePool,
        service: PinService,
        users: Arc<dyn UserRepository>,
        alice: User,
        bob: User,
        media: TempDir,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");

        let media = TempDir::new().unwrap();
        let uploads = UploadStore::new(UploadConfig {
            path: media.path().to_path_buf(),
            ..UploadConfig::default()
        });
        let categories = Arc::new(CategoryService::new(SqlxCategoryRepository::boxed(pool.clone())));
        let service = PinService::new(
            SqlxPinRepository::boxed(pool.clone()),
            SqlxSavedPinRepository::boxed(pool.clone()),
            categories,
            uploads,
        );

        let users = SqlxUserRepository::boxed(pool.clone());
        let alice = users
            .create(&User::new("alice".into(), "alice@example.com".into(), "h".into(), "Alice", "A"))
            .await
            .unwrap();
        let bob = users
            .create(&User::new("bob".into(), "bob@example.com".into(), "h".into(), "Bob", "B"))
            .await
            .unwrap();

        Fixture {
            pool,
            service,
            users,
            alice,
            bob,
            media,
        }
    }

    fn image() -> IncomingFile {
        IncomingFile {
            file_name: "cake.jpg".into(),
            content_type: "image/jpeg".into(),
            bytes: b"jpeg".to_vec(),
        }
    }

    fn input(title: &str, categories: &str, is_private: bool) -> CreatePinInput {
        CreatePinInput {
            title: title.into(),
            about: "About this pin".into(),
            categories: vec![categories.into()],
            is_private,
            ..CreatePinInput::default()
        }
    }

    async fn create(f: &Fixture, owner: &User, title: &str, categories: &str, is_private: bool) -> Pin {
        f.service
            .create(owner, input(title, categories, is_private), Some(&image()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_pin_stores_file_and_categories() {
        let f = setup().await;
        let pin = create(&f, &f.alice, "Cake", "baking, DESSERT", false).await;

        assert!(pin.pin_file.starts_with("pins/"));
        assert!(f.media.path().join(&pin.pin_file).exists());
        assert_eq!(pin.status, PinStatus::Uploaded);

        let detail = f.service.detail(Some(&f.alice), pin.id).await.unwrap();
        let names: Vec<&str> = detail.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Baking", "Dessert"]);
        assert_eq!(detail.pin.username, "alice");
    }

    #[tokio::test]
    async fn test_create_pin_validation() {
        let f = setup().await;
        let mut bad = input("", " , ", false);
        bad.title = "x".repeat(MAX_TITLE_LEN + 1);
        bad.destination_link = "ftp://example.com".into();

        match f.service.create(&f.alice, bad, None).await {
            Err(PinServiceError::ValidationError(errors)) => {
                assert!(errors.get("title").is_some());
                assert!(errors.get("category").is_some());
                assert!(errors.get("pin_file").is_some());
                assert!(errors.get("destination_link").is_some());
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        let mut pdf = image();
        pdf.content_type = "application/pdf".into();
        assert!(matches!(
            f.service.create(&f.alice, input("Doc", "docs", false), Some(&pdf)).await,
            Err(PinServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_private_pin_hidden_from_others() {
        let f = setup().await;
        let private = create(&f, &f.alice, "Secret", "travel", true).await;
        create(&f, &f.alice, "Open", "travel", false).await;

        let as_bob = f.service.search_by_category(Some(&f.bob), "TRAVEL").await.unwrap();
        assert_eq!(as_bob.len(), 1);
        assert_eq!(as_bob[0].pin.title, "Open");

        let as_alice = f.service.search_by_category(Some(&f.alice), "travel").await.unwrap();
        assert_eq!(as_alice.len(), 2);

        assert!(matches!(
            f.service.detail(Some(&f.bob), private.id).await,
            Err(PinServiceError::Forbidden(_))
        ));
        assert!(matches!(f.service.detail(None, private.id).await, Err(PinServiceError::Forbidden(_))));
        assert!(matches!(f.service.detail(None, 999).await, Err(PinServiceError::NotFound(999))));
    }

    #[tokio::test]
    async fn test_toggle_save() {
        let f = setup().await;
        let pin = create(&f, &f.alice, "Cake", "baking", false).await;

        assert!(f.service.toggle_save(&f.bob, pin.id).await.unwrap());
        let saved = f.service.saved_pins(Some(&f.bob), f.bob.id).await.unwrap();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].is_saved);

        assert!(!f.service.toggle_save(&f.bob, pin.id).await.unwrap());
        assert!(f.service.saved_pins(Some(&f.bob), f.bob.id).await.unwrap().is_empty());

        let private = create(&f, &f.alice, "Mine", "baking", true).await;
        assert!(matches!(
            f.service.toggle_save(&f.bob, private.id).await,
            Err(PinServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_suggestions_share_category_and_exclude_self() {
        let f = setup().await;
        let cake = create(&f, &f.alice, "Cake", "baking", false).await;
        create(&f, &f.bob, "Bread", "baking, bread", false).await;
        create(&f, &f.bob, "Hidden Bread", "baking", true).await;
        create(&f, &f.bob, "Beach", "travel", false).await;

        f.service.toggle_save(&f.alice, cake.id).await.unwrap();
        let detail = f.service.detail(Some(&f.alice), cake.id).await.unwrap();
        assert!(detail.pin.is_saved);
        let titles: Vec<&str> = detail.suggested.iter().map(|p| p.pin.title.as_str()).collect();
        assert_eq!(titles, vec!["Bread"]);
    }

    #[tokio::test]
    async fn test_search_by_category_blank_and_limit() {
        let f = setup().await;
        assert!(f.service.search_by_category(None, "  ").await.unwrap().is_empty());

        for i in 0..(SEARCH_LIMIT + 3) {
            create(&f, &f.alice, &format!("Pin {}", i), "art", false).await;
        }
        let found = f.service.search_by_category(None, "art").await.unwrap();
        assert_eq!(found.len() as i64, SEARCH_LIMIT);
        assert!(found.iter().all(|p| !p.is_saved));
    }

    #[tokio::test]
    async fn test_today_and_category_filter() {
        let f = setup().await;
        create(&f, &f.alice, "Cake", "baking", false).await;
        create(&f, &f.alice, "Beach", "travel", false).await;
        let old = create(&f, &f.alice, "Old", "baking", false).await;
        sqlx::query("UPDATE pins SET created_at = '2020-01-01T10:00:00+00:00' WHERE id = ?")
            .bind(old.id)
            .execute(f.pool.sqlite())
            .await
            .unwrap();

        assert_eq!(f.service.today(None, None).await.unwrap().len(), 2);
        let baking = f.service.today(None, Some("baking")).await.unwrap();
        assert_eq!(baking.len(), 1);
        assert_eq!(baking[0].pin.title, "Cake");

        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        assert_eq!(f.service.created_on(None, date, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_home_feed() {
        let f = setup().await;
        let carol = f
            .users
            .create(&User::new("carol".into(), "carol@example.com".into(), "h".into(), "Carol", "C"))
            .await
            .unwrap();
        create(&f, &f.alice, "Own", "misc", true).await;
        create(&f, &f.bob, "Followed", "misc", false).await;
        create(&f, &carol, "Interest", "travel", false).await;
        create(&f, &carol, "Unrelated", "cars", false).await;

        f.users.follow(f.alice.id, f.bob.id).await.unwrap();
        let travel = SqlxCategoryRepository::new(f.pool.clone())
            .get_by_name("Travel")
            .await
            .unwrap()
            .unwrap();
        f.users.set_interests(f.alice.id, &[travel.id]).await.unwrap();

        let mut titles: Vec<String> = f
            .service
            .home_feed(Some(&f.alice))
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.pin.title)
            .collect();
        titles.sort();
        assert_eq!(titles, vec!["Followed", "Interest", "Own"]);

        // Anonymous visitors get public pins only.
        assert_eq!(f.service.home_feed(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_user_pins_respects_visibility() {
        let f = setup().await;
        create(&f, &f.alice, "Public", "misc", false).await;
        create(&f, &f.alice, "Private", "misc", true).await;

        assert_eq!(f.service.user_pins(Some(&f.alice), f.alice.id).await.unwrap().len(), 2);
        assert_eq!(f.service.user_pins(Some(&f.bob), f.alice.id).await.unwrap().len(), 1);
        assert_eq!(f.service.user_pins(None, f.alice.id).await.unwrap().len(), 1);
    }

    #[test]
    fn test_is_http_url() {
        assert!(is_http_url("https://example.com/a?b=c"));
        assert!(is_http_url("http://localhost:8000"));
        assert!(!is_http_url("https://"));
        assert!(!is_http_url("javascript:alert(1)"));
        assert!(!is_http_url("https://exa mple.com"));
    }
}
