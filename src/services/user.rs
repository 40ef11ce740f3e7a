//! User service
//!
//! Account lifecycle and the social graph:
//! - registration with interests, emailed activation link
//! - login/logout and session validation
//! - profile editing and pictures
//! - password change and the emailed password reset flow
//! - account deactivation
//! - user search, follow/unfollow and connection lists

use crate::config::AuthConfig;
use crate::db::repositories::{
    CategoryRepository, ProfileRepository, SessionRepository, UserRepository,
};
use crate::models::{
    Gender, PictureKind, Session, UpdateProfileInput, UpdateUserInput, User, UserProfile, UserStats,
};
use crate::services::access::{authorize, Access, Policy};
use crate::services::mail::{MailJob, MailQueue, PASSWORD_RESET_TEMPLATE, VERIFICATION_TEMPLATE};
use crate::services::password::{hash_password, password_problems, verify_password};
use crate::services::token::{decode_uid, encode_uid, TokenGenerator, TokenPurpose};
use crate::services::uploads::{IncomingFile, UploadError, UploadStore};
use crate::services::validation::{looks_like_email, FieldErrors};
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Maximum username length
pub const MAX_USERNAME_LEN: usize = 150;

/// Message shown when the two password fields differ
pub const PASSWORD_MISMATCH: &str = "Password and confirm password do not match.";

const INVALID_LOGIN: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";
const INVALID_LINK: &str = "The link is invalid or has expired.";

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\w.@+-]+$").unwrap_or_else(|e| unreachable!("static regex: {}", e))
});

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Form input rejected, with messages per field
    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    /// Bad credentials, inactive account or invalid emailed link
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Ownership check failed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<FieldErrors> for UserServiceError {
    fn from(errors: FieldErrors) -> Self {
        UserServiceError::ValidationError(errors)
    }
}

fn check_access(access: Access) -> Result<(), UserServiceError> {
    match access {
        Access::Allow => Ok(()),
        Access::Deny(reason) => Err(UserServiceError::Forbidden(reason)),
    }
}

/// Input for user registration
#[derive(Debug, Clone, Default)]
pub struct RegisterInput {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub gender: Option<String>,
    /// Category IDs
    pub interests: Vec<i64>,
    pub password: String,
    pub confirm_password: String,
}

/// Input for login
#[derive(Debug, Clone, Default)]
pub struct LoginInput {
    /// Username or email
    pub username: String,
    pub password: String,
}

/// Input for a logged-in password change
#[derive(Debug, Clone, Default)]
pub struct ChangePasswordInput {
    pub old_password: String,
    pub new_password1: String,
    pub new_password2: String,
}

/// Input for setting a new password from a reset link
#[derive(Debug, Clone, Default)]
pub struct SetPasswordInput {
    pub new_password1: String,
    pub new_password2: String,
}

/// Which side of the follow graph to list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connections {
    Followers,
    Followings,
}

impl std::str::FromStr for Connections {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "followers" => Ok(Connections::Followers),
            "followings" => Ok(Connections::Followings),
            _ => Err(()),
        }
    }
}

/// Everything a profile page shows
#[derive(Debug, Clone, Serialize)]
pub struct ProfilePage {
    pub user: User,
    pub profile: UserProfile,
    pub stats: UserStats,
    /// Whether the viewer follows this user
    pub is_following: bool,
}

/// User service for accounts, sessions and follows
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    profile_repo: Arc<dyn ProfileRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    uploads: UploadStore,
    mail: MailQueue,
    activation_tokens: TokenGenerator,
    reset_tokens: TokenGenerator,
    session_days: i64,
    require_email_verification: bool,
    public_url: String,
}

impl UserService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        profile_repo: Arc<dyn ProfileRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        uploads: UploadStore,
        mail: MailQueue,
        auth: &AuthConfig,
        public_url: &str,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            profile_repo,
            category_repo,
            uploads,
            mail,
            activation_tokens: TokenGenerator::new(
                &auth.secret_key,
                TokenPurpose::Activation,
                auth.token_valid_days,
            ),
            reset_tokens: TokenGenerator::new(
                &auth.secret_key,
                TokenPurpose::PasswordReset,
                auth.token_valid_days,
            ),
            session_days: auth.session_days,
            require_email_verification: auth.require_email_verification,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    // ========================================================================
    // Registration and activation
    // ========================================================================

    /// Register a new account.
    ///
    /// When email verification is required the account starts inactive and an
    /// activation link is queued for delivery.
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let mut errors = FieldErrors::new();

        let username = errors.require("username", &input.username).to_string();
        if !username.is_empty() {
            if username.chars().count() > MAX_USERNAME_LEN || !USERNAME_RE.is_match(&username) {
                errors.add(
                    "username",
                    "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
                );
            } else if self
                .user_repo
                .get_by_username(&username)
                .await
                .context("Failed to check username")?
                .is_some()
            {
                errors.add("username", "A user with that username already exists.");
            }
        }

        let email = errors.require("email", &input.email).to_string();
        if !email.is_empty() {
            if !looks_like_email(&email) {
                errors.add("email", "Enter a valid email address.");
            } else if self
                .user_repo
                .get_by_email(&email)
                .await
                .context("Failed to check email")?
                .is_some()
            {
                errors.add("email", "User with this Email already exists.");
            }
        }

        errors.require("first_name", &input.first_name);
        errors.require("last_name", &input.last_name);

        let gender = match input.gender.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
            Some(code) => code.parse::<Gender>().unwrap_or_else(|_| {
                errors.add("gender", format!("Select a valid choice. {} is not one of the available choices.", code));
                Gender::default()
            }),
            None => Gender::default(),
        };

        let mut interests = Vec::new();
        for id in &input.interests {
            match self.category_repo.get_by_id(*id).await.context("Failed to check interest")? {
                Some(category) => interests.push(category.id),
                None => errors.add(
                    "interest",
                    format!("Select a valid choice. {} is not one of the available choices.", id),
                ),
            }
        }

        if input.password.is_empty() {
            errors.add("password", "This field is required.");
        } else if input.password != input.confirm_password {
            errors.add("password", PASSWORD_MISMATCH);
        } else {
            for problem in password_problems(&input.password, &username) {
                errors.add("password", problem);
            }
        }
        errors.into_result()?;

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let mut user = User::new(username, email, password_hash, &input.first_name, &input.last_name);
        user.gender = gender;
        user.is_active = !self.require_email_verification;

        let user = self.user_repo.create(&user).await.context("Failed to create user")?;
        self.user_repo
            .set_interests(user.id, &interests)
            .await
            .context("Failed to save interests")?;

        if self.require_email_verification {
            self.mail.enqueue(MailJob {
                to: user.email.clone(),
                subject: "VERIFY YOUR EMAIL".to_string(),
                template: VERIFICATION_TEMPLATE.to_string(),
                context: json!({
                    "domain": self.public_url,
                    "username": user.username,
                    "uid": encode_uid(user.id),
                    "token": self.activation_tokens.make_token(&user),
                }),
            });
        }

        tracing::info!("Registered user {} (id {})", user.username, user.id);
        Ok(user)
    }

    /// Activate an account from an emailed link and log it in
    pub async fn verify_email(&self, uid: &str, token: &str) -> Result<Session, UserServiceError> {
        let user = match self.user_from_uid(uid).await? {
            Some(user) if self.activation_tokens.check_token(&user, token) => user,
            _ => return Err(UserServiceError::AuthenticationError(INVALID_LINK.to_string())),
        };

        let mut user = user;
        user.is_active = true;
        let user = self.user_repo.update(&user).await.context("Failed to activate user")?;
        tracing::info!("Activated user {}", user.username);

        self.create_session(user.id).await
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Login with username (or email) and password
    pub async fn login(&self, input: LoginInput) -> Result<Session, UserServiceError> {
        let identifier = input.username.trim();
        let found = if identifier.contains('@') {
            self.user_repo.get_by_email(identifier).await
        } else {
            self.user_repo.get_by_username(identifier).await
        };
        let user = found
            .context("Failed to look up user")?
            .ok_or_else(|| UserServiceError::AuthenticationError(INVALID_LOGIN.to_string()))?;

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !password_valid {
            tracing::debug!("Failed login for {}", user.username);
            return Err(UserServiceError::AuthenticationError(INVALID_LOGIN.to_string()));
        }

        if !user.is_active {
            return Err(UserServiceError::AuthenticationError(
                "This account is inactive.".to_string(),
            ));
        }

        self.create_session(user.id).await
    }

    /// Invalidate a session
    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// The active user behind a session token, if the session is still valid
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            let _ = self.session_repo.delete(token).await;
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;
        Ok(user.filter(|u| u.is_active))
    }

    /// Delete all expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        Ok(count)
    }

    pub fn session_days(&self) -> i64 {
        self.session_days
    }

    // ========================================================================
    // Profiles
    // ========================================================================

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self.user_repo.get_by_id(id).await.context("Failed to get user by ID")?)
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to get user by username")?)
    }

    /// Profile page data for user `id` as seen by `viewer`
    pub async fn profile_page(&self, id: i64, viewer: Option<&User>) -> Result<ProfilePage, UserServiceError> {
        let user = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(format!("User {}", id)))?;
        let profile = self.profile(user.id).await?;
        let stats = self.user_repo.stats(user.id).await.context("Failed to get user stats")?;
        let is_following = match viewer {
            Some(viewer) if viewer.id != user.id => self
                .user_repo
                .is_following(viewer.id, user.id)
                .await
                .context("Failed to check follow")?,
            _ => false,
        };

        Ok(ProfilePage {
            user,
            profile,
            stats,
            is_following,
        })
    }

    /// A user's profile; empty if never edited
    pub async fn profile(&self, user_id: i64) -> Result<UserProfile, UserServiceError> {
        let profile = self
            .profile_repo
            .get(user_id)
            .await
            .context("Failed to get profile")?;
        Ok(profile.unwrap_or_else(|| UserProfile::empty(user_id)))
    }

    /// Target of an owner-only account operation addressed by username
    pub async fn owned_account(&self, requester: &User, username: &str) -> Result<User, UserServiceError> {
        let target = self
            .get_by_username(username)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(format!("User {}", username)))?;
        check_access(authorize(Some(requester), &target, Policy::OwnerOnly))?;
        Ok(target)
    }

    /// Update account and profile fields of `username`
    pub async fn update_profile(
        &self,
        requester: &User,
        username: &str,
        user_input: UpdateUserInput,
        profile_input: UpdateProfileInput,
    ) -> Result<(User, UserProfile), UserServiceError> {
        let mut user = self.owned_account(requester, username).await?;

        let mut errors = FieldErrors::new();
        errors.max_len("first_name", &user_input.first_name, 150);
        errors.max_len("last_name", &user_input.last_name, 150);
        errors.max_len("about", &profile_input.about, 500);
        errors.max_len("website", &profile_input.website, 200);
        errors.max_len("country", &profile_input.country, 100);
        errors.max_len("language", &profile_input.language, 100);
        errors.into_result()?;

        user.first_name = crate::models::title_case(user_input.first_name.trim());
        user.last_name = crate::models::title_case(user_input.last_name.trim());
        user.gender = user_input.gender;
        let user = self.user_repo.update(&user).await.context("Failed to update user")?;

        let profile = self
            .profile_repo
            .update(user.id, &profile_input)
            .await
            .context("Failed to update profile")?;
        Ok((user, profile))
    }

    /// Store a new profile or cover picture for `username`
    pub async fn set_picture(
        &self,
        requester: &User,
        username: &str,
        kind: PictureKind,
        file: &IncomingFile,
    ) -> Result<String, UserServiceError> {
        let user = self.owned_account(requester, username).await?;
        let field = match kind {
            PictureKind::Profile => "profile_picture",
            PictureKind::Cover => "cover_picture",
        };

        let path = match self.uploads.store_picture(kind, &user.username, user.id, file).await {
            Ok(path) => path,
            Err(UploadError::Storage(e)) => return Err(e.into()),
            Err(e) => return Err(FieldErrors::single(field, e.to_string()).into()),
        };
        self.profile_repo
            .set_picture(user.id, kind, &path)
            .await
            .context("Failed to save picture")?;
        Ok(path)
    }

    // ========================================================================
    // Passwords
    // ========================================================================

    /// Change the password of a logged-in user; other sessions are revoked
    pub async fn change_password(
        &self,
        user: &User,
        current_session: &str,
        input: ChangePasswordInput,
    ) -> Result<User, UserServiceError> {
        let mut errors = FieldErrors::new();
        if !verify_password(&input.old_password, &user.password_hash)
            .context("Failed to verify password")?
        {
            errors.add(
                "old_password",
                "Your old password was entered incorrectly. Please enter it again.",
            );
        }
        check_new_password(&mut errors, &input.new_password1, &input.new_password2, &user.username);
        errors.into_result()?;

        let mut updated = user.clone();
        updated.password_hash = hash_password(&input.new_password1).context("Failed to hash password")?;
        let updated = self.user_repo.update(&updated).await.context("Failed to update password")?;

        let revoked = self
            .session_repo
            .delete_by_user(user.id, Some(current_session))
            .await
            .context("Failed to revoke sessions")?;
        tracing::info!("Password changed for {}, revoked {} other sessions", user.username, revoked);
        Ok(updated)
    }

    /// Email a reset link to the active account with this address.
    ///
    /// Unknown addresses are accepted silently.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), UserServiceError> {
        let email = email.trim();
        if !looks_like_email(email) {
            return Err(FieldErrors::single("email", "Enter a valid email address.").into());
        }

        let Some(user) = self
            .user_repo
            .get_by_email(email)
            .await
            .context("Failed to look up email")?
            .filter(|u| u.is_active)
        else {
            tracing::debug!("Password reset requested for unknown address");
            return Ok(());
        };

        self.mail.enqueue(MailJob {
            to: user.email.clone(),
            subject: "PASSWORD RESET".to_string(),
            template: PASSWORD_RESET_TEMPLATE.to_string(),
            context: json!({
                "domain": self.public_url,
                "username": user.username,
                "uid": encode_uid(user.id),
                "token": self.reset_tokens.make_token(&user),
            }),
        });
        Ok(())
    }

    /// The user a reset link belongs to, if the link is still valid
    pub async fn check_reset_link(&self, uidb64: &str, token: &str) -> Result<Option<User>, UserServiceError> {
        let user = self.user_from_uid(uidb64).await?;
        Ok(user.filter(|u| u.is_active && self.reset_tokens.check_token(u, token)))
    }

    /// Set a new password from a reset link; all sessions are revoked
    pub async fn reset_password(
        &self,
        uidb64: &str,
        token: &str,
        input: SetPasswordInput,
    ) -> Result<(), UserServiceError> {
        let mut user = self
            .check_reset_link(uidb64, token)
            .await?
            .ok_or_else(|| UserServiceError::AuthenticationError(INVALID_LINK.to_string()))?;

        let mut errors = FieldErrors::new();
        check_new_password(&mut errors, &input.new_password1, &input.new_password2, &user.username);
        errors.into_result()?;

        user.password_hash = hash_password(&input.new_password1).context("Failed to hash password")?;
        self.user_repo.update(&user).await.context("Failed to update password")?;
        self.session_repo
            .delete_by_user(user.id, None)
            .await
            .context("Failed to revoke sessions")?;
        tracing::info!("Password reset for {}", user.username);
        Ok(())
    }

    // ========================================================================
    // Account deletion
    // ========================================================================

    /// Deactivate the account and end all of its sessions
    pub async fn deactivate(&self, requester: &User, username: &str) -> Result<(), UserServiceError> {
        let mut user = self.owned_account(requester, username).await?;
        user.is_active = false;
        self.user_repo.update(&user).await.context("Failed to deactivate user")?;
        self.session_repo
            .delete_by_user(user.id, None)
            .await
            .context("Failed to revoke sessions")?;
        tracing::info!("Deactivated user {}", user.username);
        Ok(())
    }

    // ========================================================================
    // Social graph
    // ========================================================================

    /// Users whose username or email contains `term`, excluding the requester
    pub async fn search(&self, requester: &User, term: &str) -> Result<Vec<User>, UserServiceError> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .user_repo
            .search(term, Some(requester.id))
            .await
            .context("Failed to search users")?)
    }

    /// Follow `target_id`, or unfollow if already following.
    ///
    /// Returns whether the requester follows the target afterwards.
    pub async fn toggle_follow(&self, requester: &User, target_id: i64) -> Result<bool, UserServiceError> {
        if requester.id == target_id {
            return Err(UserServiceError::Forbidden("You cannot follow yourself.".to_string()));
        }
        let target = self
            .get_by_id(target_id)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(format!("User {}", target_id)))?;

        if self
            .user_repo
            .unfollow(requester.id, target.id)
            .await
            .context("Failed to unfollow")?
        {
            tracing::debug!("{} unfollowed {}", requester.username, target.username);
            return Ok(false);
        }
        self.user_repo
            .follow(requester.id, target.id)
            .await
            .context("Failed to follow")?;
        tracing::debug!("{} followed {}", requester.username, target.username);
        Ok(true)
    }

    /// Followers or followings of `username`; empty for unknown users
    pub async fn connections(&self, username: &str, which: Connections) -> Result<Vec<User>, UserServiceError> {
        let Some(user) = self.get_by_username(username).await? else {
            return Ok(Vec::new());
        };
        let users = match which {
            Connections::Followers => self.user_repo.followers(user.id).await,
            Connections::Followings => self.user_repo.following(user.id).await,
        };
        Ok(users.context("Failed to list connections")?)
    }

    /// Category IDs the user picked as interests
    pub async fn interest_ids(&self, user_id: i64) -> Result<Vec<i64>, UserServiceError> {
        Ok(self
            .user_repo
            .interest_ids(user_id)
            .await
            .context("Failed to get interests")?)
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let session = Session::new(user_id, self.session_days);
        let session = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        Ok(session)
    }

    async fn user_from_uid(&self, uid: &str) -> Result<Option<User>, UserServiceError> {
        let Some(id) = decode_uid(uid) else {
            return Ok(None);
        };
        self.get_by_id(id).await
    }
}

fn check_new_password(errors: &mut FieldErrors, password1: &str, password2: &str, username: &str) {
    if password1.is_empty() {
        errors.add("new_password1", "This field is required.");
    } else if password1 != password2 {
        errors.add("new_password2", "The two password fields didn't match.");
    } else {
        for problem in password_problems(password1, username) {
            errors.add("new_password2", problem);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadConfig;
    use crate::db::repositories::{
        SqlxCategoryRepository, SqlxProfileRepository, SqlxSessionRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::Category;
    use tempfile::TempDir;
    use tokio::sync::mpsc::UnboundedReceiver;

    const PASSWORD: &str = "correct-horse-battery";

    struct Fixture {
        pool: DynDatabasePool,
        service: UserService,
        outbox: UnboundedReceiver<MailJob>,
        _media: TempDir,
    }

    async fn setup_with(require_email_verification: bool) -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");

        let media = TempDir::new().unwrap();
        let uploads = UploadStore::new(UploadConfig {
            path: media.path().to_path_buf(),
            ..UploadConfig::default()
        });
        let (mail, outbox) = MailQueue::channel();
        let auth = AuthConfig {
            require_email_verification,
            ..AuthConfig::default()
        };

        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            SqlxProfileRepository::boxed(pool.clone()),
            SqlxCategoryRepository::boxed(pool.clone()),
            uploads,
            mail,
            &auth,
            "http://localhost:8000/",
        );
        Fixture {
            pool,
            service,
            outbox,
            _media: media,
        }
    }

    async fn setup() -> Fixture {
        setup_with(false).await
    }

    fn register_input(username: &str) -> RegisterInput {
        RegisterInput {
            username: username.to_string(),
            first_name: "jane".into(),
            last_name: "doe".into(),
            email: format!("{}@example.com", username),
            gender: Some("F".into()),
            interests: Vec::new(),
            password: PASSWORD.into(),
            confirm_password: PASSWORD.into(),
        }
    }

    fn login_input(username: &str, password: &str) -> LoginInput {
        LoginInput {
            username: username.into(),
            password: password.into(),
        }
    }

    fn validation_errors(result: Result<impl std::fmt::Debug, UserServiceError>) -> FieldErrors {
        match result {
            Err(UserServiceError::ValidationError(errors)) => errors,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let f = setup().await;
        let user = f.service.register(register_input("jane")).await.unwrap();
        assert!(user.is_active);
        assert_eq!(user.first_name, "Jane");
        assert_eq!(user.gender, Gender::Female);
        assert_ne!(user.password_hash, PASSWORD);

        let session = f.service.login(login_input("jane", PASSWORD)).await.unwrap();
        let current = f.service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(current.id, user.id);

        // Email works as the identifier too.
        assert!(f.service.login(login_input("jane@example.com", PASSWORD)).await.is_ok());
    }

    #[tokio::test]
    async fn test_register_password_mismatch() {
        let f = setup().await;
        let mut input = register_input("jane");
        input.confirm_password = "something-else".into();

        let errors = validation_errors(f.service.register(input).await);
        assert_eq!(errors.get("password"), Some(&[PASSWORD_MISMATCH.to_string()][..]));
    }

    #[tokio::test]
    async fn test_register_duplicates_and_required_fields() {
        let f = setup().await;
        f.service.register(register_input("jane")).await.unwrap();

        let mut input = register_input("jane");
        input.email = "JANE@example.com".into();
        input.first_name = " ".into();
        let errors = validation_errors(f.service.register(input).await);
        assert!(errors.get("username").is_some());
        assert!(errors.get("email").is_some());
        assert!(errors.get("first_name").is_some());
        assert!(errors.get("last_name").is_none());
    }

    #[tokio::test]
    async fn test_register_rejects_bad_username_and_weak_password() {
        let f = setup().await;
        let mut input = register_input("jane doe");
        input.password = "1234".into();
        input.confirm_password = "1234".into();

        let errors = validation_errors(f.service.register(input).await);
        assert!(errors.get("username").is_some());
        assert_eq!(errors.get("password").map(|m| m.len()), Some(2));
    }

    #[tokio::test]
    async fn test_register_with_interests() {
        let f = setup().await;
        let category = SqlxCategoryRepository::new(f.pool.clone())
            .get_or_create(&Category::new("travel"))
            .await
            .unwrap();

        let mut input = register_input("jane");
        input.interests = vec![category.id];
        let user = f.service.register(input).await.unwrap();
        assert_eq!(f.service.interest_ids(user.id).await.unwrap(), vec![category.id]);

        let mut input = register_input("john");
        input.interests = vec![999];
        let errors = validation_errors(f.service.register(input).await);
        assert!(errors.get("interest").is_some());
    }

    #[tokio::test]
    async fn test_email_verification_flow() {
        let mut f = setup_with(true).await;
        let user = f.service.register(register_input("jane")).await.unwrap();
        assert!(!user.is_active);

        // Inactive accounts cannot log in.
        assert!(matches!(
            f.service.login(login_input("jane", PASSWORD)).await,
            Err(UserServiceError::AuthenticationError(_))
        ));

        let job = f.outbox.try_recv().expect("activation email queued");
        assert_eq!(job.to, "jane@example.com");
        assert_eq!(job.template, VERIFICATION_TEMPLATE);
        assert_eq!(job.context["domain"], "http://localhost:8000");
        let uid = job.context["uid"].as_str().unwrap().to_string();
        let token = job.context["token"].as_str().unwrap().to_string();

        assert!(f.service.verify_email(&uid, "bogus-token").await.is_err());
        let session = f.service.verify_email(&uid, &token).await.unwrap();
        assert_eq!(session.user_id, user.id);
        assert!(f.service.login(login_input("jane", PASSWORD)).await.is_ok());

        // The link is single use: activation changed the signed state.
        assert!(f.service.verify_email(&uid, &token).await.is_err());
    }

    #[tokio::test]
    async fn test_login_failures() {
        let f = setup().await;
        f.service.register(register_input("jane")).await.unwrap();

        assert!(matches!(
            f.service.login(login_input("jane", "wrong-password")).await,
            Err(UserServiceError::AuthenticationError(_))
        ));
        assert!(matches!(
            f.service.login(login_input("nobody", PASSWORD)).await,
            Err(UserServiceError::AuthenticationError(_))
        ));
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let f = setup().await;
        f.service.register(register_input("jane")).await.unwrap();
        let session = f.service.login(login_input("jane", PASSWORD)).await.unwrap();

        f.service.logout(&session.id).await.unwrap();
        assert!(f.service.validate_session(&session.id).await.unwrap().is_none());
        // Unknown sessions log out quietly.
        f.service.logout("missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_change_password_revokes_other_sessions() {
        let f = setup().await;
        let user = f.service.register(register_input("jane")).await.unwrap();
        let current = f.service.login(login_input("jane", PASSWORD)).await.unwrap();
        let other = f.service.login(login_input("jane", PASSWORD)).await.unwrap();

        let wrong_old = ChangePasswordInput {
            old_password: "nope".into(),
            new_password1: "brand-new-secret".into(),
            new_password2: "brand-new-secret".into(),
        };
        let errors = validation_errors(f.service.change_password(&user, &current.id, wrong_old).await);
        assert!(errors.get("old_password").is_some());

        let input = ChangePasswordInput {
            old_password: PASSWORD.into(),
            new_password1: "brand-new-secret".into(),
            new_password2: "brand-new-secret".into(),
        };
        f.service.change_password(&user, &current.id, input).await.unwrap();

        assert!(f.service.validate_session(&current.id).await.unwrap().is_some());
        assert!(f.service.validate_session(&other.id).await.unwrap().is_none());
        assert!(f.service.login(login_input("jane", "brand-new-secret")).await.is_ok());
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let mut f = setup().await;
        f.service.register(register_input("jane")).await.unwrap();
        let session = f.service.login(login_input("jane", PASSWORD)).await.unwrap();

        // Unknown addresses are accepted without sending anything.
        f.service.request_password_reset("ghost@example.com").await.unwrap();
        assert!(f.outbox.try_recv().is_err());

        f.service.request_password_reset("jane@example.com").await.unwrap();
        let job = f.outbox.try_recv().expect("reset email queued");
        assert_eq!(job.template, PASSWORD_RESET_TEMPLATE);
        let uid = job.context["uid"].as_str().unwrap().to_string();
        let token = job.context["token"].as_str().unwrap().to_string();

        assert!(f.service.check_reset_link(&uid, &token).await.unwrap().is_some());
        let mismatch = SetPasswordInput {
            new_password1: "another-secret".into(),
            new_password2: "different-secret".into(),
        };
        assert!(matches!(
            f.service.reset_password(&uid, &token, mismatch).await,
            Err(UserServiceError::ValidationError(_))
        ));

        let input = SetPasswordInput {
            new_password1: "another-secret".into(),
            new_password2: "another-secret".into(),
        };
        f.service.reset_password(&uid, &token, input.clone()).await.unwrap();
        assert!(f.service.validate_session(&session.id).await.unwrap().is_none());
        assert!(f.service.login(login_input("jane", "another-secret")).await.is_ok());

        // Used links stop working.
        assert!(f.service.check_reset_link(&uid, &token).await.unwrap().is_none());
        assert!(matches!(
            f.service.reset_password(&uid, &token, input).await,
            Err(UserServiceError::AuthenticationError(_))
        ));
    }

    #[tokio::test]
    async fn test_deactivate_account() {
        let f = setup().await;
        let jane = f.service.register(register_input("jane")).await.unwrap();
        let john = f.service.register(register_input("john")).await.unwrap();
        let session = f.service.login(login_input("jane", PASSWORD)).await.unwrap();

        assert!(matches!(
            f.service.deactivate(&john, "jane").await,
            Err(UserServiceError::Forbidden(_))
        ));

        f.service.deactivate(&jane, "jane").await.unwrap();
        assert!(f.service.validate_session(&session.id).await.unwrap().is_none());
        assert!(f.service.login(login_input("jane", PASSWORD)).await.is_err());
        assert!(f.service.search(&john, "jane").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_profile_owner_only() {
        let f = setup().await;
        let jane = f.service.register(register_input("jane")).await.unwrap();
        let john = f.service.register(register_input("john")).await.unwrap();

        let user_input = UpdateUserInput {
            first_name: "JANET".into(),
            last_name: "smith".into(),
            gender: Gender::Others,
        };
        let profile_input = UpdateProfileInput {
            about: "Photographer".into(),
            website: "https://example.com".into(),
            country: "Kenya".into(),
            language: "English".into(),
        };

        assert!(matches!(
            f.service
                .update_profile(&john, "jane", user_input.clone(), profile_input.clone())
                .await,
            Err(UserServiceError::Forbidden(_))
        ));

        let (user, profile) = f
            .service
            .update_profile(&jane, "jane", user_input, profile_input)
            .await
            .unwrap();
        assert_eq!(user.full_name(), "Janet Smith");
        assert_eq!(profile.about, "Photographer");

        let page = f.service.profile_page(jane.id, Some(&john)).await.unwrap();
        assert_eq!(page.profile.country, "Kenya");
        assert!(!page.is_following);
    }

    #[tokio::test]
    async fn test_set_picture() {
        let f = setup().await;
        let jane = f.service.register(register_input("jane")).await.unwrap();
        let file = IncomingFile {
            file_name: "me.png".into(),
            content_type: "image/png".into(),
            bytes: b"png".to_vec(),
        };

        let path = f
            .service
            .set_picture(&jane, "jane", PictureKind::Profile, &file)
            .await
            .unwrap();
        assert_eq!(path, format!("profile_pictures/jane_profile_picture_{}.png", jane.id));
        assert_eq!(f.service.profile(jane.id).await.unwrap().profile_picture, Some(path));

        let bad = IncomingFile {
            content_type: "text/plain".into(),
            ..file
        };
        let errors = validation_errors(f.service.set_picture(&jane, "jane", PictureKind::Cover, &bad).await);
        assert!(errors.get("cover_picture").is_some());
    }

    #[tokio::test]
    async fn test_toggle_follow_and_connections() {
        let f = setup().await;
        let jane = f.service.register(register_input("jane")).await.unwrap();
        let john = f.service.register(register_input("john")).await.unwrap();

        assert!(f.service.toggle_follow(&jane, john.id).await.unwrap());
        let followers = f.service.connections("john", Connections::Followers).await.unwrap();
        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].username, "jane");
        let followings = f.service.connections("jane", Connections::Followings).await.unwrap();
        assert_eq!(followings[0].username, "john");

        let page = f.service.profile_page(john.id, Some(&jane)).await.unwrap();
        assert!(page.is_following);
        assert_eq!(page.stats.followers, 1);

        assert!(!f.service.toggle_follow(&jane, john.id).await.unwrap());
        assert!(f.service.connections("john", Connections::Followers).await.unwrap().is_empty());

        assert!(matches!(
            f.service.toggle_follow(&jane, jane.id).await,
            Err(UserServiceError::Forbidden(_))
        ));
        assert!(matches!(
            f.service.toggle_follow(&jane, 999).await,
            Err(UserServiceError::NotFound(_))
        ));
        assert!(f.service.connections("ghost", Connections::Followers).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_excludes_self() {
        let f = setup().await;
        let jane = f.service.register(register_input("jane")).await.unwrap();
        f.service.register(register_input("janet")).await.unwrap();

        let found = f.service.search(&jane, "JAN").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username, "janet");
        assert!(f.service.search(&jane, "   ").await.unwrap().is_empty());
    }

    #[test]
    fn test_connections_from_str() {
        assert_eq!("followers".parse(), Ok(Connections::Followers));
        assert_eq!("followings".parse(), Ok(Connections::Followings));
        assert!("friends".parse::<Connections>().is_err());
    }
}
