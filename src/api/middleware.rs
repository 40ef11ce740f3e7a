//! API middleware
//!
//! Contains the shared application state, session resolution and the
//! extractors handlers use to get at the current user.

use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use std::convert::Infallible;
use std::sync::Arc;
use tera::Context as TeraContext;

use crate::api::forms::errors_json;
use crate::api::responses::{AppError, ErrorPage};
use crate::config::Config;
use crate::db::repositories::{
    SqlxBoardRepository, SqlxCategoryRepository, SqlxPinRepository, SqlxProfileRepository,
    SqlxSavedPinRepository, SqlxSessionRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    BoardService, CategoryService, FieldErrors, MailQueue, PinService, UploadStore, UserService,
};
use crate::templates::{StandardVars, TemplateEngine};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "session";

/// Set-Cookie value that removes the session cookie
pub const CLEAR_SESSION_COOKIE: &str = "session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub templates: Arc<TemplateEngine>,
    pub user_service: Arc<UserService>,
    pub pin_service: Arc<PinService>,
    pub board_service: Arc<BoardService>,
    pub category_service: Arc<CategoryService>,
}

impl AppState {
    /// Wire repositories and services over one pool
    pub fn new(pool: DynDatabasePool, config: &Config, templates: Arc<TemplateEngine>, mail: MailQueue) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let pin_repo = SqlxPinRepository::boxed(pool.clone());
        let category_repo = SqlxCategoryRepository::boxed(pool.clone());
        let uploads = UploadStore::new(config.upload.clone());

        let category_service = Arc::new(CategoryService::new(category_repo.clone()));
        let user_service = Arc::new(UserService::new(
            user_repo.clone(),
            SqlxSessionRepository::boxed(pool.clone()),
            SqlxProfileRepository::boxed(pool.clone()),
            category_repo,
            uploads.clone(),
            mail,
            &config.auth,
            &config.server.public_url,
        ));
        let pin_service = Arc::new(PinService::new(
            pin_repo.clone(),
            SqlxSavedPinRepository::boxed(pool.clone()),
            category_service.clone(),
            uploads,
        ));
        let board_service = Arc::new(BoardService::new(
            SqlxBoardRepository::boxed(pool.clone()),
            pin_repo,
            user_repo,
        ));

        Self {
            templates,
            user_service,
            pin_service,
            board_service,
            category_service,
        }
    }

    /// Render a page with the standard variables
    pub fn page(
        &self,
        template: &str,
        context: &TeraContext,
        user: Option<&User>,
        request_path: &str,
    ) -> Result<Html<String>, AppError> {
        let vars = StandardVars {
            current_user: user,
            request_path,
        };
        Ok(Html(self.templates.render_page(template, context, &vars)?))
    }

    /// Re-render a rejected form with its field errors and status 400
    pub fn invalid_form(
        &self,
        template: &str,
        mut context: TeraContext,
        errors: &FieldErrors,
        user: Option<&User>,
        request_path: &str,
    ) -> Result<Response, AppError> {
        context.insert("errors", &errors_json(errors));
        let html = self.page(template, &context, user, request_path)?;
        Ok((StatusCode::BAD_REQUEST, html).into_response())
    }
}

/// Logged-in user; rejects with a redirect to the login page
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Current user, if any
#[derive(Debug, Clone, Default)]
pub struct MaybeUser(pub Option<User>);

impl MaybeUser {
    pub fn get(&self) -> Option<&User> {
        self.0.as_ref()
    }
}

/// Token of the session that authenticated the request
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| {
                let next = parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str().to_string())
                    .unwrap_or_else(|| "/".to_string());
                AppError::LoginRequired(next)
            })
    }
}

impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts.extensions.get::<AuthenticatedUser>().map(|u| u.0.clone()),
        ))
    }
}

/// Extract session token from request headers.
///
/// A bearer token wins over the cookie.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    for cookie_header in headers.get_all(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                if let Some((name, value)) = cookie.trim().split_once('=') {
                    if name == SESSION_COOKIE && !value.is_empty() {
                        return Some(value.to_string());
                    }
                }
            }
        }
    }

    None
}

/// Set-Cookie value for a new session
pub fn session_cookie(token: &str, days: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        days * 24 * 60 * 60
    )
}

/// Resolve the session of every request.
///
/// Valid sessions put an [`AuthenticatedUser`] and a [`SessionToken`] into
/// the request extensions; anything else leaves the request anonymous.
pub async fn resolve_user(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if let Some(token) = extract_session_token(request.headers()) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(user)) => {
                request.extensions_mut().insert(AuthenticatedUser(user));
                request.extensions_mut().insert(SessionToken(token));
            }
            Ok(None) => tracing::debug!("Ignoring unknown or expired session"),
            Err(e) => tracing::warn!("Session validation failed: {}", e),
        }
    }
    next.run(request).await
}

/// Replace bare error bodies with the error template
pub async fn render_error_pages(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let user = request.extensions().get::<AuthenticatedUser>().map(|u| u.0.clone());

    let mut response = next.run(request).await;
    let Some(page) = response.extensions_mut().remove::<ErrorPage>() else {
        return response;
    };

    let mut context = TeraContext::new();
    context.insert("status", &page.status.as_u16());
    context.insert("message", &page.message);
    match state.page("error.html", &context, user.as_ref(), &path) {
        Ok(Html(html)) => {
            *response.body_mut() = Body::from(html);
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            );
            response.headers_mut().remove(header::CONTENT_LENGTH);
            response
        }
        Err(e) => {
            tracing::warn!("Failed to render error page: {}", e);
            response
        }
    }
}

/// Fallback for unmatched routes
pub async fn not_found() -> impl IntoResponse {
    AppError::not_found()
}
