//! API layer - HTTP handlers and routing
//!
//! Server-rendered pages for:
//! - Accounts (registration, login, email verification, passwords)
//! - Users (profiles, search, follow graph)
//! - Pins (feeds, create, detail, save, category search)
//! - Boards
//!
//! Uploaded media is served under `/media`.

pub mod accounts;
pub mod boards;
pub mod forms;
pub mod middleware;
pub mod pins;
pub mod responses;
pub mod users;


use axum::{extract::DefaultBodyLimit, middleware as axum_middleware, Router};
use tower_http::{compression::CompressionLayer, services::ServeDir, trace::TraceLayer};

use crate::config::UploadConfig;

pub use middleware::{AppState, AuthenticatedUser, MaybeUser, SessionToken};
pub use responses::AppError;

/// Room for form fields next to the largest allowed file
const FORM_OVERHEAD: usize = 1024 * 1024;

/// Build the page router without state
pub fn build_page_router() -> Router<AppState> {
    Router::new()
        .merge(accounts::router())
        .merge(users::router())
        .merge(pins::router())
        .merge(boards::router())
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, upload: &UploadConfig) -> Router {
    let body_limit = usize::try_from(upload.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(FORM_OVERHEAD);

    build_page_router()
        .nest_service("/media", ServeDir::new(&upload.path))
        .fallback(middleware::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        // resolve_user must stay outside render_error_pages
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::render_error_pages,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::resolve_user,
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
