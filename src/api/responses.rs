//! Error responses
//!
//! Handlers return [`AppError`] for anything that is not a form error. The
//! error turns into a bare HTML page carrying an [`ErrorPage`] extension; the
//! `render_error_pages` middleware swaps that body for the site's error
//! template once the current user is known.

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};

use crate::services::{
    BoardServiceError, CategoryServiceError, PinServiceError, UserServiceError,
};
use crate::templates::{simple_error_page, TemplateError};

/// Status and message of an error page waiting to be rendered
#[derive(Debug, Clone)]
pub struct ErrorPage {
    pub status: StatusCode,
    pub message: String,
}

/// HTTP-level error
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// No session on a login-required route; carries the path to return to
    #[error("Login required for {0}")]
    LoginRequired(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found() -> Self {
        AppError::NotFound("The page you are looking for does not exist.".to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::LoginRequired(next) => {
                let location = format!("/login?next={}", urlencoding::encode(&next));
                return Redirect::to(&location).into_response();
            }
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong on our side. Please try again later.".to_string(),
                )
            }
        };

        let mut response = (status, Html(simple_error_page(status.as_u16(), &message))).into_response();
        response.extensions_mut().insert(ErrorPage { status, message });
        response
    }
}

impl From<UserServiceError> for AppError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::ValidationError(errors) => AppError::BadRequest(errors.to_string()),
            UserServiceError::AuthenticationError(message) => AppError::BadRequest(message),
            UserServiceError::NotFound(_) => AppError::not_found(),
            UserServiceError::Forbidden(reason) => AppError::Forbidden(reason),
            UserServiceError::InternalError(e) => AppError::Internal(e),
        }
    }
}

impl From<PinServiceError> for AppError {
    fn from(e: PinServiceError) -> Self {
        match e {
            PinServiceError::ValidationError(errors) => AppError::BadRequest(errors.to_string()),
            PinServiceError::NotFound(_) => AppError::not_found(),
            PinServiceError::Forbidden(reason) => AppError::Forbidden(reason),
            PinServiceError::InternalError(e) => AppError::Internal(e),
        }
    }
}

impl From<BoardServiceError> for AppError {
    fn from(e: BoardServiceError) -> Self {
        match e {
            BoardServiceError::ValidationError(errors) => AppError::BadRequest(errors.to_string()),
            BoardServiceError::NotFound(_) => AppError::not_found(),
            BoardServiceError::Forbidden(reason) => AppError::Forbidden(reason),
            BoardServiceError::InternalError(e) => AppError::Internal(e),
        }
    }
}

impl From<CategoryServiceError> for AppError {
    fn from(e: CategoryServiceError) -> Self {
        match e {
            CategoryServiceError::ValidationError(message) => AppError::BadRequest(message),
            CategoryServiceError::InternalError(e) => AppError::Internal(e),
        }
    }
}

impl From<TemplateError> for AppError {
    fn from(e: TemplateError) -> Self {
        AppError::Internal(anyhow::Error::new(e))
    }
}
