//! Account endpoints
//!
//! Registration, email verification, login/logout and the password flows.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Extension, Form, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tera::Context as TeraContext;

use crate::api::forms::{errors_json, safe_next, FormFields};
use crate::api::middleware::{
    session_cookie, AppState, AuthenticatedUser, MaybeUser, SessionToken, CLEAR_SESSION_COOKIE,
};
use crate::api::responses::AppError;
use crate::models::{Gender, Session};
use crate::services::{
    ChangePasswordInput, FieldErrors, LoginInput, RegisterInput, SetPasswordInput, UserServiceError,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", get(registration_page).post(register))
        .route("/login", get(login_page).post(login))
        .route("/logout", get(logout).post(logout))
        .route("/user/email-verification/{uid}/{token}", get(verify_email))
        .route("/user/change-password", get(change_password_page).post(change_password))
        .route("/user/password-reset", get(password_reset_page).post(password_reset))
        .route("/user/password-reset/done", get(password_reset_done))
        .route("/user/reset/done", get(password_reset_complete))
        .route(
            "/user/reset/{uidb64}/{token}",
            get(password_reset_confirm_page).post(password_reset_confirm),
        )
}

/// Gender choices for select boxes
pub(crate) fn gender_choices() -> Vec<Value> {
    Gender::ALL
        .iter()
        .map(|g| json!({ "code": g.code(), "label": g.label() }))
        .collect()
}

/// Redirect carrying a fresh session cookie
fn login_redirect(session: &Session, days: i64, to: &str) -> Response {
    (
        [(header::SET_COOKIE, session_cookie(&session.id, days))],
        Redirect::to(to),
    )
        .into_response()
}

fn empty_form() -> TeraContext {
    let mut context = TeraContext::new();
    context.insert("form", &json!({}));
    context.insert("errors", &json!({}));
    context
}

// ============================================================================
// Registration
// ============================================================================

async fn registration_context(state: &AppState) -> Result<TeraContext, AppError> {
    let mut context = empty_form();
    context.insert("genders", &gender_choices());
    context.insert("categories", &state.category_service.list().await?);
    Ok(context)
}

/// GET /register
async fn registration_page(
    State(state): State<AppState>,
    user: MaybeUser,
    uri: Uri,
) -> Result<Response, AppError> {
    if user.get().is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    let context = registration_context(&state).await?;
    Ok(state.page("user_account/registration.html", &context, None, uri.path())?.into_response())
}

/// POST /register
async fn register(
    State(state): State<AppState>,
    uri: Uri,
    Form(form): Form<FormFields>,
) -> Result<Response, AppError> {
    let mut interests = Vec::new();
    for value in form.all("interests") {
        match value.parse::<i64>() {
            Ok(id) => interests.push(id),
            Err(_) => return Err(AppError::BadRequest(format!("Invalid interest '{}'", value))),
        }
    }

    let input = RegisterInput {
        username: form.get("username").to_string(),
        first_name: form.get("first_name").to_string(),
        last_name: form.get("last_name").to_string(),
        email: form.get("email").to_string(),
        gender: Some(form.get("gender").to_string()),
        interests,
        password: form.get("password").to_string(),
        confirm_password: form.get("confirm_password").to_string(),
    };

    match state.user_service.register(input).await {
        Ok(user) if !user.is_active => {
            let mut context = TeraContext::new();
            context.insert("email", &user.email);
            Ok(state.page("user_account/registration_done.html", &context, None, uri.path())?.into_response())
        }
        Ok(_) => Ok(Redirect::to("/login").into_response()),
        Err(UserServiceError::ValidationError(errors)) => {
            let mut context = registration_context(&state).await?;
            context.insert("form", &form.to_json(&["password", "confirm_password"]));
            state.invalid_form("user_account/registration.html", context, &errors, None, uri.path())
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /user/email-verification/{uid}/{token}
async fn verify_email(
    State(state): State<AppState>,
    Path((uid, token)): Path<(String, String)>,
    uri: Uri,
) -> Result<Response, AppError> {
    match state.user_service.verify_email(&uid, &token).await {
        Ok(session) => Ok(login_redirect(&session, state.user_service.session_days(), "/")),
        Err(UserServiceError::AuthenticationError(_)) => {
            let html = state.page(
                "user_account/email_verification_failed.html",
                &TeraContext::new(),
                None,
                uri.path(),
            )?;
            Ok((StatusCode::BAD_REQUEST, html).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Login / logout
// ============================================================================

#[derive(Debug, Deserialize)]
struct NextQuery {
    #[serde(default)]
    next: String,
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    next: String,
}

/// GET /login
async fn login_page(
    State(state): State<AppState>,
    user: MaybeUser,
    uri: Uri,
    Query(query): Query<NextQuery>,
) -> Result<Response, AppError> {
    if user.get().is_some() {
        return Ok(Redirect::to(safe_next(&query.next).unwrap_or("/")).into_response());
    }
    let mut context = empty_form();
    context.insert("next", &query.next);
    Ok(state.page("user_account/login.html", &context, None, uri.path())?.into_response())
}

/// POST /login
async fn login(
    State(state): State<AppState>,
    uri: Uri,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let input = LoginInput {
        username: form.username.clone(),
        password: form.password,
    };

    match state.user_service.login(input).await {
        Ok(session) => {
            let to = safe_next(&form.next).unwrap_or("/");
            Ok(login_redirect(&session, state.user_service.session_days(), to))
        }
        Err(UserServiceError::AuthenticationError(message)) => {
            let mut context = TeraContext::new();
            context.insert("form", &json!({ "username": form.username }));
            context.insert("next", &form.next);
            let errors = FieldErrors::single(FieldErrors::FORM, message);
            state.invalid_form("user_account/login.html", context, &errors, None, uri.path())
        }
        Err(e) => Err(e.into()),
    }
}

/// GET|POST /logout
async fn logout(
    State(state): State<AppState>,
    token: Option<Extension<SessionToken>>,
) -> Result<Response, AppError> {
    if let Some(Extension(SessionToken(token))) = token {
        state.user_service.logout(&token).await?;
    }
    Ok((
        [(header::SET_COOKIE, CLEAR_SESSION_COOKIE)],
        Redirect::to("/login"),
    )
        .into_response())
}

// ============================================================================
// Change password
// ============================================================================

/// GET /user/change-password
async fn change_password_page(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    uri: Uri,
) -> Result<Response, AppError> {
    Ok(state
        .page("user_account/change_password.html", &empty_form(), Some(&user), uri.path())?
        .into_response())
}

#[derive(Debug, Deserialize)]
struct ChangePasswordForm {
    #[serde(default)]
    old_password: String,
    #[serde(default)]
    new_password1: String,
    #[serde(default)]
    new_password2: String,
}

/// POST /user/change-password
async fn change_password(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Extension(SessionToken(token)): Extension<SessionToken>,
    uri: Uri,
    Form(form): Form<ChangePasswordForm>,
) -> Result<Response, AppError> {
    let input = ChangePasswordInput {
        old_password: form.old_password,
        new_password1: form.new_password1,
        new_password2: form.new_password2,
    };

    match state.user_service.change_password(&user, &token, input).await {
        Ok(user) => Ok(Redirect::to(&format!("/user/profile/{}", user.id)).into_response()),
        Err(UserServiceError::ValidationError(errors)) => state.invalid_form(
            "user_account/change_password.html",
            empty_form(),
            &errors,
            Some(&user),
            uri.path(),
        ),
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Password reset
// ============================================================================

/// GET /user/password-reset
async fn password_reset_page(
    State(state): State<AppState>,
    user: MaybeUser,
    uri: Uri,
) -> Result<Response, AppError> {
    Ok(state
        .page("user_account/password_reset.html", &empty_form(), user.get(), uri.path())?
        .into_response())
}

#[derive(Debug, Deserialize)]
struct PasswordResetForm {
    #[serde(default)]
    email: String,
}

/// POST /user/password-reset
async fn password_reset(
    State(state): State<AppState>,
    user: MaybeUser,
    uri: Uri,
    Form(form): Form<PasswordResetForm>,
) -> Result<Response, AppError> {
    match state.user_service.request_password_reset(&form.email).await {
        Ok(()) => Ok(Redirect::to("/user/password-reset/done").into_response()),
        Err(UserServiceError::ValidationError(errors)) => {
            let mut context = TeraContext::new();
            context.insert("form", &json!({ "email": form.email }));
            state.invalid_form("user_account/password_reset.html", context, &errors, user.get(), uri.path())
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /user/password-reset/done
async fn password_reset_done(
    State(state): State<AppState>,
    user: MaybeUser,
    uri: Uri,
) -> Result<Response, AppError> {
    Ok(state
        .page("user_account/password_reset_done.html", &TeraContext::new(), user.get(), uri.path())?
        .into_response())
}

/// GET /user/reset/{uidb64}/{token}
async fn password_reset_confirm_page(
    State(state): State<AppState>,
    user: MaybeUser,
    Path((uidb64, token)): Path<(String, String)>,
    uri: Uri,
) -> Result<Response, AppError> {
    let valid_link = state.user_service.check_reset_link(&uidb64, &token).await?.is_some();
    let mut context = empty_form();
    context.insert("valid_link", &valid_link);
    Ok(state
        .page("user_account/password_reset_confirm.html", &context, user.get(), uri.path())?
        .into_response())
}

#[derive(Debug, Deserialize)]
struct SetPasswordForm {
    #[serde(default)]
    new_password1: String,
    #[serde(default)]
    new_password2: String,
}

/// POST /user/reset/{uidb64}/{token}
async fn password_reset_confirm(
    State(state): State<AppState>,
    user: MaybeUser,
    Path((uidb64, token)): Path<(String, String)>,
    uri: Uri,
    Form(form): Form<SetPasswordForm>,
) -> Result<Response, AppError> {
    let input = SetPasswordInput {
        new_password1: form.new_password1,
        new_password2: form.new_password2,
    };

    let mut context = TeraContext::new();
    match state.user_service.reset_password(&uidb64, &token, input).await {
        Ok(()) => Ok(Redirect::to("/user/reset/done").into_response()),
        Err(UserServiceError::ValidationError(errors)) => {
            context.insert("valid_link", &true);
            state.invalid_form(
                "user_account/password_reset_confirm.html",
                context,
                &errors,
                user.get(),
                uri.path(),
            )
        }
        Err(UserServiceError::AuthenticationError(_)) => {
            context.insert("valid_link", &false);
            context.insert("errors", &errors_json(&FieldErrors::new()));
            let html = state.page("user_account/password_reset_confirm.html", &context, user.get(), uri.path())?;
            Ok((StatusCode::BAD_REQUEST, html).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /user/reset/done
async fn password_reset_complete(
    State(state): State<AppState>,
    user: MaybeUser,
    uri: Uri,
) -> Result<Response, AppError> {
    Ok(state
        .page("user_account/password_reset_complete.html", &TeraContext::new(), user.get(), uri.path())?
        .into_response())
}
