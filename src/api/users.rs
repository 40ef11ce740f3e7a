//! User endpoints
//!
//! Profiles, profile editing, account deletion, user search and the follow
//! graph. Everything here requires a session.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, Uri},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use serde_json::json;
use tera::Context as TeraContext;

use crate::api::accounts::gender_choices;
use crate::api::forms::read_multipart;
use crate::api::middleware::{AppState, AuthenticatedUser, CLEAR_SESSION_COOKIE};
use crate::api::responses::AppError;
use crate::models::{Gender, PictureKind, UpdateProfileInput, UpdateUserInput, User, UserProfile};
use crate::services::{Connections, FieldErrors, UserServiceError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user/profile/{id}", get(profile))
        .route("/user/edit-profile/{username}", get(edit_profile_page).post(edit_profile))
        .route("/user/edit-profile/{username}/pictures", post(upload_pictures))
        .route("/user/delete-account/{username}", get(delete_account_page).post(delete_account))
        .route("/user/search", get(search))
        .route("/user/follow-unfollow/{user_id}", get(follow_unfollow).post(follow_unfollow))
        .route("/user/connections/{username}/{which}", get(connections))
}

/// GET /user/profile/{id}
async fn profile(
    State(state): State<AppState>,
    AuthenticatedUser(viewer): AuthenticatedUser,
    Path(id): Path<i64>,
    uri: Uri,
) -> Result<Response, AppError> {
    let page = state.user_service.profile_page(id, Some(&viewer)).await?;
    let pins = state.pin_service.user_pins(Some(&viewer), page.user.id).await?;
    let saved_pins = state.pin_service.saved_pins(Some(&viewer), page.user.id).await?;

    let mut context = TeraContext::new();
    context.insert("is_owner", &(viewer.id == page.user.id));
    context.insert("page", &page);
    context.insert("pins", &pins);
    context.insert("saved_pins", &saved_pins);
    Ok(state.page("user_account/profile.html", &context, Some(&viewer), uri.path())?.into_response())
}

// ============================================================================
// Profile editing
// ============================================================================

fn edit_context(account: &User, profile: &UserProfile) -> TeraContext {
    let mut context = TeraContext::new();
    context.insert("account", account);
    context.insert("profile", profile);
    context.insert("genders", &gender_choices());
    context.insert("errors", &json!({}));
    context
}

/// GET /user/edit-profile/{username}
async fn edit_profile_page(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(username): Path<String>,
    uri: Uri,
) -> Result<Response, AppError> {
    let account = state.user_service.owned_account(&user, &username).await?;
    let profile = state.user_service.profile(account.id).await?;
    let context = edit_context(&account, &profile);
    Ok(state.page("user_account/edit_user.html", &context, Some(&user), uri.path())?.into_response())
}

#[derive(Debug, Deserialize)]
struct EditProfileForm {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    gender: String,
    #[serde(default)]
    about: String,
    #[serde(default)]
    website: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    language: String,
}

/// POST /user/edit-profile/{username}
async fn edit_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(username): Path<String>,
    uri: Uri,
    Form(form): Form<EditProfileForm>,
) -> Result<Response, AppError> {
    let gender: Gender = match form.gender.parse() {
        Ok(gender) => gender,
        Err(_) => {
            let errors = FieldErrors::single("gender", "Select a valid choice.");
            return rerender_edit(&state, &user, &username, &form, &errors, uri.path()).await;
        }
    };

    let user_input = UpdateUserInput {
        first_name: form.first_name.clone(),
        last_name: form.last_name.clone(),
        gender,
    };
    let profile_input = UpdateProfileInput {
        about: form.about.trim().to_string(),
        website: form.website.trim().to_string(),
        country: form.country.trim().to_string(),
        language: form.language.trim().to_string(),
    };

    match state
        .user_service
        .update_profile(&user, &username, user_input, profile_input)
        .await
    {
        Ok((account, _)) => {
            tracing::info!("Profile of {} updated", account.username);
            Ok(Redirect::to(&format!("/user/edit-profile/{}", account.username)).into_response())
        }
        Err(UserServiceError::ValidationError(errors)) => {
            rerender_edit(&state, &user, &username, &form, &errors, uri.path()).await
        }
        Err(e) => Err(e.into()),
    }
}

/// The edit form again, showing what was submitted
async fn rerender_edit(
    state: &AppState,
    user: &User,
    username: &str,
    form: &EditProfileForm,
    errors: &FieldErrors,
    path: &str,
) -> Result<Response, AppError> {
    let mut account = state.user_service.owned_account(user, username).await?;
    account.first_name = form.first_name.clone();
    account.last_name = form.last_name.clone();
    let mut profile = state.user_service.profile(account.id).await?;
    profile.about = form.about.clone();
    profile.website = form.website.clone();
    profile.country = form.country.clone();
    profile.language = form.language.clone();

    let context = edit_context(&account, &profile);
    state.invalid_form("user_account/edit_user.html", context, errors, Some(user), path)
}

/// POST /user/edit-profile/{username}/pictures
async fn upload_pictures(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(username): Path<String>,
    uri: Uri,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let form = read_multipart(multipart).await?;

    for (field, kind) in [
        ("profile_picture", PictureKind::Profile),
        ("cover_picture", PictureKind::Cover),
    ] {
        let Some(file) = form.file(field) else {
            continue;
        };
        match state.user_service.set_picture(&user, &username, kind, file).await {
            Ok(path) => tracing::info!("Stored {} for {}", path, username),
            Err(UserServiceError::ValidationError(errors)) => {
                let account = state.user_service.owned_account(&user, &username).await?;
                let profile = state.user_service.profile(account.id).await?;
                let context = edit_context(&account, &profile);
                return state.invalid_form("user_account/edit_user.html", context, &errors, Some(&user), uri.path());
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(Redirect::to(&format!("/user/edit-profile/{}", username)).into_response())
}

// ============================================================================
// Account deletion
// ============================================================================

/// GET /user/delete-account/{username}
async fn delete_account_page(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(username): Path<String>,
    uri: Uri,
) -> Result<Response, AppError> {
    let account = state.user_service.owned_account(&user, &username).await?;
    let mut context = TeraContext::new();
    context.insert("account", &account);
    Ok(state.page("user_account/delete_user.html", &context, Some(&user), uri.path())?.into_response())
}

/// POST /user/delete-account/{username}
async fn delete_account(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(username): Path<String>,
) -> Result<Response, AppError> {
    state.user_service.deactivate(&user, &username).await?;
    Ok((
        [(header::SET_COOKIE, CLEAR_SESSION_COOKIE)],
        Redirect::to("/login"),
    )
        .into_response())
}

// ============================================================================
// Search and follow graph
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search_input: String,
}

/// GET /user/search?search_input=
async fn search(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<SearchQuery>,
    uri: Uri,
) -> Result<Response, AppError> {
    let users = state.user_service.search(&user, &query.search_input).await?;
    let mut context = TeraContext::new();
    context.insert("users", &users);
    context.insert("search_input", query.search_input.trim());
    Ok(state.page("user_account/user_search_page.html", &context, Some(&user), uri.path())?.into_response())
}

/// GET|POST /user/follow-unfollow/{user_id}
async fn follow_unfollow(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(user_id): Path<i64>,
) -> Result<Response, AppError> {
    state.user_service.toggle_follow(&user, user_id).await?;
    Ok(Redirect::to(&format!("/user/profile/{}", user_id)).into_response())
}

/// GET /user/connections/{username}/{followers|followings}
async fn connections(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((username, which)): Path<(String, String)>,
    uri: Uri,
) -> Result<Response, AppError> {
    let kind: Connections = which.parse().map_err(|_| AppError::not_found())?;
    let users = state.user_service.connections(&username, kind).await?;
    let account_id = state.user_service.get_by_username(&username).await?.map(|u| u.id);

    let mut context = TeraContext::new();
    context.insert("account", &json!({ "username": username, "id": account_id }));
    context.insert("which", &which);
    context.insert("users", &users);
    Ok(state
        .page("user_account/followers_following_list.html", &context, Some(&user), uri.path())?
        .into_response())
}
