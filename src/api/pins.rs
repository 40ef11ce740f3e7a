//! Pin endpoints
//!
//! Feeds, pin creation and detail pages, save/unsave, category search and
//! adding pins to boards.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, Uri},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tera::Context as TeraContext;

use crate::api::forms::{read_multipart, referer_path};
use crate::api::middleware::{AppState, AuthenticatedUser, MaybeUser};
use crate::api::responses::AppError;
use crate::models::CreatePinInput;
use crate::services::PinServiceError;

/// Route value that marks a new pin as an idea
const IDEA_PIN: &str = "idea_pin";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/today", get(today))
        .route("/pinterest/pin/create/{input_value}", get(create_pin_page).post(create_pin))
        .route("/pinterest/pin/details/{id}", get(pin_detail))
        .route("/pinterest/pin/save-unsave-pin/{pin_id}", get(save_unsave).post(save_unsave))
        .route("/pinterest/pin/search-category", get(search_category))
        .route("/pinterest/pin/{board_id}/{pin_id}", get(add_to_board).post(add_to_board))
        .route("/pinterest/pin/{board_id}/{pin_id}/remove", post(remove_from_board))
}

// ============================================================================
// Feeds
// ============================================================================

/// GET /
async fn home(State(state): State<AppState>, user: MaybeUser, uri: Uri) -> Result<Response, AppError> {
    let pins = state.pin_service.home_feed(user.get()).await?;
    let mut context = TeraContext::new();
    context.insert("heading", if user.get().is_some() { "Home" } else { "Recent pins" });
    context.insert("pins", &pins);
    context.insert("categories", &state.category_service.list().await?);
    Ok(state.page("home.html", &context, user.get(), uri.path())?.into_response())
}

#[derive(Debug, Deserialize)]
struct TodayQuery {
    #[serde(default)]
    category: String,
}

/// GET /today?category=
async fn today(
    State(state): State<AppState>,
    user: MaybeUser,
    Query(query): Query<TodayQuery>,
    uri: Uri,
) -> Result<Response, AppError> {
    let category = Some(query.category.trim()).filter(|c| !c.is_empty());
    let pins = state.pin_service.today(user.get(), category).await?;

    let mut context = TeraContext::new();
    context.insert("heading", "Today");
    context.insert("pins", &pins);
    context.insert("categories", &state.category_service.list().await?);
    context.insert("selected_category", &category.map(crate::models::normalize_name));
    Ok(state.page("home.html", &context, user.get(), uri.path())?.into_response())
}

// ============================================================================
// Create
// ============================================================================

async fn create_context(state: &AppState, input_value: &str) -> Result<TeraContext, AppError> {
    let mut context = TeraContext::new();
    context.insert("input_value", input_value);
    context.insert("is_idea", &(input_value == IDEA_PIN));
    context.insert("categories", &state.category_service.list().await?);
    context.insert("form", &json!({}));
    context.insert("errors", &json!({}));
    Ok(context)
}

/// GET /pinterest/pin/create/{input_value}
async fn create_pin_page(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(input_value): Path<String>,
    uri: Uri,
) -> Result<Response, AppError> {
    let context = create_context(&state, &input_value).await?;
    Ok(state.page("pinterest/create_pin.html", &context, Some(&user), uri.path())?.into_response())
}

/// POST /pinterest/pin/create/{input_value}
async fn create_pin(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(input_value): Path<String>,
    uri: Uri,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let form = read_multipart(multipart).await?;
    let fields = &form.fields;
    let input = CreatePinInput {
        title: fields.get("title").to_string(),
        about: fields.get("about").to_string(),
        alter_text: fields.get("alter_text").to_string(),
        destination_link: fields.get("destination_link").to_string(),
        pin_file: String::new(),
        is_private: fields.checked("is_private"),
        is_idea: input_value == IDEA_PIN,
        categories: fields.all("category"),
    };

    match state.pin_service.create(&user, input, form.file("pin_file")).await {
        Ok(_) => Ok(Redirect::to("/").into_response()),
        Err(PinServiceError::ValidationError(errors)) => {
            let mut context = create_context(&state, &input_value).await?;
            let mut submitted = fields.to_json(&[]);
            submitted["category"] = json!(fields.all("category").join(", "));
            context.insert("form", &submitted);
            state.invalid_form("pinterest/create_pin.html", context, &errors, Some(&user), uri.path())
        }
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Detail and save
// ============================================================================

/// GET /pinterest/pin/details/{id}
async fn pin_detail(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<i64>,
    uri: Uri,
) -> Result<Response, AppError> {
    let detail = state.pin_service.detail(user.get(), id).await?;
    let boards = state.board_service.containing_pin(user.get(), id).await?;
    let own_boards = match user.get() {
        Some(u) => state.board_service.own_boards(u).await?,
        None => Vec::new(),
    };

    let mut context = TeraContext::new();
    context.insert("is_owner", &user.get().is_some_and(|u| u.id == detail.pin.pin.user_id));
    context.insert("detail", &detail);
    context.insert("boards", &boards);
    context.insert("own_boards", &own_boards);
    Ok(state.page("pinterest/detail_pin.html", &context, user.get(), uri.path())?.into_response())
}

/// GET|POST /pinterest/pin/save-unsave-pin/{pin_id}
///
/// Goes back to the referring page, or to the pin.
async fn save_unsave(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(pin_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    state.pin_service.toggle_save(&user, pin_id).await?;
    let back = referer_path(&headers).unwrap_or_else(|| format!("/pinterest/pin/details/{}", pin_id));
    Ok(Redirect::to(&back).into_response())
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search_input: String,
}

/// GET /pinterest/pin/search-category?search_input=
async fn search_category(
    State(state): State<AppState>,
    user: MaybeUser,
    Query(query): Query<SearchQuery>,
    uri: Uri,
) -> Result<Response, AppError> {
    let pins = state.pin_service.search_by_category(user.get(), &query.search_input).await?;
    let mut context = TeraContext::new();
    context.insert("search_input", query.search_input.trim());
    context.insert("pins", &pins);
    Ok(state.page("pinterest/search_pin_category.html", &context, user.get(), uri.path())?.into_response())
}

// ============================================================================
// Boards
// ============================================================================

/// GET|POST /pinterest/pin/{board_id}/{pin_id}
async fn add_to_board(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((board_id, pin_id)): Path<(i64, i64)>,
) -> Result<Response, AppError> {
    state.board_service.add_pin(&user, board_id, pin_id).await?;
    Ok(Redirect::to(&format!("/pinterest/board/{}", board_id)).into_response())
}

/// POST /pinterest/pin/{board_id}/{pin_id}/remove
async fn remove_from_board(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((board_id, pin_id)): Path<(i64, i64)>,
) -> Result<Response, AppError> {
    state.board_service.remove_pin(&user, board_id, pin_id).await?;
    Ok(Redirect::to(&format!("/pinterest/board/{}", board_id)).into_response())
}
