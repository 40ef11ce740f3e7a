//! Board endpoints

use axum::{
    extract::{Path, State},
    http::Uri,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde_json::json;
use tera::Context as TeraContext;

use crate::api::forms::FormFields;
use crate::api::middleware::{AppState, AuthenticatedUser, MaybeUser};
use crate::api::responses::AppError;
use crate::models::BoardInput;
use crate::services::board::is_owner;
use crate::services::BoardServiceError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pinterest/board/create", get(create_board_page).post(create_board))
        .route("/pinterest/board/{id}", get(board_detail))
        .route("/pinterest/board/{id}/edit", get(edit_board_page).post(edit_board))
        .route("/pinterest/board/{id}/delete", post(delete_board))
        .route("/pinterest/boards/{username}", get(board_list))
}

fn board_input(form: &FormFields) -> BoardInput {
    BoardInput {
        name: form.get("name").to_string(),
        is_private: form.checked("is_private"),
    }
}

/// GET /pinterest/board/create
async fn create_board_page(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    uri: Uri,
) -> Result<Response, AppError> {
    let mut context = TeraContext::new();
    context.insert("form", &json!({}));
    context.insert("errors", &json!({}));
    Ok(state.page("pinterest/create_board.html", &context, Some(&user), uri.path())?.into_response())
}

/// POST /pinterest/board/create
async fn create_board(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    uri: Uri,
    Form(form): Form<FormFields>,
) -> Result<Response, AppError> {
    match state.board_service.create(&user, board_input(&form)).await {
        Ok(board) => Ok(Redirect::to(&format!("/pinterest/board/{}", board.id)).into_response()),
        Err(BoardServiceError::ValidationError(errors)) => {
            let mut context = TeraContext::new();
            context.insert("form", &json!({ "name": form.get("name"), "is_private": form.checked("is_private") }));
            state.invalid_form("pinterest/create_board.html", context, &errors, Some(&user), uri.path())
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /pinterest/board/{id}
async fn board_detail(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<i64>,
    uri: Uri,
) -> Result<Response, AppError> {
    let detail = state.board_service.detail(user.get(), id).await?;
    let mut context = TeraContext::new();
    context.insert("is_owner", &is_owner(user.get(), &detail.board.board));
    context.insert("detail", &detail);
    Ok(state.page("pinterest/detail_board.html", &context, user.get(), uri.path())?.into_response())
}

/// GET /pinterest/board/{id}/edit
async fn edit_board_page(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    uri: Uri,
) -> Result<Response, AppError> {
    let board = state.board_service.get_owned(&user, id).await?;
    let mut context = TeraContext::new();
    context.insert("form", &json!({ "name": board.name, "is_private": board.is_private }));
    context.insert("errors", &json!({}));
    context.insert("board", &board);
    Ok(state.page("pinterest/edit_board.html", &context, Some(&user), uri.path())?.into_response())
}

/// POST /pinterest/board/{id}/edit
async fn edit_board(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    uri: Uri,
    Form(form): Form<FormFields>,
) -> Result<Response, AppError> {
    match state.board_service.update(&user, id, board_input(&form)).await {
        Ok(board) => Ok(Redirect::to(&format!("/pinterest/board/{}", board.id)).into_response()),
        Err(BoardServiceError::ValidationError(errors)) => {
            let board = state.board_service.get_owned(&user, id).await?;
            let mut context = TeraContext::new();
            context.insert("form", &json!({ "name": form.get("name"), "is_private": form.checked("is_private") }));
            context.insert("board", &board);
            state.invalid_form("pinterest/edit_board.html", context, &errors, Some(&user), uri.path())
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /pinterest/board/{id}/delete
async fn delete_board(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    state.board_service.delete(&user, id).await?;
    Ok(Redirect::to(&format!("/pinterest/boards/{}", user.username)).into_response())
}

/// GET /pinterest/boards/{username}
async fn board_list(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(username): Path<String>,
    uri: Uri,
) -> Result<Response, AppError> {
    let boards = state.board_service.list_for_user(user.get(), &username).await?;
    let mut context = TeraContext::new();
    context.insert("is_owner", &user.get().is_some_and(|u| u.username == username));
    context.insert("owner_username", &username);
    context.insert("boards", &boards);
    Ok(state.page("pinterest/board_list.html", &context, user.get(), uri.path())?.into_response())
}
