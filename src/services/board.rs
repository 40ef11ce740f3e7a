//! Board service
//!
//! Boards are named collections of pins. Names are title-cased and unique per
//! owner; a private board is only listed for, and viewable by, its owner.

use crate::db::query::{BoardFilter, BoardQuery, PinFilter, PinQuery};
use crate::db::repositories::{BoardRepository, PinRepository, UserRepository};
use crate::models::{Board, BoardInput, BoardView, PinView, User, MAX_BOARD_NAME_LEN};
use crate::services::access::{authorize, Access, Owned, Policy};
use crate::services::validation::FieldErrors;
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

/// Error types for board service operations
#[derive(Debug, thiserror::Error)]
pub enum BoardServiceError {
    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<FieldErrors> for BoardServiceError {
    fn from(errors: FieldErrors) -> Self {
        BoardServiceError::ValidationError(errors)
    }
}

/// A board page: the board and the pins on it the viewer may see
#[derive(Debug, Clone, Serialize)]
pub struct BoardDetail {
    pub board: BoardView,
    pub pins: Vec<PinView>,
}

pub struct BoardService {
    board_repo: Arc<dyn BoardRepository>,
    pin_repo: Arc<dyn PinRepository>,
    user_repo: Arc<dyn UserRepository>,
}

impl BoardService {
    pub fn new(
        board_repo: Arc<dyn BoardRepository>,
        pin_repo: Arc<dyn PinRepository>,
        user_repo: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            board_repo,
            pin_repo,
            user_repo,
        }
    }

    /// Create a board for `owner`
    pub async fn create(&self, owner: &User, input: BoardInput) -> Result<Board, BoardServiceError> {
        let board = Board::new(owner.id, &input.name, input.is_private);
        self.validate_name(owner.id, &board.name, None).await?;

        let board = self.board_repo.create(&board).await.context("Failed to create board")?;
        tracing::info!("{} created board '{}' ({})", owner.username, board.name, board.id);
        Ok(board)
    }

    /// Rename a board or change its privacy
    pub async fn update(
        &self,
        requester: &User,
        id: i64,
        input: BoardInput,
    ) -> Result<Board, BoardServiceError> {
        let mut board = self.get_owned(requester, id).await?;
        let name = Board::new(board.user_id, &input.name, input.is_private).name;
        self.validate_name(board.user_id, &name, Some(board.id)).await?;

        board.name = name;
        board.is_private = input.is_private;
        Ok(self.board_repo.update(&board).await.context("Failed to update board")?)
    }

    /// Delete a board; its pins stay
    pub async fn delete(&self, requester: &User, id: i64) -> Result<Board, BoardServiceError> {
        let board = self.get_owned(requester, id).await?;
        self.board_repo.delete(board.id).await.context("Failed to delete board")?;
        tracing::info!("{} deleted board '{}'", requester.username, board.name);
        Ok(board)
    }

    /// A board its owner is about to change
    pub async fn get_owned(&self, requester: &User, id: i64) -> Result<Board, BoardServiceError> {
        let board = self.load(id).await?;
        check(authorize(Some(requester), &board, Policy::OwnerOnly))?;
        Ok(board)
    }

    /// Board page as seen by `viewer`
    pub async fn detail(&self, viewer: Option<&User>, id: i64) -> Result<BoardDetail, BoardServiceError> {
        let board = self.load(id).await?;
        check(authorize(viewer, &board, Policy::OwnerOrPublic))?;

        let viewer_id = viewer.map(|u| u.id);
        let view = self
            .board_repo
            .find(&BoardQuery::new(viewer_id).filter(BoardFilter::Id(id)))
            .await
            .context("Failed to load board")?
            .into_iter()
            .next()
            .ok_or_else(|| BoardServiceError::NotFound(format!("Board {}", id)))?;
        let pins = self
            .pin_repo
            .find(&PinQuery::new(viewer_id).filter(PinFilter::OnBoard(id)))
            .await
            .context("Failed to list board pins")?;

        Ok(BoardDetail { board: view, pins })
    }

    /// Boards of `username` the viewer may see; empty for unknown users
    pub async fn list_for_user(
        &self,
        viewer: Option<&User>,
        username: &str,
    ) -> Result<Vec<BoardView>, BoardServiceError> {
        let Some(owner) = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to get user")?
        else {
            return Ok(Vec::new());
        };
        let query = BoardQuery::new(viewer.map(|u| u.id)).filter(BoardFilter::Owner(owner.id));
        Ok(self.board_repo.find(&query).await.context("Failed to list boards")?)
    }

    /// The requester's own boards, for the "add to board" menu
    pub async fn own_boards(&self, owner: &User) -> Result<Vec<BoardView>, BoardServiceError> {
        let query = BoardQuery::new(Some(owner.id)).filter(BoardFilter::Owner(owner.id));
        Ok(self.board_repo.find(&query).await.context("Failed to list boards")?)
    }

    /// Visible boards that hold a pin
    pub async fn containing_pin(
        &self,
        viewer: Option<&User>,
        pin_id: i64,
    ) -> Result<Vec<BoardView>, BoardServiceError> {
        let query = BoardQuery::new(viewer.map(|u| u.id)).filter(BoardFilter::ContainsPin(pin_id));
        Ok(self.board_repo.find(&query).await.context("Failed to list boards")?)
    }

    /// Put a pin on one of the requester's boards.
    ///
    /// The board must be the requester's and the pin visible to them.
    /// Returns false if the pin was already on the board.
    pub async fn add_pin(&self, requester: &User, board_id: i64, pin_id: i64) -> Result<bool, BoardServiceError> {
        let board = self.get_owned(requester, board_id).await?;
        self.check_pin(requester, pin_id).await?;

        let added = self
            .board_repo
            .add_pin(board.id, pin_id)
            .await
            .context("Failed to add pin to board")?;
        if added {
            tracing::debug!("Pin {} added to board {}", pin_id, board.id);
        }
        Ok(added)
    }

    /// Take a pin off one of the requester's boards
    pub async fn remove_pin(&self, requester: &User, board_id: i64, pin_id: i64) -> Result<bool, BoardServiceError> {
        let board = self.get_owned(requester, board_id).await?;
        Ok(self
            .board_repo
            .remove_pin(board.id, pin_id)
            .await
            .context("Failed to remove pin from board")?)
    }

    async fn load(&self, id: i64) -> Result<Board, BoardServiceError> {
        self.board_repo
            .get_by_id(id)
            .await
            .context("Failed to get board")?
            .ok_or_else(|| BoardServiceError::NotFound(format!("Board {}", id)))
    }

    async fn check_pin(&self, requester: &User, pin_id: i64) -> Result<(), BoardServiceError> {
        let pin = self
            .pin_repo
            .get_by_id(pin_id)
            .await
            .context("Failed to get pin")?
            .ok_or_else(|| BoardServiceError::NotFound(format!("Pin {}", pin_id)))?;
        check(authorize(Some(requester), &pin, Policy::OwnerOrPublic))
    }

    async fn validate_name(&self, owner_id: i64, name: &str, except_id: Option<i64>) -> Result<(), BoardServiceError> {
        let mut errors = FieldErrors::new();
        if name.is_empty() {
            errors.add("name", "This field is required.");
        }
        errors.max_len("name", name, MAX_BOARD_NAME_LEN);
        if !name.is_empty()
            && self
                .board_repo
                .name_taken(owner_id, name, except_id)
                .await
                .context("Failed to check board name")?
        {
            errors.add("name", "Board with this User and Name already exists.");
        }
        Ok(errors.into_result()?)
    }
}

fn check(access: Access) -> Result<(), BoardServiceError> {
    match access {
        Access::Allow => Ok(()),
        Access::Deny(reason) => Err(BoardServiceError::Forbidden(reason)),
    }
}

/// Whether `user` owns `board`
pub fn is_owner(user: Option<&User>, board: &impl Owned) -> bool {
    user.is_some_and(|u| u.id == board.owner_id())
}
