//! Board repository
//!
//! Database operations for boards and the board/pin association.

use crate::db::query::BoardQuery;
use crate::db::DynDatabasePool;
use crate::models::{Board, BoardView};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Board repository trait
#[async_trait]
pub trait BoardRepository: Send + Sync {
    /// Insert a board. Fails if the owner already has one with that name.
    async fn create(&self, board: &Board) -> Result<Board>;

    /// Get a board by ID regardless of visibility
    async fn get_by_id(&self, id: i64) -> Result<Option<Board>>;

    /// Whether `user_id` has a board called `name`, ignoring `except_id`
    async fn name_taken(&self, user_id: i64, name: &str, except_id: Option<i64>) -> Result<bool>;

    /// Persist name and privacy flag
    async fn update(&self, board: &Board) -> Result<Board>;

    /// Delete a board; its pins are untouched
    async fn delete(&self, id: i64) -> Result<()>;

    /// Run a visibility-scoped listing
    async fn find(&self, query: &BoardQuery) -> Result<Vec<BoardView>>;

    /// Add a pin to a board. Returns false if it was already there.
    async fn add_pin(&self, board_id: i64, pin_id: i64) -> Result<bool>;

    /// Remove a pin from a board. Returns false if it was not there.
    async fn remove_pin(&self, board_id: i64, pin_id: i64) -> Result<bool>;
}

/// SQLx-based board repository implementation
pub struct SqlxBoardRepository {
    pool: DynDatabasePool,
}

impl SqlxBoardRepository {
    /// Create a new SQLx board repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BoardRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl BoardRepository for SqlxBoardRepository {
    async fn create(&self, board: &Board) -> Result<Board> {
        create_board(self.pool.sqlite(), board).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Board>> {
        let row = sqlx::query("SELECT * FROM boards WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get board by ID")?;
        Ok(row.as_ref().map(row_to_board))
    }

    async fn name_taken(&self, user_id: i64, name: &str, except_id: Option<i64>) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM boards WHERE user_id = ? AND name = ? AND id <> ?")
            .bind(user_id)
            .bind(name)
            .bind(except_id.unwrap_or(0))
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to check board name")?;
        Ok(row.is_some())
    }

    async fn update(&self, board: &Board) -> Result<Board> {
        let now = Utc::now();
        sqlx::query("UPDATE boards SET name = ?, is_private = ?, updated_at = ? WHERE id = ?")
            .bind(&board.name)
            .bind(board.is_private)
            .bind(now)
            .bind(board.id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to update board")?;

        let mut updated = board.clone();
        updated.updated_at = now;
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM boards WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete board")?;
        Ok(())
    }

    async fn find(&self, query: &BoardQuery) -> Result<Vec<BoardView>> {
        let mut builder = query.build();
        let rows = builder
            .build()
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list boards")?;
        Ok(rows.iter().map(row_to_board_view).collect())
    }

    async fn add_pin(&self, board_id: i64, pin_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO board_pins (board_id, pin_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(board_id)
        .bind(pin_id)
        .bind(Utc::now())
        .execute(self.pool.sqlite())
        .await
        .context("Failed to add pin to board")?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_pin(&self, board_id: i64, pin_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM board_pins WHERE board_id = ? AND pin_id = ?")
            .bind(board_id)
            .bind(pin_id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to remove pin from board")?;
        Ok(result.rows_affected() > 0)
    }
}

async fn create_board(pool: &SqlitePool, board: &Board) -> Result<Board> {
    let result = sqlx::query(
        r#"
        INSERT INTO boards (user_id, name, is_private, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(board.user_id)
    .bind(&board.name)
    .bind(board.is_private)
    .bind(board.created_at)
    .bind(board.updated_at)
    .execute(pool)
    .await
    .context("Failed to create board")?;

    let mut created = board.clone();
    created.id = result.last_insert_rowid();
    Ok(created)
}

fn row_to_board(row: &sqlx::sqlite::SqliteRow) -> Board {
    Board {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        is_private: row.get("is_private"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_board_view(row: &sqlx::sqlite::SqliteRow) -> BoardView {
    BoardView {
        board: row_to_board(row),
        username: row.get("username"),
        pin_count: row.get("pin_count"),
        cover: row.get("cover"),
    }
}
