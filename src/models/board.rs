//! Board model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::normalize_name;

/// Maximum board name length in characters
pub const MAX_BOARD_NAME_LEN: usize = 50;

/// A named collection of pins owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Board {
    pub id: i64,
    /// Owner
    pub user_id: i64,
    /// Title-cased name, unique per owner
    pub name: String,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Board {
    pub fn new(user_id: i64, name: &str, is_private: bool) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            user_id,
            name: normalize_name(name),
            is_private,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A board with listing details.
#[derive(Debug, Clone, Serialize)]
pub struct BoardView {
    #[serde(flatten)]
    pub board: Board,
    /// Owner's username
    pub username: String,
    /// Number of pins on the board
    pub pin_count: i64,
    /// File of the most recently added pin, used as the cover
    pub cover: Option<String>,
}

/// Board fields editable by the owner
#[derive(Debug, Clone)]
pub struct BoardInput {
    pub name: String,
    pub is_private: bool,
}
