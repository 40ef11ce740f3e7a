//! Data models
//!
//! Database entities (users, profiles, sessions, categories, pins, boards)
//! and the input types used to create or update them.

mod board;
mod category;
mod pin;
mod profile;
mod session;
mod user;

pub use board::{Board, BoardInput, BoardView, MAX_BOARD_NAME_LEN};
pub use category::{normalize_name, title_case, Category};
pub use pin::{
    CreatePinInput, Pin, PinStatus, PinView, SavedPin, MAX_ABOUT_LEN, MAX_LINK_LEN, MAX_TITLE_LEN,
};
pub use profile::{PictureKind, UpdateProfileInput, UserProfile};
pub use session::Session;
pub use user::{Gender, UpdateUserInput, User, UserStats};
