//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the operations for one entity or relation.

pub mod board;
pub mod category;
pub mod pin;
pub mod profile;
pub mod saved_pin;
pub mod session;
pub mod user;

pub use board::{BoardRepository, SqlxBoardRepository};
pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use pin::{PinRepository, SqlxPinRepository};
pub use profile::{ProfileRepository, SqlxProfileRepository};
pub use saved_pin::{SavedPinRepository, SqlxSavedPinRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
