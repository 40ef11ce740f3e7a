//! Pin model
//!
//! A pin is an uploaded image with a title, description, optional outbound
//! link and one or more categories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum title length in characters
pub const MAX_TITLE_LEN: usize = 65;
/// Maximum description length in characters
pub const MAX_ABOUT_LEN: usize = 250;
/// Maximum destination link length in characters
pub const MAX_LINK_LEN: usize = 1000;

/// Pin entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pin {
    pub id: i64,
    /// Owner
    pub user_id: i64,
    pub title: String,
    pub about: String,
    /// Alternative text for the image
    pub alter_text: String,
    pub destination_link: String,
    /// Path relative to the media root
    pub pin_file: String,
    pub status: PinStatus,
    pub is_idea: bool,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle state of a pin.
///
/// Stored for every pin but not consulted when deciding visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinStatus {
    Draft,
    #[default]
    Uploaded,
    Deleted,
}

impl PinStatus {
    pub fn as_i64(&self) -> i64 {
        match self {
            PinStatus::Draft => 0,
            PinStatus::Uploaded => 1,
            PinStatus::Deleted => 2,
        }
    }

    /// Unknown codes read back as `Uploaded`.
    pub fn from_i64(value: i64) -> Self {
        match value {
            0 => PinStatus::Draft,
            2 => PinStatus::Deleted,
            _ => PinStatus::Uploaded,
        }
    }
}

impl fmt::Display for PinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinStatus::Draft => write!(f, "Draft"),
            PinStatus::Uploaded => write!(f, "Uploaded"),
            PinStatus::Deleted => write!(f, "Deleted"),
        }
    }
}

/// A pin as seen by a particular viewer.
#[derive(Debug, Clone, Serialize)]
pub struct PinView {
    #[serde(flatten)]
    pub pin: Pin,
    /// Owner's username
    pub username: String,
    /// Whether the viewer has saved this pin
    pub is_saved: bool,
}

/// Input for creating a pin; `pin_file` is the stored upload path.
#[derive(Debug, Clone, Default)]
pub struct CreatePinInput {
    pub title: String,
    pub about: String,
    pub alter_text: String,
    pub destination_link: String,
    pub pin_file: String,
    pub is_private: bool,
    pub is_idea: bool,
    /// Raw category names, normalized before storage
    pub categories: Vec<String>,
}

/// A bookmark of a pin by a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedPin {
    pub id: i64,
    pub user_id: i64,
    pub pin_id: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        for status in [PinStatus::Draft, PinStatus::Uploaded, PinStatus::Deleted] {
            assert_eq!(PinStatus::from_i64(status.as_i64()), status);
        }
        assert_eq!(PinStatus::from_i64(42), PinStatus::Uploaded);
        assert_eq!(PinStatus::default(), PinStatus::Uploaded);
    }
}
