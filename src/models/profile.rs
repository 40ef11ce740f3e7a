//! User profile model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One-to-one extension of a user with presentation details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub user_id: i64,
    pub about: String,
    /// Path relative to the media root
    pub profile_picture: Option<String>,
    /// Path relative to the media root
    pub cover_picture: Option<String>,
    pub website: String,
    pub country: String,
    pub language: String,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// An empty profile for a user who has never edited one
    pub fn empty(user_id: i64) -> Self {
        Self {
            user_id,
            about: String::new(),
            profile_picture: None,
            cover_picture: None,
            website: String::new(),
            country: String::new(),
            language: String::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Profile fields editable from the profile page
#[derive(Debug, Clone, Default)]
pub struct UpdateProfileInput {
    pub about: String,
    pub website: String,
    pub country: String,
    pub language: String,
}

/// Which picture slot an upload targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureKind {
    Profile,
    Cover,
}

impl PictureKind {
    /// Directory below the media root
    pub fn directory(&self) -> &'static str {
        match self {
            PictureKind::Profile => "profile_pictures",
            PictureKind::Cover => "cover_pictures",
        }
    }

    /// Infix used in generated file names
    pub fn file_tag(&self) -> &'static str {
        match self {
            PictureKind::Profile => "profile_picture",
            PictureKind::Cover => "cover_picture",
        }
    }
}
