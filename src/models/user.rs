//! User model
//!
//! Accounts, their gender choice and the derived social counters shown on a
//! profile page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::title_case;

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Username (unique)
    pub username: String,
    /// Email address (unique)
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: Gender,
    /// Inactive accounts cannot log in; set until email verification and
    /// after account deletion.
    pub is_active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new User. Names are stored title-cased.
    ///
    /// The password must already be hashed with `services::password::hash_password()`.
    pub fn new(
        username: String,
        email: String,
        password_hash: String,
        first_name: &str,
        last_name: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            username,
            email,
            password_hash,
            first_name: title_case(first_name.trim()),
            last_name: title_case(last_name.trim()),
            gender: Gender::default(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// "First Last", or the username when no name is set
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.username.clone()
        } else {
            name.to_string()
        }
    }
}

/// Gender choice stored as a single-letter code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "O")]
    Others,
    #[default]
    #[serde(rename = "N")]
    NotSpecified,
}

impl Gender {
    pub const ALL: [Gender; 4] = [
        Gender::Male,
        Gender::Female,
        Gender::Others,
        Gender::NotSpecified,
    ];

    /// Single-letter database code
    pub fn code(&self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
            Gender::Others => "O",
            Gender::NotSpecified => "N",
        }
    }

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Others => "Others",
            Gender::NotSpecified => "Not Specified",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "M" => Ok(Gender::Male),
            "F" => Ok(Gender::Female),
            "O" => Ok(Gender::Others),
            "N" | "" => Ok(Gender::NotSpecified),
            _ => Err(anyhow::anyhow!("Invalid gender: {}", s)),
        }
    }
}

/// Counters displayed on a profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub followers: i64,
    pub following: i64,
    pub private_pins: i64,
    pub public_pins: i64,
    pub total_pins: i64,
}

/// Account fields editable from the profile page
#[derive(Debug, Clone, Default)]
pub struct UpdateUserInput {
    pub first_name: String,
    pub last_name: String,
    pub gender: Gender,
}
