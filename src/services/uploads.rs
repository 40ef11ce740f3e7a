//! Upload storage
//!
//! Uploaded images live under the media root in one directory per content
//! type. Pin files get a random prefix and a timestamp; profile and cover
//! pictures are named after their owner, so a new upload replaces the old.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

use crate::config::UploadConfig;
use crate::models::PictureKind;

/// Directory for pin images, relative to the media root
pub const PIN_UPLOAD_DIR: &str = "pins";

const RANDOM_PREFIX_LEN: usize = 10;

/// Errors rejecting an upload before it is stored
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("File type '{0}' is not allowed. Upload a JPEG, PNG, GIF or WebP image.")]
    TypeNotAllowed(String),

    #[error("File is too large ({size} bytes, limit {limit} bytes).")]
    TooLarge { size: u64, limit: u64 },

    #[error("The submitted file is empty.")]
    Empty,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// An upload received from a form, not yet stored
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Writes validated uploads below the media root.
#[derive(Debug, Clone)]
pub struct UploadStore {
    config: UploadConfig,
}

impl UploadStore {
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    /// Store a pin image, returning its path relative to the media root
    pub async fn store_pin(&self, file: &IncomingFile) -> Result<String, UploadError> {
        self.check(file)?;
        let ext = self.extension(file);
        let relative = pin_file_name(&random_uppercase(RANDOM_PREFIX_LEN)?, Utc::now(), &ext);
        self.write(&relative, &file.bytes).await?;
        Ok(relative)
    }

    /// Store a profile or cover picture for a user
    pub async fn store_picture(
        &self,
        kind: PictureKind,
        username: &str,
        user_id: i64,
        file: &IncomingFile,
    ) -> Result<String, UploadError> {
        self.check(file)?;
        let ext = self.extension(file);
        let relative = picture_file_name(kind, username, user_id, &ext);
        self.write(&relative, &file.bytes).await?;
        Ok(relative)
    }

    fn check(&self, file: &IncomingFile) -> Result<(), UploadError> {
        if file.bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if !self.config.is_type_allowed(&file.content_type) {
            return Err(UploadError::TypeNotAllowed(file.content_type.clone()));
        }
        let size = file.bytes.len() as u64;
        if size > self.config.max_file_size {
            return Err(UploadError::TooLarge {
                size,
                limit: self.config.max_file_size,
            });
        }
        Ok(())
    }

    /// Extension for the stored file.
    ///
    /// The client file name only picks between spellings of the content
    /// type's own extension (`jpeg` vs `jpg`); anything else falls back to
    /// the content type.
    fn extension(&self, file: &IncomingFile) -> String {
        let canonical = self.config.get_extension(&file.content_type);
        match file_extension(&file.file_name) {
            Some(ext) if extension_matches(&ext, canonical) => ext,
            _ => canonical.to_string(),
        }
    }

    async fn write(&self, relative: &str, bytes: &[u8]) -> Result<()> {
        let path: PathBuf = self.config.path.join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create upload directory: {:?}", parent))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write upload: {:?}", path))?;
        tracing::debug!("Stored upload {}", relative);
        Ok(())
    }
}

/// `pins/{PREFIX}_pin_{YYYYmmddHHMMSS}.{ext}`
pub fn pin_file_name(prefix: &str, now: DateTime<Utc>, ext: &str) -> String {
    format!(
        "{}/{}_pin_{}.{}",
        PIN_UPLOAD_DIR,
        prefix,
        now.format("%Y%m%d%H%M%S"),
        ext
    )
}

/// `{dir}/{username}_{tag}_{id}.{ext}`
pub fn picture_file_name(kind: PictureKind, username: &str, user_id: i64, ext: &str) -> String {
    format!(
        "{}/{}_{}_{}.{}",
        kind.directory(),
        username,
        kind.file_tag(),
        user_id,
        ext
    )
}

/// Lowercased text after the last dot of a client file name
fn file_extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn extension_matches(ext: &str, canonical: &str) -> bool {
    ext == canonical || matches!((canonical, ext), ("jpg", "jpeg") | ("tiff", "tif"))
}

/// `len` random letters A-Z
pub fn random_uppercase(len: usize) -> Result<String> {
    let mut bytes = vec![0u8; len];
    getrandom::fill(&mut bytes).map_err(|e| anyhow::anyhow!("Failed to read random bytes: {}", e))?;
    Ok(bytes.iter().map(|b| (b'A' + b % 26) as char).collect())
}
