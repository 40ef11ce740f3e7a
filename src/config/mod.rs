//! Configuration management
//!
//! Configuration is read from `config.yml` and can be overridden with
//! `CYCLONE_*` environment variables. Missing values fall back to defaults,
//! so an absent or empty file yields a runnable development setup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Upload configuration
    #[serde(default)]
    pub upload: UploadConfig,
    /// Outbound mail configuration
    #[serde(default)]
    pub mail: MailConfig,
    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Template configuration
    #[serde(default)]
    pub templates: TemplateConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally visible base URL, used for links in emails
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_public_url() -> String {
    "http://localhost:8000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path or `sqlite:` URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum pool connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "data/cyclone.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Media root; pins, profile and cover pictures live in subdirectories
    #[serde(default = "default_upload_path")]
    pub path: PathBuf,
    /// Maximum file size in bytes (default: 10MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Allowed image MIME types
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            path: default_upload_path(),
            max_file_size: default_max_file_size(),
            allowed_types: default_allowed_types(),
        }
    }
}

fn default_upload_path() -> PathBuf {
    PathBuf::from("media")
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/gif".to_string(),
        "image/webp".to_string(),
    ]
}

impl UploadConfig {
    /// Check if a MIME type is allowed
    pub fn is_type_allowed(&self, mime_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == mime_type)
    }

    /// Get file extension for a MIME type
    pub fn get_extension(&self, mime_type: &str) -> &'static str {
        match mime_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/bmp" => "bmp",
            "image/tiff" => "tiff",
            _ => "bin",
        }
    }
}

/// Outbound mail configuration.
///
/// When `smtp_host` is unset, messages are written to the log instead of
/// being delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    /// Sender address
    #[serde(default = "default_from_address")]
    pub from_address: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            from_address: default_from_address(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "Cyclone <no-reply@localhost>".to_string()
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Key for signing activation and password reset tokens
    #[serde(default = "default_secret_key")]
    pub secret_key: String,
    /// Session lifetime in days
    #[serde(default = "default_session_days")]
    pub session_days: i64,
    /// Lifetime of emailed tokens in days
    #[serde(default = "default_token_valid_days")]
    pub token_valid_days: i64,
    /// New accounts stay inactive until the emailed link is followed
    #[serde(default = "default_require_email_verification")]
    pub require_email_verification: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: default_secret_key(),
            session_days: default_session_days(),
            token_valid_days: default_token_valid_days(),
            require_email_verification: default_require_email_verification(),
        }
    }
}

fn default_secret_key() -> String {
    "change-me-in-production".to_string()
}

fn default_session_days() -> i64 {
    7
}

fn default_token_valid_days() -> i64 {
    3
}

fn default_require_email_verification() -> bool {
    true
}

/// Template configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Directory whose templates override the embedded ones
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file.
    ///
    /// A missing or empty file yields the default configuration. Invalid YAML
    /// is reported with its location.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides.
    ///
    /// Recognised variables:
    /// - CYCLONE_SERVER_HOST, CYCLONE_SERVER_PORT, CYCLONE_SERVER_PUBLIC_URL
    /// - CYCLONE_DATABASE_URL
    /// - CYCLONE_UPLOAD_PATH
    /// - CYCLONE_MAIL_SMTP_HOST, CYCLONE_MAIL_SMTP_PORT, CYCLONE_MAIL_SMTP_USERNAME,
    ///   CYCLONE_MAIL_SMTP_PASSWORD, CYCLONE_MAIL_FROM_ADDRESS
    /// - CYCLONE_AUTH_SECRET_KEY, CYCLONE_AUTH_REQUIRE_EMAIL_VERIFICATION
    /// - CYCLONE_TEMPLATES_PATH
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("CYCLONE_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("CYCLONE_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(url) = std::env::var("CYCLONE_SERVER_PUBLIC_URL") {
            self.server.public_url = url;
        }

        if let Ok(url) = std::env::var("CYCLONE_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(path) = std::env::var("CYCLONE_UPLOAD_PATH") {
            self.upload.path = PathBuf::from(path);
        }

        if let Ok(host) = std::env::var("CYCLONE_MAIL_SMTP_HOST") {
            self.mail.smtp_host = Some(host);
        }
        if let Ok(port) = std::env::var("CYCLONE_MAIL_SMTP_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.mail.smtp_port = port;
            }
        }
        if let Ok(username) = std::env::var("CYCLONE_MAIL_SMTP_USERNAME") {
            self.mail.smtp_username = Some(username);
        }
        if let Ok(password) = std::env::var("CYCLONE_MAIL_SMTP_PASSWORD") {
            self.mail.smtp_password = Some(password);
        }
        if let Ok(from) = std::env::var("CYCLONE_MAIL_FROM_ADDRESS") {
            self.mail.from_address = from;
        }

        if let Ok(key) = std::env::var("CYCLONE_AUTH_SECRET_KEY") {
            self.auth.secret_key = key;
        }
        if let Ok(flag) = std::env::var("CYCLONE_AUTH_REQUIRE_EMAIL_VERIFICATION") {
            match flag.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.auth.require_email_verification = true,
                "false" | "0" | "no" => self.auth.require_email_verification = false,
                _ => {} // Ignore invalid values
            }
        }

        if let Ok(path) = std::env::var("CYCLONE_TEMPLATES_PATH") {
            self.templates.path = Some(PathBuf::from(path));
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.secret_key.is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.secret_key must not be empty".to_string(),
            ));
        }
        if self.auth.session_days <= 0 || self.auth.token_valid_days <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.session_days and auth.token_valid_days must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches CYCLONE_* variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "CYCLONE_SERVER_HOST",
    "CYCLONE_SERVER_PORT",
    "CYCLONE_SERVER_PUBLIC_URL",
    "CYCLONE_DATABASE_URL",
    "CYCLONE_UPLOAD_PATH",
    "CYCLONE_MAIL_SMTP_HOST",
    "CYCLONE_MAIL_SMTP_PORT",
    "CYCLONE_MAIL_SMTP_USERNAME",
    "CYCLONE_MAIL_SMTP_PASSWORD",
    "CYCLONE_MAIL_FROM_ADDRESS",
    "CYCLONE_AUTH_SECRET_KEY",
    "CYCLONE_AUTH_REQUIRE_EMAIL_VERIFICATION",
    "CYCLONE_TEMPLATES_PATH",
];


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn valid_server_config_strategy() -> impl Strategy<Value = ServerConfig> {
        (
            prop_oneof![Just("0.0.0.0".to_string()), Just("127.0.0.1".to_string()), "[a-z]{3,10}"],
            1024u16..65535,
            "https://[a-z]{3,10}\\.com",
        )
            .prop_map(|(host, port, public_url)| ServerConfig {
                host,
                port,
                public_url,
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Serialized configuration loads back with the same server section.
        #[test]
        fn config_file_preserves_server_section(server in valid_server_config_strategy()) {
            let config = Config { server: server.clone(), ..Config::default() };
            let yaml = serde_yaml::to_string(&config).unwrap();

            let mut file = NamedTempFile::new().unwrap();
            write!(file, "{}", yaml).unwrap();

            let loaded = Config::load(file.path()).unwrap();
            prop_assert_eq!(loaded.server.host, server.host);
            prop_assert_eq!(loaded.server.port, server.port);
            prop_assert_eq!(loaded.server.public_url, server.public_url);
        }

        /// Setting only the port never disturbs other defaults.
        #[test]
        fn partial_config_keeps_defaults(port in 1u16..65535) {
            let mut file = NamedTempFile::new().unwrap();
            write!(file, "server:\n  port: {}\n", port).unwrap();

            let loaded = Config::load(file.path()).unwrap();
            prop_assert_eq!(loaded.server.port, port);
            prop_assert_eq!(loaded.auth.session_days, 7);
            prop_assert_eq!(loaded.upload.max_file_size, 10 * 1024 * 1024);
        }
    }
}
