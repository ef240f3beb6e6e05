//! Error types for Crosscast

use thiserror::Error;

use crate::types::Platform;

pub type Result<T> = std::result::Result<T, CrosscastError>;

#[derive(Error, Debug)]
pub enum CrosscastError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl CrosscastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosscastError::Validation(_) => 3,
            CrosscastError::Credential(_) => 2,
            CrosscastError::Platform(PlatformError::Authentication(_)) => 2,
            CrosscastError::Platform(_) => 1,
            CrosscastError::Config(_) => 1,
            CrosscastError::Database(_) => 1,
            CrosscastError::NotFound(_) => 4,
        }
    }
}

/// Request-level rejections, raised before any side effect
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Content cannot be empty")]
    EmptyContent,

    #[error("Content exceeds {max} characters (current: {length})")]
    ContentTooLong { length: usize, max: usize },

    #[error("Maximum {max} media references allowed (got {count})")]
    TooManyMedia { count: usize, max: usize },

    #[error("No platform is configured for this user")]
    NoPlatforms,

    #[error("Failed to read content: {0}")]
    UnreadableInput(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("No encryption key supplied. Set CROSSCAST_ENCRYPTION_KEY or vault.key_file")]
    MissingEncryptionKey,

    #[error("Encryption key is too short ({length} bytes, minimum {min})")]
    WeakEncryptionKey { length: usize, min: usize },
}

#[derive(Error, Debug, Clone)]
pub enum CredentialError {
    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Credentials do not belong to platform {platform}")]
    Mismatch { platform: Platform },

    #[error("Authorization handshake is unknown or has expired")]
    HandshakeExpired,
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Platform not configured: {0}")]
    NotConfigured(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}
