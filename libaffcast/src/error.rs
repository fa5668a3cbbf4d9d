//! Error types for Affcast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AffcastError>;

#[derive(Error, Debug)]
pub enum AffcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AffcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            AffcastError::InvalidInput(_) => 3,
            AffcastError::Platform(PlatformError::Authentication(_)) => 2,
            AffcastError::Platform(_) => 1,
            AffcastError::Config(_) => 1,
            AffcastError::Database(_) => 1,
            AffcastError::Serialization(_) => 1,
        }
    }
}

impl From<sqlx::Error> for AffcastError {
    fn from(e: sqlx::Error) -> Self {
        AffcastError::Database(DbError::SqlxError(e))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row in {table}: {detail}")]
    CorruptRow { table: &'static str, detail: String },
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),
}

impl PlatformError {
    /// The platform's own message, without the variant prefix.
    ///
    /// This is what ends up in a queue entry's `error_msg`.
    pub fn message(&self) -> &str {
        match self {
            PlatformError::Authentication(m)
            | PlatformError::Validation(m)
            | PlatformError::Posting(m)
            | PlatformError::Network(m)
            | PlatformError::RateLimit(m) => m,
        }
    }
}
