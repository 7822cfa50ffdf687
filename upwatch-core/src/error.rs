use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Marketplace error: {0}")]
    Marketplace(#[from] MarketplaceError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Operation timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<sqlx::Error> for CoreError {
    fn from(error: sqlx::Error) -> Self {
        if is_busy_or_locked(&error) {
            return CoreError::Database(DatabaseError::DatabaseLocked);
        }
        CoreError::Database(DatabaseError::Sql(error))
    }
}

/// SQLITE_BUSY (5) or SQLITE_LOCKED (6), including their extended codes.
fn is_busy_or_locked(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map_or(false, |code| matches!(code & 0xff, 5 | 6)),
        _ => false,
    }
}

#[derive(Error, Debug, Clone)]
pub enum MarketplaceError {
    #[error("Bot challenge not passed after {attempts} attempts")]
    ChallengeNotPassed { attempts: u32 },

    #[error("Unexpected HTTP status {status_code} for {url}")]
    HttpStatus { status_code: u16, url: String },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Invalid search URL: {url}")]
    InvalidUrl { url: String },
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Migration failed: {migration}")]
    MigrationFailed { migration: String },

    #[error("Constraint violation: {constraint}")]
    ConstraintViolation { constraint: String },

    #[error("Corrupt record {id}: {details}")]
    CorruptRecord { id: String, details: String },

    #[error("Database locked")]
    DatabaseLocked,

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Error, Debug, Clone)]
pub enum MailError {
    #[error("Invalid mail address: {address}")]
    InvalidAddress { address: String },

    #[error("Failed to build message: {reason}")]
    MessageBuild { reason: String },

    #[error("SMTP authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("SMTP connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Message rejected by server: {reason}")]
    Rejected { reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not readable: {path}")]
    FileNotFound { path: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
