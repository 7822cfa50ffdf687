use crate::error::*;
use tracing::{error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    /// Whether the same operation may succeed on a later cycle.
    fn is_retryable(&self) -> bool;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::Marketplace(e) => {
                error!("Marketplace error details: {:?}", e);
            }
            CoreError::Database(e) => {
                error!("Database error details: {:?}", e);
            }
            CoreError::Mail(e) => {
                error!("Mail error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::Marketplace(e) => e.is_retryable(),
            CoreError::Database(e) => e.is_retryable(),
            CoreError::Mail(e) => e.is_retryable(),
            CoreError::Network(_) => true,
            CoreError::Timeout { .. } => true,
            _ => false,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::Marketplace(e) => e.user_friendly_message(),
            CoreError::Database(e) => e.user_friendly_message(),
            CoreError::Mail(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::InvalidInput { message } => format!("Invalid input: {}", message),
            CoreError::Timeout { seconds } => {
                format!("The operation did not finish within {} seconds.", seconds)
            }
            _ => "An unexpected error occurred.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::Marketplace(_) => "MARKETPLACE".to_string(),
            CoreError::Database(_) => "DATABASE".to_string(),
            CoreError::Mail(_) => "MAIL".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::InvalidInput { .. } => "INVALID_INPUT".to_string(),
            CoreError::Timeout { .. } => "TIMEOUT".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
        }
    }
}

impl ErrorExt for MarketplaceError {
    fn log_error(&self) -> &Self {
        error!("MarketplaceError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("MarketplaceError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            MarketplaceError::ChallengeNotPassed { .. } => true,
            MarketplaceError::RequestTimeout => true,
            MarketplaceError::HttpStatus { status_code, .. } => {
                *status_code == 429 || *status_code >= 500
            }
            MarketplaceError::InvalidUrl { .. } => false,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            MarketplaceError::ChallengeNotPassed { .. } => {
                "The marketplace blocked the request with a bot check.".to_string()
            }
            MarketplaceError::HttpStatus { status_code, .. } => {
                format!("The marketplace answered with HTTP {}.", status_code)
            }
            MarketplaceError::RequestTimeout => "The marketplace did not respond in time.".to_string(),
            MarketplaceError::InvalidUrl { url } => {
                format!("The configured search URL is not valid: {}", url)
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            MarketplaceError::ChallengeNotPassed { .. } => "MARKETPLACE_CHALLENGE".to_string(),
            MarketplaceError::HttpStatus { .. } => "MARKETPLACE_HTTP_STATUS".to_string(),
            MarketplaceError::RequestTimeout => "MARKETPLACE_TIMEOUT".to_string(),
            MarketplaceError::InvalidUrl { .. } => "MARKETPLACE_INVALID_URL".to_string(),
        }
    }
}

impl ErrorExt for DatabaseError {
    fn log_error(&self) -> &Self {
        error!("DatabaseError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("DatabaseError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            DatabaseError::DatabaseLocked | DatabaseError::ConnectionFailed { .. }
        )
    }

    fn user_friendly_message(&self) -> String {
        match self {
            DatabaseError::ConnectionFailed { .. } => {
                "Database connection failed. Check the configured database URL.".to_string()
            }
            DatabaseError::DatabaseLocked => "Database is locked by another process.".to_string(),
            DatabaseError::CorruptRecord { id, .. } => {
                format!("Stored record {} could not be read back.", id)
            }
            _ => "Database error occurred.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            DatabaseError::ConnectionFailed { .. } => "DB_CONNECTION_FAILED".to_string(),
            DatabaseError::MigrationFailed { .. } => "DB_MIGRATION_FAILED".to_string(),
            DatabaseError::ConstraintViolation { .. } => "DB_CONSTRAINT_VIOLATION".to_string(),
            DatabaseError::CorruptRecord { .. } => "DB_CORRUPT_RECORD".to_string(),
            DatabaseError::DatabaseLocked => "DB_LOCKED".to_string(),
            DatabaseError::Sql(_) => "DB_SQL_ERROR".to_string(),
        }
    }
}

impl ErrorExt for MailError {
    fn log_error(&self) -> &Self {
        error!("MailError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("MailError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(self, MailError::ConnectionFailed { .. })
    }

    fn user_friendly_message(&self) -> String {
        match self {
            MailError::InvalidAddress { address } => {
                format!("'{}' is not a valid email address.", address)
            }
            MailError::MessageBuild { .. } => "The alert email could not be assembled.".to_string(),
            MailError::AuthenticationFailed { .. } => {
                "SMTP login failed. Check the mail username and app password.".to_string()
            }
            MailError::ConnectionFailed { .. } => {
                "Could not reach the SMTP server.".to_string()
            }
            MailError::Rejected { .. } => "The SMTP server rejected the alert email.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            MailError::InvalidAddress { .. } => "MAIL_INVALID_ADDRESS".to_string(),
            MailError::MessageBuild { .. } => "MAIL_MESSAGE_BUILD".to_string(),
            MailError::AuthenticationFailed { .. } => "MAIL_AUTH_FAILED".to_string(),
            MailError::ConnectionFailed { .. } => "MAIL_CONNECTION_FAILED".to_string(),
            MailError::Rejected { .. } => "MAIL_REJECTED".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file could not be read: {}", path)
            }
            ConfigError::MissingField { field } => {
                format!("Missing required configuration field: {}", field)
            }
            ConfigError::InvalidValue { field, value } => {
                format!("Invalid value '{}' for configuration field {}", value, field)
            }
            ConfigError::ValidationFailed { reason } => {
                format!("Configuration is invalid: {}", reason)
            }
            ConfigError::Parse(_) => "Configuration file is not valid TOML.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}

/// Final reporting for errors that end the process.
pub struct ErrorReporter;

impl ErrorReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn report_error(&self, error: &CoreError) {
        error.log_error();
        info!("Error code: {}", error.error_code());
        info!("User message: {}", error.user_friendly_message());
        if error.is_retryable() {
            info!("Error is transient and may clear after a restart");
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
