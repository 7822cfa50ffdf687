use upwatch_core::{
    ConfigError, CoreError, DatabaseError, ErrorExt, ErrorReporter, MailError, MarketplaceError,
};

#[test]
fn test_error_codes() {
    let marketplace_error = CoreError::Marketplace(MarketplaceError::RequestTimeout);
    assert_eq!(marketplace_error.error_code(), "MARKETPLACE");

    let db_error = CoreError::Database(DatabaseError::DatabaseLocked);
    assert_eq!(db_error.error_code(), "DATABASE");

    let mail_error = CoreError::Mail(MailError::AuthenticationFailed {
        reason: "535 bad credentials".to_string(),
    });
    assert_eq!(mail_error.error_code(), "MAIL");

    let config_error = CoreError::Config(ConfigError::MissingField {
        field: "mail.recipient".to_string(),
    });
    assert_eq!(config_error.error_code(), "CONFIG");
}

#[test]
fn test_retryable_errors() {
    let challenge = CoreError::Marketplace(MarketplaceError::ChallengeNotPassed { attempts: 3 });
    assert!(challenge.is_retryable());

    let server_error = MarketplaceError::HttpStatus {
        status_code: 503,
        url: "https://www.upwork.com/nx/search/jobs/".to_string(),
    };
    assert!(server_error.is_retryable());

    let not_found = MarketplaceError::HttpStatus {
        status_code: 404,
        url: "https://www.upwork.com/nx/search/jobs/".to_string(),
    };
    assert!(!not_found.is_retryable());

    let non_retryable_error = CoreError::Config(ConfigError::MissingField {
        field: "keywords".to_string(),
    });
    assert!(!non_retryable_error.is_retryable());
}

#[test]
fn test_sqlx_errors_convert_to_database_errors() {
    let error: CoreError = sqlx::Error::RowNotFound.into();
    assert!(matches!(error, CoreError::Database(DatabaseError::Sql(_))));
    assert_eq!(error.error_code(), "DATABASE");
}

#[test]
fn test_user_friendly_messages() {
    let mail_error = CoreError::Mail(MailError::AuthenticationFailed {
        reason: "535".to_string(),
    });
    let message = mail_error.user_friendly_message();
    assert!(message.contains("SMTP login failed"));

    let config_error = CoreError::Config(ConfigError::MissingField {
        field: "mail.password".to_string(),
    });
    let message = config_error.user_friendly_message();
    assert!(message.contains("mail.password"));
}

#[test]
fn test_error_reporter() {
    let reporter = ErrorReporter::new();
    let error = CoreError::Database(DatabaseError::DatabaseLocked);

    // This test just ensures reporting doesn't panic
    reporter.report_error(&error);
    assert!(error.is_retryable());
}
