//! Error recovery policy for the polling pipeline.
//!
//! Every failure the pipeline can hit falls into one of three buckets:
//! the current keyword is abandoned for this cycle, a single notification
//! is dropped, or the whole invocation must stop. Nothing is retried
//! within a cycle; transient failures clear up on the next pass.

use crate::{CoreError, ErrorExt};
use tracing::{error, warn};

/// Recovery strategy for handling errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Log and treat the keyword as having yielded no postings
    SkipKeyword,
    /// Log and lose the notification; the posting stays persisted
    DropNotification,
    /// Propagate to the caller and stop the invocation
    Fail,
}

/// Error recovery handler that provides strategies for different error types
pub struct ErrorRecovery;

impl ErrorRecovery {
    /// Determine the appropriate recovery strategy for a given error
    pub fn determine_strategy(error: &CoreError) -> RecoveryStrategy {
        match error {
            // Fetch side: best-effort scraping
            CoreError::Marketplace(_) | CoreError::Network(_) | CoreError::Timeout { .. } => {
                RecoveryStrategy::SkipKeyword
            }

            CoreError::Mail(_) => RecoveryStrategy::DropNotification,

            // Malformed input for one keyword does not poison the rest
            CoreError::InvalidInput { .. } => RecoveryStrategy::SkipKeyword,

            CoreError::Database(_)
            | CoreError::Config(_)
            | CoreError::Io(_)
            | CoreError::Serialization(_)
            | CoreError::Internal { .. } => RecoveryStrategy::Fail,
        }
    }

    /// Apply the strategy for `result`'s error, if any.
    ///
    /// Returns `Ok(Some(value))` on success, `Ok(None)` when the error was
    /// absorbed, and `Err` when the strategy is [`RecoveryStrategy::Fail`].
    pub fn recover<T>(result: Result<T, CoreError>, context: &str) -> Result<Option<T>, CoreError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) => match Self::determine_strategy(&err) {
                RecoveryStrategy::SkipKeyword => {
                    warn!(
                        code = %err.error_code(),
                        "{}: {}; skipping for this cycle", context, err
                    );
                    Ok(None)
                }
                RecoveryStrategy::DropNotification => {
                    warn!(
                        code = %err.error_code(),
                        "{}: {}; notification dropped", context, err
                    );
                    Ok(None)
                }
                RecoveryStrategy::Fail => {
                    error!(code = %err.error_code(), "{}: {}", context, err);
                    Err(err)
                }
            },
        }
    }
}
