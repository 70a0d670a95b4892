//! Unified error handling for the user store.
//!
//! Every store operation returns [`AppResult`]. The variants map one-to-one
//! onto the outcomes callers are expected to handle:
//! - caller-correctable: `NotFound`, `DuplicateUsername`, `InvalidInput`
//! - retryable at the caller's discretion: `Timeout`, `StorageUnavailable`

use domain::DomainError;
use thiserror::Error;

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    // Resource errors
    #[error("Resource not found")]
    NotFound,

    #[error("Username '{0}' already exists")]
    DuplicateUsername(String),

    // Validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Concurrency
    #[error("Timed out waiting for lock on {0}")]
    Timeout(String),

    // External service errors
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[cfg(feature = "database")]
    #[error("Database error")]
    Database(sea_orm::DbErr),

    // Internal
    #[error("Internal error")]
    Internal(String),
}

impl AppError {
    /// Get stable error code for callers
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound => "NOT_FOUND",
            AppError::DuplicateUsername(_) => "DUPLICATE_USERNAME",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            #[cfg(feature = "database")]
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether a caller may reasonably retry the same call.
    ///
    /// The store itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Timeout(_) | AppError::StorageUnavailable(_))
    }

    /// Get user-facing message (hides internal details)
    pub fn user_message(&self) -> String {
        match self {
            #[cfg(feature = "database")]
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "A database error occurred".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }
            AppError::StorageUnavailable(msg) => {
                tracing::error!("Storage unavailable: {}", msg);
                "The user store is unavailable".to_string()
            }
            _ => self.to_string(),
        }
    }
}

// =============================================================================
// Database Error Conversion
// =============================================================================

#[cfg(feature = "database")]
impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        use sea_orm::DbErr;

        match err {
            DbErr::Conn(e) => AppError::StorageUnavailable(e.to_string()),
            DbErr::ConnectionAcquire(e) => AppError::StorageUnavailable(e.to_string()),
            other => AppError::Database(other),
        }
    }
}

// =============================================================================
// Domain Error Conversion
// =============================================================================

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => AppError::InvalidInput(msg),
        }
    }
}

/// Result type alias
pub type AppResult<T> = Result<T, AppError>;

/// Extension trait for Option -> AppError conversion
pub trait OptionExt<T> {
    fn ok_or_not_found(self) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self) -> AppResult<T> {
        self.ok_or(AppError::NotFound)
    }
}

/// Convenience constructors
impl AppError {
    pub fn duplicate_username(username: impl Into<String>) -> Self {
        AppError::DuplicateUsername(username.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        AppError::InvalidInput(msg.into())
    }

    pub fn timeout(resource: impl Into<String>) -> Self {
        AppError::Timeout(resource.into())
    }

    pub fn storage_unavailable(msg: impl Into<String>) -> Self {
        AppError::StorageUnavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}
