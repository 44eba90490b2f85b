//! # Database Error Types
//!
//! Error types for persistence and engine operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  CoreError (rules)          sqlx::Error (SQLite)                        │
//! │       │                          │                                      │
//! │       │ transparent              │ From<sqlx::Error>                    │
//! │       ▼                          ▼                                      │
//! │  ┌──────────────────────────────────────────────────┐                  │
//! │  │                    DbError                       │                  │
//! │  │  Core(..)  NotFound  ConsistencyViolation  ...   │                  │
//! │  └──────────────────────────────────────────────────┘                  │
//! │       │                                                                 │
//! │       │ ConsistencyViolation? → engine retries the whole unit once      │
//! │       ▼                                                                 │
//! │  request handler                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::borrow::Cow;

use mizan_core::{CoreError, ValidationError};
use thiserror::Error;

/// Errors surfaced by the database crate.
#[derive(Debug, Error)]
pub enum DbError {
    /// A ledger rule was violated (insufficient stock, overpayment, ...).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Entity not found (or soft-deleted).
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A concurrent writer got in the way of this unit of work.
    ///
    /// ## When This Occurs
    /// - SQLite reports the database as busy or locked
    /// - An invoice's version changed between read and write
    ///
    /// Engines retry the whole operation once before surfacing this.
    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),

    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Configuration could not be read or is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether the engines should re-run the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::ConsistencyViolation(_))
    }

    /// The wrapped rule violation, if any.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            DbError::Core(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for DbError {
    fn from(err: ValidationError) -> Self {
        DbError::Core(CoreError::Validation(err))
    }
}

/// SQLite primary result codes that mean "someone else holds the lock".
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

fn is_lock_contention(code: Option<Cow<'_, str>>, message: &str) -> bool {
    let primary = code
        .and_then(|c| c.parse::<i32>().ok())
        .map(|extended| extended & 0xff);
    matches!(primary, Some(SQLITE_BUSY) | Some(SQLITE_LOCKED))
        || message.contains("database is locked")
        || message.contains("database table is locked")
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → busy/locked  → ConsistencyViolation
///                               UNIQUE       → UniqueViolation
///                               FOREIGN KEY  → ForeignKeyViolation
///                               other        → QueryFailed
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                if is_lock_contention(db_err.code(), msg) {
                    DbError::ConsistencyViolation(msg.to_string())
                } else if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<toml::de::Error> for DbError {
    fn from(err: toml::de::Error) -> Self {
        DbError::InvalidConfig(err.to_string())
    }
}

impl From<toml::ser::Error> for DbError {
    fn from(err: toml::ser::Error) -> Self {
        DbError::InvalidConfig(err.to_string())
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        DbError::InvalidConfig(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;
    use mizan_core::Quantity;

    #[test]
    fn test_lock_contention_detection() {
        assert!(is_lock_contention(Some(Cow::Borrowed("5")), ""));
        assert!(is_lock_contention(Some(Cow::Borrowed("517")), ""));
        assert!(is_lock_contention(Some(Cow::Borrowed("6")), ""));
        assert!(is_lock_contention(None, "database is locked"));
        assert!(!is_lock_contention(Some(Cow::Borrowed("2067")), "UNIQUE constraint failed"));
    }

    #[test]
    fn test_core_error_is_transparent() {
        let err: DbError = CoreError::InsufficientStock {
            product_id: "p".to_string(),
            available: Quantity::zero(),
            required: Quantity::from_units(1),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product p: available 0, required 1"
        );
        assert!(!err.is_retryable());
        assert!(err.as_core().is_some());
    }

    #[test]
    fn test_consistency_violation_is_retryable() {
        assert!(DbError::ConsistencyViolation("busy".into()).is_retryable());
        assert!(!DbError::not_found("Invoice", "x").is_retryable());
    }
}
