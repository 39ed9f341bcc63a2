use thiserror::Error;

use crate::domain::{AccountId, Cents};

/// Failures reported by the store. Repository errors pass through the unit of
/// work and the transfer coordinator unchanged.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    #[error("check constraint violated: {0}")]
    CheckViolation(String),

    #[error("insufficient funds in account {account_id}: balance {balance}, required {required}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Cents,
        required: Cents,
    },

    #[error("transaction cancelled")]
    Cancelled,

    #[error("transaction deadline exceeded")]
    DeadlineExceeded,

    #[error("after-create hook failed: {0}")]
    Hook(#[source] anyhow::Error),

    #[error("invalid stored data: {0}")]
    InvalidData(String),

    #[error("transaction error: {source}, rollback error: {rollback}")]
    Rollback {
        source: Box<StoreError>,
        rollback: sqlx::Error,
    },

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    /// True when repeating the whole call may succeed. Nothing is partially
    /// committed on failure, so a retry never double-applies.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::DeadlineExceeded => true,
            StoreError::Rollback { source, .. } => source.is_retryable(),
            StoreError::Database(err) => match err {
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
                // SQLITE_BUSY, SQLITE_LOCKED and their extended codes
                sqlx::Error::Database(db) => db
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
                _ => false,
            },
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self.cause(),
            StoreError::NotFound | StoreError::AccountNotFound(_)
        )
    }

    /// The error that caused the unit of work to abort, looking through a
    /// failed rollback.
    pub fn cause(&self) -> &StoreError {
        match self {
            StoreError::Rollback { source, .. } => source.cause(),
            other => other,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::UniqueViolation(db.message().to_string());
            }
            if db.is_foreign_key_violation() {
                return StoreError::ForeignKeyViolation(db.message().to_string());
            }
            if db.is_check_violation() {
                return StoreError::CheckViolation(db.message().to_string());
            }
        }
        if matches!(err, sqlx::Error::RowNotFound) {
            return StoreError::NotFound;
        }
        StoreError::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_rollback_keeps_both_errors() {
        let err = StoreError::Rollback {
            source: Box::new(StoreError::Cancelled),
            rollback: sqlx::Error::PoolClosed,
        };
        let message = err.to_string();
        assert!(message.contains("transaction cancelled"), "{message}");
        assert!(message.contains("rollback error"), "{message}");
        assert!(matches!(err.cause(), StoreError::Cancelled));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(StoreError::DeadlineExceeded.is_retryable());
        assert!(!StoreError::Cancelled.is_retryable());
        assert!(!StoreError::UniqueViolation("users.email".into()).is_retryable());
        let wrapped = StoreError::Rollback {
            source: Box::new(StoreError::Database(sqlx::Error::PoolTimedOut)),
            rollback: sqlx::Error::PoolClosed,
        };
        assert!(wrapped.is_retryable());
    }
}
