use thiserror::Error;

use crate::domain::{AccountId, Cents};
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Account {account_id} currency mismatch: {actual} vs {expected}")]
    CurrencyMismatch {
        account_id: AccountId,
        expected: String,
        actual: String,
    },

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid page: {0}")]
    InvalidPage(String),

    #[error("Account {account_id} does not belong to {username}")]
    NotOwner {
        account_id: AccountId,
        username: String,
    },

    #[error("Insufficient funds in account {account_id}: balance {balance}, required {required}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Cents,
        required: Cents,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl AppError {
    /// Translate a store failure. A bare `NotFound` is attributed to
    /// `account_id`; the transfer coordinator names the missing account itself.
    pub(crate) fn from_store(err: StoreError, account_id: AccountId) -> Self {
        match err.cause() {
            StoreError::AccountNotFound(missing) => return AppError::AccountNotFound(*missing),
            StoreError::NotFound => return AppError::AccountNotFound(account_id),
            StoreError::Cancelled => return AppError::Cancelled,
            StoreError::InsufficientFunds {
                account_id,
                balance,
                required,
            } => {
                return AppError::InsufficientFunds {
                    account_id: *account_id,
                    balance: *balance,
                    required: *required,
                };
            }
            StoreError::UniqueViolation(what) => return AppError::AlreadyExists(what.clone()),
            StoreError::ForeignKeyViolation(what) => return AppError::Conflict(what.clone()),
            _ => {}
        }
        AppError::Storage(err)
    }

    /// Whether the caller got something wrong, as opposed to the ledger
    /// failing. The API layer maps these to 4xx responses.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, AppError::Storage(_) | AppError::Cancelled)
    }
}
