use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::{Account, AccountId, Cents, Currency, Entry, Transfer, User};
use crate::storage::{
    AfterCreate, CreateAccountParams, CreateUserParams, LedgerStats, ListAccountsParams,
    ListEntriesParams, ListTransfersParams, Store, StoreError, TransferTxParams, TransferTxResult,
};

use super::AppError;

/// Entry point for clients (CLI, API handlers). Performs the validation the
/// store expects to have happened before it is called.
pub struct BankService {
    store: Arc<dyn Store>,
}

/// A request to move money, as a client submits it.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Cents,
    /// Both accounts must hold this currency
    pub currency: String,
    /// When set, the source account must belong to this user
    pub acting_user: Option<String>,
}

/// One page of a listing. Numbers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    number: i64,
    size: i64,
}

impl Page {
    pub const MIN_SIZE: i64 = 5;
    pub const MAX_SIZE: i64 = 10;

    pub fn new(number: i64, size: i64) -> Result<Self, AppError> {
        if number < 1 {
            return Err(AppError::InvalidPage(format!(
                "page number must be at least 1, got {}",
                number
            )));
        }
        if !(Self::MIN_SIZE..=Self::MAX_SIZE).contains(&size) {
            return Err(AppError::InvalidPage(format!(
                "page size must be between {} and {}, got {}",
                Self::MIN_SIZE,
                Self::MAX_SIZE,
                size
            )));
        }
        Ok(Self { number, size })
    }

    pub fn first() -> Self {
        Self {
            number: 1,
            size: Self::MIN_SIZE,
        }
    }

    pub fn limit(&self) -> i64 {
        self.size
    }

    pub fn offset(&self) -> i64 {
        (self.number - 1) * self.size
    }
}

impl BankService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    // ========================
    // User operations
    // ========================

    /// Create a user, running `after_create` inside the same unit of work.
    pub async fn create_user(
        &self,
        params: CreateUserParams,
        after_create: AfterCreate,
        cancel: &CancellationToken,
    ) -> Result<User, AppError> {
        let username = params.username.clone();
        self.store
            .create_user_tx(params, after_create, cancel)
            .await
            .map_err(|err| match err {
                StoreError::UniqueViolation(_) => {
                    AppError::AlreadyExists(format!("user {}", username))
                }
                StoreError::Cancelled => AppError::Cancelled,
                other => AppError::Storage(other),
            })
    }

    pub async fn get_user(&self, username: &str) -> Result<User, AppError> {
        self.store.get_user(username).await.map_err(|err| match err {
            StoreError::NotFound => AppError::UserNotFound(username.to_string()),
            other => AppError::Storage(other),
        })
    }

    // ========================
    // Account operations
    // ========================

    /// Open an empty account for `owner`. One account per owner and currency.
    pub async fn create_account(&self, owner: &str, currency: &str) -> Result<Account, AppError> {
        if !Currency::is_supported(currency) {
            return Err(AppError::UnsupportedCurrency(currency.to_string()));
        }

        self.store
            .create_account(CreateAccountParams {
                owner: owner.to_string(),
                balance: 0,
                currency: currency.to_string(),
            })
            .await
            .map_err(|err| match err {
                StoreError::ForeignKeyViolation(_) => AppError::UserNotFound(owner.to_string()),
                StoreError::UniqueViolation(_) => {
                    AppError::AlreadyExists(format!("{} account for {}", currency, owner))
                }
                other => AppError::Storage(other),
            })
    }

    /// Fetch an account, optionally checking it belongs to `acting_user`.
    pub async fn get_account(
        &self,
        id: AccountId,
        acting_user: Option<&str>,
    ) -> Result<Account, AppError> {
        let account = self
            .store
            .get_account(id)
            .await
            .map_err(|err| AppError::from_store(err, id))?;

        if let Some(username) = acting_user {
            ensure_owner(&account, username)?;
        }
        Ok(account)
    }

    pub async fn list_accounts(&self, owner: &str, page: Page) -> Result<Vec<Account>, AppError> {
        Ok(self
            .store
            .list_accounts(ListAccountsParams {
                owner: owner.to_string(),
                limit: page.limit(),
                offset: page.offset(),
            })
            .await?)
    }

    pub async fn account_entries(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<Entry>, AppError> {
        Ok(self
            .store
            .list_entries(ListEntriesParams {
                account_id,
                limit: page.limit(),
                offset: page.offset(),
            })
            .await?)
    }

    /// Transfers in or out of an account, oldest first.
    pub async fn account_transfers(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<Transfer>, AppError> {
        Ok(self
            .store
            .list_transfers(ListTransfersParams {
                from_account_id: account_id,
                to_account_id: account_id,
                limit: page.limit(),
                offset: page.offset(),
            })
            .await?)
    }

    pub async fn ledger_stats(&self) -> Result<LedgerStats, AppError> {
        Ok(self.store.ledger_stats().await?)
    }

    // ========================
    // Transfer operations
    // ========================

    /// Validate a transfer request and hand it to the store.
    pub async fn transfer(
        &self,
        request: TransferRequest,
        cancel: &CancellationToken,
    ) -> Result<TransferTxResult, AppError> {
        if request.amount <= 0 {
            return Err(AppError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }
        if !Currency::is_supported(&request.currency) {
            return Err(AppError::UnsupportedCurrency(request.currency));
        }

        let from_account = self
            .valid_account(request.from_account_id, &request.currency)
            .await?;
        if let Some(username) = &request.acting_user {
            ensure_owner(&from_account, username)?;
        }
        self.valid_account(request.to_account_id, &request.currency)
            .await?;

        debug!(
            from_account_id = request.from_account_id,
            to_account_id = request.to_account_id,
            amount = request.amount,
            "transfer request validated"
        );

        self.store
            .transfer_tx(
                TransferTxParams {
                    from_account_id: request.from_account_id,
                    to_account_id: request.to_account_id,
                    amount: request.amount,
                },
                cancel,
            )
            .await
            .map_err(|err| AppError::from_store(err, request.from_account_id))
    }

    async fn valid_account(&self, id: AccountId, currency: &str) -> Result<Account, AppError> {
        let account = self
            .store
            .get_account(id)
            .await
            .map_err(|err| AppError::from_store(err, id))?;

        if account.currency != currency {
            return Err(AppError::CurrencyMismatch {
                account_id: id,
                expected: currency.to_string(),
                actual: account.currency,
            });
        }
        Ok(account)
    }
}

fn ensure_owner(account: &Account, username: &str) -> Result<(), AppError> {
    if account.is_owned_by(username) {
        Ok(())
    } else {
        Err(AppError::NotOwner {
            account_id: account.id,
            username: username.to_string(),
        })
    }
}
