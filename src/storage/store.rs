use std::str::FromStr;

use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::StoreConfig;
use crate::domain::{Account, AccountId, Entry, EntryId, Transfer, TransferId, User};

use super::{
    CreateAccountParams, CreateUserParams, LedgerQueries, LedgerStats, ListAccountsParams,
    ListEntriesParams, ListTransfersParams, MIGRATION_001_INITIAL, Queries, StoreError,
    TransferTxParams, TransferTxResult, UpdateAccountParams, UpdateUserParams, execute_transfer,
};

/// Callback run with the freshly inserted user inside the same unit of work as
/// the insert. An error rolls the user back.
pub type AfterCreate = Box<dyn FnOnce(User) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Storage capability used by the service layer. [`SqliteStore`] is the only
/// backend; the trait keeps callers independent of it.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_user(&self, params: CreateUserParams) -> Result<User, StoreError>;

    async fn get_user(&self, username: &str) -> Result<User, StoreError>;

    async fn update_user(&self, params: UpdateUserParams) -> Result<User, StoreError>;

    async fn create_account(&self, params: CreateAccountParams) -> Result<Account, StoreError>;

    async fn get_account(&self, id: AccountId) -> Result<Account, StoreError>;

    async fn list_accounts(&self, params: ListAccountsParams) -> Result<Vec<Account>, StoreError>;

    async fn update_account(&self, params: UpdateAccountParams) -> Result<Account, StoreError>;

    async fn delete_account(&self, id: AccountId) -> Result<(), StoreError>;

    async fn get_entry(&self, id: EntryId) -> Result<Entry, StoreError>;

    async fn list_entries(&self, params: ListEntriesParams) -> Result<Vec<Entry>, StoreError>;

    async fn get_transfer(&self, id: TransferId) -> Result<Transfer, StoreError>;

    async fn list_transfers(
        &self,
        params: ListTransfersParams,
    ) -> Result<Vec<Transfer>, StoreError>;

    async fn ledger_stats(&self) -> Result<LedgerStats, StoreError>;

    /// Move `amount` from one account to another: one transfer record, two
    /// entries and two balance updates, all committed together or not at all.
    async fn transfer_tx(
        &self,
        params: TransferTxParams,
        cancel: &CancellationToken,
    ) -> Result<TransferTxResult, StoreError>;

    /// Insert a user and run `after_create` in the same unit of work.
    async fn create_user_tx(
        &self,
        params: CreateUserParams,
        after_create: AfterCreate,
        cancel: &CancellationToken,
    ) -> Result<User, StoreError>;
}

/// SQLite-backed store. Cloning shares the underlying pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    config: StoreConfig,
}

impl SqliteStore {
    /// Open a pool on an existing database.
    pub async fn connect(config: StoreConfig) -> Result<Self, StoreError> {
        Self::open(config, false).await
    }

    /// Create the database if needed and apply the schema.
    pub async fn init(config: StoreConfig) -> Result<Self, StoreError> {
        let store = Self::open(config, true).await?;
        store.migrate().await?;
        Ok(store)
    }

    #[instrument(skip(config), fields(database_url = %config.database_url))]
    async fn open(config: StoreConfig, create: bool) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        info!(
            max_connections = config.max_connections,
            overdraft_policy = ?config.overdraft_policy,
            "ledger store opened"
        );
        Ok(Self { pool, config })
    }

    /// Apply the schema. Safe to run against an initialised database.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await?;
        debug!("schema migration 001 applied");
        Ok(())
    }

    /// Close every pooled connection. Waits for checked-out connections.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("ledger store closed");
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Run `f` as one unit of work.
    ///
    /// The transaction is opened with `BEGIN IMMEDIATE`, so the write lock is
    /// held from the first statement and competing units of work wait on the
    /// busy timeout instead of failing on a lock upgrade. If `f` fails, `cancel`
    /// fires, or the configured deadline passes, every write is rolled back. A
    /// failing rollback is reported together with the error that caused it.
    pub async fn exec_tx<T, F>(&self, cancel: &CancellationToken, f: F) -> Result<T, StoreError>
    where
        T: Send,
        F: for<'c> FnOnce(Queries<'c>) -> BoxFuture<'c, Result<T, StoreError>> + Send,
    {
        let deadline = tokio::time::sleep(self.config.tx_timeout);
        tokio::pin!(deadline);

        let mut tx = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StoreError::Cancelled),
            _ = &mut deadline => return Err(StoreError::DeadlineExceeded),
            tx = self.pool.begin_with("BEGIN IMMEDIATE") => tx?,
        };

        let outcome = {
            let work = f(Queries::new(&mut *tx));
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(StoreError::Cancelled),
                _ = &mut deadline => Err(StoreError::DeadlineExceeded),
                result = work => result,
            }
        };

        match outcome {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => match tx.rollback().await {
                Ok(()) => {
                    warn!(error = %err, "unit of work rolled back");
                    Err(err)
                }
                Err(rollback) => {
                    error!(error = %err, rollback_error = %rollback, "rollback failed");
                    Err(StoreError::Rollback {
                        source: Box::new(err),
                        rollback,
                    })
                }
            },
        }
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_user(&self, params: CreateUserParams) -> Result<User, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).create_user(&params).await
    }

    async fn get_user(&self, username: &str) -> Result<User, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).get_user(username).await
    }

    async fn update_user(&self, params: UpdateUserParams) -> Result<User, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).update_user(&params).await
    }

    async fn create_account(&self, params: CreateAccountParams) -> Result<Account, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).create_account(&params).await
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).get_account(id).await
    }

    async fn list_accounts(&self, params: ListAccountsParams) -> Result<Vec<Account>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).list_accounts(&params).await
    }

    async fn update_account(&self, params: UpdateAccountParams) -> Result<Account, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).update_account(params).await
    }

    async fn delete_account(&self, id: AccountId) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).delete_account(id).await
    }

    async fn get_entry(&self, id: EntryId) -> Result<Entry, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).get_entry(id).await
    }

    async fn list_entries(&self, params: ListEntriesParams) -> Result<Vec<Entry>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).list_entries(params).await
    }

    async fn get_transfer(&self, id: TransferId) -> Result<Transfer, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).get_transfer(id).await
    }

    async fn list_transfers(
        &self,
        params: ListTransfersParams,
    ) -> Result<Vec<Transfer>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).list_transfers(params).await
    }

    async fn ledger_stats(&self) -> Result<LedgerStats, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Queries::new(&mut conn).ledger_stats().await
    }

    #[instrument(
        skip(self, cancel),
        fields(
            from_account_id = params.from_account_id,
            to_account_id = params.to_account_id,
            amount = params.amount,
        )
    )]
    async fn transfer_tx(
        &self,
        params: TransferTxParams,
        cancel: &CancellationToken,
    ) -> Result<TransferTxResult, StoreError> {
        let policy = self.config.overdraft_policy;
        let result = self
            .exec_tx(cancel, move |mut q| {
                Box::pin(async move { execute_transfer(&mut q, params, policy).await })
            })
            .await?;

        info!(transfer_id = result.transfer.id, "transfer committed");
        Ok(result)
    }

    #[instrument(skip_all, fields(username = %params.username))]
    async fn create_user_tx(
        &self,
        params: CreateUserParams,
        after_create: AfterCreate,
        cancel: &CancellationToken,
    ) -> Result<User, StoreError> {
        let user = self
            .exec_tx(cancel, move |mut q| {
                Box::pin(async move {
                    let user = q.create_user(&params).await?;
                    after_create(user.clone()).await.map_err(StoreError::Hook)?;
                    Ok(user)
                })
            })
            .await?;

        info!("user created");
        Ok(user)
    }
}
