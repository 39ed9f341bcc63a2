// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bank_ledger::application::BankService;
use bank_ledger::config::{OverdraftPolicy, StoreConfig};
use bank_ledger::domain::{Account, Cents, User};
use bank_ledger::storage::{
    AfterCreate, CreateAccountParams, CreateUserParams, SqliteStore, Store,
};
use tempfile::TempDir;

/// Config for a fresh database file inside `temp_dir`
pub fn test_config(temp_dir: &TempDir, policy: OverdraftPolicy) -> StoreConfig {
    let db_path = temp_dir.path().join("test.db");
    StoreConfig::for_path(db_path.to_str().unwrap()).with_overdraft_policy(policy)
}

/// Helper to create a test store with a temporary database
pub async fn test_store() -> Result<(SqliteStore, TempDir)> {
    test_store_with(OverdraftPolicy::Allow).await
}

pub async fn test_store_with(policy: OverdraftPolicy) -> Result<(SqliteStore, TempDir)> {
    let temp_dir = TempDir::new()?;
    let store = SqliteStore::init(test_config(&temp_dir, policy)).await?;
    Ok((store, temp_dir))
}

/// Store with a short unit-of-work deadline
pub async fn test_store_with_deadline(deadline: Duration) -> Result<(SqliteStore, TempDir)> {
    let temp_dir = TempDir::new()?;
    let config = test_config(&temp_dir, OverdraftPolicy::Allow).with_tx_timeout(deadline);
    let store = SqliteStore::init(config).await?;
    Ok((store, temp_dir))
}

/// Helper to create a test service over a temporary database
pub async fn test_service() -> Result<(BankService, SqliteStore, TempDir)> {
    let (store, temp_dir) = test_store().await?;
    let service = BankService::new(Arc::new(store.clone()));
    Ok((service, store, temp_dir))
}

pub fn user_params(username: &str) -> CreateUserParams {
    CreateUserParams {
        username: username.to_string(),
        hashed_password: "secret-hash".to_string(),
        full_name: format!("{} Example", username),
        email: format!("{}@example.com", username),
    }
}

/// Hook that accepts every user
pub fn no_hook() -> AfterCreate {
    Box::new(|_| Box::pin(async { Ok(()) }))
}

pub async fn create_user(store: &SqliteStore, username: &str) -> Result<User> {
    Ok(store.create_user(user_params(username)).await?)
}

/// Create a user and an account holding `balance`
pub async fn create_account(
    store: &SqliteStore,
    username: &str,
    currency: &str,
    balance: Cents,
) -> Result<Account> {
    if store.get_user(username).await.is_err() {
        create_user(store, username).await?;
    }
    Ok(store
        .create_account(CreateAccountParams {
            owner: username.to_string(),
            balance,
            currency: currency.to_string(),
        })
        .await?)
}

/// Test fixture: two funded USD accounts owned by alice and bob
pub struct TwoAccounts {
    pub alice: Account,
    pub bob: Account,
}

impl TwoAccounts {
    pub async fn create(store: &SqliteStore, alice: Cents, bob: Cents) -> Result<Self> {
        Ok(Self {
            alice: create_account(store, "alice", "USD", alice).await?,
            bob: create_account(store, "bob", "USD", bob).await?,
        })
    }
}
