mod common;

use anyhow::Result;
use bank_ledger::config::{OverdraftPolicy, StoreConfig};
use bank_ledger::storage::{
    CreateAccountParams, ListAccountsParams, SqliteStore, Store, StoreError, UpdateAccountParams,
};
use common::{create_account, create_user, test_config, test_store};

#[tokio::test]
async fn test_account_crud() -> Result<()> {
    let (store, _temp) = test_store().await?;
    let account = create_account(&store, "alice", "USD", 1_000).await?;

    assert!(account.id > 0);
    assert_eq!(account.owner, "alice");
    assert_eq!(account.currency, "USD");
    assert_eq!(account.balance, 1_000);
    assert_eq!(store.get_account(account.id).await?, account);

    let updated = store
        .update_account(UpdateAccountParams {
            id: account.id,
            balance: 250,
        })
        .await?;
    assert_eq!(updated.balance, 250);
    assert_eq!(updated.created_at, account.created_at);

    store.delete_account(account.id).await?;
    assert!(store.get_account(account.id).await.unwrap_err().is_not_found());
    assert!(store.delete_account(account.id).await.unwrap_err().is_not_found());

    Ok(())
}

#[tokio::test]
async fn test_one_account_per_owner_and_currency() -> Result<()> {
    let (store, _temp) = test_store().await?;
    create_account(&store, "alice", "USD", 0).await?;
    create_account(&store, "alice", "EUR", 0).await?;

    let err = store
        .create_account(CreateAccountParams {
            owner: "alice".to_string(),
            balance: 0,
            currency: "USD".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation(_)));

    Ok(())
}

#[tokio::test]
async fn test_account_requires_existing_owner() -> Result<()> {
    let (store, _temp) = test_store().await?;

    let err = store
        .create_account(CreateAccountParams {
            owner: "ghost".to_string(),
            balance: 0,
            currency: "USD".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::ForeignKeyViolation(_)));

    Ok(())
}

#[tokio::test]
async fn test_list_accounts_pages_by_id() -> Result<()> {
    let (store, _temp) = test_store().await?;
    create_user(&store, "alice").await?;
    for currency in ["USD", "CAD", "EUR"] {
        create_account(&store, "alice", currency, 0).await?;
    }
    create_account(&store, "bob", "USD", 0).await?;

    let first = store
        .list_accounts(ListAccountsParams {
            owner: "alice".to_string(),
            limit: 2,
            offset: 0,
        })
        .await?;
    let second = store
        .list_accounts(ListAccountsParams {
            owner: "alice".to_string(),
            limit: 2,
            offset: 2,
        })
        .await?;

    assert_eq!(
        first.iter().map(|a| a.currency.as_str()).collect::<Vec<_>>(),
        vec!["USD", "CAD"]
    );
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].currency, "EUR");
    assert!(first[0].id < first[1].id && first[1].id < second[0].id);
    assert!(first.iter().chain(&second).all(|a| a.owner == "alice"));

    Ok(())
}

#[tokio::test]
async fn test_migrate_is_idempotent_and_data_survives_reopen() -> Result<()> {
    let temp_dir = tempfile::TempDir::new()?;
    let config = test_config(&temp_dir, OverdraftPolicy::Allow);

    let store = SqliteStore::init(config.clone()).await?;
    let account = create_account(&store, "alice", "USD", 42).await?;
    store.migrate().await?;
    store.close().await;

    let reopened = SqliteStore::connect(config.clone()).await?;
    assert_eq!(reopened.config().database_url, config.database_url);
    assert_eq!(reopened.get_account(account.id).await?.balance, 42);
    assert_eq!(reopened.ledger_stats().await?.accounts, 1);

    Ok(())
}

#[tokio::test]
async fn test_connect_requires_existing_database() -> Result<()> {
    let temp_dir = tempfile::TempDir::new()?;
    let missing = temp_dir.path().join("missing.db");

    let result = SqliteStore::connect(StoreConfig::for_path(missing.to_str().unwrap())).await;
    assert!(result.is_err());

    Ok(())
}
