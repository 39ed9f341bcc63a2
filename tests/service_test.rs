mod common;

use anyhow::Result;
use bank_ledger::application::{AppError, Page, TransferRequest};
use bank_ledger::storage::Store;
use common::{no_hook, test_service, user_params};
use tokio_util::sync::CancellationToken;

fn request(from: i64, to: i64, amount: i64, currency: &str) -> TransferRequest {
    TransferRequest {
        from_account_id: from,
        to_account_id: to,
        amount,
        currency: currency.to_string(),
        acting_user: None,
    }
}

#[tokio::test]
async fn test_open_accounts_and_transfer() -> Result<()> {
    let (service, store, _temp) = test_service().await?;
    let cancel = CancellationToken::new();

    service.create_user(user_params("alice"), no_hook(), &cancel).await?;
    service.create_user(user_params("bob"), no_hook(), &cancel).await?;
    let alice = service.create_account("alice", "USD").await?;
    let bob = service.create_account("bob", "USD").await?;
    assert_eq!(alice.balance, 0);

    let mut req = request(alice.id, bob.id, 2_500, "USD");
    req.acting_user = Some("alice".to_string());
    let result = service.transfer(req, &cancel).await?;

    // Overdrafts are allowed unless the store is configured otherwise
    assert_eq!(result.from_account.balance, -2_500);
    assert_eq!(result.to_account.balance, 2_500);

    let entries = service.account_entries(bob.id, Page::first()).await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].amount, 2_500);

    let transfers = service.account_transfers(alice.id, Page::first()).await?;
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].id, result.transfer.id);

    assert_eq!(store.ledger_stats().await?.entry_total, 0);

    Ok(())
}

#[tokio::test]
async fn test_transfer_request_validation() -> Result<()> {
    let (service, _store, _temp) = test_service().await?;
    let cancel = CancellationToken::new();

    service.create_user(user_params("alice"), no_hook(), &cancel).await?;
    service.create_user(user_params("bob"), no_hook(), &cancel).await?;
    let alice_usd = service.create_account("alice", "USD").await?;
    let alice_eur = service.create_account("alice", "EUR").await?;
    let bob_usd = service.create_account("bob", "USD").await?;

    let err = service
        .transfer(request(alice_usd.id, bob_usd.id, 0, "USD"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidAmount(_)));

    let err = service
        .transfer(request(alice_usd.id, bob_usd.id, 10, "JPY"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::UnsupportedCurrency(_)));

    let err = service
        .transfer(request(alice_eur.id, bob_usd.id, 10, "USD"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::CurrencyMismatch { account_id, .. } if account_id == alice_eur.id));

    let err = service
        .transfer(request(alice_usd.id, 9999, 10, "USD"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccountNotFound(9999)));

    let mut as_bob = request(alice_usd.id, bob_usd.id, 10, "USD");
    as_bob.acting_user = Some("bob".to_string());
    let err = service.transfer(as_bob, &cancel).await.unwrap_err();
    assert!(matches!(err, AppError::NotOwner { .. }));
    assert!(err.is_client_error());

    // None of the rejected requests touched the ledger
    assert_eq!(service.ledger_stats().await?.transfers, 0);

    Ok(())
}

#[tokio::test]
async fn test_account_creation_errors() -> Result<()> {
    let (service, _store, _temp) = test_service().await?;
    let cancel = CancellationToken::new();

    let err = service.create_account("ghost", "USD").await.unwrap_err();
    assert!(matches!(err, AppError::UserNotFound(ref name) if name == "ghost"));

    service.create_user(user_params("alice"), no_hook(), &cancel).await?;
    let err = service.create_account("alice", "GBP").await.unwrap_err();
    assert!(matches!(err, AppError::UnsupportedCurrency(_)));

    service.create_account("alice", "CAD").await?;
    let err = service.create_account("alice", "CAD").await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyExists(_)));

    let err = service
        .create_user(user_params("alice"), no_hook(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyExists(_)));

    Ok(())
}

#[tokio::test]
async fn test_account_ownership_and_paging() -> Result<()> {
    let (service, _store, _temp) = test_service().await?;
    let cancel = CancellationToken::new();

    service.create_user(user_params("alice"), no_hook(), &cancel).await?;
    let account = service.create_account("alice", "USD").await?;

    assert_eq!(service.get_account(account.id, Some("alice")).await?, account);
    assert_eq!(service.get_account(account.id, None).await?, account);
    let err = service
        .get_account(account.id, Some("mallory"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotOwner { .. }));

    let accounts = service.list_accounts("alice", Page::new(1, 5)?).await?;
    assert_eq!(accounts, vec![account]);
    assert!(service.list_accounts("alice", Page::new(2, 5)?).await?.is_empty());

    assert!(matches!(Page::new(0, 5), Err(AppError::InvalidPage(_))));

    let err = service.get_user("nobody").await.unwrap_err();
    assert!(matches!(err, AppError::UserNotFound(_)));

    Ok(())
}
