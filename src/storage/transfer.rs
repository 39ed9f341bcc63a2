use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OverdraftPolicy;
use crate::domain::{Account, AccountId, Cents, Entry, Transfer};

use super::{
    AddAccountBalanceParams, CreateEntryParams, CreateTransferParams, LedgerQueries, StoreError,
};

/// Input to a transfer. `amount` must be positive; callers validate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTxParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Cents,
}

/// Everything a committed transfer wrote, with both accounts as they stand
/// after their balance updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTxResult {
    pub transfer: Transfer,
    pub from_account: Account,
    pub to_account: Account,
    pub from_entry: Entry,
    pub to_entry: Entry,
}

/// Run the transfer steps against `q`. Must be called inside a unit of work:
/// on error the caller rolls back everything written here.
///
/// Balances are updated lowest account id first, whichever side that is, so
/// two transfers over the same pair of accounts always lock them in the same
/// order.
pub async fn execute_transfer<Q>(
    q: &mut Q,
    params: TransferTxParams,
    policy: OverdraftPolicy,
) -> Result<TransferTxResult, StoreError>
where
    Q: LedgerQueries + ?Sized,
{
    fetch_account(q, params.from_account_id).await?;
    fetch_account(q, params.to_account_id).await?;

    let transfer = q
        .create_transfer(CreateTransferParams {
            from_account_id: params.from_account_id,
            to_account_id: params.to_account_id,
            amount: params.amount,
        })
        .await?;

    let from_entry = q
        .create_entry(CreateEntryParams {
            account_id: params.from_account_id,
            amount: -params.amount,
        })
        .await?;

    let to_entry = q
        .create_entry(CreateEntryParams {
            account_id: params.to_account_id,
            amount: params.amount,
        })
        .await?;

    let (from_account, to_account) = if params.from_account_id < params.to_account_id {
        add_money(
            q,
            params.from_account_id,
            -params.amount,
            params.to_account_id,
            params.amount,
        )
        .await?
    } else {
        let (to_account, from_account) = add_money(
            q,
            params.to_account_id,
            params.amount,
            params.from_account_id,
            -params.amount,
        )
        .await?;
        if params.from_account_id == params.to_account_id {
            // Both updates hit one row; only the second state was committed
            (from_account.clone(), from_account)
        } else {
            (from_account, to_account)
        }
    };

    if policy == OverdraftPolicy::Reject && from_account.is_overdrawn() {
        return Err(StoreError::InsufficientFunds {
            account_id: from_account.id,
            balance: from_account.balance + params.amount,
            required: params.amount,
        });
    }

    debug!(
        transfer_id = transfer.id,
        from_balance = from_account.balance,
        to_balance = to_account.balance,
        "transfer steps applied"
    );

    Ok(TransferTxResult {
        transfer,
        from_account,
        to_account,
        from_entry,
        to_entry,
    })
}

/// Look up an account, naming it when it is missing.
async fn fetch_account<Q>(q: &mut Q, id: AccountId) -> Result<Account, StoreError>
where
    Q: LedgerQueries + ?Sized,
{
    q.get_account(id).await.map_err(|err| match err {
        StoreError::NotFound => StoreError::AccountNotFound(id),
        other => other,
    })
}

/// Apply two balance deltas in the order given. Callers pass the lower
/// account id first.
async fn add_money<Q>(
    q: &mut Q,
    first_id: AccountId,
    first_amount: Cents,
    second_id: AccountId,
    second_amount: Cents,
) -> Result<(Account, Account), StoreError>
where
    Q: LedgerQueries + ?Sized,
{
    let first = q
        .add_account_balance(AddAccountBalanceParams {
            id: first_id,
            amount: first_amount,
        })
        .await?;
    let second = q
        .add_account_balance(AddAccountBalanceParams {
            id: second_id,
            amount: second_amount,
        })
        .await?;
    Ok((first, second))
}
