use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::domain::{Account, AccountId, Cents, Entry, EntryId, Transfer, TransferId, User};

use super::StoreError;

const ACCOUNT_COLUMNS: &str = "id, owner, balance, currency, created_at";
const ENTRY_COLUMNS: &str = "id, account_id, amount, created_at";
const TRANSFER_COLUMNS: &str = "id, from_account_id, to_account_id, amount, created_at";
const USER_COLUMNS: &str =
    "username, hashed_password, full_name, email, password_changed_at, created_at";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserParams {
    pub username: String,
    pub hashed_password: String,
    pub full_name: String,
    pub email: String,
}

/// Fields left as `None` keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct UpdateUserParams {
    pub username: String,
    pub hashed_password: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountParams {
    pub owner: String,
    pub balance: Cents,
    pub currency: String,
}

#[derive(Debug, Clone, Copy)]
pub struct UpdateAccountParams {
    pub id: AccountId,
    pub balance: Cents,
}

#[derive(Debug, Clone, Copy)]
pub struct AddAccountBalanceParams {
    pub id: AccountId,
    pub amount: Cents,
}

#[derive(Debug, Clone)]
pub struct ListAccountsParams {
    pub owner: String,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct CreateEntryParams {
    pub account_id: AccountId,
    pub amount: Cents,
}

#[derive(Debug, Clone, Copy)]
pub struct ListEntriesParams {
    pub account_id: AccountId,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct CreateTransferParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Cents,
}

/// Matches transfers where either side equals the given id.
#[derive(Debug, Clone, Copy)]
pub struct ListTransfersParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub limit: i64,
    pub offset: i64,
}

/// Row counts across the ledger tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub users: i64,
    pub accounts: i64,
    pub entries: i64,
    pub transfers: i64,
    /// Sum of all entry amounts. Every transfer nets to zero.
    pub entry_total: Cents,
}

/// The repository capability the transfer coordinator is written against.
///
/// [`Queries`] is the production implementation; tests wrap it to inject
/// failures at individual steps.
#[async_trait]
pub trait LedgerQueries: Send {
    async fn get_account(&mut self, id: AccountId) -> Result<Account, StoreError>;

    async fn create_transfer(
        &mut self,
        params: CreateTransferParams,
    ) -> Result<Transfer, StoreError>;

    async fn create_entry(&mut self, params: CreateEntryParams) -> Result<Entry, StoreError>;

    /// Atomically add `amount` to the stored balance and return the updated
    /// account. Never a read followed by a write.
    async fn add_account_balance(
        &mut self,
        params: AddAccountBalanceParams,
    ) -> Result<Account, StoreError>;
}

/// Single-statement reads and writes over one connection. Inside a unit of
/// work the connection is the open transaction.
pub struct Queries<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> Queries<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    // ========================
    // User operations
    // ========================

    pub async fn create_user(&mut self, params: &CreateUserParams) -> Result<User, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO users (username, hashed_password, full_name, email, created_at) \
             VALUES (?, ?, ?, ?, ?) RETURNING {USER_COLUMNS}"
        ))
        .bind(&params.username)
        .bind(&params.hashed_password)
        .bind(&params.full_name)
        .bind(&params.email)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&mut *self.conn)
        .await?;

        row_to_user(&row)
    }

    pub async fn get_user(&mut self, username: &str) -> Result<User, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(username)
        .fetch_one(&mut *self.conn)
        .await?;

        row_to_user(&row)
    }

    /// Update the given fields. Setting a password stamps `password_changed_at`.
    pub async fn update_user(&mut self, params: &UpdateUserParams) -> Result<User, StoreError> {
        let password_changed_at = params
            .hashed_password
            .as_ref()
            .map(|_| Utc::now().to_rfc3339());

        let row = sqlx::query(&format!(
            r#"
            UPDATE users
            SET hashed_password = COALESCE(?, hashed_password),
                password_changed_at = COALESCE(?, password_changed_at),
                full_name = COALESCE(?, full_name),
                email = COALESCE(?, email)
            WHERE username = ?
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&params.hashed_password)
        .bind(password_changed_at)
        .bind(&params.full_name)
        .bind(&params.email)
        .bind(&params.username)
        .fetch_one(&mut *self.conn)
        .await?;

        row_to_user(&row)
    }

    // ========================
    // Account operations
    // ========================

    pub async fn create_account(
        &mut self,
        params: &CreateAccountParams,
    ) -> Result<Account, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO accounts (owner, balance, currency, created_at) \
             VALUES (?, ?, ?, ?) RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(&params.owner)
        .bind(params.balance)
        .bind(&params.currency)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&mut *self.conn)
        .await?;

        row_to_account(&row)
    }

    /// Accounts of one owner, ordered by id.
    pub async fn list_accounts(
        &mut self,
        params: &ListAccountsParams,
    ) -> Result<Vec<Account>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE owner = ? ORDER BY id LIMIT ? OFFSET ?"
        ))
        .bind(&params.owner)
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(&mut *self.conn)
        .await?;

        rows.iter().map(row_to_account).collect()
    }

    /// Overwrite a balance. Administrative only; transfers go through
    /// [`LedgerQueries::add_account_balance`].
    pub async fn update_account(
        &mut self,
        params: UpdateAccountParams,
    ) -> Result<Account, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE accounts SET balance = ? WHERE id = ? RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(params.balance)
        .bind(params.id)
        .fetch_one(&mut *self.conn)
        .await?;

        row_to_account(&row)
    }

    pub async fn delete_account(&mut self, id: AccountId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ========================
    // Entry operations
    // ========================

    pub async fn get_entry(&mut self, id: EntryId) -> Result<Entry, StoreError> {
        let row = sqlx::query(&format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?"))
            .bind(id)
            .fetch_one(&mut *self.conn)
            .await?;

        row_to_entry(&row)
    }

    pub async fn list_entries(
        &mut self,
        params: ListEntriesParams,
    ) -> Result<Vec<Entry>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE account_id = ? ORDER BY id LIMIT ? OFFSET ?"
        ))
        .bind(params.account_id)
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(&mut *self.conn)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }

    // ========================
    // Transfer operations
    // ========================

    pub async fn get_transfer(&mut self, id: TransferId) -> Result<Transfer, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(&mut *self.conn)
        .await?;

        row_to_transfer(&row)
    }

    pub async fn list_transfers(
        &mut self,
        params: ListTransfersParams,
    ) -> Result<Vec<Transfer>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRANSFER_COLUMNS}
            FROM transfers
            WHERE from_account_id = ? OR to_account_id = ?
            ORDER BY id
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(params.from_account_id)
        .bind(params.to_account_id)
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(&mut *self.conn)
        .await?;

        rows.iter().map(row_to_transfer).collect()
    }

    pub async fn ledger_stats(&mut self) -> Result<LedgerStats, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS users,
                (SELECT COUNT(*) FROM accounts) AS accounts,
                (SELECT COUNT(*) FROM entries) AS entries,
                (SELECT COUNT(*) FROM transfers) AS transfers,
                (SELECT COALESCE(SUM(amount), 0) FROM entries) AS entry_total
            "#,
        )
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(LedgerStats {
            users: row.get("users"),
            accounts: row.get("accounts"),
            entries: row.get("entries"),
            transfers: row.get("transfers"),
            entry_total: row.get("entry_total"),
        })
    }
}

#[async_trait]
impl<'c> LedgerQueries for Queries<'c> {
    async fn get_account(&mut self, id: AccountId) -> Result<Account, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(&mut *self.conn)
        .await?;

        row_to_account(&row)
    }

    async fn create_transfer(
        &mut self,
        params: CreateTransferParams,
    ) -> Result<Transfer, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO transfers (from_account_id, to_account_id, amount, created_at) \
             VALUES (?, ?, ?, ?) RETURNING {TRANSFER_COLUMNS}"
        ))
        .bind(params.from_account_id)
        .bind(params.to_account_id)
        .bind(params.amount)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&mut *self.conn)
        .await?;

        row_to_transfer(&row)
    }

    async fn create_entry(&mut self, params: CreateEntryParams) -> Result<Entry, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO entries (account_id, amount, created_at) \
             VALUES (?, ?, ?) RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(params.account_id)
        .bind(params.amount)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&mut *self.conn)
        .await?;

        row_to_entry(&row)
    }

    async fn add_account_balance(
        &mut self,
        params: AddAccountBalanceParams,
    ) -> Result<Account, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE accounts SET balance = balance + ? WHERE id = ? RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(params.amount)
        .bind(params.id)
        .fetch_one(&mut *self.conn)
        .await?;

        row_to_account(&row)
    }
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidData(format!("{column} '{value}': {e}")))
}

fn row_to_user(row: &SqliteRow) -> Result<User, StoreError> {
    let created_at: String = row.get("created_at");
    let password_changed_at: Option<String> = row.get("password_changed_at");

    Ok(User {
        username: row.get("username"),
        hashed_password: row.get("hashed_password"),
        full_name: row.get("full_name"),
        email: row.get("email"),
        password_changed_at: password_changed_at
            .map(|s| parse_timestamp(&s, "password_changed_at"))
            .transpose()?,
        created_at: parse_timestamp(&created_at, "created_at")?,
    })
}

fn row_to_account(row: &SqliteRow) -> Result<Account, StoreError> {
    let created_at: String = row.get("created_at");

    Ok(Account {
        id: row.get("id"),
        owner: row.get("owner"),
        balance: row.get("balance"),
        currency: row.get("currency"),
        created_at: parse_timestamp(&created_at, "created_at")?,
    })
}

fn row_to_entry(row: &SqliteRow) -> Result<Entry, StoreError> {
    let created_at: String = row.get("created_at");

    Ok(Entry {
        id: row.get("id"),
        account_id: row.get("account_id"),
        amount: row.get("amount"),
        created_at: parse_timestamp(&created_at, "created_at")?,
    })
}

fn row_to_transfer(row: &SqliteRow) -> Result<Transfer, StoreError> {
    let created_at: String = row.get("created_at");

    Ok(Transfer {
        id: row.get("id"),
        from_account_id: row.get("from_account_id"),
        to_account_id: row.get("to_account_id"),
        amount: row.get("amount"),
        created_at: parse_timestamp(&created_at, "created_at")?,
    })
}
