use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Cents;

pub type AccountId = i64;

/// A ledger account. The balance is kept in step with the entries posted
/// against the account; it is only ever moved by an atomic increment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Username of the owning user
    pub owner: String,
    pub balance: Cents,
    /// ISO 4217 code, e.g. "USD"
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn is_overdrawn(&self) -> bool {
        self.balance < 0
    }

    pub fn is_owned_by(&self, username: &str) -> bool {
        self.owner == username
    }
}
