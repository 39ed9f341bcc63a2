use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, Cents, Entry};

pub type TransferId = i64;

/// The logical record of one movement of money between two accounts.
/// Immutable once written; its two entries carry the actual postings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    /// Source account (balance decreases)
    pub from_account_id: AccountId,
    /// Destination account (balance increases)
    pub to_account_id: AccountId,
    /// Always positive
    pub amount: Cents,
    pub created_at: DateTime<Utc>,
}

impl Transfer {
    pub fn involves(&self, account_id: AccountId) -> bool {
        self.from_account_id == account_id || self.to_account_id == account_id
    }

    /// Whether `debit` and `credit` are exactly the two postings this transfer
    /// implies: `-amount` against the source and `+amount` against the
    /// destination.
    pub fn is_balanced_by(&self, debit: &Entry, credit: &Entry) -> bool {
        debit.account_id == self.from_account_id
            && debit.amount == -self.amount
            && credit.account_id == self.to_account_id
            && credit.amount == self.amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(from: AccountId, to: AccountId, amount: Cents) -> Transfer {
        Transfer {
            id: 1,
            from_account_id: from,
            to_account_id: to,
            amount,
            created_at: Utc::now(),
        }
    }

    fn entry(account_id: AccountId, amount: Cents) -> Entry {
        Entry {
            id: 1,
            account_id,
            amount,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_involves() {
        let t = transfer(3, 7, 10);
        assert!(t.involves(3));
        assert!(t.involves(7));
        assert!(!t.involves(5));
    }

    #[test]
    fn test_balanced_postings() {
        let t = transfer(3, 7, 10);
        assert!(t.is_balanced_by(&entry(3, -10), &entry(7, 10)));
        // Legs swapped
        assert!(!t.is_balanced_by(&entry(7, 10), &entry(3, -10)));
        // Wrong amount on one side
        assert!(!t.is_balanced_by(&entry(3, -10), &entry(7, 9)));
    }
}
