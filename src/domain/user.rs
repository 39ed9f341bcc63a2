use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An account holder. Accounts reference users by `username`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    /// Opaque to the ledger; hashing happens before it gets here
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub full_name: String,
    pub email: String,
    /// None until the password is changed for the first time
    pub password_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
