use std::time::Duration;

/// What a transfer does when it would leave the source account below zero.
///
/// The ledger has always permitted overdrafts, so `Allow` stays the default.
/// `Reject` checks the source balance after the atomic update, inside the
/// same unit of work, so concurrent transfers cannot slip past it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverdraftPolicy {
    #[default]
    Allow,
    Reject,
}

/// Settings for opening a [`crate::storage::SqliteStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// sqlx connection string, e.g. `sqlite:bank.db`
    pub database_url: String,
    pub max_connections: u32,
    /// How long a statement waits on a lock held by another connection
    pub busy_timeout: Duration,
    /// Upper bound on a single unit of work, begin to commit
    pub tx_timeout: Duration,
    pub overdraft_policy: OverdraftPolicy,
}

impl StoreConfig {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_TX_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            busy_timeout: Self::DEFAULT_BUSY_TIMEOUT,
            tx_timeout: Self::DEFAULT_TX_TIMEOUT,
            overdraft_policy: OverdraftPolicy::default(),
        }
    }

    /// Config for a database file on disk.
    pub fn for_path(path: &str) -> Self {
        Self::new(format!("sqlite:{}", path))
    }

    pub fn with_overdraft_policy(mut self, policy: OverdraftPolicy) -> Self {
        self.overdraft_policy = policy;
        self
    }

    pub fn with_tx_timeout(mut self, timeout: Duration) -> Self {
        self.tx_timeout = timeout;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::for_path("bank.db");
        assert_eq!(config.database_url, "sqlite:bank.db");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.overdraft_policy, OverdraftPolicy::Allow);
        assert_eq!(config.tx_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builders() {
        let config = StoreConfig::new("sqlite::memory:")
            .with_overdraft_policy(OverdraftPolicy::Reject)
            .with_tx_timeout(Duration::from_millis(250))
            .with_max_connections(2);
        assert_eq!(config.overdraft_policy, OverdraftPolicy::Reject);
        assert_eq!(config.tx_timeout, Duration::from_millis(250));
        assert_eq!(config.max_connections, 2);
    }
}
