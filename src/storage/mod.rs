mod error;
mod queries;
mod store;
mod transfer;

pub use error::*;
pub use queries::*;
pub use store::*;
pub use transfer::*;

/// SQL migration for the initial ledger schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");
