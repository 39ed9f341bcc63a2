// Application layer: the checks a transfer's callers owe the ledger
// (amounts, currencies, ownership, paging) in front of the store.

pub mod error;
pub mod service;

pub use error::*;
pub use service::*;
