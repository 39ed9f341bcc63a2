pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod storage;
pub mod telemetry;

pub use config::{OverdraftPolicy, StoreConfig};
pub use domain::*;
pub use storage::{SqliteStore, Store, StoreError};
