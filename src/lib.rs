pub mod aggregator;
pub mod balance;
pub mod chain_client;
pub mod config;
pub mod erc1155;
pub mod error;
pub mod executor;
pub mod metadata;
pub mod operation_log;
pub mod planner;
pub mod recipients;
pub mod report;
pub mod session;
pub mod types;
pub mod user_settings;
pub mod wallet;

#[cfg(test)]
mod testing;

pub use error::{TransferError, TransferResult};
pub use session::Distributor;
