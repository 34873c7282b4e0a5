//! Typed error kinds for balance queries and transfer sessions.

use ethers::types::U256;

/// Errors surfaced by the transfer core.
///
/// Validation variants (`EmptyRecipientList`, `InsufficientBalance`, `InvalidAmount`,
/// `InvalidTokenRef`) are raised before any transfer is sent. `BatchFailure` is recorded
/// per batch and never aborts a running session.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransferError {
    /// No signing capability is available.
    #[error("No wallet available: {0}")]
    Connection(String),

    /// A balance or URI query against the token contract failed.
    #[error("Error checking token balance: {0}. Make sure the contract address and token ID are valid.")]
    Query(String),

    /// Metadata could not be resolved. Logged only.
    #[error("Token metadata unavailable: {0}")]
    MetadataUnavailable(String),

    /// `required` is None when the total does not fit in 256 bits.
    #[error("{}", insufficient_message(.required, .available))]
    InsufficientBalance { required: Option<U256>, available: U256 },

    #[error("Please provide at least one recipient address")]
    EmptyRecipientList,

    #[error("Amount per recipient must be at least 1")]
    InvalidAmount,

    #[error("Invalid token: {0}")]
    InvalidTokenRef(String),

    /// Another transfer session is already running against this account.
    #[error("A transfer session is already in progress")]
    SessionInProgress,

    #[error("Batch {index} failed: {reason}")]
    BatchFailure { index: usize, reason: String },
}

pub type TransferResult<T> = std::result::Result<T, TransferError>;

fn insufficient_message(required: &Option<U256>, available: &U256) -> String {
    match required {
        Some(required) => format!(
            "Not enough tokens. You have {} tokens but trying to send {}",
            available, required
        ),
        None => format!(
            "Not enough tokens. You have {} tokens but the requested total overflows a 256-bit amount",
            available
        ),
    }
}

impl TransferError {
    /// True for errors raised by input validation, before any ledger call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TransferError::EmptyRecipientList
                | TransferError::InsufficientBalance { .. }
                | TransferError::InvalidAmount
                | TransferError::InvalidTokenRef(_)
        )
    }
}
