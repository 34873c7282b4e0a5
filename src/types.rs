//! Common types shared across modules.

use crate::error::{TransferError, TransferResult};
use ethers::prelude::*;

/// The connected operator account and the chain it is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountInfo {
    pub address: Address,
    pub chain_id: u64,
}

/// The semi-fungible token being inspected or distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRef {
    pub contract: Address,
    pub token_id: U256,
}

impl TokenRef {
    pub fn new(contract: Address, token_id: U256) -> Self {
        Self { contract, token_id }
    }

    /// Build from operator input. Both fields must be non-empty.
    pub fn parse(contract: &str, token_id: &str) -> TransferResult<Self> {
        let contract = contract.trim();
        let token_id = token_id.trim();
        if contract.is_empty() {
            return Err(TransferError::InvalidTokenRef("contract address is empty".to_string()));
        }
        if token_id.is_empty() {
            return Err(TransferError::InvalidTokenRef("token id is empty".to_string()));
        }
        let contract: Address = contract.parse().map_err(|_| {
            TransferError::InvalidTokenRef(format!("invalid contract address: {}", contract))
        })?;
        let token_id = U256::from_dec_str(token_id).map_err(|_| {
            TransferError::InvalidTokenRef(format!("invalid token id: {}", token_id))
        })?;
        Ok(Self { contract, token_id })
    }
}

/// A contiguous group of recipients sent together.
///
/// `ids` and `amounts` are the single (id, amount) pair every recipient in the batch receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    pub recipients: Vec<String>,
    pub ids: Vec<U256>,
    pub amounts: Vec<U256>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    /// Tokens leaving the account if every transfer in this batch lands.
    pub fn total_amount(&self) -> U256 {
        let per_recipient = self.amounts.first().copied().unwrap_or_default();
        per_recipient * U256::from(self.recipients.len())
    }
}

/// All-or-nothing result of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Confirmed,
    Failed(String),
}

impl BatchOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, BatchOutcome::Confirmed)
    }
}

/// Status of a single transfer transaction inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    Confirmed { block_number: Option<u64> },
    Failed { error: String },
}

/// One recipient's transaction within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub recipient: String,
    /// None when the transaction never reached the network.
    pub tx_hash: Option<TxHash>,
    pub status: TransferStatus,
}

impl TransferRecord {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.status, TransferStatus::Confirmed { .. })
    }
}

/// Outcome of a batch plus the per-transaction records it was rolled up from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub index: usize,
    pub outcome: BatchOutcome,
    pub transfers: Vec<TransferRecord>,
}

impl BatchReport {
    /// Roll per-transaction records up into an all-or-nothing batch outcome.
    /// The first failure's reason becomes the batch's reason.
    pub fn from_transfers(index: usize, transfers: Vec<TransferRecord>) -> Self {
        let outcome = transfers
            .iter()
            .find_map(|t| match &t.status {
                TransferStatus::Failed { error } => {
                    Some(BatchOutcome::Failed(format!("{}: {}", t.recipient, error)))
                }
                TransferStatus::Confirmed { .. } => None,
            })
            .unwrap_or(BatchOutcome::Confirmed);
        Self {
            index,
            outcome,
            transfers,
        }
    }

    pub fn confirmed_count(&self) -> usize {
        self.transfers.iter().filter(|t| t.is_confirmed()).count()
    }
}
