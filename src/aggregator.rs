//! Result aggregation: folds batch reports into the session result and refreshes the balance.

use crate::balance::BalanceOracle;
use crate::error::TransferError;
use crate::types::{BatchOutcome, BatchReport, TokenRef, TransferRecord};
use ethers::prelude::*;
use tracing::{info, warn};

/// Outcome of a whole transfer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResult {
    /// True iff every batch confirmed.
    pub all_succeeded: bool,
    /// Zero-based indices of failed batches, ascending.
    pub failed_batch_indices: Vec<usize>,
    pub batches: Vec<BatchReport>,
    /// Balance re-read after the session. None if that query failed.
    pub balance_after: Option<U256>,
}

impl SessionResult {
    pub fn confirmed_transfers(&self) -> impl Iterator<Item = &TransferRecord> {
        self.batches.iter().flat_map(|b| b.transfers.iter()).filter(|t| t.is_confirmed())
    }

    pub fn failed_transfers(&self) -> impl Iterator<Item = &TransferRecord> {
        self.batches.iter().flat_map(|b| b.transfers.iter()).filter(|t| !t.is_confirmed())
    }

    pub fn batch_failures(&self) -> Vec<TransferError> {
        self.batches
            .iter()
            .filter_map(|b| match &b.outcome {
                BatchOutcome::Failed(reason) => Some(TransferError::BatchFailure {
                    index: b.index,
                    reason: reason.clone(),
                }),
                BatchOutcome::Confirmed => None,
            })
            .collect()
    }

    /// Operator-facing message.
    pub fn summary(&self) -> String {
        if self.all_succeeded {
            return "Tokens sent successfully!".to_string();
        }
        let indices = self
            .failed_batch_indices
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Error sending tokens: {} of {} batches failed (batch indices: {}). {} of {} transfers confirmed.",
            self.failed_batch_indices.len(),
            self.batches.len(),
            indices,
            self.confirmed_transfers().count(),
            self.batches.iter().map(|b| b.transfers.len()).sum::<usize>()
        )
    }
}

/// Consolidate batch reports. Does not touch the chain.
pub fn aggregate(reports: Vec<BatchReport>) -> SessionResult {
    let failed_batch_indices: Vec<usize> = reports
        .iter()
        .filter(|r| !r.outcome.is_confirmed())
        .map(|r| r.index)
        .collect();

    SessionResult {
        all_succeeded: failed_batch_indices.is_empty(),
        failed_batch_indices,
        batches: reports,
        balance_after: None,
    }
}

/// Aggregate and then re-query the balance exactly once, whatever the outcome.
pub async fn finalize(oracle: &BalanceOracle, account: Address, token: &TokenRef, reports: Vec<BatchReport>) -> SessionResult {
    let mut result = aggregate(reports);

    match oracle.query_balance(account, token).await {
        Ok(balance) => result.balance_after = Some(balance),
        Err(e) => warn!("Balance refresh after transfer failed: {}", e),
    }

    if result.all_succeeded {
        info!("Transfer session succeeded across {} batches", result.batches.len());
    } else {
        warn!("Transfer session finished with failed batches {:?}", result.failed_batch_indices);
    }
    result
}
