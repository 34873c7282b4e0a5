//! Transfer execution: sends planned batches to the chain, strictly one batch at a time.
//!
//! Inside a batch every recipient's transaction is submitted before any confirmation is awaited;
//! the next batch starts only after every transaction of the current one has resolved.

use crate::chain_client::{ChainClient, PendingTransfer};
use crate::session::TransferSession;
use crate::types::{Batch, BatchOutcome, BatchReport, TransferRecord, TransferStatus};
use anyhow::{anyhow, Result};
use ethers::prelude::*;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

/// Progress updates for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionProgress {
    BatchStarted { index: usize, total_batches: usize, recipients: usize },
    TransferSubmitted { batch: usize, recipient: String, tx_hash: TxHash },
    TransferFailed { batch: usize, recipient: String, error: String },
    BatchFinished { index: usize, outcome: BatchOutcome },
}

pub struct TransferExecutor {
    client: Arc<dyn ChainClient>,
    /// None waits for confirmations indefinitely.
    confirmation_timeout: Option<Duration>,
    progress: Option<UnboundedSender<ExecutionProgress>>,
}

impl TransferExecutor {
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self {
            client,
            confirmation_timeout: None,
            progress: None,
        }
    }

    pub fn with_confirmation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn with_progress(mut self, sender: UnboundedSender<ExecutionProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    fn report(&self, update: ExecutionProgress) {
        if let Some(sender) = &self.progress {
            let _ = sender.send(update);
        }
    }

    /// Run every batch of the session in order. A failed batch does not stop the ones after it.
    pub async fn execute(&self, session: &TransferSession) -> Vec<BatchReport> {
        let total_batches = session.batches.len();
        let mut reports = Vec::with_capacity(total_batches);

        info!(
            "Starting transfer of token {} to {} recipients in {} batches",
            session.token.token_id,
            session.recipient_count(),
            total_batches
        );

        for batch in &session.batches {
            self.report(ExecutionProgress::BatchStarted {
                index: batch.index,
                total_batches,
                recipients: batch.len(),
            });
            info!("Batch {}/{}: sending to {} recipients", batch.index + 1, total_batches, batch.len());

            let report = self.execute_batch(session, batch).await;
            match &report.outcome {
                BatchOutcome::Confirmed => {
                    info!("Batch {}/{} confirmed", batch.index + 1, total_batches);
                }
                BatchOutcome::Failed(reason) => {
                    warn!(
                        "Batch {}/{} failed ({}/{} transfers confirmed): {}",
                        batch.index + 1,
                        total_batches,
                        report.confirmed_count(),
                        batch.len(),
                        reason
                    );
                }
            }
            self.report(ExecutionProgress::BatchFinished {
                index: batch.index,
                outcome: report.outcome.clone(),
            });
            reports.push(report);
        }

        let failed = reports.iter().filter(|r| !r.outcome.is_confirmed()).count();
        info!(
            "Transfer execution complete: {} batches confirmed, {} failed out of {} total",
            total_batches - failed,
            failed,
            total_batches
        );
        reports
    }

    async fn execute_batch(&self, session: &TransferSession, batch: &Batch) -> BatchReport {
        // Fire every transfer in the batch
        let submissions = join_all(batch.recipients.iter().map(|recipient| {
            self.client.transfer_batch(
                session.token.contract,
                session.account,
                recipient,
                &batch.ids,
                &batch.amounts,
                &[],
            )
        }))
        .await;

        for (recipient, submission) in batch.recipients.iter().zip(&submissions) {
            match submission {
                Ok(pending) => self.report(ExecutionProgress::TransferSubmitted {
                    batch: batch.index,
                    recipient: recipient.clone(),
                    tx_hash: pending.tx_hash,
                }),
                Err(e) => {
                    error!("Transfer to {} could not be submitted: {}", recipient, e);
                    self.report(ExecutionProgress::TransferFailed {
                        batch: batch.index,
                        recipient: recipient.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        // Then wait for all of them
        let transfers = join_all(
            batch
                .recipients
                .iter()
                .zip(submissions)
                .map(|(recipient, submission)| self.settle(batch.index, recipient, submission)),
        )
        .await;

        BatchReport::from_transfers(batch.index, transfers)
    }

    async fn settle(&self, batch: usize, recipient: &str, submission: Result<PendingTransfer>) -> TransferRecord {
        let pending = match submission {
            Ok(pending) => pending,
            Err(e) => {
                return TransferRecord {
                    recipient: recipient.to_string(),
                    tx_hash: None,
                    status: TransferStatus::Failed { error: e.to_string() },
                };
            }
        };

        let status = match self.confirm(&pending).await {
            Ok(confirmation) => {
                debug!(
                    "Transfer {:?} to {} mined in block {:?} using {} gas",
                    pending.tx_hash, recipient, confirmation.block_number, confirmation.gas_used
                );
                TransferStatus::Confirmed {
                    block_number: confirmation.block_number,
                }
            }
            Err(e) => {
                warn!("Transfer {:?} to {} failed: {}", pending.tx_hash, recipient, e);
                self.report(ExecutionProgress::TransferFailed {
                    batch,
                    recipient: recipient.to_string(),
                    error: e.to_string(),
                });
                TransferStatus::Failed { error: e.to_string() }
            }
        };

        TransferRecord {
            recipient: recipient.to_string(),
            tx_hash: Some(pending.tx_hash),
            status,
        }
    }

    async fn confirm(&self, pending: &PendingTransfer) -> Result<crate::chain_client::Confirmation> {
        match self.confirmation_timeout {
            Some(limit) => tokio::time::timeout(limit, self.client.await_confirmation(pending))
                .await
                .map_err(|_| anyhow!("Confirmation timeout after {} seconds", limit.as_secs()))?,
            None => self.client.await_confirmation(pending).await,
        }
    }
}
