//! Transfer sessions: the orchestration from raw recipient text to a refreshed balance.
//!
//! Only one session may run per [`Distributor`] at a time. The account's nonce sequence is
//! shared by every transaction it sends, so overlapping sessions are refused rather than queued.

use crate::aggregator::{self, SessionResult};
use crate::balance::{BalanceOracle, BalanceReport};
use crate::chain_client::ChainClient;
use crate::config::Config;
use crate::error::{TransferError, TransferResult};
use crate::executor::{ExecutionProgress, TransferExecutor};
use crate::metadata::MetadataFetcher;
use crate::planner::plan;
use crate::recipients::parse_recipients;
use crate::types::{AccountInfo, Batch, TokenRef};
use ethers::prelude::*;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

/// Everything one transfer run works from. Discarded once the result is reported.
#[derive(Debug, Clone)]
pub struct TransferSession {
    pub account: Address,
    pub token: TokenRef,
    pub recipients: Vec<String>,
    pub amount_per_recipient: U256,
    pub balance_snapshot: U256,
    pub batches: Vec<Batch>,
}

impl TransferSession {
    /// Validate and plan. Fails before anything is sent.
    pub fn prepare(
        account: Address,
        token: TokenRef,
        recipients: Vec<String>,
        amount_per_recipient: U256,
        balance: U256,
    ) -> TransferResult<Self> {
        let batches = plan(&recipients, token.token_id, amount_per_recipient, balance)?;
        Ok(Self {
            account,
            token,
            recipients,
            amount_per_recipient,
            balance_snapshot: balance,
            batches,
        })
    }

    pub fn recipient_count(&self) -> usize {
        self.recipients.len()
    }

    pub fn required_total(&self) -> U256 {
        self.amount_per_recipient.saturating_mul(U256::from(self.recipients.len()))
    }
}

/// Mutual exclusion for transfer sessions on one account.
#[derive(Default)]
pub struct SessionLock {
    inner: Mutex<()>,
}

impl SessionLock {
    pub fn try_acquire(&self) -> TransferResult<MutexGuard<'_, ()>> {
        self.inner.try_lock().map_err(|_| TransferError::SessionInProgress)
    }

    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

/// Balance checks and bulk transfers for one connected account.
pub struct Distributor {
    account: AccountInfo,
    oracle: BalanceOracle,
    executor: TransferExecutor,
    lock: SessionLock,
}

impl Distributor {
    pub fn new(account: AccountInfo, client: Arc<dyn ChainClient>, fetcher: Arc<dyn MetadataFetcher>, config: &Config) -> Self {
        let oracle = BalanceOracle::new(client.clone(), fetcher, config.ipfs_gateway.clone());
        let executor = TransferExecutor::new(client).with_confirmation_timeout(config.confirmation_timeout());
        Self {
            account,
            oracle,
            executor,
            lock: SessionLock::default(),
        }
    }

    /// Ask the client for its signing account and build a distributor for it.
    pub async fn connect(client: Arc<dyn ChainClient>, fetcher: Arc<dyn MetadataFetcher>, config: &Config) -> TransferResult<Self> {
        let account = client
            .request_account()
            .await
            .map_err(|e| TransferError::Connection(e.to_string()))?;
        info!("Connected {:?} on chain {}", account.address, account.chain_id);
        Ok(Self::new(account, client, fetcher, config))
    }

    pub fn with_progress(mut self, sender: UnboundedSender<ExecutionProgress>) -> Self {
        self.executor = self.executor.with_progress(sender);
        self
    }

    pub fn account(&self) -> AccountInfo {
        self.account
    }

    /// True while a transfer session is running.
    pub fn is_busy(&self) -> bool {
        self.lock.is_held()
    }

    pub async fn check_balance(&self, token: &TokenRef) -> TransferResult<BalanceReport> {
        self.oracle.check_balance(self.account.address, token).await
    }

    /// Send `amount_per_recipient` of `token` to every address in `raw_recipients`.
    ///
    /// Validation errors are returned before any transfer is sent. Once sending starts the
    /// session always runs to the end and returns a [`SessionResult`], with the balance
    /// re-queried once afterwards.
    pub async fn send(&self, token: &TokenRef, raw_recipients: &str, amount_per_recipient: U256) -> TransferResult<SessionResult> {
        let _guard = self.lock.try_acquire()?;

        let recipients = parse_recipients(raw_recipients);
        if recipients.is_empty() {
            return Err(TransferError::EmptyRecipientList);
        }
        if amount_per_recipient.is_zero() {
            return Err(TransferError::InvalidAmount);
        }

        let address = self.account.address;
        let balance = match self.oracle.current_balance(address, token).await {
            Some(balance) => balance,
            None => self.oracle.query_balance(address, token).await?,
        };

        let session = TransferSession::prepare(address, *token, recipients, amount_per_recipient, balance)?;
        info!(
            "Sending {} each to {} recipients ({} total of {} available)",
            amount_per_recipient,
            session.recipient_count(),
            session.required_total(),
            balance
        );

        self.oracle.invalidate().await;
        let reports = self.executor.execute(&session).await;
        Ok(aggregator::finalize(&self.oracle, address, token, reports).await)
    }
}
