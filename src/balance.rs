//! Balance oracle: the operator's current holding of the selected token, plus best-effort
//! display metadata.

use crate::chain_client::ChainClient;
use crate::error::{TransferError, TransferResult};
use crate::metadata::{self, MetadataFetcher, TokenMetadata};
use crate::types::TokenRef;
use ethers::prelude::*;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Result of an explicit balance check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceReport {
    pub balance: U256,
    /// None when the token URI could not be read.
    pub metadata: Option<TokenMetadata>,
}

#[derive(Debug, Clone, Copy)]
struct BalanceSnapshot {
    account: Address,
    token: TokenRef,
    balance: U256,
}

pub struct BalanceOracle {
    client: Arc<dyn ChainClient>,
    fetcher: Arc<dyn MetadataFetcher>,
    ipfs_gateway: String,
    snapshot: Mutex<Option<BalanceSnapshot>>,
}

impl BalanceOracle {
    pub fn new(client: Arc<dyn ChainClient>, fetcher: Arc<dyn MetadataFetcher>, ipfs_gateway: impl Into<String>) -> Self {
        Self {
            client,
            fetcher,
            ipfs_gateway: ipfs_gateway.into(),
            snapshot: Mutex::new(None),
        }
    }

    /// Read the balance from the contract and remember it as the current value.
    pub async fn query_balance(&self, account: Address, token: &TokenRef) -> TransferResult<U256> {
        let balance = self
            .client
            .balance_of(account, token)
            .await
            .map_err(|e| TransferError::Query(e.to_string()))?;

        *self.snapshot.lock().await = Some(BalanceSnapshot {
            account,
            token: *token,
            balance,
        });
        info!("Balance of {:?} for token {} at {:?}: {}", account, token.token_id, token.contract, balance);
        Ok(balance)
    }

    /// Last queried balance for this account/token pair, if it has not been invalidated.
    pub async fn current_balance(&self, account: Address, token: &TokenRef) -> Option<U256> {
        self.snapshot
            .lock()
            .await
            .filter(|s| s.account == account && s.token == *token)
            .map(|s| s.balance)
    }

    /// Mark the stored balance stale. Called as soon as transfers start going out.
    pub async fn invalidate(&self) {
        *self.snapshot.lock().await = None;
    }

    /// Resolve the token's metadata URL and image. Never fails: a URI read failure yields None,
    /// a document fetch failure yields metadata without an image.
    pub async fn resolve_metadata(&self, token: &TokenRef) -> Option<TokenMetadata> {
        let uri = match self.client.uri_of(token).await {
            Ok(uri) => uri,
            Err(e) => {
                warn!("{}", TransferError::MetadataUnavailable(format!("uri() failed: {}", e)));
                return None;
            }
        };

        let metadata_url = metadata::metadata_url(&uri, token.token_id, &self.ipfs_gateway);
        let image_url = match self.fetcher.fetch_json(&metadata_url).await {
            Ok(document) => metadata::image_url(&document, &self.ipfs_gateway),
            Err(e) => {
                warn!("{}", TransferError::MetadataUnavailable(format!("{:#}", e)));
                None
            }
        };

        Some(TokenMetadata {
            uri,
            metadata_url,
            image_url,
        })
    }

    /// Query the balance, then enrich it with metadata. Only the balance query can fail.
    pub async fn check_balance(&self, account: Address, token: &TokenRef) -> TransferResult<BalanceReport> {
        let balance = self.query_balance(account, token).await?;
        let metadata = self.resolve_metadata(token).await;
        Ok(BalanceReport { balance, metadata })
    }
}
