//! In-memory chain client and metadata fetcher for unit tests.

use crate::chain_client::{ChainClient, Confirmation, PendingTransfer};
use crate::metadata::MetadataFetcher;
use crate::types::{AccountInfo, TokenRef};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::prelude::*;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    Submitted(String),
    Confirmed(String),
    Failed(String),
}

/// A single-account, single-token chain.
///
/// Confirmed transfers reduce the stored balance, so a balance query after a session reflects
/// what landed.
pub struct MockChainClient {
    pub account: Address,
    pub chain_id: u64,
    balance: Mutex<U256>,
    uri: Option<String>,
    balance_error: bool,
    fail_submit: HashSet<String>,
    fail_confirm: HashSet<String>,
    next_hash: AtomicUsize,
    pending: Mutex<HashMap<TxHash, (String, U256)>>,
    pub balance_calls: AtomicUsize,
    pub uri_calls: AtomicUsize,
    pub transfer_calls: AtomicUsize,
    pub transfers: Mutex<Vec<(String, Vec<U256>, Vec<U256>)>>,
    pub events: Mutex<Vec<ChainEvent>>,
}

impl MockChainClient {
    pub fn new(balance: u64) -> Self {
        Self {
            account: Address::repeat_byte(0xaa),
            chain_id: 137,
            balance: Mutex::new(U256::from(balance)),
            uri: None,
            balance_error: false,
            fail_submit: HashSet::new(),
            fail_confirm: HashSet::new(),
            next_hash: AtomicUsize::new(1),
            pending: Mutex::new(HashMap::new()),
            balance_calls: AtomicUsize::new(0),
            uri_calls: AtomicUsize::new(0),
            transfer_calls: AtomicUsize::new(0),
            transfers: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn with_uri(mut self, uri: &str) -> Self {
        self.uri = Some(uri.to_string());
        self
    }

    pub fn with_balance_error(mut self) -> Self {
        self.balance_error = true;
        self
    }

    pub fn failing_submission(mut self, recipient: &str) -> Self {
        self.fail_submit.insert(recipient.to_string());
        self
    }

    pub fn failing_confirmation(mut self, recipient: &str) -> Self {
        self.fail_confirm.insert(recipient.to_string());
        self
    }

    pub fn balance(&self) -> U256 {
        *self.balance.lock().unwrap()
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    pub fn transfer_calls(&self) -> usize {
        self.transfer_calls.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<ChainEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn request_account(&self) -> Result<AccountInfo> {
        Ok(AccountInfo {
            address: self.account,
            chain_id: self.chain_id,
        })
    }

    async fn balance_of(&self, account: Address, _token: &TokenRef) -> Result<U256> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        if self.balance_error {
            return Err(anyhow!("execution reverted"));
        }
        if account != self.account {
            return Ok(U256::zero());
        }
        Ok(self.balance())
    }

    async fn uri_of(&self, _token: &TokenRef) -> Result<String> {
        self.uri_calls.fetch_add(1, Ordering::SeqCst);
        self.uri.clone().ok_or_else(|| anyhow!("uri() reverted"))
    }

    async fn transfer_batch(
        &self,
        _contract: Address,
        _from: Address,
        to: &str,
        ids: &[U256],
        amounts: &[U256],
        _data: &[u8],
    ) -> Result<PendingTransfer> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        self.transfers
            .lock()
            .unwrap()
            .push((to.to_string(), ids.to_vec(), amounts.to_vec()));

        if self.fail_submit.contains(to) {
            self.events.lock().unwrap().push(ChainEvent::Failed(to.to_string()));
            return Err(anyhow!("Failed to send transaction: rejected"));
        }

        let hash = TxHash::from_low_u64_be(self.next_hash.fetch_add(1, Ordering::SeqCst) as u64);
        let amount = amounts.first().copied().unwrap_or_default();
        self.pending.lock().unwrap().insert(hash, (to.to_string(), amount));
        self.events.lock().unwrap().push(ChainEvent::Submitted(to.to_string()));
        Ok(PendingTransfer { tx_hash: hash })
    }

    async fn await_confirmation(&self, pending: &PendingTransfer) -> Result<Confirmation> {
        // Let sibling submissions in the same batch run first
        tokio::task::yield_now().await;

        let (recipient, amount) = self
            .pending
            .lock()
            .unwrap()
            .remove(&pending.tx_hash)
            .ok_or_else(|| anyhow!("unknown transaction {:?}", pending.tx_hash))?;

        if self.fail_confirm.contains(&recipient) {
            self.events.lock().unwrap().push(ChainEvent::Failed(recipient));
            return Err(anyhow!("Transaction {:?} reverted", pending.tx_hash));
        }

        {
            let mut balance = self.balance.lock().unwrap();
            *balance = balance.saturating_sub(amount);
        }
        self.events.lock().unwrap().push(ChainEvent::Confirmed(recipient));
        Ok(Confirmation {
            block_number: Some(100),
            gas_used: 50_000,
        })
    }
}

/// Serves metadata documents from a fixed map; unknown URLs fail.
#[derive(Default)]
pub struct MockMetadataFetcher {
    documents: HashMap<String, Value>,
    pub requested: Mutex<Vec<String>>,
}

impl MockMetadataFetcher {
    pub fn with_document(mut self, url: &str, document: Value) -> Self {
        self.documents.insert(url.to_string(), document);
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataFetcher for MockMetadataFetcher {
    async fn fetch_json(&self, url: &str) -> Result<Value> {
        self.requested.lock().unwrap().push(url.to_string());
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("404 Not Found: {}", url))
    }
}

/// `n` distinct well-formed recipient addresses.
pub fn recipients(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("0x{:040x}", i + 1)).collect()
}

pub fn token() -> TokenRef {
    TokenRef::new(Address::repeat_byte(0x42), U256::one())
}
