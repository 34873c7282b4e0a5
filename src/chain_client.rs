//! Chain client: the on-chain calls the transfer flow depends on.
//!
//! [`ChainClient`] is the seam between the orchestration logic and the network. The ethers-rs
//! implementation signs locally (private key or Ledger device), tracks the account nonce itself
//! and polls for receipts.

use crate::config::chain_supports_eip1559;
use crate::erc1155;
use crate::types::{AccountInfo, TokenRef};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};

/// Interval between receipt polls.
const RECEIPT_POLL_INTERVAL_MS: u64 = 500;

/// Gas limit headroom over the node's estimate, in percent.
const GAS_LIMIT_BUFFER_PERCENT: u64 = 20;

/// A transaction that was accepted by the node and awaits confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransfer {
    pub tx_hash: TxHash,
}

/// A mined, successful transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// The signing account and the chain the client is connected to.
    async fn request_account(&self) -> Result<AccountInfo>;

    async fn balance_of(&self, account: Address, token: &TokenRef) -> Result<U256>;

    async fn uri_of(&self, token: &TokenRef) -> Result<String>;

    /// Sign and broadcast one `safeBatchTransferFrom` call. `to` is parsed here, so a malformed
    /// recipient fails at submission.
    async fn transfer_batch(
        &self,
        contract: Address,
        from: Address,
        to: &str,
        ids: &[U256],
        amounts: &[U256],
        data: &[u8],
    ) -> Result<PendingTransfer>;

    /// Wait until the transaction is mined. Reverted transactions are errors.
    async fn await_confirmation(&self, pending: &PendingTransfer) -> Result<Confirmation>;
}

/// [`ChainClient`] over an ethers middleware and a local signer.
pub struct EthersChainClient<M, S> {
    provider: Arc<M>,
    signer: S,
    chain_id: u64,
    /// Next nonce to use. None means it must be fetched from the node first.
    current_nonce: Mutex<Option<U256>>,
}

impl<M: Middleware + 'static, S: Signer + 'static> EthersChainClient<M, S> {
    /// The signer is rebound to `chain_id` so EIP-155 signatures always match the chain the
    /// transactions are built for.
    pub fn new(provider: Arc<M>, signer: S, chain_id: u64) -> Self {
        Self {
            provider,
            signer: signer.with_chain_id(chain_id),
            chain_id,
            current_nonce: Mutex::new(None),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Pending nonce from the node, so transactions still in the mempool are counted.
    async fn fetch_pending_nonce(&self) -> Result<U256> {
        self.provider
            .get_transaction_count(self.signer.address(), Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| anyhow!("Failed to fetch nonce: {}", e))
    }

    async fn read_call(&self, to: Address, calldata: Bytes) -> Result<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(calldata).into();
        self.provider
            .call(&tx, None)
            .await
            .map_err(|e| anyhow!("Contract call failed: {}", e))
    }

    fn build_transaction(&self, from: Address, contract: Address, calldata: Bytes, nonce: U256) -> TypedTransaction {
        if chain_supports_eip1559(self.chain_id) {
            Eip1559TransactionRequest::new()
                .from(from)
                .to(contract)
                .data(calldata)
                .nonce(nonce)
                .chain_id(self.chain_id)
                .into()
        } else {
            TransactionRequest::new()
                .from(from)
                .to(contract)
                .data(calldata)
                .nonce(nonce)
                .chain_id(self.chain_id)
                .into()
        }
    }

    async fn fill_gas(&self, tx: &mut TypedTransaction) -> Result<()> {
        let estimate = self
            .provider
            .estimate_gas(tx, None)
            .await
            .map_err(|e| anyhow!("Gas estimation failed: {}", e))?;
        tx.set_gas(estimate * U256::from(100 + GAS_LIMIT_BUFFER_PERCENT) / U256::from(100u64));

        if matches!(tx, TypedTransaction::Eip1559(_)) {
            let (max_fee, priority_fee) = self
                .provider
                .estimate_eip1559_fees(None)
                .await
                .map_err(|e| anyhow!("Fee estimation failed: {}", e))?;
            if let TypedTransaction::Eip1559(inner) = tx {
                inner.max_fee_per_gas = Some(max_fee);
                inner.max_priority_fee_per_gas = Some(priority_fee);
            }
        } else {
            let gas_price = self
                .provider
                .get_gas_price()
                .await
                .map_err(|e| anyhow!("Failed to fetch gas price: {}", e))?;
            tx.set_gas_price(gas_price);
        }
        Ok(())
    }
}

#[async_trait]
impl<M: Middleware + 'static, S: Signer + 'static> ChainClient for EthersChainClient<M, S> {
    async fn request_account(&self) -> Result<AccountInfo> {
        let chain_id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| anyhow!("Failed to fetch chain id: {}", e))?;
        Ok(AccountInfo {
            address: self.signer.address(),
            chain_id: chain_id.as_u64(),
        })
    }

    async fn balance_of(&self, account: Address, token: &TokenRef) -> Result<U256> {
        let calldata = erc1155::encode_balance_of(account, token.token_id)?;
        let output = self.read_call(token.contract, calldata).await?;
        erc1155::decode_balance_of(&output)
    }

    async fn uri_of(&self, token: &TokenRef) -> Result<String> {
        let calldata = erc1155::encode_uri(token.token_id)?;
        let output = self.read_call(token.contract, calldata).await?;
        erc1155::decode_uri(&output)
    }

    async fn transfer_batch(
        &self,
        contract: Address,
        from: Address,
        to: &str,
        ids: &[U256],
        amounts: &[U256],
        data: &[u8],
    ) -> Result<PendingTransfer> {
        let to_address: Address = to
            .parse()
            .map_err(|_| anyhow!("Invalid recipient address: {}", to))?;
        let calldata = erc1155::encode_safe_batch_transfer_from(from, to_address, ids, amounts, data)?;

        // Held until broadcast so nonces reach the node in order
        let mut nonce_guard = self.current_nonce.lock().await;
        let nonce = match *nonce_guard {
            Some(nonce) => nonce,
            None => self.fetch_pending_nonce().await?,
        };

        let mut tx = self.build_transaction(from, contract, calldata, nonce);
        self.fill_gas(&mut tx).await?;

        let signature = self
            .signer
            .sign_transaction(&tx)
            .await
            .map_err(|e| anyhow!("Signing failed: {}", e))?;
        let signed_tx = tx.rlp_signed(&signature);

        match self.provider.send_raw_transaction(signed_tx).await {
            Ok(pending) => {
                let tx_hash = pending.tx_hash();
                *nonce_guard = Some(nonce + U256::one());
                info!("Transfer to {:?} sent with nonce {}: {:?}", to_address, nonce, tx_hash);
                Ok(PendingTransfer { tx_hash })
            }
            Err(e) => {
                // The node may or may not have consumed the nonce; re-read it next time
                *nonce_guard = None;
                Err(anyhow!("Failed to send transaction: {}", e))
            }
        }
    }

    async fn await_confirmation(&self, pending: &PendingTransfer) -> Result<Confirmation> {
        loop {
            match self.provider.get_transaction_receipt(pending.tx_hash).await {
                Ok(Some(receipt)) => {
                    if receipt.status == Some(U64::zero()) {
                        return Err(anyhow!("Transaction {:?} reverted", pending.tx_hash));
                    }
                    return Ok(Confirmation {
                        block_number: receipt.block_number.map(|n| n.as_u64()),
                        gas_used: receipt.gas_used.map(|g| g.as_u64()).unwrap_or(0),
                    });
                }
                Ok(None) => {}
                Err(e) => warn!("Error fetching receipt for {:?}: {}", pending.tx_hash, e),
            }
            sleep(Duration::from_millis(RECEIPT_POLL_INTERVAL_MS)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{encode, Token};
    use ethers::providers::{JsonRpcError, MockProvider, MockResponse};

    const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn mocked_client() -> (EthersChainClient<Provider<MockProvider>, LocalWallet>, MockProvider) {
        let (provider, mock) = Provider::mocked();
        let wallet: LocalWallet = TEST_KEY.parse().unwrap();
        let wallet = wallet.with_chain_id(137u64);
        (EthersChainClient::new(Arc::new(provider), wallet, 137), mock)
    }

    fn token() -> TokenRef {
        TokenRef::new(Address::repeat_byte(0x42), U256::one())
    }

    #[tokio::test]
    async fn test_request_account() {
        let (client, mock) = mocked_client();
        mock.push::<U256, _>(U256::from(137u64)).unwrap();

        let account = client.request_account().await.unwrap();
        assert_eq!(account.chain_id, 137);
        assert_eq!(account.address, client.address());
    }

    #[tokio::test]
    async fn test_balance_of_decodes_call_output() {
        let (client, mock) = mocked_client();
        let output: Bytes = encode(&[Token::Uint(U256::from(200u64))]).into();
        mock.push::<Bytes, _>(output).unwrap();

        let balance = client.balance_of(client.address(), &token()).await.unwrap();
        assert_eq!(balance, U256::from(200u64));
    }

    #[tokio::test]
    async fn test_uri_of_decodes_call_output() {
        let (client, mock) = mocked_client();
        let output: Bytes = encode(&[Token::String("ipfs://Qm/{id}.json".to_string())]).into();
        mock.push::<Bytes, _>(output).unwrap();

        let uri = client.uri_of(&token()).await.unwrap();
        assert_eq!(uri, "ipfs://Qm/{id}.json");
    }

    #[tokio::test]
    async fn test_balance_of_rpc_error() {
        // No queued response, so the mock provider errors
        let (client, _mock) = mocked_client();
        assert!(client.balance_of(client.address(), &token()).await.is_err());
    }

    #[tokio::test]
    async fn test_transfer_batch_rejects_malformed_recipient() {
        let (client, _mock) = mocked_client();
        let err = client
            .transfer_batch(
                Address::repeat_byte(0x42),
                client.address(),
                "not-an-address",
                &[U256::one()],
                &[U256::one()],
                &[],
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid recipient address"));
    }

    fn legacy_client() -> (EthersChainClient<Provider<MockProvider>, LocalWallet>, MockProvider) {
        let (provider, mock) = Provider::mocked();
        let wallet: LocalWallet = TEST_KEY.parse().unwrap();
        (EthersChainClient::new(Arc::new(provider), wallet, 56), mock)
    }

    /// Queue the node responses for one legacy submission. The mock pops responses from the
    /// back, so the last submission must be queued first.
    fn queue_submission(mock: &MockProvider, nonce: Option<u64>, tx_hash: TxHash) {
        mock.push::<TxHash, _>(tx_hash).unwrap();
        mock.push::<U256, _>(U256::from(30_000_000_000u64)).unwrap();
        mock.push::<U256, _>(U256::from(60_000u64)).unwrap();
        if let Some(nonce) = nonce {
            mock.push::<U256, _>(U256::from(nonce)).unwrap();
        }
    }

    async fn send_one(client: &EthersChainClient<Provider<MockProvider>, LocalWallet>, to: &str) -> Result<PendingTransfer> {
        client
            .transfer_batch(Address::repeat_byte(0x42), client.address(), to, &[U256::one()], &[U256::one()], &[])
            .await
    }

    #[test]
    fn test_signer_bound_to_client_chain() {
        let (provider, _mock) = Provider::mocked();
        let wallet: LocalWallet = TEST_KEY.parse().unwrap();
        let client = EthersChainClient::new(Arc::new(provider), wallet.with_chain_id(137u64), 8453);
        assert_eq!(client.signer.chain_id(), 8453);
    }

    #[tokio::test]
    async fn test_sibling_submissions_reserve_consecutive_nonces() {
        let (client, mock) = legacy_client();
        let first_hash = TxHash::from_low_u64_be(1);
        let second_hash = TxHash::from_low_u64_be(2);
        queue_submission(&mock, None, second_hash);
        queue_submission(&mock, Some(7), first_hash);

        let recipient = format!("{:?}", Address::repeat_byte(0x11));
        let results = futures::future::join_all([send_one(&client, &recipient), send_one(&client, &recipient)]).await;
        let hashes: Vec<TxHash> = results.into_iter().map(|r| r.unwrap().tx_hash).collect();

        assert_eq!(hashes, vec![first_hash, second_hash]);
        // Fetched once, then advanced locally for each broadcast
        assert_eq!(*client.current_nonce.lock().await, Some(U256::from(9u64)));
    }

    #[tokio::test]
    async fn test_failed_broadcast_resets_nonce() {
        let (client, mock) = legacy_client();
        let recipient = format!("{:?}", Address::repeat_byte(0x11));

        // A later successful submission, which must re-read the nonce
        queue_submission(&mock, Some(7), TxHash::from_low_u64_be(3));
        mock.push_response(MockResponse::Error(JsonRpcError {
            code: -32000,
            message: "nonce too low".to_string(),
            data: None,
        }));
        mock.push::<U256, _>(U256::from(30_000_000_000u64)).unwrap();
        mock.push::<U256, _>(U256::from(60_000u64)).unwrap();
        mock.push::<U256, _>(U256::from(7u64)).unwrap();

        let err = send_one(&client, &recipient).await.unwrap_err();
        assert!(err.to_string().contains("Failed to send transaction"));
        assert!(err.to_string().contains("nonce too low"));
        assert_eq!(*client.current_nonce.lock().await, None);

        let pending = send_one(&client, &recipient).await.unwrap();
        assert_eq!(pending.tx_hash, TxHash::from_low_u64_be(3));
        assert_eq!(*client.current_nonce.lock().await, Some(U256::from(8u64)));
    }

    #[tokio::test]
    async fn test_await_confirmation_reverted_receipt_is_error() {
        let (client, mock) = legacy_client();
        let receipt = TransactionReceipt {
            status: Some(U64::zero()),
            block_number: Some(U64::from(5u64)),
            ..Default::default()
        };
        mock.push::<TransactionReceipt, _>(receipt).unwrap();

        let pending = PendingTransfer { tx_hash: TxHash::from_low_u64_be(1) };
        let err = client.await_confirmation(&pending).await.unwrap_err();
        assert!(err.to_string().contains("reverted"));
    }

    #[tokio::test]
    async fn test_await_confirmation_success() {
        let (client, mock) = legacy_client();
        let receipt = TransactionReceipt {
            status: Some(U64::one()),
            block_number: Some(U64::from(5u64)),
            gas_used: Some(U256::from(51_000u64)),
            ..Default::default()
        };
        mock.push::<TransactionReceipt, _>(receipt).unwrap();

        let pending = PendingTransfer { tx_hash: TxHash::from_low_u64_be(1) };
        let confirmation = client.await_confirmation(&pending).await.unwrap();
        assert_eq!(confirmation, Confirmation { block_number: Some(5), gas_used: 51_000 });
    }
}
