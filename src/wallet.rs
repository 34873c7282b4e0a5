//! Wallet connection: builds a signing [`ChainClient`] from a private key or a Ledger device.

use crate::chain_client::{ChainClient, EthersChainClient};
use crate::config::{Config, SignerKind};
use crate::error::{TransferError, TransferResult};
use ethers::prelude::*;
use ethers::signers::{HDPath, Ledger};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Environment variable holding a hex private key.
pub const PRIVATE_KEY_ENV: &str = "SCARAB_PRIVATE_KEY";

/// Maximum number of attempts to open the Ledger on transient HID errors
const MAX_RETRY_ATTEMPTS: usize = 5;

/// Base delay between retries in milliseconds (multiplied by attempt number)
const RETRY_BASE_DELAY_MS: u64 = 300;

/// Check if an error is transient and worth retrying
fn is_transient_error(err_str: &str) -> bool {
    let lower = err_str.to_lowercase();

    // Windows HID timing issue right after the device is plugged in or unlocked
    if lower.contains("overlapped i/o operation") || lower.contains("overlapped io operation") {
        return true;
    }
    if lower.contains("busy") {
        return true;
    }
    if lower.contains("hidapi") && !lower.contains("no device") && !lower.contains("device not found") {
        return true;
    }
    if lower.contains("transport") && lower.contains("error") {
        return true;
    }
    lower.contains("i/o error") || lower.contains("io error")
}

/// Turn a Ledger error into an operator-facing connection error.
fn map_ledger_error<E: std::fmt::Display>(e: E) -> TransferError {
    let err_str = e.to_string();
    error!("Ledger error: {}", err_str);

    let lower = err_str.to_lowercase();
    let message = if lower.contains("device not found") || lower.contains("no device") || lower.contains("hidapi") {
        "Ledger device not found. Please ensure it's connected and unlocked.".to_string()
    } else if lower.contains("locked") || lower.contains("6983") || lower.contains("6985") {
        "Ledger is locked or Ethereum app is not open.".to_string()
    } else if lower.contains("denied") || lower.contains("rejected") {
        "Request was rejected on the Ledger device.".to_string()
    } else if lower.contains("timeout") {
        "Ledger operation timed out. Please try again.".to_string()
    } else {
        format!("Ledger error: {}", err_str)
    };
    TransferError::Connection(message)
}

/// Parse a hex private key (with or without `0x`) into a wallet bound to `chain_id`.
pub fn wallet_from_key(key: &str, chain_id: u64) -> TransferResult<LocalWallet> {
    let key = key.trim();
    let key = key.strip_prefix("0x").unwrap_or(key);
    let wallet: LocalWallet = key
        .parse()
        .map_err(|_| TransferError::Connection(format!("{} is not a valid private key", PRIVATE_KEY_ENV)))?;
    Ok(wallet.with_chain_id(chain_id))
}

/// Wallet from [`PRIVATE_KEY_ENV`]. Absent or empty means no wallet is available.
pub fn wallet_from_env(chain_id: u64) -> TransferResult<LocalWallet> {
    match env::var(PRIVATE_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => wallet_from_key(&key, chain_id),
        _ => Err(TransferError::Connection(format!(
            "Set {} or use a Ledger to sign transfers",
            PRIVATE_KEY_ENV
        ))),
    }
}

/// Open the Ledger Ethereum app at `hd_path`, retrying transient HID errors.
pub async fn open_ledger(hd_path: &str, chain_id: u64) -> TransferResult<Ledger> {
    for attempt in 1..=MAX_RETRY_ATTEMPTS {
        info!("Opening Ledger at path {} (attempt {}/{})", hd_path, attempt, MAX_RETRY_ATTEMPTS);

        match Ledger::new(HDPath::Other(hd_path.to_string()), chain_id).await {
            Ok(ledger) => {
                info!("Ledger connected, address {:?}", ledger.address());
                return Ok(ledger);
            }
            Err(e) => {
                let err_str = e.to_string();
                if is_transient_error(&err_str) && attempt < MAX_RETRY_ATTEMPTS {
                    warn!("Transient Ledger error (attempt {}): {}, retrying...", attempt, err_str);
                    sleep(Duration::from_millis(RETRY_BASE_DELAY_MS * attempt as u64)).await;
                    continue;
                }
                return Err(map_ledger_error(e));
            }
        }
    }

    Err(TransferError::Connection(format!(
        "Failed to open Ledger after {} attempts",
        MAX_RETRY_ATTEMPTS
    )))
}

/// Chain id reported by the RPC endpoint. Transactions are signed for this chain; a different
/// configured chain only produces a warning.
pub async fn resolve_chain_id<M: Middleware>(provider: &M, configured: u64) -> TransferResult<u64> {
    let chain_id = provider
        .get_chainid()
        .await
        .map_err(|e| TransferError::Connection(format!("Failed to fetch chain id from RPC: {}", e)))?
        .as_u64();
    if chain_id != configured {
        warn!(
            "RPC endpoint is on chain {} but chain {} was configured; signing for chain {}",
            chain_id, configured, chain_id
        );
    }
    Ok(chain_id)
}

/// Connect to the configured RPC endpoint with the configured signer.
pub async fn connect(config: &Config) -> TransferResult<Arc<dyn ChainClient>> {
    let provider = config
        .get_provider()
        .await
        .map_err(|e| TransferError::Connection(format!("Invalid RPC URL {}: {}", config.rpc_url, e)))?;
    let chain_id = resolve_chain_id(provider.as_ref(), config.chain_id).await?;

    let client: Arc<dyn ChainClient> = match config.signer {
        SignerKind::PrivateKey => {
            let wallet = wallet_from_env(chain_id)?;
            info!("Using private key wallet {:?}", wallet.address());
            Arc::new(EthersChainClient::new(provider, wallet, chain_id))
        }
        SignerKind::Ledger => {
            let ledger = open_ledger(&config.get_derivation_path(), chain_id).await?;
            Arc::new(EthersChainClient::new(provider, ledger, chain_id))
        }
    };
    Ok(client)
}
