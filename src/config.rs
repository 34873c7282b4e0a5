use anyhow::Result;
use ethers::providers::{Http, Provider};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// HTTP gateway used to fetch `ipfs://` resources.
pub const DEFAULT_IPFS_GATEWAY: &str = "https://ipfs.io/ipfs/";

/// Default BIP-44 coin type for Ethereum (used for all EVM chains for compatibility)
pub const DEFAULT_COIN_TYPE: u32 = 60;

/// An EVM network with label, chain ID, native token, and default RPC.
#[derive(Clone, Debug)]
pub struct EvmNetwork {
    pub label: &'static str,
    pub chain_id: u64,
    pub native_token: &'static str,
    pub default_rpc: &'static str,
}

impl EvmNetwork {
    pub const fn new(
        label: &'static str,
        chain_id: u64,
        native_token: &'static str,
        default_rpc: &'static str,
    ) -> Self {
        Self {
            label,
            chain_id,
            native_token,
            default_rpc,
        }
    }
}

/// Networks with a known default RPC endpoint.
pub const NETWORKS: &[EvmNetwork] = &[
    EvmNetwork::new("Polygon", 137, "POL", "https://polygon-rpc.com"),
    EvmNetwork::new("Base", 8453, "ETH", "https://mainnet.base.org"),
    EvmNetwork::new("Ethereum", 1, "ETH", "https://ethereum-rpc.publicnode.com"),
    EvmNetwork::new("Sepolia", 11155111, "ETH", "https://ethereum-sepolia-rpc.publicnode.com"),
];

pub fn find_network_by_chain_id(chain_id: u64) -> Option<&'static EvmNetwork> {
    NETWORKS.iter().find(|n| n.chain_id == chain_id)
}

/// Network name shown next to the connected account. Informational only; transfers are
/// never gated on it.
pub fn network_display_name(chain_id: u64) -> &'static str {
    match chain_id {
        137 => "Polygon",
        8453 => "Base",
        _ => "Unsupported Network",
    }
}

/// Get the block explorer URL for a given chain ID
pub fn get_block_explorer_url(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("https://etherscan.io"),
        11155111 => Some("https://sepolia.etherscan.io"),
        8453 => Some("https://basescan.org"),
        137 => Some("https://polygonscan.com"),
        _ => None,
    }
}

/// Get the full URL to view a transaction on the block explorer
pub fn get_tx_explorer_url(chain_id: u64, tx_hash: &str) -> Option<String> {
    get_block_explorer_url(chain_id).map(|base| format!("{}/tx/{}", base, tx_hash))
}

/// OpenSea page for a token, on chains OpenSea lists.
pub fn marketplace_url(chain_id: u64, contract: &str, token_id: &str) -> Option<String> {
    let slug = match chain_id {
        137 => "matic",
        8453 => "base",
        _ => return None,
    };
    Some(format!("https://opensea.io/assets/{}/{}/{}", slug, contract, token_id))
}

/// Check if a chain supports EIP-1559 (Type 2 transactions)
pub fn chain_supports_eip1559(chain_id: u64) -> bool {
    match chain_id {
        // BNB Chain, Ethereum Classic, Fantom Opera
        56 | 61 | 250 => false,
        _ => true,
    }
}

/// Derivation path mode for HD wallets
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DerivationMode {
    /// Account-index: m/44'/60'/i'/0/0 - account number varies (Ledger Live, MetaMask default)
    #[default]
    AccountIndex,
    /// Address-index: m/44'/60'/0'/0/i - address index varies, account fixed
    AddressIndex,
}

impl DerivationMode {
    pub fn get_path(&self, index: u32, custom_account: u32, custom_address_index: u32, coin_type: u32) -> String {
        match self {
            DerivationMode::AccountIndex => {
                format!("m/44'/{}'/{}'/0/{}", coin_type, index, custom_address_index)
            }
            DerivationMode::AddressIndex => {
                format!("m/44'/{}'/{}'/0/{}", coin_type, custom_account, index)
            }
        }
    }
}

/// How transactions are signed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignerKind {
    /// Private key from `SCARAB_PRIVATE_KEY`
    #[default]
    PrivateKey,
    /// Ledger hardware wallet
    Ledger,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub rpc_url: String,
    pub chain_id: u64,
    pub ipfs_gateway: String,
    /// Upper bound on waiting for a single confirmation. None waits indefinitely.
    pub confirmation_timeout_secs: Option<u64>,
    pub signer: SignerKind,
    pub account_index: u32,
    pub derivation_mode: DerivationMode,
    /// Fixed account number in address-index mode
    pub custom_account: u32,
    /// Fixed address index in account-index mode
    pub custom_address_index: u32,
    pub coin_type: u32,
}

impl Config {
    pub fn new(rpc_url: String, chain_id: u64) -> Self {
        let ipfs_gateway = env::var("SCARAB_IPFS_GATEWAY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_IPFS_GATEWAY.to_string());

        let confirmation_timeout_secs = env::var("SCARAB_CONFIRMATION_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok());

        Self {
            rpc_url,
            chain_id,
            ipfs_gateway,
            confirmation_timeout_secs,
            signer: SignerKind::default(),
            account_index: 0,
            derivation_mode: DerivationMode::default(),
            custom_account: 0,
            custom_address_index: 0,
            coin_type: DEFAULT_COIN_TYPE,
        }
    }

    pub fn from_network(network: &EvmNetwork) -> Self {
        Self::new(network.default_rpc.to_string(), network.chain_id)
    }

    /// Config for a chain, taking the RPC from `SCARAB_RPC_URL` when set.
    pub fn for_chain(chain_id: u64) -> Result<Self> {
        if let Ok(rpc) = env::var("SCARAB_RPC_URL") {
            if !rpc.trim().is_empty() {
                return Ok(Self::new(rpc.trim().to_string(), chain_id));
            }
        }
        find_network_by_chain_id(chain_id)
            .map(Self::from_network)
            .ok_or_else(|| anyhow::anyhow!("No default RPC for chain {}. Set SCARAB_RPC_URL or pass --rpc-url", chain_id))
    }

    pub fn get_derivation_path(&self) -> String {
        self.derivation_mode.get_path(self.account_index, self.custom_account, self.custom_address_index, self.coin_type)
    }

    pub fn confirmation_timeout(&self) -> Option<Duration> {
        self.confirmation_timeout_secs.map(Duration::from_secs)
    }

    pub async fn get_provider(&self) -> Result<Arc<Provider<Http>>> {
        let url = Url::parse(&self.rpc_url)?;
        let provider = Provider::<Http>::try_from(url.as_str())?;
        Ok(Arc::new(provider))
    }
}

impl Default for Config {
    fn default() -> Self {
        // Polygon is where this tool is normally used
        if let Some(polygon) = find_network_by_chain_id(137) {
            Self::from_network(polygon)
        } else {
            Self::new("https://polygon-rpc.com".to_string(), 137)
        }
    }
}
