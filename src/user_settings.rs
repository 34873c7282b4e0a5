use crate::config::{Config, DerivationMode, SignerKind, DEFAULT_COIN_TYPE, DEFAULT_IPFS_GATEWAY};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const SETTINGS_FILE: &str = "scarab_settings.json";

fn default_chain_id() -> u64 {
    137
}

fn default_ipfs_gateway() -> String {
    DEFAULT_IPFS_GATEWAY.to_string()
}

fn default_amount() -> u64 {
    1
}

/// User settings that persist between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    /// Chain used when none is given on the command line
    #[serde(default = "default_chain_id")]
    pub selected_chain_id: u64,
    /// Custom RPC overrides per chain ID
    #[serde(default)]
    pub custom_rpcs: HashMap<u64, String>,
    #[serde(default = "default_ipfs_gateway")]
    pub ipfs_gateway: String,
    #[serde(default)]
    pub signer: SignerKind,
    /// Ledger derivation index
    #[serde(default)]
    pub account_index: u32,
    #[serde(default)]
    pub derivation_mode: DerivationMode,
    /// Fixed account number in address-index mode
    #[serde(default)]
    pub custom_account: u32,
    /// Fixed address index in account-index mode
    #[serde(default)]
    pub custom_address_index: u32,
    /// Custom coin type override (None = use default 60)
    #[serde(default)]
    pub coin_type_override: Option<u32>,
    /// Amount per recipient when --amount is omitted
    #[serde(default = "default_amount")]
    pub default_amount: u64,
    /// Confirmation deadline in seconds. None waits indefinitely.
    #[serde(default)]
    pub confirmation_timeout_secs: Option<u64>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            selected_chain_id: default_chain_id(),
            custom_rpcs: HashMap::new(),
            ipfs_gateway: default_ipfs_gateway(),
            signer: SignerKind::default(),
            account_index: 0,
            derivation_mode: DerivationMode::default(),
            custom_account: 0,
            custom_address_index: 0,
            coin_type_override: None,
            default_amount: default_amount(),
            confirmation_timeout_secs: None,
        }
    }
}

impl UserSettings {
    /// Get the settings file path
    pub fn settings_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            let app_dir = config_dir.join("scarab");
            if !app_dir.exists() {
                let _ = fs::create_dir_all(&app_dir);
            }
            app_dir.join(SETTINGS_FILE)
        } else {
            PathBuf::from(SETTINGS_FILE)
        }
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        Self::load_from(&Self::settings_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(settings) => {
                        tracing::info!("Loaded settings from {:?}", path);
                        return settings;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse settings file: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read settings file: {}", e);
                }
            }
        }
        tracing::info!("Using default settings");
        Self::default()
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::settings_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        tracing::info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Get custom RPC for a chain, or None if using default
    pub fn get_custom_rpc(&self, chain_id: u64) -> Option<&String> {
        self.custom_rpcs.get(&chain_id).filter(|s| !s.is_empty())
    }

    /// Set custom RPC for a chain (empty string removes the override)
    pub fn set_custom_rpc(&mut self, chain_id: u64, rpc: String) {
        if rpc.trim().is_empty() {
            self.custom_rpcs.remove(&chain_id);
        } else {
            self.custom_rpcs.insert(chain_id, rpc.trim().to_string());
        }
    }

    /// Get the effective coin type (custom override or default 60)
    pub fn effective_coin_type(&self) -> u32 {
        self.coin_type_override.unwrap_or(DEFAULT_COIN_TYPE)
    }

    /// Fold the persisted preferences into a config. Environment values already in the
    /// config win over the settings file.
    pub fn apply(&self, config: &mut Config) {
        if let Some(rpc) = self.get_custom_rpc(config.chain_id) {
            if std::env::var("SCARAB_RPC_URL").map(|v| v.trim().is_empty()).unwrap_or(true) {
                config.rpc_url = rpc.clone();
            }
        }
        if config.ipfs_gateway == DEFAULT_IPFS_GATEWAY && !self.ipfs_gateway.trim().is_empty() {
            config.ipfs_gateway = self.ipfs_gateway.trim().to_string();
        }
        if config.confirmation_timeout_secs.is_none() {
            config.confirmation_timeout_secs = self.confirmation_timeout_secs;
        }
        config.signer = self.signer;
        config.account_index = self.account_index;
        config.derivation_mode = self.derivation_mode;
        config.custom_account = self.custom_account;
        config.custom_address_index = self.custom_address_index;
        config.coin_type = self.effective_coin_type();
    }
}
