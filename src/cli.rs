use clap::{Parser, Subcommand, ValueEnum};
use scarab::config::{DerivationMode, SignerKind};
use scarab::user_settings::UserSettings;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version)]
#[command(about = "Bulk ERC-1155 token distribution")]
#[command(
    long_about = "Checks the connected wallet's balance of an ERC-1155 token and sends a fixed amount \
    of it to every address in a recipient list, in batches of 50."
)]
pub struct Args {
    /// Chain to connect to (defaults to the chain saved in settings)
    #[arg(long, global = true)]
    pub chain_id: Option<u64>,

    /// RPC endpoint, overriding SCARAB_RPC_URL and saved settings
    #[arg(long, global = true)]
    pub rpc_url: Option<String>,

    /// Sign with a Ledger device instead of SCARAB_PRIVATE_KEY
    #[arg(long, global = true)]
    pub ledger: bool,

    /// Ledger derivation index
    #[arg(long, global = true)]
    pub account_index: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the wallet's balance of a token, with its metadata
    Balance {
        /// Token contract address
        #[arg(short, long)]
        contract: String,

        /// Token id (decimal)
        #[arg(short, long)]
        token_id: String,
    },

    /// Send the same amount of a token to every recipient
    Send {
        /// Token contract address
        #[arg(short, long)]
        contract: String,

        /// Token id (decimal)
        #[arg(short, long)]
        token_id: String,

        /// File with one recipient address per line, or - for stdin
        #[arg(short, long)]
        recipients: PathBuf,

        /// Amount per recipient (defaults to the saved default, normally 1)
        #[arg(short, long)]
        amount: Option<u64>,

        /// Write a per-transfer CSV report here
        #[arg(long)]
        report: Option<PathBuf>,

        /// Give up waiting for a confirmation after this many seconds
        #[arg(long)]
        confirmation_timeout: Option<u64>,
    },

    /// Print the operation log
    Log,

    /// Show or change the saved settings
    Config(SettingsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignerChoice {
    PrivateKey,
    Ledger,
}

impl From<SignerChoice> for SignerKind {
    fn from(choice: SignerChoice) -> Self {
        match choice {
            SignerChoice::PrivateKey => SignerKind::PrivateKey,
            SignerChoice::Ledger => SignerKind::Ledger,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DerivationChoice {
    /// m/44'/60'/i'/0/0
    AccountIndex,
    /// m/44'/60'/0'/0/i
    AddressIndex,
}

impl From<DerivationChoice> for DerivationMode {
    fn from(choice: DerivationChoice) -> Self {
        match choice {
            DerivationChoice::AccountIndex => DerivationMode::AccountIndex,
            DerivationChoice::AddressIndex => DerivationMode::AddressIndex,
        }
    }
}

/// Changes to the saved settings. Omitted flags leave the saved value alone.
#[derive(clap::Args, Debug, Default)]
pub struct SettingsArgs {
    /// Chain used when --chain-id is not given
    #[arg(long)]
    pub default_chain: Option<u64>,

    /// Save an RPC endpoint for the --chain-id chain (or the default chain). Empty removes it.
    #[arg(long)]
    pub save_rpc: Option<String>,

    /// IPFS gateway for metadata links
    #[arg(long)]
    pub ipfs_gateway: Option<String>,

    #[arg(long, value_enum)]
    pub signer: Option<SignerChoice>,

    #[arg(long, value_enum)]
    pub derivation: Option<DerivationChoice>,

    /// Fixed account number in address-index mode
    #[arg(long)]
    pub custom_account: Option<u32>,

    /// Fixed address index in account-index mode
    #[arg(long)]
    pub custom_address_index: Option<u32>,

    /// Ledger coin type. 0 restores the default of 60.
    #[arg(long)]
    pub coin_type: Option<u32>,

    /// Amount per recipient when send is run without --amount
    #[arg(long)]
    pub default_amount: Option<u64>,

    /// Confirmation deadline in seconds. 0 waits indefinitely.
    #[arg(long)]
    pub confirmation_timeout: Option<u64>,
}

impl SettingsArgs {
    /// Write the given flags into `settings`. Returns false when nothing was given.
    pub fn apply_to(&self, settings: &mut UserSettings, chain_id: Option<u64>, account_index: Option<u32>) -> bool {
        let mut changed = false;
        if let Some(chain) = self.default_chain {
            settings.selected_chain_id = chain;
            changed = true;
        }
        if let Some(rpc) = &self.save_rpc {
            let chain = chain_id.unwrap_or(settings.selected_chain_id);
            settings.set_custom_rpc(chain, rpc.clone());
            changed = true;
        }
        if let Some(gateway) = &self.ipfs_gateway {
            settings.ipfs_gateway = gateway.trim().to_string();
            changed = true;
        }
        if let Some(signer) = self.signer {
            settings.signer = signer.into();
            changed = true;
        }
        if let Some(mode) = self.derivation {
            settings.derivation_mode = mode.into();
            changed = true;
        }
        if let Some(account) = self.custom_account {
            settings.custom_account = account;
            changed = true;
        }
        if let Some(index) = self.custom_address_index {
            settings.custom_address_index = index;
            changed = true;
        }
        if let Some(index) = account_index {
            settings.account_index = index;
            changed = true;
        }
        if let Some(coin_type) = self.coin_type {
            settings.coin_type_override = Some(coin_type).filter(|c| *c != 0);
            changed = true;
        }
        if let Some(amount) = self.default_amount {
            settings.default_amount = amount;
            changed = true;
        }
        if let Some(secs) = self.confirmation_timeout {
            settings.confirmation_timeout_secs = Some(secs).filter(|s| *s > 0);
            changed = true;
        }
        changed
    }
}
