mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Args, Command};
use ethers::types::U256;
use scarab::config::{find_network_by_chain_id, marketplace_url, network_display_name, Config, SignerKind};
use scarab::executor::ExecutionProgress;
use scarab::metadata::HttpMetadataFetcher;
use scarab::recipients::read_recipients_text;
use scarab::session::Distributor;
use scarab::types::{BatchOutcome, TokenRef};
use scarab::user_settings::UserSettings;
use scarab::{operation_log, report, wallet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

fn build_config(args: &Args, settings: &UserSettings) -> Result<Config> {
    let chain_id = args.chain_id.unwrap_or(settings.selected_chain_id);
    let mut config = match &args.rpc_url {
        Some(url) => Config::new(url.clone(), chain_id),
        None => Config::for_chain(chain_id).or_else(|e| {
            settings
                .get_custom_rpc(chain_id)
                .map(|rpc| Config::new(rpc.clone(), chain_id))
                .ok_or(e)
        })?,
    };
    settings.apply(&mut config);

    if let Some(url) = &args.rpc_url {
        config.rpc_url = url.clone();
    }
    if args.ledger {
        config.signer = SignerKind::Ledger;
    }
    if let Some(index) = args.account_index {
        config.account_index = index;
    }
    if let Command::Send { confirmation_timeout: Some(secs), .. } = &args.command {
        config.confirmation_timeout_secs = Some(*secs);
    }
    Ok(config)
}

fn print_progress(update: &ExecutionProgress) {
    match update {
        ExecutionProgress::BatchStarted { index, total_batches, recipients } => {
            println!("Batch {}/{}: sending to {} recipients...", index + 1, total_batches, recipients);
        }
        ExecutionProgress::TransferSubmitted { recipient, tx_hash, .. } => {
            println!("  sent to {} ({:?})", recipient, tx_hash);
        }
        ExecutionProgress::TransferFailed { recipient, error, .. } => {
            println!("  FAILED {}: {}", recipient, error);
        }
        ExecutionProgress::BatchFinished { index, outcome } => match outcome {
            BatchOutcome::Confirmed => println!("Batch {} confirmed", index + 1),
            BatchOutcome::Failed(reason) => println!("Batch {} failed: {}", index + 1, reason),
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    if let Command::Log = args.command {
        let log = operation_log::read_log()?;
        if log.is_empty() {
            println!("No operations logged yet ({})", operation_log::log_file_path());
        } else {
            print!("{}", log);
        }
        return Ok(());
    }

    if let Command::Config(settings_args) = &args.command {
        let mut settings = UserSettings::load();
        if settings_args.apply_to(&mut settings, args.chain_id, args.account_index) {
            settings.save()?;
        }
        println!("{}", serde_json::to_string_pretty(&settings)?);
        println!("Settings file: {}", UserSettings::settings_path().display());
        return Ok(());
    }

    let settings = UserSettings::load();
    let config = build_config(&args, &settings)?;

    let client = wallet::connect(&config).await?;
    let fetcher = Arc::new(HttpMetadataFetcher::new()?);
    let distributor = Distributor::connect(client, fetcher, &config).await?;

    let account = distributor.account();
    println!("Account: {:?}", account.address);
    match find_network_by_chain_id(account.chain_id) {
        Some(network) => println!(
            "Network: {} (chain {}, gas paid in {})",
            network_display_name(account.chain_id),
            account.chain_id,
            network.native_token
        ),
        None => println!("Network: {} (chain {})", network_display_name(account.chain_id), account.chain_id),
    }

    match args.command {
        Command::Balance { contract, token_id } => {
            let token = TokenRef::parse(&contract, &token_id)?;
            let balance = distributor.check_balance(&token).await?;

            println!("Balance: {}", balance.balance);
            if let Some(metadata) = &balance.metadata {
                println!("Metadata: {}", metadata.metadata_url);
                if let Some(image) = &metadata.image_url {
                    println!("Image: {}", image);
                }
            }
            if let Some(url) = marketplace_url(account.chain_id, &contract.trim().to_lowercase(), token_id.trim()) {
                println!("View on OpenSea: {}", url);
            }

            if let Err(e) = operation_log::append_log(
                "balance",
                account.chain_id,
                operation_log::balance_check_details(&token, balance.balance),
            ) {
                warn!("Failed to write operation log: {}", e);
            }
        }
        Command::Send {
            contract,
            token_id,
            recipients,
            amount,
            report: report_path,
            ..
        } => {
            let token = TokenRef::parse(&contract, &token_id)?;
            let raw = read_recipients_text(&recipients)?;
            let amount = U256::from(amount.unwrap_or(settings.default_amount));

            let (tx, mut rx) = mpsc::unbounded_channel();
            let printer = tokio::spawn(async move {
                while let Some(update) = rx.recv().await {
                    print_progress(&update);
                }
            });

            let distributor = distributor.with_progress(tx);
            let outcome = distributor.send(&token, &raw, amount).await;
            // Closes the progress channel
            drop(distributor);
            let _ = printer.await;
            let result = match outcome {
                Ok(result) => result,
                Err(e) if e.is_validation() => {
                    eprintln!("Nothing was sent: {}", e);
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            };

            println!("{}", result.summary());
            for failure in result.batch_failures() {
                println!("  {}", failure);
            }
            let failed: Vec<&str> = result.failed_transfers().map(|t| t.recipient.as_str()).collect();
            if !failed.is_empty() {
                println!("Recipients without a confirmed transfer: {}", failed.join(", "));
            }
            match result.balance_after {
                Some(balance) => println!("Balance after transfer: {}", balance),
                None => println!("Balance after transfer could not be read"),
            }

            if let Some(path) = report_path {
                report::write_csv_report(&path, &result)?;
                println!("Report written to {}", path.display());
            }

            if let Err(e) = operation_log::append_log(
                "send",
                account.chain_id,
                operation_log::session_details(account.chain_id, &token, amount, &result),
            ) {
                warn!("Failed to write operation log: {}", e);
            }

            if !result.all_succeeded {
                std::process::exit(1);
            }
        }
        Command::Log | Command::Config(_) => {}
    }

    Ok(())
}
