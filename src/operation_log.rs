use crate::aggregator::SessionResult;
use crate::config::get_tx_explorer_url;
use crate::types::{TokenRef, TransferStatus};
use anyhow::Result;
use chrono::Utc;
use ethers::types::U256;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Log file name
const OPERATION_LOG_FILE: &str = "operation_log.txt";

/// Get the directory where app data is stored (same as settings)
fn app_data_dir() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        let app_dir = config_dir.join("scarab");
        if !app_dir.exists() {
            let _ = fs::create_dir_all(&app_dir);
        }
        app_dir
    } else {
        PathBuf::from(".")
    }
}

fn log_path() -> PathBuf {
    app_data_dir().join(OPERATION_LOG_FILE)
}

/// Get the full path to the operation log file as a string for display
pub fn log_file_path() -> String {
    log_path().display().to_string()
}

/// Append a structured log entry describing a user-requested operation.
pub fn append_log(operation: &str, chain_id: u64, details: impl AsRef<str>) -> Result<()> {
    append_log_to(&log_path(), operation, chain_id, details)
}

/// One log entry: a header line, the details indented by two spaces, then a blank line.
fn format_entry(timestamp: &str, operation: &str, chain_id: u64, details: &str) -> String {
    let mut entry = format!("[{}] chain_id={} operation={}\n", timestamp, chain_id, operation);
    if details.trim().is_empty() {
        entry.push_str("  (no additional details)\n");
    } else {
        for line in details.lines() {
            if line.trim().is_empty() {
                entry.push('\n');
            } else {
                let _ = writeln!(entry, "  {}", line);
            }
        }
    }
    entry.push('\n');
    entry
}

fn append_log_to(path: &Path, operation: &str, chain_id: u64, details: impl AsRef<str>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let entry = format_entry(&Utc::now().to_rfc3339(), operation, chain_id, details.as_ref());
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?
        .write_all(entry.as_bytes())?;
    Ok(())
}

/// Read the entire log file content
pub fn read_log() -> Result<String> {
    let path = log_path();
    if path.exists() {
        Ok(fs::read_to_string(&path)?)
    } else {
        Ok(String::new())
    }
}

/// Log body for a balance check.
pub fn balance_check_details(token: &TokenRef, balance: U256) -> String {
    format!(
        "contract={:?}\ntoken_id={}\nbalance={}",
        token.contract, token.token_id, balance
    )
}

/// Log body for a finished transfer session, one line per transfer.
pub fn session_details(chain_id: u64, token: &TokenRef, amount_per_recipient: U256, result: &SessionResult) -> String {
    let mut body = format!(
        "contract={:?}\ntoken_id={}\namount_per_recipient={}\n{}\n",
        token.contract,
        token.token_id,
        amount_per_recipient,
        result.summary()
    );

    for batch in &result.batches {
        for transfer in &batch.transfers {
            let tx = transfer
                .tx_hash
                .map(|h| {
                    let hash = format!("{:?}", h);
                    get_tx_explorer_url(chain_id, &hash).unwrap_or(hash)
                })
                .unwrap_or_else(|| "-".to_string());
            let status = match &transfer.status {
                TransferStatus::Confirmed { .. } => "confirmed".to_string(),
                TransferStatus::Failed { error } => format!("failed: {}", error),
            };
            let _ = writeln!(body, "batch {} {} {} {}", batch.index, transfer.recipient, status, tx);
        }
    }

    if let Some(balance) = result.balance_after {
        let _ = writeln!(body, "balance_after={}", balance);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::aggregate;
    use crate::types::{BatchReport, TransferRecord};
    use ethers::types::{Address, TxHash};

    fn token() -> TokenRef {
        TokenRef::new(Address::repeat_byte(0x42), U256::one())
    }

    #[test]
    fn test_append_log_format() {
        let path = std::env::temp_dir().join(format!("scarab_oplog_test_{}.txt", std::process::id()));
        let _ = fs::remove_file(&path);

        append_log_to(&path, "balance", 137, "line one\n\nline two").unwrap();
        append_log_to(&path, "send", 137, "").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert!(content.contains("chain_id=137 operation=balance"));
        assert!(content.contains("  line one\n\n  line two\n"));
        assert!(content.contains("operation=send\n  (no additional details)"));
    }

    #[test]
    fn test_format_entry_layout() {
        let entry = format_entry("2026-01-01T00:00:00+00:00", "send", 8453, "a=1\n   \nb=2");
        assert_eq!(
            entry,
            "[2026-01-01T00:00:00+00:00] chain_id=8453 operation=send\n  a=1\n\n  b=2\n\n"
        );
    }

    #[test]
    fn test_session_details_links_transactions() {
        let hash = TxHash::from_low_u64_be(1);
        let report = BatchReport::from_transfers(
            0,
            vec![
                TransferRecord {
                    recipient: "0xaaa".to_string(),
                    tx_hash: Some(hash),
                    status: TransferStatus::Confirmed { block_number: Some(5) },
                },
                TransferRecord {
                    recipient: "0xbbb".to_string(),
                    tx_hash: None,
                    status: TransferStatus::Failed { error: "rejected".to_string() },
                },
            ],
        );
        let result = aggregate(vec![report]);
        let details = session_details(137, &token(), U256::from(2u64), &result);

        assert!(details.contains("amount_per_recipient=2"));
        assert!(details.contains(&format!("batch 0 0xaaa confirmed https://polygonscan.com/tx/{:?}", hash)));
        assert!(details.contains("batch 0 0xbbb failed: rejected -"));
    }

    #[test]
    fn test_balance_check_details() {
        let details = balance_check_details(&token(), U256::from(9u64));
        assert!(details.contains("token_id=1"));
        assert!(details.contains("balance=9"));
    }
}
