//! CSV export of a finished transfer session.

use crate::aggregator::SessionResult;
use crate::types::TransferStatus;
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    batch: usize,
    recipient: &'a str,
    status: &'static str,
    tx_hash: String,
    block: Option<u64>,
    error: &'a str,
}

/// One row per transfer, in submission order.
pub fn write_report<W: Write>(writer: W, result: &SessionResult) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for batch in &result.batches {
        for transfer in &batch.transfers {
            let (status, block, error) = match &transfer.status {
                TransferStatus::Confirmed { block_number } => ("confirmed", *block_number, ""),
                TransferStatus::Failed { error } => ("failed", None, error.as_str()),
            };
            wtr.serialize(ReportRow {
                batch: batch.index,
                recipient: &transfer.recipient,
                status,
                tx_hash: transfer.tx_hash.map(|h| format!("{:?}", h)).unwrap_or_default(),
                block,
                error,
            })?;
        }
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_csv_report(path: &Path, result: &SessionResult) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create report file: {}", path.display()))?;
    write_report(file, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::aggregate;
    use crate::types::{BatchReport, TransferRecord};
    use ethers::types::TxHash;

    fn result() -> SessionResult {
        aggregate(vec![
            BatchReport::from_transfers(
                0,
                vec![TransferRecord {
                    recipient: "0xaaa".to_string(),
                    tx_hash: Some(TxHash::from_low_u64_be(1)),
                    status: TransferStatus::Confirmed { block_number: Some(42) },
                }],
            ),
            BatchReport::from_transfers(
                1,
                vec![TransferRecord {
                    recipient: "bad".to_string(),
                    tx_hash: None,
                    status: TransferStatus::Failed { error: "Invalid recipient address: bad".to_string() },
                }],
            ),
        ])
    }

    #[test]
    fn test_write_report_rows() {
        let mut out = Vec::new();
        write_report(&mut out, &result()).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "batch,recipient,status,tx_hash,block,error");
        assert_eq!(
            lines[1],
            format!("0,0xaaa,confirmed,{:?},42,", TxHash::from_low_u64_be(1))
        );
        assert_eq!(lines[2], "1,bad,failed,,,Invalid recipient address: bad");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_write_csv_report_file() {
        let path = std::env::temp_dir().join(format!("scarab_report_{}.csv", std::process::id()));
        write_csv_report(&path, &result()).unwrap();
        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let count = rdr.records().count();
        let _ = std::fs::remove_file(&path);
        assert_eq!(count, 2);
    }
}
