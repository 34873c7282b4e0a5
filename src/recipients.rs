//! Recipient list parsing.
//!
//! Input is one address per line. Lines are trimmed and blank lines dropped; nothing else is
//! checked here. A malformed address is kept and fails when its transfer is submitted.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

/// Parse raw multi-line text into the ordered recipient list.
///
/// Duplicates are preserved; each occurrence receives its own allocation.
pub fn parse_recipients(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read raw recipient text from a file, or from stdin when `path` is `-`.
pub fn read_recipients_text(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read recipients from stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read recipients file: {}", path.display()))
}

/// Read and parse a recipients file.
pub fn read_recipients_file(path: &Path) -> Result<Vec<String>> {
    Ok(parse_recipients(&read_recipients_text(path)?))
}
