//! Batch planning: validates a transfer request against the balance and splits the recipient
//! list into fixed-size batches.

use crate::error::{TransferError, TransferResult};
use crate::types::Batch;
use ethers::types::U256;

/// Maximum number of recipients per batch.
pub const BATCH_SIZE: usize = 50;

/// Total tokens needed to send `amount_per_recipient` to each of `recipient_count` recipients.
/// None on overflow.
pub fn required_total(recipient_count: usize, amount_per_recipient: U256) -> Option<U256> {
    amount_per_recipient.checked_mul(U256::from(recipient_count))
}

/// Check the request and partition recipients into ordered batches of at most [`BATCH_SIZE`].
///
/// No ledger calls are made here.
pub fn plan(
    recipients: &[String],
    token_id: U256,
    amount_per_recipient: U256,
    balance: U256,
) -> TransferResult<Vec<Batch>> {
    if recipients.is_empty() {
        return Err(TransferError::EmptyRecipientList);
    }
    if amount_per_recipient.is_zero() {
        return Err(TransferError::InvalidAmount);
    }

    // An overflowing total exceeds every representable balance
    match required_total(recipients.len(), amount_per_recipient) {
        Some(required) if required <= balance => {}
        required => {
            return Err(TransferError::InsufficientBalance {
                required,
                available: balance,
            });
        }
    }

    Ok(recipients
        .chunks(BATCH_SIZE)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            recipients: chunk.to_vec(),
            ids: vec![token_id],
            amounts: vec![amount_per_recipient],
        })
        .collect())
}
