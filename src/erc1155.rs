//! ERC-1155 contract ABI used by the chain client.
//!
//! Only the three calls the transfer flow needs are defined:
//! - `balanceOf(address account, uint256 id) view returns (uint256)`
//! - `uri(uint256 id) view returns (string)`
//! - `safeBatchTransferFrom(address from, address to, uint256[] ids, uint256[] amounts, bytes data)`

use anyhow::{anyhow, Result};
use ethers::abi::{Function, Param, ParamType, StateMutability, Token};
use ethers::prelude::*;

fn param(name: &str, kind: ParamType) -> Param {
    Param {
        name: name.to_string(),
        kind,
        internal_type: None,
    }
}

#[allow(deprecated)]
fn balance_of_function() -> Function {
    Function {
        name: "balanceOf".to_string(),
        inputs: vec![
            param("account", ParamType::Address),
            param("id", ParamType::Uint(256)),
        ],
        outputs: vec![param("", ParamType::Uint(256))],
        constant: None,
        state_mutability: StateMutability::View,
    }
}

#[allow(deprecated)]
fn uri_function() -> Function {
    Function {
        name: "uri".to_string(),
        inputs: vec![param("id", ParamType::Uint(256))],
        outputs: vec![param("", ParamType::String)],
        constant: None,
        state_mutability: StateMutability::View,
    }
}

#[allow(deprecated)]
fn safe_batch_transfer_from_function() -> Function {
    Function {
        name: "safeBatchTransferFrom".to_string(),
        inputs: vec![
            param("from", ParamType::Address),
            param("to", ParamType::Address),
            param("ids", ParamType::Array(Box::new(ParamType::Uint(256)))),
            param("amounts", ParamType::Array(Box::new(ParamType::Uint(256)))),
            param("data", ParamType::Bytes),
        ],
        outputs: vec![],
        constant: None,
        state_mutability: StateMutability::NonPayable,
    }
}

pub fn encode_balance_of(account: Address, id: U256) -> Result<Bytes> {
    let calldata = balance_of_function().encode_input(&[Token::Address(account), Token::Uint(id)])?;
    Ok(calldata.into())
}

pub fn decode_balance_of(output: &[u8]) -> Result<U256> {
    let tokens = balance_of_function().decode_output(output)?;
    match tokens.into_iter().next() {
        Some(Token::Uint(balance)) => Ok(balance),
        other => Err(anyhow!("Unexpected balanceOf return value: {:?}", other)),
    }
}

pub fn encode_uri(id: U256) -> Result<Bytes> {
    let calldata = uri_function().encode_input(&[Token::Uint(id)])?;
    Ok(calldata.into())
}

pub fn decode_uri(output: &[u8]) -> Result<String> {
    let tokens = uri_function().decode_output(output)?;
    match tokens.into_iter().next() {
        Some(Token::String(uri)) => Ok(uri),
        other => Err(anyhow!("Unexpected uri return value: {:?}", other)),
    }
}

pub fn encode_safe_batch_transfer_from(
    from: Address,
    to: Address,
    ids: &[U256],
    amounts: &[U256],
    data: &[u8],
) -> Result<Bytes> {
    if ids.len() != amounts.len() {
        return Err(anyhow!(
            "ids and amounts length mismatch ({} vs {})",
            ids.len(),
            amounts.len()
        ));
    }
    let id_tokens: Vec<Token> = ids.iter().map(|id| Token::Uint(*id)).collect();
    let amount_tokens: Vec<Token> = amounts.iter().map(|a| Token::Uint(*a)).collect();
    let calldata = safe_batch_transfer_from_function().encode_input(&[
        Token::Address(from),
        Token::Address(to),
        Token::Array(id_tokens),
        Token::Array(amount_tokens),
        Token::Bytes(data.to_vec()),
    ])?;
    Ok(calldata.into())
}
