//! Loading of ledger state dumps into snapshot balances.

use std::{borrow::Cow, collections::BTreeMap};

use alloy_primitives::{Address, U256};
use serde::Deserialize;
use tracing::info;

use crate::{error::AirdropError, types::parse_quantity};

#[derive(Debug, Deserialize)]
struct StateDump {
    state: BTreeMap<Address, AccountDump>,
}

#[derive(Debug, Deserialize)]
struct AccountDump {
    balance: String,
}

/// Parity dumps wrap the `state` object in brackets. Swaps them for braces so the
/// dump parses as a JSON object.
pub fn canonicalize(input: &str) -> Cow<'_, str> {
    let Some(key) = input.find("\"state\"") else {
        return Cow::Borrowed(input);
    };
    let after_key = key + "\"state\"".len();
    let Some(open) = input[after_key..]
        .find(|c: char| !c.is_whitespace() && c != ':')
        .map(|offset| after_key + offset)
    else {
        return Cow::Borrowed(input);
    };
    if !input[open..].starts_with('[') {
        return Cow::Borrowed(input);
    }
    let Some(close) = input.trim_end().strip_suffix('}').and_then(|body| body.rfind(']')) else {
        return Cow::Borrowed(input);
    };

    let mut canonical = String::with_capacity(input.len());
    canonical.push_str(&input[..open]);
    canonical.push('{');
    canonical.push_str(&input[open + 1..close]);
    canonical.push('}');
    canonical.push_str(&input[close + 1..]);
    Cow::Owned(canonical)
}

fn parse_balance(address: Address, value: &str) -> Result<U256, AirdropError> {
    parse_quantity(value).ok_or_else(|| AirdropError::InvalidBalance {
        address,
        value: value.to_string(),
    })
}

/// Parses a node state dump `{"state": {address: {"balance": "0x.."}}}` into balances.
pub fn load_state_dump(input: &str) -> Result<BTreeMap<Address, U256>, AirdropError> {
    let dump: StateDump = serde_json::from_str(&canonicalize(input))?;
    info!(target: "airdrop::snapshot", accounts = dump.state.len(), "Loaded state dump");

    dump.state
        .into_iter()
        .map(|(address, account)| Ok((address, parse_balance(address, &account.balance)?)))
        .collect()
}
