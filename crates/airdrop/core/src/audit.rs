//! Independent re-verification of an allocation and of what was delivered.

use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use tracing::{info, warn};

use crate::{
    allocation::scaled_amount, chain::ChainClient, config::AllocationParams,
    error::AirdropError, types::Airdrop,
};

/// Recomputes every entry of `airdrops` from the snapshot `balances`, without relying
/// on the ordering or cutoff search of [`crate::allocation::allocate`].
///
/// The burn address may appear twice: once with its own share when it is eligible
/// and once with the remainder. Returns the number of entries checked.
pub fn verify_allocation(
    airdrops: &[Airdrop],
    balances: &BTreeMap<Address, U256>,
    params: &AllocationParams,
) -> Result<usize, AirdropError> {
    let eligible: BTreeMap<Address, U256> = balances
        .iter()
        .filter(|(_, balance)| **balance > params.cutoff)
        .map(|(address, balance)| (*address, *balance))
        .collect();

    let eligible_sum = eligible
        .iter()
        .try_fold(U256::ZERO, |acc, (address, balance)| {
            acc.checked_add(*balance)
                .ok_or(AirdropError::Overflow { address: *address })
        })?;

    let mut owed = BTreeMap::new();
    let mut distributed = U256::ZERO;
    for (address, balance) in &eligible {
        let amount = scaled_amount(*address, *balance, params.budget, eligible_sum)?;
        distributed = distributed
            .checked_add(amount)
            .ok_or(AirdropError::Overflow { address: *address })?;
        owed.insert(*address, amount);
    }
    let remainder = params
        .budget
        .checked_sub(distributed)
        .ok_or(AirdropError::Overflow {
            address: params.burn_address,
        })?;

    for airdrop in airdrops {
        let share = owed.get(&airdrop.address).copied();
        let valid = if airdrop.address == params.burn_address {
            airdrop.amount == remainder || share == Some(airdrop.amount)
        } else {
            share == Some(airdrop.amount)
        };

        if !valid {
            return Err(AirdropError::AllocationAudit {
                address: airdrop.address,
                expected: share.unwrap_or(remainder),
                found: airdrop.amount,
            });
        }
    }

    if airdrops.len() != eligible.len() + 1 {
        return Err(AirdropError::AllocationCount {
            expected: eligible.len() + 1,
            found: airdrops.len(),
        });
    }

    info!(target: "airdrop::audit", checked = airdrops.len(), %remainder, "Allocation verified");
    Ok(airdrops.len())
}

/// Total amount owed to each address, duplicates summed.
pub fn expected_balances(airdrops: &[Airdrop]) -> Result<BTreeMap<Address, U256>, AirdropError> {
    let mut expected = BTreeMap::<Address, U256>::new();
    for airdrop in airdrops {
        let total = expected.entry(airdrop.address).or_default();
        *total = total
            .checked_add(airdrop.amount)
            .ok_or(AirdropError::Overflow {
                address: airdrop.address,
            })?;
    }
    Ok(expected)
}

/// An address holding less of the token than it was allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub address: Address,
    pub expected: U256,
    pub actual: U256,
}

/// Compares the on-chain token balance of every beneficiary to what it is owed.
pub async fn check_delivered<C: ChainClient>(
    chain: &C,
    token: Address,
    airdrops: &[Airdrop],
) -> Result<Vec<Shortfall>, AirdropError> {
    let expected = expected_balances(airdrops)?;
    let mut shortfalls = Vec::new();

    for (address, expected) in expected {
        let actual = chain.token_balance(token, address).await?;
        if actual < expected {
            warn!(target: "airdrop::audit", %address, %expected, %actual, "beneficiary is short");
            shortfalls.push(Shortfall {
                address,
                expected,
                actual,
            });
        }
    }

    info!(target: "airdrop::audit", shortfalls = shortfalls.len(), "Delivered balances checked");
    Ok(shortfalls)
}
