//! Proportional allocation of the airdrop budget over the snapshot balances.

use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use tracing::info;

use crate::{config::AllocationParams, error::AirdropError, types::Airdrop};

/// Lossy conversion used only by the diagnostic ratio checks.
pub(crate) fn to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, &limb| acc * 18_446_744_073_709_551_616.0 + limb as f64)
}

/// Returns `|numerator_a / denominator_a - numerator_b / denominator_b|`.
pub(crate) fn share_deviation(
    numerator_a: U256,
    denominator_a: U256,
    numerator_b: U256,
    denominator_b: U256,
) -> (f64, f64, f64) {
    let a = to_f64(numerator_a) / to_f64(denominator_a);
    let b = to_f64(numerator_b) / to_f64(denominator_b);
    (a, b, (a - b).abs())
}

/// `floor(balance * budget / eligible_sum)`.
pub(crate) fn scaled_amount(
    address: Address,
    balance: U256,
    budget: U256,
    eligible_sum: U256,
) -> Result<U256, AirdropError> {
    balance
        .checked_mul(budget)
        .and_then(|product| product.checked_div(eligible_sum))
        .ok_or(AirdropError::Overflow { address })
}

fn checked_sum<'a>(
    values: impl IntoIterator<Item = (&'a Address, &'a U256)>,
) -> Result<U256, AirdropError> {
    values
        .into_iter()
        .try_fold(U256::ZERO, |acc, (address, value)| {
            acc.checked_add(*value)
                .ok_or(AirdropError::Overflow { address: *address })
        })
}

/// Sorts `balances` by balance descending, ties by ascending address.
pub(crate) fn sorted_balances(balances: &BTreeMap<Address, U256>) -> Vec<(Address, U256)> {
    let mut sorted: Vec<_> = balances.iter().map(|(a, b)| (*a, *b)).collect();
    // the map already yields ascending addresses and the sort is stable
    sorted.sort_by(|(_, a), (_, b)| b.cmp(a));
    sorted
}

/// Splits the sorted balances at the first entry at or below the cutoff, returning
/// the eligible prefix.
///
/// The largest ineligible balance must be exactly the cutoff.
pub(crate) fn eligible_prefix(
    sorted: &[(Address, U256)],
    cutoff: U256,
) -> Result<&[(Address, U256)], AirdropError> {
    let boundary = sorted
        .iter()
        .position(|(_, balance)| *balance <= cutoff)
        .ok_or(AirdropError::CutoffNotReached { cutoff })?;

    let (_, boundary_balance) = sorted[boundary];
    if boundary_balance != cutoff {
        return Err(AirdropError::CutoffBoundary {
            cutoff,
            boundary: boundary_balance,
        });
    }

    if boundary == 0 {
        return Err(AirdropError::NoEligibleAccounts { cutoff });
    }

    Ok(&sorted[..boundary])
}

/// Computes the allocation list from the snapshot `balances`.
///
/// Eligible accounts come first in descending balance order, followed by a single
/// burn entry carrying the rounding remainder. The amounts sum exactly to
/// [`AllocationParams::budget`].
pub fn allocate(
    balances: &BTreeMap<Address, U256>,
    params: &AllocationParams,
) -> Result<Vec<Airdrop>, AirdropError> {
    info!(target: "airdrop::allocation", accounts = balances.len(), "Started processing");

    if let Some(expected) = params.expected_total {
        let actual = checked_sum(balances.iter())?;
        if actual != expected {
            return Err(AirdropError::TotalBalanceMismatch { expected, actual });
        }
    }

    let sorted = sorted_balances(balances);
    let eligible = eligible_prefix(&sorted, params.cutoff)?;

    info!(target: "airdrop::allocation", eligible = eligible.len(), "Sorted and cut off eligible accounts");

    let eligible_sum = checked_sum(eligible.iter().map(|(a, b)| (a, b)))?;
    if let Some(expected) = params.expected_eligible_sum {
        if eligible_sum != expected {
            return Err(AirdropError::EligibleSumMismatch {
                expected,
                actual: eligible_sum,
            });
        }
    }

    let mut airdrops = Vec::with_capacity(eligible.len() + 1);
    let mut distributed = U256::ZERO;

    for &(address, balance) in eligible {
        let amount = scaled_amount(address, balance, params.budget, eligible_sum)?;

        let (balance_share, airdrop_share, deviation) =
            share_deviation(balance, eligible_sum, amount, params.budget);
        if deviation >= params.tolerance {
            return Err(AirdropError::ShareDeviation {
                address,
                balance_share,
                airdrop_share,
            });
        }

        distributed = distributed
            .checked_add(amount)
            .ok_or(AirdropError::Overflow { address })?;
        airdrops.push(Airdrop::new(address, amount));
    }

    let remainder = params
        .budget
        .checked_sub(distributed)
        .ok_or(AirdropError::Overflow {
            address: params.burn_address,
        })?;
    if remainder > params.remainder_bound {
        return Err(AirdropError::RemainderTooLarge {
            remainder,
            bound: params.remainder_bound,
        });
    }

    airdrops.push(Airdrop::new(params.burn_address, remainder));

    if let (Some(first), Some(last)) = (airdrops.first(), airdrops.last()) {
        info!(
            target: "airdrop::allocation",
            first = %first.address,
            first_amount = %first.amount,
            last = %last.address,
            last_amount = %last.amount,
            "Sanity checks passed"
        );
    }

    Ok(airdrops)
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;
    use test_case::test_case;

    use super::*;
    use crate::config::DEAD;

    const A: Address = address!("00000000000000000000000000000000000000a1");
    const B: Address = address!("00000000000000000000000000000000000000b2");
    const C: Address = address!("00000000000000000000000000000000000000c3");
    const D: Address = address!("00000000000000000000000000000000000000d4");
    const E: Address = address!("00000000000000000000000000000000000000e5");

    fn snapshot(entries: &[(Address, u64)]) -> BTreeMap<Address, U256> {
        entries
            .iter()
            .map(|(address, balance)| (*address, U256::from(*balance)))
            .collect()
    }

    fn params(cutoff: u64, budget: u64) -> AllocationParams {
        let mut params = AllocationParams::new(U256::from(cutoff), U256::from(budget));
        params.tolerance = 1e-3;
        params
    }

    #[test]
    fn allocates_proportionally_with_burn_remainder() -> eyre::Result<()> {
        let balances = snapshot(&[(A, 300), (B, 100), (C, 200), (D, 10), (E, 1)]);
        let airdrops = allocate(&balances, &params(10, 1000))?;

        assert_eq!(
            airdrops,
            vec![
                Airdrop::new(A, U256::from(500)),
                Airdrop::new(C, U256::from(333)),
                Airdrop::new(B, U256::from(166)),
                Airdrop::new(DEAD, U256::from(1)),
            ]
        );

        let total = airdrops.iter().map(|a| a.amount).sum::<U256>();
        assert_eq!(total, U256::from(1000));
        Ok(())
    }

    #[test]
    fn ties_are_ordered_by_address() -> eyre::Result<()> {
        let balances = snapshot(&[(C, 50), (A, 50), (B, 50), (D, 5)]);
        let airdrops = allocate(&balances, &params(5, 300))?;

        let order: Vec<_> = airdrops.iter().map(|a| a.address).collect();
        assert_eq!(order, vec![A, B, C, DEAD]);
        Ok(())
    }

    #[test]
    fn burn_address_may_also_be_eligible() -> eyre::Result<()> {
        let balances = snapshot(&[(A, 200), (DEAD, 100), (B, 7)]);
        let airdrops = allocate(&balances, &params(7, 1000))?;

        let burns: Vec<_> = airdrops.iter().filter(|a| a.address == DEAD).collect();
        assert_eq!(burns.len(), 2);
        assert_eq!(burns[0].amount, U256::from(333));
        assert_eq!(burns[1].amount, U256::from(1));
        Ok(())
    }

    #[test_case(&[(A, 300), (B, 20)], 10 => matches AirdropError::CutoffNotReached { .. } ; "nothing at cutoff")]
    #[test_case(&[(A, 300), (B, 9)], 10 => matches AirdropError::CutoffBoundary { .. } ; "boundary below cutoff")]
    #[test_case(&[(A, 10), (B, 3)], 10 => matches AirdropError::NoEligibleAccounts { .. } ; "nobody above cutoff")]
    fn rejects_bad_cutoff(entries: &[(Address, u64)], cutoff: u64) -> AirdropError {
        allocate(&snapshot(entries), &params(cutoff, 1000)).unwrap_err()
    }

    #[test]
    fn remainder_above_bound_is_rejected() {
        let balances = snapshot(&[(A, 1), (B, 1), (C, 1), (D, 0)]);
        let mut params = params(0, 1000);
        params.tolerance = 1.0;
        params.remainder_bound = U256::ZERO;

        let err = allocate(&balances, &params).unwrap_err();
        assert!(matches!(
            err,
            AirdropError::RemainderTooLarge { remainder, .. } if remainder == U256::from(1)
        ));
    }

    #[test]
    fn coarse_budget_trips_the_share_tolerance() {
        let balances = snapshot(&[(A, 2), (B, 1), (C, 0)]);
        let mut params = params(0, 10);
        params.tolerance = 1e-6;

        let err = allocate(&balances, &params).unwrap_err();
        assert!(matches!(err, AirdropError::ShareDeviation { address, .. } if address == A));
    }

    #[test]
    fn golden_numbers_are_enforced() {
        let balances = snapshot(&[(A, 300), (B, 100), (C, 10)]);

        let mut wrong_total = params(10, 1000);
        wrong_total.expected_total = Some(U256::from(400));
        assert!(matches!(
            allocate(&balances, &wrong_total),
            Err(AirdropError::TotalBalanceMismatch { .. })
        ));

        let mut wrong_eligible = params(10, 1000);
        wrong_eligible.expected_total = Some(U256::from(410));
        wrong_eligible.expected_eligible_sum = Some(U256::from(410));
        assert!(matches!(
            allocate(&balances, &wrong_eligible),
            Err(AirdropError::EligibleSumMismatch { .. })
        ));
    }

    #[test]
    fn large_balances_sum_exactly_to_budget() -> eyre::Result<()> {
        let budget: U256 = "7012269912256639039461982".parse()?;
        let ether = U256::from(10).pow(U256::from(18));
        let balances: BTreeMap<_, _> = (1u64..=500)
            .map(|i| {
                let address = Address::left_padding_from(&i.to_be_bytes());
                (address, U256::from(i * 7919 + 13) * ether + U256::from(i))
            })
            .chain([(Address::repeat_byte(0xee), ether)])
            .collect();

        let mut params = AllocationParams::new(ether, budget);
        params.burn_address = DEAD;
        let airdrops = allocate(&balances, &params)?;

        assert_eq!(airdrops.len(), 501);
        assert_eq!(airdrops.iter().map(|a| a.amount).sum::<U256>(), budget);

        let eligible_sum = balances
            .values()
            .filter(|b| **b > ether)
            .copied()
            .sum::<U256>();
        for airdrop in &airdrops[..500] {
            let balance = balances[&airdrop.address];
            assert_eq!(airdrop.amount, balance * budget / eligible_sum);
        }
        assert!(airdrops.windows(2).take(499).all(|w| w[0].amount >= w[1].amount));
        Ok(())
    }
}
