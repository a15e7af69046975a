use std::time::Duration;

use alloy_primitives::{address, uint, Address, U256};

/// Burn address receiving the rounding remainder of the allocation.
pub const DEAD: Address = address!("000000000000000000000000000000000000dEaD");

/// Largest remainder the allocation may leave for the burn address.
pub const DEFAULT_REMAINDER_BOUND: U256 = uint!(1000000000_U256);

/// Maximum deviation between a balance share and the matching airdrop share.
pub const DEFAULT_TOLERANCE: f64 = 1e-12;

/// Number of airdrops bundled into a single `multisend`.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Gas ceiling of a full batch.
pub const DEFAULT_GAS_LIMIT: u64 = 3_500_000;

/// Slack added on top of the gas limit in every transaction.
pub const DEFAULT_GAS_RESERVE: u64 = 200_000;

/// 20 gwei.
pub const DEFAULT_GAS_PRICE: u128 = 20_000_000_000;

/// Inclusion may legitimately take this long.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(86_400);

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Constants driving [`crate::allocation::allocate`].
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationParams {
    /// Exclusive eligibility cutoff. The largest ineligible balance must equal it.
    pub cutoff: U256,
    /// Total amount distributed, remainder included.
    pub budget: U256,
    pub tolerance: f64,
    pub remainder_bound: U256,
    pub burn_address: Address,
    /// Expected sum of every snapshot balance, when known in advance.
    pub expected_total: Option<U256>,
    /// Expected sum of the eligible balances, when known in advance.
    pub expected_eligible_sum: Option<U256>,
}

impl AllocationParams {
    pub fn new(cutoff: U256, budget: U256) -> Self {
        Self {
            cutoff,
            budget,
            tolerance: DEFAULT_TOLERANCE,
            remainder_bound: DEFAULT_REMAINDER_BOUND,
            burn_address: DEAD,
            expected_total: None,
            expected_eligible_sum: None,
        }
    }
}

/// Gas settings shared by every batch transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasConfig {
    pub gas_limit: u64,
    pub gas_price: u128,
    pub gas_reserve: u64,
}

impl GasConfig {
    /// The gas field of every emitted transaction, `None` on overflow.
    pub const fn transaction_gas(&self) -> Option<u64> {
        self.gas_limit.checked_add(self.gas_reserve)
    }
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            gas_limit: DEFAULT_GAS_LIMIT,
            gas_price: DEFAULT_GAS_PRICE,
            gas_reserve: DEFAULT_GAS_RESERVE,
        }
    }
}

/// Cross-checks airdrop amounts against balances observed at a reference block
/// while batches are created.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationConfig {
    pub block_height: u64,
    /// Sum of all eligible balances at `block_height`.
    pub eligible_total: U256,
    pub budget: U256,
    pub tolerance: f64,
    /// Checked against everything it receives, since it may hold its own share
    /// besides the remainder.
    pub burn_address: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryConfig {
    pub receipt_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}
