//! Pessimistic gas model of a `multisend` batch, used to sanity check the gas limit
//! before any estimate is requested from the chain.

/// Bare token transfer: 2 SSTOREs, 3 SLOADs, the log and minor bookkeeping.
const TRANSFER_GAS: u64 = 28_900;
/// The external call into the token, per transfer.
const TRANSFER_CALL_GAS: u64 = 700;
/// Loop overhead inside the contract, more or less.
const LOOP_GAS: u64 = 100;
/// Owner check SLOAD.
const OWNER_CHECK_GAS: u64 = 200;
const TX_BASE_GAS: u64 = 21_000;

/// Calldata cost of an address argument: 20 non-zero bytes and 12 zero bytes.
const ADDRESS_INPUT_GAS: u64 = 20 * 68 + 12 * 4;
/// Calldata cost of an amount argument, assuming 32 non-zero bytes.
const AMOUNT_INPUT_GAS: u64 = 32 * 68;

const PER_TRANSFER_GAS: u64 =
    TRANSFER_GAS + TRANSFER_CALL_GAS + ADDRESS_INPUT_GAS + AMOUNT_INPUT_GAS + LOOP_GAS;

/// Theoretical gas usage of a `multisend` transaction carrying `batch_size` transfers,
/// `None` when it does not fit in a `u64`.
pub const fn theoretical_gas(batch_size: u64) -> Option<u64> {
    match batch_size.checked_mul(PER_TRANSFER_GAS) {
        Some(transfers) => transfers.checked_add(TX_BASE_GAS + OWNER_CHECK_GAS + ADDRESS_INPUT_GAS),
        None => None,
    }
}
