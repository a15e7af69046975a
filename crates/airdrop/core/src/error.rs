use std::time::Duration;

use alloy_eips::eip2718::Eip2718Error;
use alloy_network::{Ethereum, TransactionBuilderError};
use alloy_primitives::{Address, B256, U256};
use alloy_transport::TransportError;

/// Coarse classification of an [`AirdropError`].
///
/// Every kind is fatal to the run. The binary maps the kind to its exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Allocation or gas invariants were violated before anything was broadcast.
    Configuration,
    /// A signed transaction does not match its local, unsigned counterpart.
    Mismatch,
    /// A broadcast batch ran out of gas or silently failed on-chain.
    OutOfGas,
    /// Chain client, decoding and signing failures.
    Other,
}

impl ErrorKind {
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Configuration => 2,
            Self::Mismatch => 3,
            Self::OutOfGas => 4,
            Self::Other => 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AirdropError {
    // allocation
    #[error("no balance is at or below the cutoff {cutoff}")]
    CutoffNotReached { cutoff: U256 },
    #[error("largest ineligible balance {boundary} is not exactly the cutoff {cutoff}")]
    CutoffBoundary { cutoff: U256, boundary: U256 },
    #[error("no balance is above the cutoff {cutoff}")]
    NoEligibleAccounts { cutoff: U256 },
    #[error("snapshot balances sum to {actual}, expected {expected}")]
    TotalBalanceMismatch { expected: U256, actual: U256 },
    #[error("eligible balances sum to {actual}, expected {expected}")]
    EligibleSumMismatch { expected: U256, actual: U256 },
    #[error("share of {address} deviates: balance share {balance_share} vs airdrop share {airdrop_share}")]
    ShareDeviation {
        address: Address,
        balance_share: f64,
        airdrop_share: f64,
    },
    #[error("remainder {remainder} exceeds bound {bound}")]
    RemainderTooLarge { remainder: U256, bound: U256 },
    #[error("arithmetic overflow computing the airdrop of {address}")]
    Overflow { address: Address },
    #[error("allocation of {address} does not match the snapshot: expected {expected}, found {found}")]
    AllocationAudit {
        address: Address,
        expected: U256,
        found: U256,
    },
    #[error("allocation covers {found} entries, expected {expected}")]
    AllocationCount { expected: usize, found: usize },

    // batch creation
    #[error("batch size must be greater than zero")]
    InvalidBatchSize,
    #[error("batch of {batch_size} theoretically too expensive for gas limit: {theoretical} over {gas_limit}")]
    BatchTooExpensive {
        batch_size: usize,
        theoretical: u64,
        gas_limit: u64,
    },
    #[error("gas limit {gas_limit} plus reserve {gas_reserve} overflows")]
    GasOverflow { gas_limit: u64, gas_reserve: u64 },
    #[error("gas estimate over limit for batch with nonce {nonce}: {estimate} over {gas_limit}")]
    EstimateOverLimit {
        nonce: u64,
        estimate: u64,
        gas_limit: u64,
    },
    #[error("gas estimate suspiciously low for full-sized batch with nonce {nonce}: {estimate} / {gas_limit}")]
    EstimateTooLow {
        nonce: u64,
        estimate: u64,
        gas_limit: u64,
    },
    #[error("could not verify airdrop of {amount} to {address}: expected share {expected_share} vs {airdrop_share}")]
    UnverifiableAirdrop {
        address: Address,
        amount: U256,
        expected_share: f64,
        airdrop_share: f64,
    },

    // pre-send verification
    #[error("{signed} signed transactions but {unsigned} unsigned counterparts")]
    LengthMismatch { signed: usize, unsigned: usize },
    #[error("transaction mismatch for nonce {nonce}: {field} signed {signed}, local {local}")]
    TransactionMismatch {
        nonce: u64,
        field: &'static str,
        signed: String,
        local: String,
    },

    // post-send verification
    #[error("out of gas when sending nonce {nonce}, transaction {tx_hash}")]
    OutOfGas { nonce: u64, tx_hash: B256 },
    #[error("out of gas probably occurred when sending nonce {nonce}: transaction {tx_hash} emitted no transfer to the first beneficiary")]
    MissingTransferLog { nonce: u64, tx_hash: B256 },

    // everything else
    #[error("no receipt for {tx_hash} after {timeout:?}")]
    ReceiptTimeout { tx_hash: B256, timeout: Duration },
    #[error("could not recover the signer of a signed transaction")]
    UnrecoverableSigner,
    #[error("invalid balance {value:?} for {address}")]
    InvalidBalance { address: Address, value: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Decode(#[from] Eip2718Error),
    #[error(transparent)]
    Abi(#[from] alloy_sol_types::Error),
    #[error(transparent)]
    Build(#[from] TransactionBuilderError<Ethereum>),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AirdropError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CutoffNotReached { .. }
            | Self::CutoffBoundary { .. }
            | Self::NoEligibleAccounts { .. }
            | Self::TotalBalanceMismatch { .. }
            | Self::EligibleSumMismatch { .. }
            | Self::ShareDeviation { .. }
            | Self::RemainderTooLarge { .. }
            | Self::Overflow { .. }
            | Self::AllocationAudit { .. }
            | Self::AllocationCount { .. }
            | Self::InvalidBatchSize
            | Self::BatchTooExpensive { .. }
            | Self::GasOverflow { .. }
            | Self::EstimateOverLimit { .. }
            | Self::EstimateTooLow { .. }
            | Self::UnverifiableAirdrop { .. } => ErrorKind::Configuration,
            Self::LengthMismatch { .. } | Self::TransactionMismatch { .. } => ErrorKind::Mismatch,
            Self::OutOfGas { .. } | Self::MissingTransferLog { .. } => ErrorKind::OutOfGas,
            Self::ReceiptTimeout { .. }
            | Self::UnrecoverableSigner
            | Self::InvalidBalance { .. }
            | Self::Transport(_)
            | Self::Decode(_)
            | Self::Abi(_)
            | Self::Build(_)
            | Self::Json(_) => ErrorKind::Other,
        }
    }
}
