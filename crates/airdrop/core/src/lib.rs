#![cfg_attr(not(any(test, feature = "test")), warn(unused_crate_dependencies))]

//! Proportional token airdrop: allocation, batching, signing and resumable delivery.

pub mod allocation;
pub mod audit;
pub mod batch;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod delivery;
pub mod error;
pub mod events;
pub mod gas;
pub mod signer;
pub mod snapshot;
pub mod types;

pub use allocation::allocate;
pub use batch::{BatchBuilder, BatchContext};
pub use chain::{BatchReceipt, ChainClient, RpcChainClient};
pub use delivery::{DeliveryStatus, Sender};
pub use error::{AirdropError, ErrorKind};
pub use signer::{LocalSigner, NodeSigner, Signer, TransactionSigner};
pub use types::{Airdrop, SignedBatch, TxParams, UnsignedBatch};

#[cfg(any(feature = "test", test))]
pub mod test_utils;

#[cfg(test)]
mod tests;
