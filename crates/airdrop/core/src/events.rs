use alloy_primitives::B256;
use auto_impl::auto_impl;
use tracing::info;

/// Progress reported by the pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AirdropEvent {
    /// A full batch was turned into an unsigned transaction.
    BatchCreated {
        nonce: u64,
        processed: usize,
        total: usize,
        gas_estimate: u64,
    },
    /// About to hand transaction `index` of `total` to the signer.
    Signing { index: usize, total: usize },
    AboutToSend { nonce: u64 },
    Sent { nonce: u64, tx_hash: B256 },
    ReceiptReceived {
        nonce: u64,
        tx_hash: B256,
        block_number: Option<u64>,
        gas_used: u64,
    },
    /// Both out-of-gas checks passed.
    Confirmed { nonce: u64, tx_hash: B256 },
    /// A delivered batch is being scanned for the airdrops it carried.
    Filtering { nonce: u64 },
}

/// Receives [`AirdropEvent`]s, in order, from a single task.
#[auto_impl(&, Box, Arc)]
pub trait AirdropObserver: Send + Sync {
    fn on_event(&self, event: &AirdropEvent);
}

/// Logs every event at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl AirdropObserver for TracingObserver {
    fn on_event(&self, event: &AirdropEvent) {
        match event {
            AirdropEvent::BatchCreated {
                nonce,
                processed,
                total,
                gas_estimate,
            } => info!(target: "airdrop::create", nonce, processed, total, gas_estimate, "Creating transactions"),
            AirdropEvent::Signing { index, total } => {
                info!(target: "airdrop::sign", index, total, "Signing transactions")
            }
            AirdropEvent::AboutToSend { nonce } => {
                info!(target: "airdrop::send", nonce, "About to send")
            }
            AirdropEvent::Sent { nonce, tx_hash } => {
                info!(target: "airdrop::send", nonce, %tx_hash, "Sent")
            }
            AirdropEvent::ReceiptReceived {
                nonce,
                tx_hash,
                block_number,
                gas_used,
            } => info!(target: "airdrop::send", nonce, %tx_hash, ?block_number, gas_used, "Got receipt"),
            AirdropEvent::Confirmed { nonce, tx_hash } => {
                info!(target: "airdrop::send", nonce, %tx_hash, "Batch confirmed")
            }
            AirdropEvent::Filtering { nonce } => {
                info!(target: "airdrop::recover", nonce, "Filtering transaction")
            }
        }
    }
}
