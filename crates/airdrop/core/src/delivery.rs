//! Sending of signed batches and recovery of an interrupted run from the chain.

use std::{collections::HashSet, fmt::Debug, time::Duration};

use alloy_primitives::{Address, Log, B256, U256};
use alloy_sol_types::{SolCall, SolEvent};
use tracing::{error, warn};

use crate::{
    chain::{BatchReceipt, ChainClient},
    config::DeliveryConfig,
    contracts::{IAirdropper, IERC20},
    error::AirdropError,
    events::{AirdropEvent, AirdropObserver, TracingObserver},
    types::{Airdrop, DecodedTransaction, SignedBatch, UnsignedBatch},
};

/// What the chain says about a single batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// No receipt, the batch was never mined.
    Pending,
    /// Mined and consumed its whole gas allowance.
    OutOfGas,
    /// Mined, but the transfer to the first beneficiary is absent from the logs.
    MissingTransferLog,
    /// Mined and both exhaustion checks passed.
    Confirmed(BatchReceipt),
}

impl DeliveryStatus {
    pub const fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }
}

/// Decodes `log` as an ERC-20 transfer, skipping unrelated events.
fn decode_transfer(log: &Log) -> Option<IERC20::Transfer> {
    if log.topics().first() != Some(&IERC20::Transfer::SIGNATURE_HASH) {
        return None;
    }
    IERC20::Transfer::decode_log_data(&log.data).ok()
}

/// Whether `receipt` carries the transfer from the airdropper to the first
/// beneficiary of `batch`.
pub fn has_expected_transfer(receipt: &BatchReceipt, batch: &UnsignedBatch) -> bool {
    let Some(first) = batch.raw_batch.first() else {
        return false;
    };
    let Ok(call) = IAirdropper::multisendCall::abi_decode(&batch.tx.data) else {
        return false;
    };

    receipt.logs.iter().any(|log| {
        log.address == call.tokenAddr
            && decode_transfer(log).is_some_and(|transfer| {
                transfer.to == first.address && transfer.from == batch.tx.to
            })
    })
}

/// Classifies a mined batch. Gas exhaustion is checked first.
pub fn assess_receipt(receipt: BatchReceipt, batch: &UnsignedBatch) -> DeliveryStatus {
    if receipt.gas_used == batch.tx.gas {
        DeliveryStatus::OutOfGas
    } else if !has_expected_transfer(&receipt, batch) {
        DeliveryStatus::MissingTransferLog
    } else {
        DeliveryStatus::Confirmed(receipt)
    }
}

fn ensure_field<T: PartialEq + Debug>(
    nonce: u64,
    field: &'static str,
    signed: T,
    local: T,
) -> Result<(), AirdropError> {
    if signed == local {
        return Ok(());
    }

    let (signed, local) = (format!("{signed:?}"), format!("{local:?}"));
    error!(target: "airdrop::send", nonce, field, %signed, %local, "mismatch between signed and local transaction");
    Err(AirdropError::TransactionMismatch {
        nonce,
        field,
        signed,
        local,
    })
}

/// Checks a signed transaction against its local, unsigned counterpart.
pub fn check_transaction(
    transaction: &SignedBatch,
    unsigned: &UnsignedBatch,
) -> Result<DecodedTransaction, AirdropError> {
    let decoded = transaction.decode()?;
    let local = &unsigned.tx;
    let nonce = local.nonce;

    ensure_field(nonce, "nonce", decoded.nonce, local.nonce)?;
    ensure_field(nonce, "gasPrice", decoded.gas_price, Some(local.gas_price))?;
    ensure_field(nonce, "gas", decoded.gas, local.gas)?;
    ensure_field(nonce, "to", decoded.to, Some(local.to))?;
    ensure_field(nonce, "value", decoded.value, local.value)?;
    ensure_field(nonce, "data", &decoded.data, &local.data)?;
    if local.chain_id.is_some() {
        ensure_field(nonce, "chainId", decoded.chain_id, local.chain_id)?;
    }
    ensure_field(nonce, "from", decoded.signer, local.from)?;

    Ok(decoded)
}

/// Broadcasts signed batches one at a time and re-derives what was delivered.
#[derive(Debug)]
pub struct Sender<C, O = TracingObserver> {
    chain: C,
    config: DeliveryConfig,
    observer: O,
}

impl<C: ChainClient> Sender<C> {
    pub fn new(chain: C) -> Self {
        Self {
            chain,
            config: DeliveryConfig::default(),
            observer: TracingObserver,
        }
    }
}

impl<C, O> Sender<C, O>
where
    C: ChainClient,
    O: AirdropObserver,
{
    pub fn with_config(mut self, config: DeliveryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_observer<T: AirdropObserver>(self, observer: T) -> Sender<C, T> {
        Sender {
            chain: self.chain,
            config: self.config,
            observer,
        }
    }

    /// Verifies every signed transaction against its unsigned counterpart, then sends
    /// them in order, halting at the first failure.
    pub async fn send_transactions(
        &self,
        transactions: &[SignedBatch],
        unsigned: &[UnsignedBatch],
    ) -> Result<(), AirdropError> {
        ensure_aligned(transactions, unsigned)?;

        for (transaction, unsigned) in transactions.iter().zip(unsigned) {
            check_transaction(transaction, unsigned)?;
        }

        for (transaction, unsigned) in transactions.iter().zip(unsigned) {
            self.send_transaction(transaction, unsigned).await?;
        }

        Ok(())
    }

    /// Sends a single batch and waits for it to be mined.
    ///
    /// The receipt is judged against `unsigned`, which the signed payload must match.
    pub async fn send_transaction(
        &self,
        transaction: &SignedBatch,
        unsigned: &UnsignedBatch,
    ) -> Result<BatchReceipt, AirdropError> {
        check_transaction(transaction, unsigned)?;
        let nonce = unsigned.nonce();
        self.observer.on_event(&AirdropEvent::AboutToSend { nonce });

        let tx_hash = self
            .chain
            .send_raw_transaction(&transaction.signed_raw)
            .await?;
        self.observer
            .on_event(&AirdropEvent::Sent { nonce, tx_hash });

        let receipt = self.wait_for_receipt(tx_hash).await?;
        self.observer.on_event(&AirdropEvent::ReceiptReceived {
            nonce,
            tx_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
        });

        match assess_receipt(receipt, unsigned) {
            DeliveryStatus::Confirmed(receipt) => {
                self.observer
                    .on_event(&AirdropEvent::Confirmed { nonce, tx_hash });
                Ok(receipt)
            }
            DeliveryStatus::OutOfGas => {
                error!(target: "airdrop::send", nonce, %tx_hash, gas = unsigned.tx.gas, "batch ran out of gas");
                Err(AirdropError::OutOfGas { nonce, tx_hash })
            }
            DeliveryStatus::MissingTransferLog | DeliveryStatus::Pending => {
                error!(target: "airdrop::send", nonce, %tx_hash, "batch emitted no transfer to its first beneficiary");
                Err(AirdropError::MissingTransferLog { nonce, tx_hash })
            }
        }
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<BatchReceipt, AirdropError> {
        let poll = async {
            // a zero period panics
            let period = self.config.poll_interval.max(Duration::from_millis(1));
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Some(receipt) = self.chain.transaction_receipt(tx_hash).await? {
                    return Ok::<_, AirdropError>(receipt);
                }
            }
        };

        tokio::time::timeout(self.config.receipt_timeout, poll)
            .await
            .map_err(|_| AirdropError::ReceiptTimeout {
                tx_hash,
                timeout: self.config.receipt_timeout,
            })?
    }

    /// What the chain says about `transaction`, judged against `batch`.
    pub async fn delivery_status(
        &self,
        transaction: &SignedBatch,
        batch: &UnsignedBatch,
    ) -> Result<DeliveryStatus, AirdropError> {
        let hash = transaction.decode()?.hash;
        Ok(match self.chain.transaction_receipt(hash).await? {
            Some(receipt) => assess_receipt(receipt, batch),
            None => DeliveryStatus::Pending,
        })
    }

    /// Returns the pairs not yet successfully delivered, in their original order.
    ///
    /// The result can be fed back into [`Self::send_transactions`] to resume a run.
    pub async fn recover_unsent(
        &self,
        transactions: &[SignedBatch],
        unsigned: &[UnsignedBatch],
    ) -> Result<(Vec<SignedBatch>, Vec<UnsignedBatch>), AirdropError> {
        ensure_aligned(transactions, unsigned)?;

        let mut unsent = Vec::new();
        let mut unsent_unsigned = Vec::new();

        for (transaction, unsigned) in transactions.iter().zip(unsigned) {
            let status = self.delivery_status(transaction, unsigned).await?;
            if status.is_confirmed() {
                continue;
            }
            if status != DeliveryStatus::Pending {
                warn!(target: "airdrop::recover", nonce = unsigned.nonce(), ?status, "mined batch failed, treating as unsent");
            }
            unsent.push(transaction.clone());
            unsent_unsigned.push(unsigned.clone());
        }

        Ok((unsent, unsent_unsigned))
    }

    /// Returns the entries of `airdrops` that no delivered batch transferred, in
    /// their original order.
    ///
    /// Transfers are read from the `token` logs at each delivered batch's block and
    /// only those sent by `airdropper` count. Delivery is judged from the signed
    /// payload itself, not from its echo.
    pub async fn recover_unsent_airdrops(
        &self,
        airdrops: &[Airdrop],
        transactions: &[SignedBatch],
        airdropper: Address,
        token: Address,
    ) -> Result<Vec<Airdrop>, AirdropError> {
        let mut sent: HashSet<(Address, U256)> = HashSet::new();

        for transaction in transactions {
            let batch = transaction.decode()?.to_batch()?;
            let DeliveryStatus::Confirmed(receipt) =
                self.delivery_status(transaction, &batch).await?
            else {
                continue;
            };

            self.observer.on_event(&AirdropEvent::Filtering {
                nonce: batch.nonce(),
            });

            let logs = match receipt.block_number {
                Some(block) => {
                    self.chain
                        .logs(token, IERC20::Transfer::SIGNATURE_HASH, block, block)
                        .await?
                }
                None => receipt.logs,
            };

            sent.extend(
                logs.iter()
                    .filter(|log| log.address == token)
                    .filter_map(decode_transfer)
                    .filter(|transfer| transfer.from == airdropper)
                    .map(|transfer| (transfer.to, transfer.value)),
            );
        }

        Ok(airdrops
            .iter()
            .filter(|airdrop| !sent.contains(&(airdrop.address, airdrop.amount)))
            .copied()
            .collect())
    }
}

fn ensure_aligned(
    transactions: &[SignedBatch],
    unsigned: &[UnsignedBatch],
) -> Result<(), AirdropError> {
    if transactions.len() != unsigned.len() {
        return Err(AirdropError::LengthMismatch {
            signed: transactions.len(),
            unsigned: unsigned.len(),
        });
    }
    Ok(())
}
