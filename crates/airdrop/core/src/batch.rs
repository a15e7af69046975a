//! Turns an allocation list into unsigned `multisend` transactions.

use alloy_primitives::{Address, U256};
use tracing::{debug, error};

use crate::{
    allocation::share_deviation,
    chain::ChainClient,
    config::{GasConfig, VerificationConfig},
    contracts::encode_multisend,
    error::AirdropError,
    events::{AirdropEvent, AirdropObserver, TracingObserver},
    gas::theoretical_gas,
    types::{Airdrop, TxParams, UnsignedBatch},
};

/// Where the batches are sent from and to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchContext {
    /// Owner of the airdropper contract, signing every batch.
    pub sender: Address,
    pub airdropper: Address,
    pub token: Address,
    pub gas: GasConfig,
    pub chain_id: Option<u64>,
}

/// Builds one [`UnsignedBatch`] per `batch_size` airdrops.
#[derive(Debug)]
pub struct BatchBuilder<C, O = TracingObserver> {
    chain: C,
    context: BatchContext,
    verification: Option<VerificationConfig>,
    observer: O,
}

impl<C: ChainClient> BatchBuilder<C> {
    pub fn new(chain: C, context: BatchContext) -> Self {
        Self {
            chain,
            context,
            verification: None,
            observer: TracingObserver,
        }
    }
}

impl<C, O> BatchBuilder<C, O>
where
    C: ChainClient,
    O: AirdropObserver,
{
    /// Cross-checks every airdrop against the balance of its address at a reference block.
    pub fn with_verification(mut self, verification: VerificationConfig) -> Self {
        self.verification = Some(verification);
        self
    }

    pub fn with_observer<T: AirdropObserver>(self, observer: T) -> BatchBuilder<C, T> {
        BatchBuilder {
            chain: self.chain,
            context: self.context,
            verification: self.verification,
            observer,
        }
    }

    /// Partitions `airdrops` into contiguous batches of `batch_size` and builds their
    /// transactions with consecutive nonces, starting at the sender's live count.
    ///
    /// The last batch may be shorter and is exempt from the low estimate check.
    pub async fn create_txs(
        &self,
        airdrops: &[Airdrop],
        batch_size: usize,
    ) -> Result<Vec<UnsignedBatch>, AirdropError> {
        if batch_size == 0 {
            return Err(AirdropError::InvalidBatchSize);
        }

        let gas_limit = self.context.gas.gas_limit;
        let theoretical = u64::try_from(batch_size)
            .ok()
            .and_then(theoretical_gas)
            .unwrap_or(u64::MAX);
        if theoretical >= gas_limit {
            return Err(AirdropError::BatchTooExpensive {
                batch_size,
                theoretical,
                gas_limit,
            });
        }

        let burn_total = self.burn_total(airdrops)?;
        let mut nonce = self.chain.transaction_count(self.context.sender).await?;
        let mut transactions = Vec::with_capacity(airdrops.len().div_ceil(batch_size));
        let mut processed = 0;

        for batch in airdrops.chunks(batch_size) {
            let unsigned = self.build_batch(batch, nonce, burn_total).await?;

            if batch.len() == batch_size {
                let estimate = unsigned.gas_estimate.unwrap_or_default();
                if estimate < gas_limit / 2 {
                    return Err(AirdropError::EstimateTooLow {
                        nonce,
                        estimate,
                        gas_limit,
                    });
                }

                processed += batch.len();
                self.observer.on_event(&AirdropEvent::BatchCreated {
                    nonce,
                    processed,
                    total: airdrops.len(),
                    gas_estimate: estimate,
                });
            }

            transactions.push(unsigned);
            nonce += 1;
        }

        Ok(transactions)
    }

    /// Builds the transaction paying out a single batch.
    pub async fn process_batch(
        &self,
        batch: &[Airdrop],
        nonce: u64,
    ) -> Result<UnsignedBatch, AirdropError> {
        let burn_total = self.burn_total(batch)?;
        self.build_batch(batch, nonce, burn_total).await
    }

    async fn build_batch(
        &self,
        batch: &[Airdrop],
        nonce: u64,
        burn_total: U256,
    ) -> Result<UnsignedBatch, AirdropError> {
        if let Some(verification) = &self.verification {
            self.verify_batch(batch, verification, burn_total).await?;
        }

        let data = encode_multisend(self.context.token, batch);
        let estimate = self
            .chain
            .estimate_gas(self.context.sender, self.context.airdropper, data.clone())
            .await?;

        let GasConfig {
            gas_limit,
            gas_reserve,
            ..
        } = self.context.gas;
        let gas = self
            .context
            .gas
            .transaction_gas()
            .ok_or(AirdropError::GasOverflow {
                gas_limit,
                gas_reserve,
            })?;
        if estimate >= gas_limit {
            return Err(AirdropError::EstimateOverLimit {
                nonce,
                estimate,
                gas_limit,
            });
        }

        debug!(target: "airdrop::create", nonce, estimate, entries = batch.len(), "estimated batch");

        Ok(UnsignedBatch {
            raw_batch: batch.to_vec(),
            tx: TxParams {
                nonce,
                gas_price: self.context.gas.gas_price,
                gas,
                to: self.context.airdropper,
                value: U256::ZERO,
                data,
                from: self.context.sender,
                chain_id: self.context.chain_id,
            },
            gas_estimate: Some(estimate),
        })
    }

    /// Everything the burn address receives across `airdrops`, its own share and the
    /// remainder alike. Zero without verification.
    fn burn_total(&self, airdrops: &[Airdrop]) -> Result<U256, AirdropError> {
        let Some(verification) = &self.verification else {
            return Ok(U256::ZERO);
        };

        airdrops
            .iter()
            .filter(|airdrop| airdrop.address == verification.burn_address)
            .try_fold(U256::ZERO, |total, airdrop| {
                total.checked_add(airdrop.amount).ok_or(AirdropError::Overflow {
                    address: airdrop.address,
                })
            })
    }

    async fn verify_batch(
        &self,
        batch: &[Airdrop],
        verification: &VerificationConfig,
        burn_total: U256,
    ) -> Result<(), AirdropError> {
        for airdrop in batch {
            let balance = self
                .chain
                .balance(airdrop.address, verification.block_height)
                .await?;

            // the burn address is checked against the sum of its entries
            let amount = if airdrop.address == verification.burn_address {
                burn_total
            } else {
                airdrop.amount
            };
            let (expected_share, airdrop_share, deviation) = share_deviation(
                balance,
                verification.eligible_total,
                amount,
                verification.budget,
            );
            if deviation > verification.tolerance {
                error!(target: "airdrop::create", address = %airdrop.address, %balance, amount = %airdrop.amount, "could not verify airdrop");
                return Err(AirdropError::UnverifiableAirdrop {
                    address: airdrop.address,
                    amount: airdrop.amount,
                    expected_share,
                    airdrop_share,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;
    use alloy_sol_types::SolCall;

    use super::*;
    use crate::{
        allocation::allocate,
        config::{AllocationParams, DEAD, DEFAULT_GAS_LIMIT},
        contracts::IAirdropper,
        error::ErrorKind,
        test_utils::{airdrops, MockChain, RecordingObserver, AIRDROPPER, SENDER, TOKEN},
    };

    fn context() -> BatchContext {
        BatchContext {
            sender: SENDER,
            airdropper: AIRDROPPER,
            token: TOKEN,
            gas: GasConfig::default(),
            chain_id: None,
        }
    }

    #[tokio::test]
    async fn batch_endings() -> eyre::Result<()> {
        let chain = MockChain::default();
        chain.set_nonce(SENDER, 5);
        let observer = RecordingObserver::default();
        let builder = BatchBuilder::new(chain, context()).with_observer(observer.clone());

        let list = airdrops(110);
        let transactions = builder.create_txs(&list, 100).await?;

        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].raw_batch, list[..100]);
        assert_eq!(transactions[1].raw_batch, list[100..]);
        assert_eq!(transactions[0].nonce(), 5);
        assert_eq!(transactions[1].nonce(), 6);
        assert_eq!(observer.len(), 1);

        for transaction in &transactions {
            assert_eq!(transaction.tx.gas, DEFAULT_GAS_LIMIT + 200_000);
            assert_eq!(transaction.tx.to, AIRDROPPER);
            assert_eq!(transaction.tx.from, SENDER);
            let call = IAirdropper::multisendCall::abi_decode(&transaction.tx.data)?;
            assert_eq!(call.tokenAddr, TOKEN);
            assert_eq!(call.dests.len(), transaction.raw_batch.len());
        }
        Ok(())
    }

    #[tokio::test]
    async fn exact_multiple_has_no_trailing_batch() -> eyre::Result<()> {
        let builder = BatchBuilder::new(MockChain::default(), context());
        let transactions = builder.create_txs(&airdrops(200), 100).await?;

        assert_eq!(transactions.len(), 2);
        assert!(transactions.iter().all(|tx| tx.raw_batch.len() == 100));
        Ok(())
    }

    #[tokio::test]
    async fn too_expensive_batch_fails_fast() {
        let chain = MockChain::default();
        let builder = BatchBuilder::new(chain.clone(), context());

        let err = builder.create_txs(&airdrops(10), 200).await.unwrap_err();
        assert!(matches!(err, AirdropError::BatchTooExpensive { .. }));
        assert_eq!(chain.estimate_count(), 0);
    }

    #[tokio::test]
    async fn zero_batch_size_is_rejected() {
        let builder = BatchBuilder::new(MockChain::default(), context());
        let err = builder.create_txs(&airdrops(10), 0).await.unwrap_err();
        assert!(matches!(err, AirdropError::InvalidBatchSize));
    }

    #[tokio::test]
    async fn estimate_over_limit_is_rejected() {
        let chain = MockChain::default();
        chain.set_transfer_gas(40_000);
        let builder = BatchBuilder::new(chain, context());

        let err = builder.create_txs(&airdrops(150), 100).await.unwrap_err();
        assert!(matches!(err, AirdropError::EstimateOverLimit { nonce: 0, .. }));
    }

    #[tokio::test]
    async fn suspiciously_low_estimate_is_rejected() {
        let builder = BatchBuilder::new(MockChain::default(), context());

        let err = builder.create_txs(&airdrops(60), 50).await.unwrap_err();
        assert!(matches!(err, AirdropError::EstimateTooLow { .. }));
    }

    #[tokio::test]
    async fn short_list_is_a_single_unchecked_batch() -> eyre::Result<()> {
        let builder = BatchBuilder::new(MockChain::default(), context());
        let transactions = builder.create_txs(&airdrops(3), 100).await?;

        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].raw_batch.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn verification_checks_reference_balances() -> eyre::Result<()> {
        let chain = MockChain::default();
        let list = vec![
            Airdrop::new(address!("00000000000000000000000000000000000000a1"), U256::from(750)),
            Airdrop::new(address!("00000000000000000000000000000000000000b2"), U256::from(250)),
        ];
        chain.set_balance(list[0].address, U256::from(3000));
        chain.set_balance(list[1].address, U256::from(1000));

        let verification = VerificationConfig {
            block_height: 3_988_888,
            eligible_total: U256::from(4000),
            budget: U256::from(1000),
            tolerance: 1e-9,
            burn_address: DEAD,
        };
        let builder = BatchBuilder::new(chain.clone(), context()).with_verification(verification);
        builder.create_txs(&list, 100).await?;

        chain.set_balance(list[1].address, U256::from(900));
        let err = builder.create_txs(&list, 100).await.unwrap_err();
        assert!(matches!(
            err,
            AirdropError::UnverifiableAirdrop { address, .. } if address == list[1].address
        ));
        Ok(())
    }

    #[tokio::test]
    async fn eligible_burn_address_is_verified_against_its_total() -> eyre::Result<()> {
        let a = address!("00000000000000000000000000000000000000a1");
        let b = address!("00000000000000000000000000000000000000b2");
        let balances = [
            (a, U256::from(3_000_000)),
            (DEAD, U256::from(1_000_000)),
            (b, U256::from(10)),
        ];
        let list = allocate(
            &balances.into_iter().collect(),
            &AllocationParams::new(U256::from(10), U256::from(1_000_000_000)),
        )?;
        assert_eq!(
            list,
            vec![
                Airdrop::new(a, U256::from(750_000_000)),
                Airdrop::new(DEAD, U256::from(250_000_000)),
                Airdrop::new(DEAD, U256::ZERO),
            ]
        );

        let chain = MockChain::default();
        for (address, balance) in balances {
            chain.set_balance(address, balance);
        }
        let verification = VerificationConfig {
            block_height: 3_988_888,
            eligible_total: U256::from(4_000_000),
            budget: U256::from(1_000_000_000),
            tolerance: 1e-12,
            burn_address: DEAD,
        };
        let transactions = BatchBuilder::new(chain, context())
            .with_verification(verification)
            .create_txs(&list, 100)
            .await?;

        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].raw_batch, list);
        Ok(())
    }

    #[tokio::test]
    async fn overflowing_batch_size_is_too_expensive() {
        let chain = MockChain::default();
        let builder = BatchBuilder::new(chain.clone(), context());

        let err = builder
            .create_txs(&airdrops(10), usize::MAX)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AirdropError::BatchTooExpensive {
                theoretical: u64::MAX,
                ..
            }
        ));
        assert_eq!(chain.estimate_count(), 0);
    }

    #[tokio::test]
    async fn overflowing_gas_reserve_is_rejected() {
        let context = BatchContext {
            gas: GasConfig {
                gas_reserve: u64::MAX,
                ..GasConfig::default()
            },
            ..context()
        };
        let builder = BatchBuilder::new(MockChain::default(), context);

        let err = builder.create_txs(&airdrops(3), 100).await.unwrap_err();
        assert!(matches!(err, AirdropError::GasOverflow { .. }));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
