use std::time::Duration;

use alloy_primitives::U256;

use crate::{
    batch::{BatchBuilder, BatchContext},
    config::{DeliveryConfig, GasConfig},
    delivery::Sender,
    signer::{LocalSigner, Signer},
    test_utils::{sender_key, MockChain, RecordingObserver, AIRDROPPER, SENDER, TOKEN},
    types::{Airdrop, SignedBatch, UnsignedBatch},
};


pub(crate) const TIMING: DeliveryConfig = DeliveryConfig {
    receipt_timeout: Duration::from_secs(5),
    poll_interval: Duration::from_millis(1),
};

pub(crate) fn context() -> BatchContext {
    BatchContext {
        sender: SENDER,
        airdropper: AIRDROPPER,
        token: TOKEN,
        gas: GasConfig::default(),
        chain_id: None,
    }
}

/// A chain whose airdropper holds exactly the tokens `airdrops` pay out.
pub(crate) fn funded_chain(airdrops: &[Airdrop]) -> MockChain {
    let chain = MockChain::default();
    let total = airdrops.iter().map(|airdrop| airdrop.amount).sum::<U256>();
    chain.set_token_balance(TOKEN, AIRDROPPER, total);
    chain
}

pub(crate) async fn create_and_sign(
    chain: &MockChain,
    airdrops: &[Airdrop],
    batch_size: usize,
) -> eyre::Result<(Vec<SignedBatch>, Vec<UnsignedBatch>)> {
    let unsigned = BatchBuilder::new(chain.clone(), context())
        .create_txs(airdrops, batch_size)
        .await?;
    let signed = Signer::new(LocalSigner::new(sender_key()))
        .sign_transactions(unsigned.clone())
        .await?;
    Ok((signed, unsigned))
}

pub(crate) fn sender(
    chain: &MockChain,
    observer: &RecordingObserver,
) -> Sender<MockChain, RecordingObserver> {
    Sender::new(chain.clone())
        .with_config(TIMING)
        .with_observer(observer.clone())
}

/// Asserts every beneficiary holds exactly what it was allocated.
pub(crate) fn assert_delivered(chain: &MockChain, airdrops: &[Airdrop]) {
    for airdrop in airdrops {
        assert_eq!(
            chain.token_balance_of(TOKEN, airdrop.address),
            airdrop.amount,
            "balance of {}",
            airdrop.address
        );
    }
}
