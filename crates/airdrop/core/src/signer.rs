//! Signing of unsigned batches, either with a local key or through a node.

use std::borrow::Cow;

use alloy_network::{eip2718::Encodable2718, Ethereum, EthereumWallet, TransactionBuilder};
use alloy_primitives::Bytes;
use alloy_provider::Provider;
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    error::AirdropError,
    events::{AirdropEvent, AirdropObserver, TracingObserver},
    types::{SignedBatch, TxParams, UnsignedBatch},
};

/// Produces the EIP-2718 encoded signed form of a transaction.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign_transaction(&self, tx: &TxParams) -> Result<Bytes, AirdropError>;
}

/// Signs with a private key held in process.
#[derive(Debug, Clone)]
pub struct LocalSigner {
    wallet: EthereumWallet,
}

impl LocalSigner {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self {
            wallet: EthereumWallet::from(signer),
        }
    }
}

#[async_trait]
impl TransactionSigner for LocalSigner {
    async fn sign_transaction(&self, tx: &TxParams) -> Result<Bytes, AirdropError> {
        let signed =
            <TransactionRequest as TransactionBuilder<Ethereum>>::build(tx.to_request(), &self.wallet)
                .await?;
        Ok(signed.encoded_2718().into())
    }
}

#[derive(Debug, Deserialize)]
struct SignTransactionResponse {
    raw: Bytes,
}

/// Delegates signing to the connected node via `eth_signTransaction`. The node must
/// hold the unlocked key of the sender.
#[derive(Debug, Clone)]
pub struct NodeSigner<P> {
    provider: P,
}

impl<P> NodeSigner<P> {
    pub const fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P> TransactionSigner for NodeSigner<P>
where
    P: Provider + Send + Sync,
{
    async fn sign_transaction(&self, tx: &TxParams) -> Result<Bytes, AirdropError> {
        let response: SignTransactionResponse = self
            .provider
            .raw_request(Cow::Borrowed("eth_signTransaction"), (tx.to_request(),))
            .await?;
        Ok(response.raw)
    }
}

/// Signs batches strictly in order, reporting progress before each one.
#[derive(Debug)]
pub struct Signer<S, O = TracingObserver> {
    signer: S,
    observer: O,
}

impl<S: TransactionSigner> Signer<S> {
    pub fn new(signer: S) -> Self {
        Self {
            signer,
            observer: TracingObserver,
        }
    }
}

impl<S, O> Signer<S, O>
where
    S: TransactionSigner,
    O: AirdropObserver,
{
    pub fn with_observer<T: AirdropObserver>(self, observer: T) -> Signer<S, T> {
        Signer {
            signer: self.signer,
            observer,
        }
    }

    /// Signs every batch. The signed echo carries no gas estimate.
    pub async fn sign_transactions(
        &self,
        transactions: Vec<UnsignedBatch>,
    ) -> Result<Vec<SignedBatch>, AirdropError> {
        let total = transactions.len();
        let mut signed = Vec::with_capacity(total);

        for (index, batch) in transactions.into_iter().enumerate() {
            self.observer
                .on_event(&AirdropEvent::Signing { index, total });

            let signed_raw = self.signer.sign_transaction(&batch.tx).await?;
            signed.push(SignedBatch {
                batch: batch.without_estimate(),
                signed_raw,
            });
        }

        Ok(signed)
    }
}
