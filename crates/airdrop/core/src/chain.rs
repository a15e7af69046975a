//! The narrow view of the chain the pipeline depends on.

use alloy_network::{ReceiptResponse, TransactionBuilder};
use alloy_primitives::{Address, Bytes, Log, B256, U256};
use alloy_provider::Provider;
use alloy_rpc_types_eth::{BlockId, Filter, TransactionReceipt, TransactionRequest};
use alloy_sol_types::{sol_data, SolCall, SolType};
use async_trait::async_trait;
use tracing::debug;

use crate::{contracts::IERC20, error::AirdropError};

/// The parts of a mined transaction's receipt the delivery checks look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReceipt {
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub logs: Vec<Log>,
}

impl From<TransactionReceipt> for BatchReceipt {
    fn from(receipt: TransactionReceipt) -> Self {
        Self {
            block_number: receipt.block_number(),
            gas_used: receipt.gas_used(),
            logs: receipt
                .inner
                .logs()
                .iter()
                .map(|log| log.inner.clone())
                .collect(),
        }
    }
}

/// Read and broadcast access to the chain.
///
/// Every call is a suspension point of the single pipeline task; callers never
/// issue two calls concurrently.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Native balance of `address` at `block`.
    async fn balance(&self, address: Address, block: u64) -> Result<U256, AirdropError>;

    /// Number of transactions sent by `address`, i.e. its next nonce.
    async fn transaction_count(&self, address: Address) -> Result<u64, AirdropError>;

    async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<u64, AirdropError>;

    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, AirdropError>;

    /// `None` while the transaction is unknown or not yet mined.
    async fn transaction_receipt(&self, hash: B256)
        -> Result<Option<BatchReceipt>, AirdropError>;

    /// Logs emitted by `contract` with topic0 `event` within the inclusive block range.
    async fn logs(
        &self,
        contract: Address,
        event: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, AirdropError>;

    /// ERC-20 balance of `holder` in `token`.
    async fn token_balance(&self, token: Address, holder: Address) -> Result<U256, AirdropError>;
}

/// [`ChainClient`] backed by an alloy [`Provider`].
#[derive(Debug, Clone)]
pub struct RpcChainClient<P> {
    provider: P,
}

impl<P> RpcChainClient<P> {
    pub const fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P> ChainClient for RpcChainClient<P>
where
    P: Provider + Send + Sync,
{
    async fn balance(&self, address: Address, block: u64) -> Result<U256, AirdropError> {
        Ok(self
            .provider
            .get_balance(address)
            .block_id(BlockId::number(block))
            .await?)
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, AirdropError> {
        Ok(self.provider.get_transaction_count(address).await?)
    }

    async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<u64, AirdropError> {
        let request = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_input(data);
        Ok(self.provider.estimate_gas(request).await?)
    }

    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, AirdropError> {
        let pending = self.provider.send_raw_transaction(raw).await?;
        Ok(*pending.tx_hash())
    }

    async fn transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<BatchReceipt>, AirdropError> {
        let receipt = self.provider.get_transaction_receipt(hash).await?;
        Ok(receipt.map(Into::into))
    }

    async fn logs(
        &self,
        contract: Address,
        event: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, AirdropError> {
        let filter = Filter::new()
            .address(contract)
            .event_signature(event)
            .from_block(from_block)
            .to_block(to_block);

        let logs = self.provider.get_logs(&filter).await?;
        debug!(target: "airdrop::chain", %contract, from_block, to_block, count = logs.len(), "fetched logs");

        Ok(logs.into_iter().map(|log| log.inner).collect())
    }

    async fn token_balance(&self, token: Address, holder: Address) -> Result<U256, AirdropError> {
        let calldata = IERC20::balanceOfCall { account: holder }.abi_encode();
        let request = TransactionRequest::default()
            .with_to(token)
            .with_input(calldata);

        let output = self.provider.call(request).await?;
        Ok(sol_data::Uint::<256>::abi_decode(&output)?)
    }
}
