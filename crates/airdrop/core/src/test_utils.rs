//! In-process chain used to exercise the pipeline end to end.

use std::{collections::HashMap, sync::Arc};

use alloy_primitives::{address, Address, Bytes, Log, B256, U256};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{SolCall, SolEvent};
use alloy_transport::TransportErrorKind;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    chain::{BatchReceipt, ChainClient},
    config::{DEFAULT_GAS_LIMIT, DEFAULT_GAS_PRICE, DEFAULT_GAS_RESERVE},
    contracts::{encode_multisend, IAirdropper, IERC20},
    error::AirdropError,
    events::{AirdropEvent, AirdropObserver},
    types::{Airdrop, DecodedTransaction, TxParams, UnsignedBatch},
};

/// First anvil dev account.
pub const SENDER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
pub const AIRDROPPER: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
pub const TOKEN: Address = address!("e7f1725E7734CE288F8367e1Bb143E90bb3F0512");

const SENDER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Gas of a `multisend` carrying no transfers.
pub const BASE_GAS: u64 = 22_608;
pub const TRANSFER_GAS: u64 = 33_000;

pub fn sender_key() -> PrivateKeySigner {
    SENDER_KEY.parse().expect("valid key")
}

/// `count` distinct airdrops with decreasing amounts.
pub fn airdrops(count: usize) -> Vec<Airdrop> {
    (0..count as u64)
        .map(|i| {
            Airdrop::new(
                Address::left_padding_from(&(0x1000 + i).to_be_bytes()),
                U256::from(1_000_000 - i),
            )
        })
        .collect()
}

/// `count` unsigned batches of two airdrops each, nonces starting at `nonce`.
pub fn unsigned_batches(count: usize, nonce: u64) -> Vec<UnsignedBatch> {
    airdrops(count * 2)
        .chunks(2)
        .zip(nonce..)
        .map(|(batch, nonce)| UnsignedBatch {
            raw_batch: batch.to_vec(),
            tx: TxParams {
                nonce,
                gas_price: DEFAULT_GAS_PRICE,
                gas: DEFAULT_GAS_LIMIT + DEFAULT_GAS_RESERVE,
                to: AIRDROPPER,
                value: U256::ZERO,
                data: encode_multisend(TOKEN, batch),
                from: SENDER,
                chain_id: None,
            },
            gas_estimate: Some(BASE_GAS + 2 * TRANSFER_GAS),
        })
        .collect()
}

/// Records every event it observes.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<AirdropEvent>>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<AirdropEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl AirdropObserver for RecordingObserver {
    fn on_event(&self, event: &AirdropEvent) {
        self.events.lock().push(event.clone());
    }
}

#[derive(Debug)]
struct MockState {
    block_number: u64,
    nonces: HashMap<Address, u64>,
    balances: HashMap<Address, U256>,
    token_balances: HashMap<(Address, Address), U256>,
    receipts: HashMap<B256, BatchReceipt>,
    logs: Vec<(u64, Log)>,
    transfer_gas: u64,
    fail_next_send: bool,
    fail_receipts: bool,
    withhold_receipts: bool,
    silent_failures: bool,
    sent: usize,
    estimates: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            block_number: 0,
            nonces: HashMap::new(),
            balances: HashMap::new(),
            token_balances: HashMap::new(),
            receipts: HashMap::new(),
            logs: Vec::new(),
            transfer_gas: TRANSFER_GAS,
            fail_next_send: false,
            fail_receipts: false,
            withhold_receipts: false,
            silent_failures: false,
            sent: 0,
            estimates: 0,
        }
    }
}

impl MockState {
    fn required_gas(&self, transfers: usize) -> u64 {
        BASE_GAS + transfers as u64 * self.transfer_gas
    }

    /// Runs a `multisend`, returning the gas used and the emitted logs.
    fn execute(&mut self, tx: &DecodedTransaction) -> (u64, Vec<Log>) {
        let (Some(airdropper), Ok(call)) = (tx.to, IAirdropper::multisendCall::abi_decode(&tx.data))
        else {
            return (BASE_GAS, Vec::new());
        };

        let required = self.required_gas(call.dests.len());
        if tx.gas < required {
            return (tx.gas, Vec::new());
        }
        if self.silent_failures {
            return (BASE_GAS, Vec::new());
        }

        let total = call.values.iter().copied().sum::<U256>();
        let funds = self
            .token_balances
            .get(&(call.tokenAddr, airdropper))
            .copied()
            .unwrap_or_default();
        if funds < total {
            return (required / 2, Vec::new());
        }

        self.token_balances
            .insert((call.tokenAddr, airdropper), funds - total);
        let mut logs = Vec::with_capacity(call.dests.len());
        for (to, value) in call.dests.iter().zip(&call.values) {
            *self.token_balances.entry((call.tokenAddr, *to)).or_default() += *value;
            logs.push(Log {
                address: call.tokenAddr,
                data: IERC20::Transfer {
                    from: airdropper,
                    to: *to,
                    value: *value,
                }
                .encode_log_data(),
            });
        }

        (required, logs)
    }
}

fn rpc_error(message: &'static str) -> AirdropError {
    TransportErrorKind::custom_str(message).into()
}

/// A single-node chain mining one block per transaction.
///
/// Token transfers move balances and emit `Transfer` logs. A transaction given less
/// gas than its transfers need uses all of it and emits nothing.
#[derive(Debug, Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<MockState>>,
}

impl MockChain {
    pub fn set_nonce(&self, address: Address, nonce: u64) {
        self.state.lock().nonces.insert(address, nonce);
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.state.lock().balances.insert(address, balance);
    }

    pub fn set_token_balance(&self, token: Address, holder: Address, balance: U256) {
        self.state
            .lock()
            .token_balances
            .insert((token, holder), balance);
    }

    /// Gas every transfer costs, both when estimated and when executed.
    pub fn set_transfer_gas(&self, gas: u64) {
        self.state.lock().transfer_gas = gas;
    }

    /// The next broadcast fails without reaching the chain.
    pub fn fail_next_send(&self) {
        self.state.lock().fail_next_send = true;
    }

    pub fn fail_receipt_queries(&self, fail: bool) {
        self.state.lock().fail_receipts = fail;
    }

    /// Transactions are accepted but their receipts never show up.
    pub fn withhold_receipts(&self, withhold: bool) {
        self.state.lock().withhold_receipts = withhold;
    }

    /// Mined batches succeed without transferring anything.
    pub fn set_silent_failures(&self, silent: bool) {
        self.state.lock().silent_failures = silent;
    }

    /// Number of transactions accepted.
    pub fn sent_count(&self) -> usize {
        self.state.lock().sent
    }

    pub fn estimate_count(&self) -> usize {
        self.state.lock().estimates
    }

    pub fn token_balance_of(&self, token: Address, holder: Address) -> U256 {
        self.state
            .lock()
            .token_balances
            .get(&(token, holder))
            .copied()
            .unwrap_or_default()
    }

    pub fn receipt(&self, hash: B256) -> Option<BatchReceipt> {
        self.state.lock().receipts.get(&hash).cloned()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn balance(&self, address: Address, _block: u64) -> Result<U256, AirdropError> {
        Ok(self
            .state
            .lock()
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, AirdropError> {
        Ok(self
            .state
            .lock()
            .nonces
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn estimate_gas(
        &self,
        _from: Address,
        _to: Address,
        data: Bytes,
    ) -> Result<u64, AirdropError> {
        let mut state = self.state.lock();
        state.estimates += 1;
        let transfers = IAirdropper::multisendCall::abi_decode(&data)
            .map(|call| call.dests.len())
            .unwrap_or_default();
        Ok(state.required_gas(transfers))
    }

    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, AirdropError> {
        let tx = DecodedTransaction::decode(raw)?;

        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_send) {
            return Err(rpc_error("connection reset"));
        }
        if state.receipts.contains_key(&tx.hash) {
            return Err(rpc_error("already known"));
        }
        let expected = state.nonces.get(&tx.signer).copied().unwrap_or_default();
        if tx.nonce != expected {
            return Err(rpc_error("invalid nonce"));
        }

        state.nonces.insert(tx.signer, expected + 1);
        state.sent += 1;
        state.block_number += 1;
        let block_number = state.block_number;

        let (gas_used, logs) = state.execute(&tx);
        state
            .logs
            .extend(logs.iter().cloned().map(|log| (block_number, log)));
        state.receipts.insert(
            tx.hash,
            BatchReceipt {
                block_number: Some(block_number),
                gas_used,
                logs,
            },
        );

        Ok(tx.hash)
    }

    async fn transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<BatchReceipt>, AirdropError> {
        let state = self.state.lock();
        if state.fail_receipts {
            return Err(rpc_error("receipt unavailable"));
        }
        if state.withhold_receipts {
            return Ok(None);
        }
        Ok(state.receipts.get(&hash).cloned())
    }

    async fn logs(
        &self,
        contract: Address,
        event: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, AirdropError> {
        Ok(self
            .state
            .lock()
            .logs
            .iter()
            .filter(|(block, log)| {
                (from_block..=to_block).contains(block)
                    && log.address == contract
                    && log.topics().first() == Some(&event)
            })
            .map(|(_, log)| log.clone())
            .collect())
    }

    async fn token_balance(&self, token: Address, holder: Address) -> Result<U256, AirdropError> {
        Ok(self.token_balance_of(token, holder))
    }
}
