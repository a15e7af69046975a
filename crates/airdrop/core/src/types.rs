//! Records exchanged between the pipeline stages and persisted as JSON in between.

use alloy_consensus::{transaction::SignerRecoverable, Transaction, TxEnvelope};
use alloy_eips::eip2718::Decodable2718;
use alloy_network::TransactionBuilder;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_sol_types::SolCall;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;

use crate::{contracts::IAirdropper, error::AirdropError};

/// Parses a hex (`0x` prefixed) or decimal quantity. A bare `0x` is zero.
pub(crate) fn parse_quantity(value: &str) -> Option<U256> {
    match value.strip_prefix("0x") {
        Some("") => Some(U256::ZERO),
        Some(hex) => U256::from_str_radix(hex, 16).ok(),
        None => U256::from_str_radix(value, 10).ok(),
    }
}

/// Reads an amount written either as a quantity string or as a JSON integer of any
/// width, without going through a float.
fn deserialize_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    let raw = Box::<RawValue>::deserialize(deserializer)?;
    let text = raw.get().trim();
    let text = text
        .strip_prefix('"')
        .and_then(|text| text.strip_suffix('"'))
        .unwrap_or(text);

    parse_quantity(text).ok_or_else(|| D::Error::custom(format!("invalid amount {text}")))
}

/// A single allocation entry, serialized as an `[address, amount]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "(Address, U256)")]
pub struct Airdrop {
    pub address: Address,
    pub amount: U256,
}

impl Airdrop {
    pub const fn new(address: Address, amount: U256) -> Self {
        Self { address, amount }
    }
}

impl<'de> Deserialize<'de> for Airdrop {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Pair(Address, #[serde(deserialize_with = "deserialize_amount")] U256);

        let Pair(address, amount) = Pair::deserialize(deserializer)?;
        Ok(Self::new(address, amount))
    }
}

impl From<Airdrop> for (Address, U256) {
    fn from(airdrop: Airdrop) -> Self {
        (airdrop.address, airdrop.amount)
    }
}

/// Call parameters of a batch transaction, as intended locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxParams {
    #[serde(with = "alloy_serde::quantity")]
    pub nonce: u64,
    #[serde(with = "alloy_serde::quantity")]
    pub gas_price: u128,
    #[serde(with = "alloy_serde::quantity")]
    pub gas: u64,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub from: Address,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "alloy_serde::quantity::opt"
    )]
    pub chain_id: Option<u64>,
}

impl TxParams {
    /// The legacy transaction request handed to a signer.
    pub fn to_request(&self) -> TransactionRequest {
        let request = TransactionRequest::default()
            .with_from(self.from)
            .with_to(self.to)
            .with_nonce(self.nonce)
            .with_gas_price(self.gas_price)
            .with_gas_limit(self.gas)
            .with_value(self.value)
            .with_input(self.data.clone());

        match self.chain_id {
            Some(chain_id) => request.with_chain_id(chain_id),
            None => request,
        }
    }
}

/// One batch of airdrops together with the transaction paying it out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedBatch {
    pub raw_batch: Vec<Airdrop>,
    pub tx: TxParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_estimate: Option<u64>,
}

impl UnsignedBatch {
    pub fn nonce(&self) -> u64 {
        self.tx.nonce
    }

    /// Drops the bookkeeping gas estimate.
    pub fn without_estimate(mut self) -> Self {
        self.gas_estimate = None;
        self
    }
}

/// An [`UnsignedBatch`] echo extended with the payload produced by the signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SignedRecord", into = "SignedRecord")]
pub struct SignedBatch {
    pub batch: UnsignedBatch,
    pub signed_raw: Bytes,
}

/// On-disk layout of a [`SignedBatch`], the echo's fields inlined next to the payload.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedRecord {
    raw_batch: Vec<Airdrop>,
    tx: TxParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gas_estimate: Option<u64>,
    signed_raw: Bytes,
}

impl From<SignedRecord> for SignedBatch {
    fn from(record: SignedRecord) -> Self {
        Self {
            batch: UnsignedBatch {
                raw_batch: record.raw_batch,
                tx: record.tx,
                gas_estimate: record.gas_estimate,
            },
            signed_raw: record.signed_raw,
        }
    }
}

impl From<SignedBatch> for SignedRecord {
    fn from(signed: SignedBatch) -> Self {
        Self {
            raw_batch: signed.batch.raw_batch,
            tx: signed.batch.tx,
            gas_estimate: signed.batch.gas_estimate,
            signed_raw: signed.signed_raw,
        }
    }
}

impl SignedBatch {
    pub fn decode(&self) -> Result<DecodedTransaction, AirdropError> {
        DecodedTransaction::decode(&self.signed_raw)
    }
}

/// The fields of a signed payload, as they will be seen by the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransaction {
    pub hash: B256,
    pub signer: Address,
    pub nonce: u64,
    pub gas_price: Option<u128>,
    pub gas: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub chain_id: Option<u64>,
}

impl DecodedTransaction {
    /// The batch this payload pays out, rebuilt from its `multisend` calldata.
    pub fn to_batch(&self) -> Result<UnsignedBatch, AirdropError> {
        let call = IAirdropper::multisendCall::abi_decode(&self.data)?;
        let raw_batch = call
            .dests
            .into_iter()
            .zip(call.values)
            .map(|(address, amount)| Airdrop::new(address, amount))
            .collect();

        Ok(UnsignedBatch {
            raw_batch,
            tx: TxParams {
                nonce: self.nonce,
                gas_price: self.gas_price.unwrap_or_default(),
                gas: self.gas,
                to: self.to.unwrap_or_default(),
                value: self.value,
                data: self.data.clone(),
                from: self.signer,
                chain_id: self.chain_id,
            },
            gas_estimate: None,
        })
    }

    /// Decodes an EIP-2718 encoded signed transaction.
    pub fn decode(raw: &[u8]) -> Result<Self, AirdropError> {
        let mut buf = raw;
        let envelope = TxEnvelope::decode_2718(&mut buf)?;
        let signer = envelope
            .recover_signer()
            .map_err(|_| AirdropError::UnrecoverableSigner)?;

        Ok(Self {
            hash: *envelope.tx_hash(),
            signer,
            nonce: envelope.nonce(),
            gas_price: envelope.gas_price(),
            gas: envelope.gas_limit(),
            to: envelope.to(),
            value: envelope.value(),
            data: envelope.input().clone(),
            chain_id: envelope.chain_id(),
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, bytes};
    use serde_json::json;

    use super::*;

    fn params() -> TxParams {
        TxParams {
            nonce: 7,
            gas_price: 20_000_000_000,
            gas: 3_700_000,
            to: address!("00000000000000000000000000000000000000a1"),
            value: U256::ZERO,
            data: bytes!("deadbeef"),
            from: address!("00000000000000000000000000000000000000f0"),
            chain_id: None,
        }
    }

    #[test]
    fn airdrop_is_an_address_amount_pair() -> eyre::Result<()> {
        let airdrop = Airdrop::new(
            address!("000000000000000000000000000000000000dEaD"),
            U256::from(240306),
        );
        let value = serde_json::to_value(airdrop)?;
        let pair = value.as_array().expect("pair");
        assert_eq!(pair.len(), 2);
        assert_eq!(pair[1], json!("0x3aab2"));
        assert_eq!(serde_json::from_str::<Airdrop>(&value.to_string())?, airdrop);
        Ok(())
    }

    #[test]
    fn amounts_are_read_from_integers_and_decimal_strings() -> eyre::Result<()> {
        let input = r#"[
            ["0x00000000000000000000000000000000000000a1", 7012269912256639039461982],
            ["0x00000000000000000000000000000000000000b2", "7012269912256639039461982"],
            ["0x00000000000000000000000000000000000000c3", "0x3aab2"],
            ["0x00000000000000000000000000000000000000d4", 0]
        ]"#;
        let budget = U256::from_str_radix("7012269912256639039461982", 10)?;

        let airdrops: Vec<Airdrop> = serde_json::from_str(input)?;
        assert_eq!(
            airdrops.iter().map(|airdrop| airdrop.amount).collect::<Vec<_>>(),
            vec![budget, budget, U256::from(240306), U256::ZERO]
        );

        for amount in ["1.5", "-1", "\"ten\""] {
            let invalid = format!(r#"[["0x00000000000000000000000000000000000000a1", {amount}]]"#);
            assert!(serde_json::from_str::<Vec<Airdrop>>(&invalid).is_err());
        }
        Ok(())
    }

    #[test]
    fn unsigned_batch_layout() -> eyre::Result<()> {
        let batch = UnsignedBatch {
            raw_batch: vec![],
            tx: params(),
            gas_estimate: Some(3_300_000),
        };

        let value = serde_json::to_value(&batch)?;
        assert_eq!(value["gasEstimate"], json!(3_300_000));
        assert_eq!(value["rawBatch"], json!([]));
        assert_eq!(value["tx"]["nonce"], json!("0x7"));
        assert_eq!(value["tx"]["gasPrice"], json!("0x4a817c800"));
        assert_eq!(value["tx"]["gas"], json!("0x387520"));
        assert!(value["tx"].get("chainId").is_none());

        let without = serde_json::to_value(batch.without_estimate())?;
        assert!(without.get("gasEstimate").is_none());
        Ok(())
    }

    #[test]
    fn signed_batch_flattens_the_echo() -> eyre::Result<()> {
        let signed = SignedBatch {
            batch: UnsignedBatch {
                raw_batch: vec![],
                tx: params(),
                gas_estimate: None,
            },
            signed_raw: bytes!("f86b"),
        };

        let value = serde_json::to_value(&signed)?;
        assert_eq!(value["signedRaw"], json!("0xf86b"));
        assert_eq!(value["tx"]["nonce"], json!("0x7"));
        assert!(value.get("batch").is_none());
        assert_eq!(serde_json::from_str::<SignedBatch>(&value.to_string())?, signed);
        Ok(())
    }
}
