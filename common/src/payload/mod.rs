use std::fmt::{Display, Error as FmtError, Formatter};

use log::trace;
use serde::{Deserialize, Serialize};

use crate::{
    block::calculate_root,
    config::{LOGS_BLOOM_SIZE, MAX_EXTRA_DATA_SIZE, MAX_TRANSACTIONS_PER_PAYLOAD,
        MAX_TRANSACTION_SIZE},
    crypto::{hash, Hash, Hashable, PublicKey},
    serializer::{Reader, ReaderError, Serializer, Writer},
    transaction::Transaction,
};

// Serialize the logs bloom in a hexadecimal string
fn serialize_bloom<S: serde::Serializer>(
    bloom: &[u8; LOGS_BLOOM_SIZE],
    s: S,
) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(bloom))
}

// Deserialize the logs bloom from a hexadecimal string
fn deserialize_bloom<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<[u8; LOGS_BLOOM_SIZE], D::Error> {
    let mut bloom = [0u8; LOGS_BLOOM_SIZE];
    let hex = String::deserialize(deserializer)?;
    let decoded = hex::decode(hex).map_err(serde::de::Error::custom)?;

    if decoded.len() != LOGS_BLOOM_SIZE {
        return Err(serde::de::Error::custom(format!(
            "Invalid logs bloom length: expected {} bytes, got {}",
            LOGS_BLOOM_SIZE,
            decoded.len()
        )));
    }

    bloom.copy_from_slice(&decoded);
    Ok(bloom)
}

fn serialize_transactions<S: serde::Serializer>(
    transactions: &[Vec<u8>],
    s: S,
) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeSeq;
    let mut seq = s.serialize_seq(Some(transactions.len()))?;
    for tx in transactions {
        seq.serialize_element(&hex::encode(tx))?;
    }
    seq.end()
}

fn deserialize_transactions<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<Vec<u8>>, D::Error> {
    let strings = Vec::<String>::deserialize(deserializer)?;
    strings
        .into_iter()
        .map(|s| hex::decode(s).map_err(serde::de::Error::custom))
        .collect()
}

/// Execution payload.
///
/// The block hash certifies every other field: it is computed once, as the
/// final step of construction, and there is no way to set it directly. The
/// transaction sequence enters the hash through `transactions_root`, the
/// order-preserving hash tree over the decoded transaction hashes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ExecutionPayload {
    parent_hash: Hash,
    fee_recipient: PublicKey,
    state_root: Hash,
    receipts_root: Hash,
    #[serde(serialize_with = "serialize_bloom")]
    #[serde(deserialize_with = "deserialize_bloom")]
    logs_bloom: [u8; LOGS_BLOOM_SIZE],
    prev_randao: Hash,
    block_number: u64,
    gas_limit: u64,
    gas_used: u64,
    timestamp: u64,
    #[serde(with = "hex")]
    extra_data: Vec<u8>,
    base_fee_per_gas: u64,
    transactions_root: Hash,
    block_hash: Hash,
    #[serde(serialize_with = "serialize_transactions")]
    #[serde(deserialize_with = "deserialize_transactions")]
    transactions: Vec<Vec<u8>>,
}

impl ExecutionPayload {
    /// Assemble and seal a payload.
    ///
    /// Decodes every opaque transaction byte string to build the
    /// transactions root, then computes the block hash last. Fails if any
    /// transaction fails to decode or a bound is exceeded.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        parent_hash: Hash,
        fee_recipient: PublicKey,
        state_root: Hash,
        receipts_root: Hash,
        logs_bloom: [u8; LOGS_BLOOM_SIZE],
        prev_randao: Hash,
        block_number: u64,
        gas_limit: u64,
        gas_used: u64,
        timestamp: u64,
        extra_data: Vec<u8>,
        base_fee_per_gas: u64,
        transactions: Vec<Vec<u8>>,
    ) -> Result<Self, ReaderError> {
        if extra_data.len() > MAX_EXTRA_DATA_SIZE {
            return Err(ReaderError::InvalidSize);
        }
        if transactions.len() > MAX_TRANSACTIONS_PER_PAYLOAD {
            return Err(ReaderError::InvalidSize);
        }

        let transactions_root = compute_transactions_root(&transactions)?;

        let mut payload = Self {
            parent_hash,
            fee_recipient,
            state_root,
            receipts_root,
            logs_bloom,
            prev_randao,
            block_number,
            gas_limit,
            gas_used,
            timestamp,
            extra_data,
            base_fee_per_gas,
            transactions_root,
            block_hash: Hash::zero(),
            transactions,
        };

        // Seal: the hash is a function of everything above, computed last
        payload.block_hash = payload.compute_block_hash();
        trace!(
            "sealed payload number {} with hash {}",
            payload.block_number,
            payload.block_hash
        );
        Ok(payload)
    }

    pub fn get_parent_hash(&self) -> &Hash {
        &self.parent_hash
    }

    pub fn get_fee_recipient(&self) -> &PublicKey {
        &self.fee_recipient
    }

    pub fn get_state_root(&self) -> &Hash {
        &self.state_root
    }

    pub fn get_receipts_root(&self) -> &Hash {
        &self.receipts_root
    }

    pub fn get_logs_bloom(&self) -> &[u8; LOGS_BLOOM_SIZE] {
        &self.logs_bloom
    }

    pub fn get_prev_randao(&self) -> &Hash {
        &self.prev_randao
    }

    pub fn get_block_number(&self) -> u64 {
        self.block_number
    }

    pub fn get_gas_limit(&self) -> u64 {
        self.gas_limit
    }

    pub fn get_gas_used(&self) -> u64 {
        self.gas_used
    }

    pub fn get_timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn get_extra_data(&self) -> &[u8] {
        &self.extra_data
    }

    pub fn get_base_fee_per_gas(&self) -> u64 {
        self.base_fee_per_gas
    }

    pub fn get_transactions_root(&self) -> &Hash {
        &self.transactions_root
    }

    pub fn get_block_hash(&self) -> &Hash {
        &self.block_hash
    }

    pub fn get_transactions(&self) -> &[Vec<u8>] {
        &self.transactions
    }

    pub fn get_transactions_count(&self) -> usize {
        self.transactions.len()
    }

    /// Compute the block hash from the current field values.
    ///
    /// Pure function of every field except the hash itself; the
    /// transaction sequence is covered through `transactions_root`.
    pub fn compute_block_hash(&self) -> Hash {
        let mut buffer = Vec::new();
        let mut writer = Writer::new(&mut buffer);
        self.write_hashable_fields(&mut writer);
        hash(&buffer)
    }

    fn write_hashable_fields(&self, writer: &mut Writer) {
        writer.write_hash(&self.parent_hash);
        self.fee_recipient.write(writer);
        writer.write_hash(&self.state_root);
        writer.write_hash(&self.receipts_root);
        writer.write_bytes(&self.logs_bloom);
        writer.write_hash(&self.prev_randao);
        writer.write_u64(&self.block_number);
        writer.write_u64(&self.gas_limit);
        writer.write_u64(&self.gas_used);
        writer.write_u64(&self.timestamp);
        writer.write_var_bytes(&self.extra_data);
        writer.write_u64(&self.base_fee_per_gas);
        writer.write_hash(&self.transactions_root);
    }
}

/// Compute the order-preserving hash-tree root of opaque transaction bytes.
///
/// Each byte string must decode as a [`Transaction`]; the leaves are the
/// decoded transaction hashes in sequence order.
pub fn compute_transactions_root(transactions: &[Vec<u8>]) -> Result<Hash, ReaderError> {
    let mut leaves = Vec::with_capacity(transactions.len());
    for bytes in transactions {
        let tx = Transaction::from_bytes(bytes)?;
        leaves.push(tx.hash());
    }
    Ok(calculate_root(&leaves))
}

impl Serializer for ExecutionPayload {
    fn write(&self, writer: &mut Writer) {
        self.write_hashable_fields(writer);
        writer.write_hash(&self.block_hash);

        writer.write_u32(&(self.transactions.len() as u32));
        for tx in &self.transactions {
            writer.write_var_bytes(tx);
        }
    }

    fn read(reader: &mut Reader) -> Result<ExecutionPayload, ReaderError> {
        let parent_hash = reader.read_hash()?;
        let fee_recipient = PublicKey::read(reader)?;
        let state_root = reader.read_hash()?;
        let receipts_root = reader.read_hash()?;
        let logs_bloom: [u8; LOGS_BLOOM_SIZE] = reader
            .read_bytes(LOGS_BLOOM_SIZE)?
            .try_into()
            .map_err(|_| ReaderError::InvalidSize)?;
        let prev_randao = reader.read_hash()?;
        let block_number = reader.read_u64()?;
        let gas_limit = reader.read_u64()?;
        let gas_used = reader.read_u64()?;
        let timestamp = reader.read_u64()?;
        let extra_data = reader.read_var_bytes(MAX_EXTRA_DATA_SIZE)?;
        let base_fee_per_gas = reader.read_u64()?;
        let transactions_root = reader.read_hash()?;
        let block_hash = reader.read_hash()?;

        let count = reader.read_u32()? as usize;
        if count > MAX_TRANSACTIONS_PER_PAYLOAD {
            return Err(ReaderError::InvalidSize);
        }
        let mut transactions = Vec::with_capacity(count);
        for _ in 0..count {
            transactions.push(reader.read_var_bytes(MAX_TRANSACTION_SIZE)?);
        }

        Ok(ExecutionPayload {
            parent_hash,
            fee_recipient,
            state_root,
            receipts_root,
            logs_bloom,
            prev_randao,
            block_number,
            gas_limit,
            gas_used,
            timestamp,
            extra_data,
            base_fee_per_gas,
            transactions_root,
            block_hash,
            transactions,
        })
    }

    fn size(&self) -> usize {
        self.parent_hash.size()
            + self.fee_recipient.size()
            + self.state_root.size()
            + self.receipts_root.size()
            + LOGS_BLOOM_SIZE
            + self.prev_randao.size()
            + 8 // block_number
            + 8 // gas_limit
            + 8 // gas_used
            + 8 // timestamp
            + 4 + self.extra_data.len()
            + 8 // base_fee_per_gas
            + self.transactions_root.size()
            + self.block_hash.size()
            + 4 // transactions count
            + self.transactions.iter().map(|tx| 4 + tx.len()).sum::<usize>()
    }
}

impl Hashable for ExecutionPayload {
    fn hash(&self) -> Hash {
        self.block_hash.clone()
    }
}

impl Display for ExecutionPayload {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(
            f,
            "ExecutionPayload[number: {}, hash: {}, parent: {}, txs: {}]",
            self.block_number,
            self.block_hash,
            self.parent_hash,
            self.transactions.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn signed_tx_bytes(nonce: u64) -> Vec<u8> {
        let keypair = KeyPair::from_secret_bytes(&[11u8; 32]);
        let mut tx = Transaction::new(
            nonce,
            21_000,
            50,
            keypair.public_key(),
            None,
            500,
            vec![],
            None,
        );
        tx.sign_with(&keypair);
        tx.to_bytes()
    }

    fn sample_payload(transactions: Vec<Vec<u8>>) -> ExecutionPayload {
        let fee_recipient = KeyPair::from_secret_bytes(&[12u8; 32]).public_key();
        ExecutionPayload::new(
            Hash::new([1u8; 32]),
            fee_recipient,
            Hash::new([2u8; 32]),
            Hash::new([3u8; 32]),
            [0u8; LOGS_BLOOM_SIZE],
            Hash::new([4u8; 32]),
            10,
            30_000_000,
            21_000,
            1_700_000_000,
            b"fray".to_vec(),
            7,
            transactions,
        )
        .unwrap()
    }

    #[test]
    fn test_seal_is_consistent() {
        let payload = sample_payload(vec![signed_tx_bytes(0), signed_tx_bytes(1)]);
        assert_eq!(*payload.get_block_hash(), payload.compute_block_hash());
    }

    #[test]
    fn test_transactions_enter_the_hash() {
        let a = sample_payload(vec![signed_tx_bytes(0)]);
        let b = sample_payload(vec![signed_tx_bytes(1)]);

        assert_ne!(a.get_transactions_root(), b.get_transactions_root());
        assert_ne!(a.get_block_hash(), b.get_block_hash());
    }

    #[test]
    fn test_transaction_order_matters() {
        let a = sample_payload(vec![signed_tx_bytes(0), signed_tx_bytes(1)]);
        let b = sample_payload(vec![signed_tx_bytes(1), signed_tx_bytes(0)]);
        assert_ne!(a.get_block_hash(), b.get_block_hash());
    }

    #[test]
    fn test_undecodable_transaction_rejected() {
        let fee_recipient = KeyPair::from_secret_bytes(&[12u8; 32]).public_key();
        let result = ExecutionPayload::new(
            Hash::zero(),
            fee_recipient,
            Hash::zero(),
            Hash::zero(),
            [0u8; LOGS_BLOOM_SIZE],
            Hash::zero(),
            0,
            0,
            0,
            0,
            vec![],
            0,
            vec![vec![0xde, 0xad]],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_serialization_round_trip() {
        let payload = sample_payload(vec![signed_tx_bytes(0)]);
        let bytes = payload.to_bytes();
        assert_eq!(bytes.len(), payload.size());

        let decoded = ExecutionPayload::from_bytes(&bytes).unwrap();
        assert_eq!(payload, decoded);
    }

    #[test]
    fn test_json_round_trip() {
        let payload = sample_payload(vec![signed_tx_bytes(0)]);
        let json = serde_json::to_string(&payload).unwrap();
        let decoded: ExecutionPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(payload, decoded);
    }

    #[test]
    fn test_oversized_extra_data_rejected() {
        let fee_recipient = KeyPair::from_secret_bytes(&[12u8; 32]).public_key();
        let result = ExecutionPayload::new(
            Hash::zero(),
            fee_recipient,
            Hash::zero(),
            Hash::zero(),
            [0u8; LOGS_BLOOM_SIZE],
            Hash::zero(),
            0,
            0,
            0,
            0,
            vec![0u8; MAX_EXTRA_DATA_SIZE + 1],
            0,
            vec![],
        );
        assert!(result.is_err());
    }
}
