//! Artifact mutation engine.
//!
//! Every mutation takes a baseline artifact plus a sparse set of field
//! overrides and produces a new artifact with all derived fields
//! recomputed. Fields absent from the override set are copied unchanged.
//! Derived fields are recomputed in dependency order and the content hash
//! always last; re-signing happens exactly when a signed field was
//! overridden and no explicit signature override was supplied.
//!
//! Mutation is deterministic: identical (baseline, overrides) inputs yield
//! byte-identical output, including re-derived signatures.

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fray_common::{
    block::{SignedSlotHeader, SlotHeader},
    crypto::{Hash, KeyPair, PublicKey, Signature},
    payload::ExecutionPayload,
    serializer::ReaderError,
    shard::{compute_commitment, DataShard},
    transaction::{Transaction, TxSignature},
};

#[derive(Debug, Error)]
pub enum MutationError {
    /// The content hash certifies every other field; setting it directly
    /// is a configuration bug, not a mutation.
    #[error("The block hash is derived from all other fields and cannot be overridden")]
    BlockHashOverride,

    #[error("Opaque transaction bytes failed to decode: {0}")]
    Decode(#[from] ReaderError),
}

/// Sparse transaction overrides. `None` means "copy from baseline".
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransactionOverrides {
    pub nonce: Option<u64>,
    pub gas_limit: Option<u64>,
    pub gas_price: Option<u64>,
    pub to: Option<PublicKey>,
    pub value: Option<u64>,
    pub input: Option<Vec<u8>>,
    pub signature: Option<TxSignature>,
}

impl TransactionOverrides {
    /// Whether any signed field is being overridden.
    fn touches_signed_fields(&self) -> bool {
        self.nonce.is_some()
            || self.gas_limit.is_some()
            || self.gas_price.is_some()
            || self.to.is_some()
            || self.value.is_some()
            || self.input.is_some()
    }
}

/// Produce a new transaction from `baseline` with `overrides` applied.
///
/// If any signed field changes and no explicit signature override is
/// present, the transaction is re-signed with `signer`, the original
/// sender's credential, so the output remains valid. An explicit
/// signature override is installed verbatim, never re-derived.
pub fn mutate_transaction(
    baseline: &Transaction,
    overrides: &TransactionOverrides,
    signer: &KeyPair,
) -> Result<Transaction, MutationError> {
    let touches_signed = overrides.touches_signed_fields();

    let mut tx = Transaction::new(
        overrides.nonce.unwrap_or_else(|| baseline.get_nonce()),
        overrides.gas_limit.unwrap_or_else(|| baseline.get_gas_limit()),
        overrides.gas_price.unwrap_or_else(|| baseline.get_gas_price()),
        *baseline.get_source(),
        overrides.to.or_else(|| baseline.get_to().copied()),
        overrides.value.unwrap_or_else(|| baseline.get_value()),
        overrides
            .input
            .clone()
            .unwrap_or_else(|| baseline.get_input().to_vec()),
        overrides.signature.or_else(|| baseline.get_signature().copied()),
    );

    // Explicit branch: re-sign only when a signed field changed and the
    // caller did not pin a signature
    if touches_signed && overrides.signature.is_none() {
        debug!("re-signing mutated transaction with the original sender credential");
        tx.sign_with(signer);
    }

    Ok(tx)
}

/// Sparse execution-payload overrides. `None` means "copy from baseline".
///
/// `block_hash` is present so that a self-contradictory configuration is
/// detectable: any attempt to set it is rejected, since the hash exists to
/// certify the other fields.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PayloadOverrides {
    pub parent_hash: Option<Hash>,
    pub fee_recipient: Option<PublicKey>,
    pub state_root: Option<Hash>,
    pub receipts_root: Option<Hash>,
    pub logs_bloom: Option<Vec<u8>>,
    pub prev_randao: Option<Hash>,
    pub block_number: Option<u64>,
    pub gas_limit: Option<u64>,
    pub gas_used: Option<u64>,
    pub timestamp: Option<u64>,
    pub extra_data: Option<Vec<u8>>,
    pub base_fee_per_gas: Option<u64>,
    pub transactions: Option<Vec<Vec<u8>>>,
    pub block_hash: Option<Hash>,
}

impl PayloadOverrides {
    /// Watermark the payload through its extra data, leaving every other
    /// field to the baseline.
    pub fn watermark(text: &str) -> Self {
        Self {
            extra_data: Some(text.as_bytes().to_vec()),
            ..Self::default()
        }
    }
}

/// Produce a new payload from `baseline` with `overrides` applied.
///
/// A transactions override invalidates the transactions root and the block
/// hash: the opaque byte strings are decoded (`Decode` error on failure),
/// folded into the order-preserving hash tree, and the resulting root
/// written into the new payload before its hash is computed. The block
/// hash itself is recomputed last, after every other override.
pub fn mutate_payload(
    baseline: &ExecutionPayload,
    overrides: &PayloadOverrides,
) -> Result<ExecutionPayload, MutationError> {
    if overrides.block_hash.is_some() {
        return Err(MutationError::BlockHashOverride);
    }

    let logs_bloom = match &overrides.logs_bloom {
        Some(bytes) => bytes
            .as_slice()
            .try_into()
            .map_err(|_| MutationError::Decode(ReaderError::InvalidSize))?,
        None => *baseline.get_logs_bloom(),
    };

    // ExecutionPayload::new recomputes the transactions root and seals the
    // hash as its final step
    let payload = ExecutionPayload::new(
        overrides
            .parent_hash
            .clone()
            .unwrap_or_else(|| baseline.get_parent_hash().clone()),
        overrides
            .fee_recipient
            .unwrap_or_else(|| *baseline.get_fee_recipient()),
        overrides
            .state_root
            .clone()
            .unwrap_or_else(|| baseline.get_state_root().clone()),
        overrides
            .receipts_root
            .clone()
            .unwrap_or_else(|| baseline.get_receipts_root().clone()),
        logs_bloom,
        overrides
            .prev_randao
            .clone()
            .unwrap_or_else(|| baseline.get_prev_randao().clone()),
        overrides
            .block_number
            .unwrap_or_else(|| baseline.get_block_number()),
        overrides.gas_limit.unwrap_or_else(|| baseline.get_gas_limit()),
        overrides.gas_used.unwrap_or_else(|| baseline.get_gas_used()),
        overrides.timestamp.unwrap_or_else(|| baseline.get_timestamp()),
        overrides
            .extra_data
            .clone()
            .unwrap_or_else(|| baseline.get_extra_data().to_vec()),
        overrides
            .base_fee_per_gas
            .unwrap_or_else(|| baseline.get_base_fee_per_gas()),
        overrides
            .transactions
            .clone()
            .unwrap_or_else(|| baseline.get_transactions().to_vec()),
    )?;

    debug!(
        "mutated payload {} -> {}",
        baseline.get_block_hash(),
        payload.get_block_hash()
    );
    Ok(payload)
}

/// Sparse slot-header overrides. `None` means "copy from baseline".
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HeaderOverrides {
    pub slot: Option<u64>,
    pub proposer_index: Option<u64>,
    pub parent_hash: Option<Hash>,
    pub state_root: Option<Hash>,
    pub payload_hash: Option<Hash>,
    pub shard_commitments_root: Option<Hash>,
    pub graffiti: Option<[u8; 32]>,
    pub signature: Option<Signature>,
}

impl HeaderOverrides {
    /// Override only the distinguishing tag, the minimal equivocation.
    pub fn graffiti(tag: [u8; 32]) -> Self {
        Self {
            graffiti: Some(tag),
            ..Self::default()
        }
    }

    fn touches_signed_fields(&self) -> bool {
        self.slot.is_some()
            || self.proposer_index.is_some()
            || self.parent_hash.is_some()
            || self.state_root.is_some()
            || self.payload_hash.is_some()
            || self.shard_commitments_root.is_some()
            || self.graffiti.is_some()
    }
}

/// Produce a new signed header from `baseline` with `overrides` applied.
///
/// Re-signs with the proposer credential when a signed field changed and
/// no explicit signature was supplied.
pub fn mutate_header(
    baseline: &SignedSlotHeader,
    overrides: &HeaderOverrides,
    proposer: &KeyPair,
) -> Result<SignedSlotHeader, MutationError> {
    let base = baseline.get_header();
    let header = SlotHeader::new(
        overrides.slot.unwrap_or_else(|| base.get_slot()),
        overrides
            .proposer_index
            .unwrap_or_else(|| base.get_proposer_index()),
        overrides
            .parent_hash
            .clone()
            .unwrap_or_else(|| base.get_parent_hash().clone()),
        overrides
            .state_root
            .clone()
            .unwrap_or_else(|| base.state_root.clone()),
        overrides
            .payload_hash
            .clone()
            .unwrap_or_else(|| base.get_payload_hash().clone()),
        overrides
            .shard_commitments_root
            .clone()
            .unwrap_or_else(|| base.get_shard_commitments_root().clone()),
        overrides.graffiti.unwrap_or_else(|| *base.get_graffiti()),
    );

    let signed = if overrides.touches_signed_fields() && overrides.signature.is_none() {
        debug!("re-signing mutated header with the proposer credential");
        header.sign(proposer)
    } else {
        SignedSlotHeader {
            header,
            signature: overrides
                .signature
                .unwrap_or_else(|| *baseline.get_signature()),
        }
    };

    Ok(signed)
}

/// Sparse data-shard overrides. `None` means "copy from baseline".
#[derive(Clone, Debug, Default)]
pub struct ShardOverrides {
    pub index: Option<u8>,
    pub blob: Option<Vec<u8>>,
    pub commitment: Option<Hash>,
    pub signature: Option<Signature>,
    pub inclusion_branch: Option<Vec<Hash>>,
}

/// Produce a new shard from `baseline` with `overrides` applied.
///
/// Derived fields are recomputed unless explicitly pinned: a blob override
/// without a commitment override recomputes the commitment, and a change
/// to any signed field without a signature override re-signs with the
/// proposer credential. The inclusion branch cannot be derived from a
/// single shard, so it is copied unless overridden; corruption scenarios
/// rely on exactly that to break one axis at a time.
pub fn mutate_shard(
    baseline: &DataShard,
    overrides: &ShardOverrides,
    proposer: &KeyPair,
) -> Result<DataShard, MutationError> {
    let index = overrides.index.unwrap_or_else(|| baseline.get_index());
    let blob = overrides
        .blob
        .clone()
        .unwrap_or_else(|| baseline.get_blob().to_vec());

    let commitment = match &overrides.commitment {
        Some(commitment) => commitment.clone(),
        None => {
            if overrides.blob.is_some() {
                compute_commitment(&blob)
            } else {
                baseline.get_commitment().clone()
            }
        }
    };

    let header = baseline.get_header().clone();
    let touches_signed = overrides.index.is_some()
        || overrides.blob.is_some()
        || overrides.commitment.is_some();

    let signature = match overrides.signature {
        Some(signature) => signature,
        None if touches_signed => {
            debug!("re-signing mutated shard with the proposer credential");
            proposer.sign(&DataShard::signing_bytes(
                index,
                &commitment,
                &header.header_root(),
            ))
        }
        None => *baseline.get_signature(),
    };

    Ok(DataShard::new(
        index,
        blob,
        commitment,
        header,
        signature,
        overrides
            .inclusion_branch
            .clone()
            .unwrap_or_else(|| baseline.get_inclusion_branch().to_vec()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fray_common::{config::LOGS_BLOOM_SIZE, serializer::Serializer};

    fn sender() -> KeyPair {
        KeyPair::from_secret_bytes(&[31u8; 32])
    }

    fn baseline_tx() -> Transaction {
        let keypair = sender();
        let mut tx = Transaction::new(
            4,
            21_000,
            100,
            keypair.public_key(),
            None,
            9_000,
            vec![0x01, 0x02],
            None,
        );
        tx.sign_with(&keypair);
        tx
    }

    fn baseline_payload() -> ExecutionPayload {
        ExecutionPayload::new(
            Hash::new([1u8; 32]),
            sender().public_key(),
            Hash::new([2u8; 32]),
            Hash::new([3u8; 32]),
            [0u8; LOGS_BLOOM_SIZE],
            Hash::new([4u8; 32]),
            42,
            30_000_000,
            21_000,
            1_700_000_000,
            b"base".to_vec(),
            7,
            vec![baseline_tx().to_bytes()],
        )
        .unwrap()
    }

    #[test]
    fn test_untouched_fields_copied() {
        let baseline = baseline_tx();
        let mutated = mutate_transaction(
            &baseline,
            &TransactionOverrides {
                value: Some(1),
                ..Default::default()
            },
            &sender(),
        )
        .unwrap();

        assert_eq!(mutated.get_value(), 1);
        assert_eq!(mutated.get_nonce(), baseline.get_nonce());
        assert_eq!(mutated.get_gas_limit(), baseline.get_gas_limit());
        assert_eq!(mutated.get_input(), baseline.get_input());
    }

    #[test]
    fn test_resign_branch_taken_when_signed_field_touched() {
        let baseline = baseline_tx();
        let mutated = mutate_transaction(
            &baseline,
            &TransactionOverrides {
                nonce: Some(5),
                ..Default::default()
            },
            &sender(),
        )
        .unwrap();

        assert_ne!(mutated.get_signature(), baseline.get_signature());
        assert!(mutated.verify_signature());
    }

    #[test]
    fn test_explicit_signature_installed_verbatim() {
        let baseline = baseline_tx();
        let pinned = TxSignature::new(3, [0xaa; 32], [0xbb; 32]);
        let mutated = mutate_transaction(
            &baseline,
            &TransactionOverrides {
                nonce: Some(5),
                signature: Some(pinned),
                ..Default::default()
            },
            &sender(),
        )
        .unwrap();

        assert_eq!(mutated.get_signature(), Some(&pinned));
        assert!(!mutated.verify_signature());
    }

    #[test]
    fn test_no_override_means_no_resigning() {
        let baseline = baseline_tx();
        let mutated =
            mutate_transaction(&baseline, &TransactionOverrides::default(), &sender()).unwrap();

        assert_eq!(mutated.to_bytes(), baseline.to_bytes());
    }

    #[test]
    fn test_mutation_is_deterministic() {
        let baseline = baseline_tx();
        let overrides = TransactionOverrides {
            value: Some(77),
            input: Some(vec![0xfe]),
            ..Default::default()
        };

        let a = mutate_transaction(&baseline, &overrides, &sender()).unwrap();
        let b = mutate_transaction(&baseline, &overrides, &sender()).unwrap();
        assert_eq!(a.to_bytes(), b.to_bytes());
    }

    #[test]
    fn test_block_hash_override_rejected() {
        let baseline = baseline_payload();
        let result = mutate_payload(
            &baseline,
            &PayloadOverrides {
                block_hash: Some(Hash::max()),
                ..Default::default()
            },
        );

        assert!(matches!(result, Err(MutationError::BlockHashOverride)));
    }

    #[test]
    fn test_payload_hash_recomputed_last() {
        let baseline = baseline_payload();
        let mutated = mutate_payload(
            &baseline,
            &PayloadOverrides {
                gas_used: Some(99_000),
                ..Default::default()
            },
        )
        .unwrap();

        assert_ne!(mutated.get_block_hash(), baseline.get_block_hash());
        assert_eq!(*mutated.get_block_hash(), mutated.compute_block_hash());
    }

    #[test]
    fn test_transactions_override_recomputes_roots_only() {
        let baseline = baseline_payload();

        let keypair = sender();
        let mut other_tx = Transaction::new(
            5,
            21_000,
            100,
            keypair.public_key(),
            None,
            1,
            vec![],
            None,
        );
        other_tx.sign_with(&keypair);

        let mutated = mutate_payload(
            &baseline,
            &PayloadOverrides {
                transactions: Some(vec![other_tx.to_bytes()]),
                ..Default::default()
            },
        )
        .unwrap();

        assert_ne!(mutated.get_transactions_root(), baseline.get_transactions_root());
        assert_ne!(mutated.get_block_hash(), baseline.get_block_hash());

        // Every unrelated field is unchanged
        assert_eq!(mutated.get_parent_hash(), baseline.get_parent_hash());
        assert_eq!(mutated.get_state_root(), baseline.get_state_root());
        assert_eq!(mutated.get_gas_used(), baseline.get_gas_used());
        assert_eq!(mutated.get_timestamp(), baseline.get_timestamp());
        assert_eq!(mutated.get_extra_data(), baseline.get_extra_data());
    }

    #[test]
    fn test_undecodable_transactions_rejected() {
        let baseline = baseline_payload();
        let result = mutate_payload(
            &baseline,
            &PayloadOverrides {
                transactions: Some(vec![vec![0xba, 0xad]]),
                ..Default::default()
            },
        );

        assert!(matches!(result, Err(MutationError::Decode(_))));
    }

    #[test]
    fn test_header_graffiti_mutation_resigns() {
        let proposer = KeyPair::from_secret_bytes(&[32u8; 32]);
        let baseline = SlotHeader::new(
            8,
            1,
            Hash::zero(),
            Hash::zero(),
            Hash::new([5u8; 32]),
            Hash::zero(),
            [0u8; 32],
        )
        .sign(&proposer);

        let mutated =
            mutate_header(&baseline, &HeaderOverrides::graffiti([0x42; 32]), &proposer).unwrap();

        assert!(mutated.verify_signature(&proposer.public_key()));
        assert!(mutated.is_equivocation_of(&baseline));
    }

    #[test]
    fn test_shard_blob_override_recommits_and_resigns() {
        use fray_common::{config::GRAFFITI_SIZE, shard::build_shard_set};

        let proposer = KeyPair::from_secret_bytes(&[33u8; 32]);
        let header = SlotHeader::new(
            3,
            0,
            Hash::zero(),
            Hash::zero(),
            Hash::zero(),
            Hash::zero(),
            [0u8; GRAFFITI_SIZE],
        );
        let (_, shards) =
            build_shard_set(header, vec![b"one".to_vec(), b"two".to_vec()], &proposer).unwrap();

        let mutated = mutate_shard(
            &shards[0],
            &ShardOverrides {
                blob: Some(b"different".to_vec()),
                ..Default::default()
            },
            &proposer,
        )
        .unwrap();

        // Commitment and signature re-derived, inclusion branch untouched:
        // the proof is now the only broken axis
        assert_eq!(
            *mutated.get_commitment(),
            compute_commitment(b"different")
        );
        assert!(matches!(
            mutated.verify(&proposer.public_key()),
            Err(fray_common::shard::ShardError::InvalidInclusionProof)
        ));
    }
}
