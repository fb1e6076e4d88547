//! Data shards: auxiliary blobs referenced by a block and required for its
//! full availability.
//!
//! A receiver accepts a shard only if all four axes hold: index in range,
//! commitment matches a recomputed digest of the content, proposer
//! signature verifies against the referenced header, and the inclusion
//! branch links the commitment to the header's shard commitments root.

use std::fmt::{Display, Error as FmtError, Formatter};

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use thiserror::Error;

use crate::{
    block::{calculate_branch, calculate_root, verify_branch, SignedSlotHeader, SlotHeader},
    config::{MAX_SHARDS_PER_BLOCK, MAX_SHARD_BLOB_SIZE},
    crypto::{Hash, KeyPair, PublicKey, Signature},
    serializer::{Reader, ReaderError, Serializer, Writer},
};

#[derive(Debug, Error)]
pub enum ShardError {
    #[error("Shard index {0} out of range (max {max})", max = MAX_SHARDS_PER_BLOCK - 1)]
    IndexOutOfRange(u8),

    #[error("Commitment does not match blob digest")]
    CommitmentMismatch,

    #[error("Proposer signature does not verify")]
    InvalidSignature,

    #[error("Inclusion branch does not link to the header commitments root")]
    InvalidInclusionProof,

    #[error("Blob exceeds maximum size: {0} bytes")]
    BlobTooLarge(usize),
}

/// Compute the commitment digest of a blob (SHA3-256).
pub fn compute_commitment(blob: &[u8]) -> Hash {
    let mut hasher = Sha3_256::new();
    hasher.update(blob);
    Hash::new(hasher.finalize().into())
}

/// A data shard bound to a specific signed header.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DataShard {
    /// Position of this shard within the block, unique in
    /// `[0, MAX_SHARDS_PER_BLOCK)`
    index: u8,
    /// Opaque shard content
    #[serde(with = "hex")]
    blob: Vec<u8>,
    /// Digest committing to the blob
    commitment: Hash,
    /// The signed header this shard belongs to
    header: SignedSlotHeader,
    /// Proposer signature over (index, commitment, header root)
    signature: Signature,
    /// Hash-tree path from the commitment leaf to the header's
    /// shard commitments root
    inclusion_branch: Vec<Hash>,
}

impl DataShard {
    pub fn new(
        index: u8,
        blob: Vec<u8>,
        commitment: Hash,
        header: SignedSlotHeader,
        signature: Signature,
        inclusion_branch: Vec<Hash>,
    ) -> Self {
        Self {
            index,
            blob,
            commitment,
            header,
            signature,
            inclusion_branch,
        }
    }

    pub fn get_index(&self) -> u8 {
        self.index
    }

    pub fn get_blob(&self) -> &[u8] {
        &self.blob
    }

    pub fn get_commitment(&self) -> &Hash {
        &self.commitment
    }

    pub fn get_header(&self) -> &SignedSlotHeader {
        &self.header
    }

    pub fn get_signature(&self) -> &Signature {
        &self.signature
    }

    pub fn get_inclusion_branch(&self) -> &[Hash] {
        &self.inclusion_branch
    }

    /// Bytes covered by the shard signature.
    pub fn signing_bytes(index: u8, commitment: &Hash, header_root: &Hash) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(1 + 32 + 32);
        buffer.push(index);
        buffer.extend_from_slice(commitment.as_bytes());
        buffer.extend_from_slice(header_root.as_bytes());
        buffer
    }

    /// Full acceptance check, all four axes.
    ///
    /// The error names the first axis that failed, so corruption scenarios
    /// can assert exactly which validation rule they exercised.
    pub fn verify(&self, proposer: &PublicKey) -> Result<(), ShardError> {
        if self.index >= MAX_SHARDS_PER_BLOCK {
            return Err(ShardError::IndexOutOfRange(self.index));
        }

        if compute_commitment(&self.blob) != self.commitment {
            return Err(ShardError::CommitmentMismatch);
        }

        let message =
            Self::signing_bytes(self.index, &self.commitment, &self.header.header_root());
        if proposer.verify(&message, &self.signature).is_err() {
            return Err(ShardError::InvalidSignature);
        }

        if !verify_branch(
            &self.commitment,
            self.index as usize,
            &self.inclusion_branch,
            self.header.get_header().get_shard_commitments_root(),
        ) {
            return Err(ShardError::InvalidInclusionProof);
        }

        Ok(())
    }
}

impl Serializer for DataShard {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(self.index);
        writer.write_var_bytes(&self.blob);
        writer.write_hash(&self.commitment);
        self.header.write(writer);
        self.signature.write(writer);

        writer.write_u8(self.inclusion_branch.len() as u8);
        for node in &self.inclusion_branch {
            writer.write_hash(node);
        }
    }

    fn read(reader: &mut Reader) -> Result<DataShard, ReaderError> {
        let index = reader.read_u8()?;
        let blob = reader.read_var_bytes(MAX_SHARD_BLOB_SIZE)?;
        let commitment = reader.read_hash()?;
        let header = SignedSlotHeader::read(reader)?;
        let signature = Signature::read(reader)?;

        let branch_len = reader.read_u8()?;
        let mut inclusion_branch = Vec::with_capacity(branch_len as usize);
        for _ in 0..branch_len {
            inclusion_branch.push(reader.read_hash()?);
        }

        Ok(DataShard {
            index,
            blob,
            commitment,
            header,
            signature,
            inclusion_branch,
        })
    }

    fn size(&self) -> usize {
        1 + 4
            + self.blob.len()
            + self.commitment.size()
            + self.header.size()
            + self.signature.size()
            + 1
            + self.inclusion_branch.len() * self.commitment.size()
    }
}

impl Display for DataShard {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(
            f,
            "DataShard[index: {}, commitment: {}, slot: {}]",
            self.index,
            self.commitment,
            self.header.get_header().get_slot()
        )
    }
}

/// Build the complete shard set for a slot.
///
/// Fills the header's shard commitments root from the blob commitments,
/// signs the header, then derives one bound shard per blob with its
/// signature and inclusion branch. Returns the signed header alongside the
/// shards.
pub fn build_shard_set(
    mut header: SlotHeader,
    blobs: Vec<Vec<u8>>,
    proposer: &KeyPair,
) -> Result<(SignedSlotHeader, Vec<DataShard>), ShardError> {
    if blobs.len() > MAX_SHARDS_PER_BLOCK as usize {
        return Err(ShardError::IndexOutOfRange(blobs.len() as u8 - 1));
    }
    for blob in &blobs {
        if blob.len() > MAX_SHARD_BLOB_SIZE {
            return Err(ShardError::BlobTooLarge(blob.len()));
        }
    }

    let commitments: Vec<Hash> = blobs.iter().map(|blob| compute_commitment(blob)).collect();
    header.shard_commitments_root = calculate_root(&commitments);

    let signed = header.sign(proposer);
    let header_root = signed.header_root();

    let mut shards = Vec::with_capacity(blobs.len());
    for (position, blob) in blobs.into_iter().enumerate() {
        let index = position as u8;
        let commitment = commitments[position].clone();
        let branch = calculate_branch(&commitments, position)
            .expect("position bounded by commitments length");

        let signature =
            proposer.sign(&DataShard::signing_bytes(index, &commitment, &header_root));

        shards.push(DataShard::new(
            index,
            blob,
            commitment,
            signed.clone(),
            signature,
            branch,
        ));
    }

    Ok((signed, shards))
}
