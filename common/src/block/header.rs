// Slot header and its signed wrapper.
//
// The unsigned header is the signing message; the signed wrapper binds the
// proposer signature to it. Shards reference the signed wrapper by root.

use std::fmt::{Display, Error as FmtError, Formatter};

use serde::{Deserialize, Serialize};

use crate::{
    config::{GRAFFITI_SIZE, SLOTS_PER_EPOCH},
    crypto::{Hash, Hashable, KeyPair, PublicKey, Signature},
    serializer::{Reader, ReaderError, Serializer, Writer},
};

use super::Slot;

// Serialize the graffiti in a hexadecimal string
pub fn serialize_graffiti<S: serde::Serializer>(
    graffiti: &[u8; GRAFFITI_SIZE],
    s: S,
) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(graffiti))
}

// Deserialize the graffiti from a hexadecimal string
pub fn deserialize_graffiti<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<[u8; GRAFFITI_SIZE], D::Error> {
    let mut graffiti = [0u8; GRAFFITI_SIZE];
    let hex = String::deserialize(deserializer)?;
    let decoded = hex::decode(hex).map_err(serde::de::Error::custom)?;

    if decoded.len() != GRAFFITI_SIZE {
        return Err(serde::de::Error::custom(format!(
            "Invalid graffiti length: expected {} bytes, got {}",
            GRAFFITI_SIZE,
            decoded.len()
        )));
    }

    graffiti.copy_from_slice(&decoded);
    Ok(graffiti)
}

/// Unsigned slot header.
///
/// Mirrors the execution payload it commits to (`parent_hash`,
/// `state_root`, `payload_hash`) and adds the consensus-side identifiers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SlotHeader {
    pub slot: Slot,
    pub proposer_index: u64,

    // Payload mirror
    pub parent_hash: Hash,
    pub state_root: Hash,
    pub payload_hash: Hash,

    // Commitment to the shard set of this block
    pub shard_commitments_root: Hash,

    // Opaque distinguishing tag
    #[serde(serialize_with = "serialize_graffiti")]
    #[serde(deserialize_with = "deserialize_graffiti")]
    pub graffiti: [u8; GRAFFITI_SIZE],
}

impl SlotHeader {
    pub fn new(
        slot: Slot,
        proposer_index: u64,
        parent_hash: Hash,
        state_root: Hash,
        payload_hash: Hash,
        shard_commitments_root: Hash,
        graffiti: [u8; GRAFFITI_SIZE],
    ) -> Self {
        Self {
            slot,
            proposer_index,
            parent_hash,
            state_root,
            payload_hash,
            shard_commitments_root,
            graffiti,
        }
    }

    pub fn get_slot(&self) -> Slot {
        self.slot
    }

    /// Epoch containing this header's slot
    pub fn get_epoch(&self) -> u64 {
        self.slot / SLOTS_PER_EPOCH
    }

    pub fn get_proposer_index(&self) -> u64 {
        self.proposer_index
    }

    pub fn get_parent_hash(&self) -> &Hash {
        &self.parent_hash
    }

    pub fn get_payload_hash(&self) -> &Hash {
        &self.payload_hash
    }

    pub fn get_shard_commitments_root(&self) -> &Hash {
        &self.shard_commitments_root
    }

    pub fn get_graffiti(&self) -> &[u8; GRAFFITI_SIZE] {
        &self.graffiti
    }

    pub fn set_graffiti(&mut self, values: [u8; GRAFFITI_SIZE]) {
        self.graffiti = values;
    }

    /// Sign this header with the proposer key pair.
    pub fn sign(self, keypair: &KeyPair) -> SignedSlotHeader {
        let signature = keypair.sign(&self.to_bytes());
        SignedSlotHeader {
            header: self,
            signature,
        }
    }
}

impl Serializer for SlotHeader {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(&self.slot);
        writer.write_u64(&self.proposer_index);
        writer.write_hash(&self.parent_hash);
        writer.write_hash(&self.state_root);
        writer.write_hash(&self.payload_hash);
        writer.write_hash(&self.shard_commitments_root);
        writer.write_bytes(&self.graffiti);
    }

    fn read(reader: &mut Reader) -> Result<SlotHeader, ReaderError> {
        Ok(SlotHeader {
            slot: reader.read_u64()?,
            proposer_index: reader.read_u64()?,
            parent_hash: reader.read_hash()?,
            state_root: reader.read_hash()?,
            payload_hash: reader.read_hash()?,
            shard_commitments_root: reader.read_hash()?,
            graffiti: reader.read_bytes_32()?,
        })
    }

    fn size(&self) -> usize {
        8 + 8
            + self.parent_hash.size()
            + self.state_root.size()
            + self.payload_hash.size()
            + self.shard_commitments_root.size()
            + GRAFFITI_SIZE
    }
}

impl Hashable for SlotHeader {}

/// Slot header with the proposer signature attached.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SignedSlotHeader {
    #[serde(flatten)]
    pub header: SlotHeader,
    pub signature: Signature,
}

impl SignedSlotHeader {
    pub fn get_header(&self) -> &SlotHeader {
        &self.header
    }

    pub fn get_signature(&self) -> &Signature {
        &self.signature
    }

    /// Root of the unsigned header, the identifier shards bind to.
    pub fn header_root(&self) -> Hash {
        self.header.hash()
    }

    /// Verify the proposer signature over the unsigned header bytes.
    pub fn verify_signature(&self, proposer: &PublicKey) -> bool {
        proposer
            .verify(&self.header.to_bytes(), &self.signature)
            .is_ok()
    }

    /// Two signed headers equivocate when they come from the same proposer
    /// for the same slot but differ in any other way.
    pub fn is_equivocation_of(&self, other: &SignedSlotHeader) -> bool {
        self.header.slot == other.header.slot
            && self.header.proposer_index == other.header.proposer_index
            && self.header != other.header
    }
}

impl Serializer for SignedSlotHeader {
    fn write(&self, writer: &mut Writer) {
        self.header.write(writer);
        self.signature.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<SignedSlotHeader, ReaderError> {
        Ok(SignedSlotHeader {
            header: SlotHeader::read(reader)?,
            signature: Signature::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.header.size() + self.signature.size()
    }
}

impl Display for SignedSlotHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(
            f,
            "SignedSlotHeader[slot: {}, proposer: {}, payload: {}, graffiti: {}]",
            self.header.slot,
            self.header.proposer_index,
            self.header.payload_hash,
            hex::encode(self.header.graffiti)
        )
    }
}
