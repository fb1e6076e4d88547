use serde::{Deserialize, Serialize};

use crate::{
    config::MAX_TRANSACTION_INPUT_SIZE,
    crypto::{Hash, Hashable, KeyPair, PublicKey},
    serializer::{Reader, ReaderError, Serializer, Writer},
};

/// Transaction signature triple.
///
/// Carried on the wire as `(v, r, s)`. The embedded ed25519 signer packs
/// the 64-byte signature into `r || s` and always emits `v = 0`; the byte
/// is still wire-carried and overridable so corruption scenarios can
/// exercise it. The triple is atomic: a transaction either carries all
/// three components or none.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxSignature {
    pub v: u8,
    #[serde(with = "hex")]
    pub r: [u8; 32],
    #[serde(with = "hex")]
    pub s: [u8; 32],
}

impl TxSignature {
    pub fn new(v: u8, r: [u8; 32], s: [u8; 32]) -> Self {
        Self { v, r, s }
    }

    /// Pack an ed25519 signature into the triple shape.
    pub fn from_signature_bytes(bytes: &[u8; 64]) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Self { v: 0, r, s }
    }

    /// Reassemble the 64-byte signature from `r || s`.
    pub fn to_signature_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..].copy_from_slice(&self.s);
        bytes
    }
}

impl Serializer for TxSignature {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(self.v);
        writer.write_bytes(&self.r);
        writer.write_bytes(&self.s);
    }

    fn read(reader: &mut Reader) -> Result<TxSignature, ReaderError> {
        Ok(TxSignature {
            v: reader.read_u8()?,
            r: reader.read_bytes_32()?,
            s: reader.read_bytes_32()?,
        })
    }

    fn size(&self) -> usize {
        1 + 32 + 32
    }
}

/// Execution-layer transaction.
///
/// The harness treats transactions as opaque byte strings everywhere except
/// the mutation boundary, where individual fields must be addressable.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// Account nonce of the sender
    nonce: u64,
    /// Gas ceiling for execution
    gas_limit: u64,
    /// Price the sender pays per gas unit
    gas_price: u64,
    /// Sender public key
    source: PublicKey,
    /// Recipient, absent for contract creation
    to: Option<PublicKey>,
    /// Transferred amount
    value: u64,
    /// Opaque call data
    #[serde(with = "hex")]
    input: Vec<u8>,
    /// Signature triple, fully present or fully absent
    signature: Option<TxSignature>,
}

impl Transaction {
    #[inline(always)]
    pub fn new(
        nonce: u64,
        gas_limit: u64,
        gas_price: u64,
        source: PublicKey,
        to: Option<PublicKey>,
        value: u64,
        input: Vec<u8>,
        signature: Option<TxSignature>,
    ) -> Self {
        Self {
            nonce,
            gas_limit,
            gas_price,
            source,
            to,
            value,
            input,
            signature,
        }
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_gas_limit(&self) -> u64 {
        self.gas_limit
    }

    pub fn get_gas_price(&self) -> u64 {
        self.gas_price
    }

    pub fn get_source(&self) -> &PublicKey {
        &self.source
    }

    pub fn get_to(&self) -> Option<&PublicKey> {
        self.to.as_ref()
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_input(&self) -> &[u8] {
        &self.input
    }

    pub fn get_signature(&self) -> Option<&TxSignature> {
        self.signature.as_ref()
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Get the bytes that are covered by the signature.
    ///
    /// Every field except the signature itself, in wire order.
    pub fn get_signing_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        let mut writer = Writer::new(&mut buffer);

        writer.write_u64(&self.nonce);
        writer.write_u64(&self.gas_limit);
        writer.write_u64(&self.gas_price);
        self.source.write(&mut writer);
        self.to.write(&mut writer);
        writer.write_u64(&self.value);
        writer.write_var_bytes(&self.input);

        buffer
    }

    /// Sign this transaction in place with the sender key pair.
    ///
    /// Deterministic: identical transaction bytes and key always yield the
    /// same triple.
    pub fn sign_with(&mut self, keypair: &KeyPair) {
        let signature = keypair.sign(&self.get_signing_bytes());
        self.signature = Some(TxSignature::from_signature_bytes(signature.as_bytes()));
    }

    /// Verify the signature triple against the sender public key.
    ///
    /// An unsigned transaction never verifies.
    pub fn verify_signature(&self) -> bool {
        let Some(signature) = &self.signature else {
            return false;
        };
        let sig = crate::crypto::Signature::from_bytes(signature.to_signature_bytes());
        self.source.verify(&self.get_signing_bytes(), &sig).is_ok()
    }
}

impl Serializer for Transaction {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(&self.nonce);
        writer.write_u64(&self.gas_limit);
        writer.write_u64(&self.gas_price);
        self.source.write(writer);
        self.to.write(writer);
        writer.write_u64(&self.value);
        writer.write_var_bytes(&self.input);
        self.signature.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Transaction, ReaderError> {
        let nonce = reader.read_u64()?;
        let gas_limit = reader.read_u64()?;
        let gas_price = reader.read_u64()?;
        let source = PublicKey::read(reader)?;
        let to = Option::read(reader)?;
        let value = reader.read_u64()?;
        let input = reader.read_var_bytes(MAX_TRANSACTION_INPUT_SIZE)?;
        let signature = Option::read(reader)?;

        Ok(Transaction::new(
            nonce, gas_limit, gas_price, source, to, value, input, signature,
        ))
    }

    fn size(&self) -> usize {
        8 + 8
            + 8
            + self.source.size()
            + self.to.size()
            + 8
            // Input length prefix
            + 4
            + self.input.len()
            + self.signature.size()
    }
}

impl Hashable for Transaction {}

impl AsRef<Transaction> for Transaction {
    fn as_ref(&self) -> &Transaction {
        self
    }
}
