//! Ed25519 primitives for proposer and shard signing.
//!
//! Signing follows RFC 8032 and is fully deterministic: the same secret key
//! and message always produce byte-identical signatures, which golden-value
//! tests in the mutation engine rely on.

use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH,
    SIGNATURE_LENGTH,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::serializer::{Reader, ReaderError, Serializer, Writer};

use super::Hash;

/// Size of Ed25519 secret key in bytes.
pub const ED25519_SECRET_KEY_SIZE: usize = SECRET_KEY_LENGTH;

/// Size of Ed25519 public key in bytes.
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;

/// Size of Ed25519 signature in bytes.
pub const ED25519_SIGNATURE_SIZE: usize = SIGNATURE_LENGTH;

/// Error types for Ed25519 operations.
#[derive(Error, Debug, Clone)]
pub enum Ed25519Error {
    /// Invalid secret key length.
    #[error(
        "Invalid secret key length: expected {}, got {}",
        ED25519_SECRET_KEY_SIZE,
        _0
    )]
    InvalidSecretKeyLength(usize),

    /// Invalid public key length.
    #[error(
        "Invalid public key length: expected {}, got {}",
        ED25519_PUBLIC_KEY_SIZE,
        _0
    )]
    InvalidPublicKeyLength(usize),

    /// Invalid signature length.
    #[error(
        "Invalid signature length: expected {}, got {}",
        ED25519_SIGNATURE_SIZE,
        _0
    )]
    InvalidSignatureLength(usize),

    /// Failed to parse public key bytes.
    #[error("Failed to parse public key")]
    InvalidPublicKey,

    /// Signature verification failed.
    #[error("Signature verification failed")]
    VerificationFailed,

    /// Hex decoding error.
    #[error("Invalid hex string: {0}")]
    HexError(String),
}

/// Ed25519 secret key (32 bytes).
///
/// The secret key is zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Ed25519SecretKey([u8; ED25519_SECRET_KEY_SIZE]);

impl Ed25519SecretKey {
    /// Create a secret key from raw bytes.
    pub fn from_bytes(bytes: [u8; ED25519_SECRET_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a secret key from a slice.
    pub fn from_slice(slice: &[u8]) -> Result<Self, Ed25519Error> {
        if slice.len() != ED25519_SECRET_KEY_SIZE {
            return Err(Ed25519Error::InvalidSecretKeyLength(slice.len()));
        }
        let mut bytes = [0u8; ED25519_SECRET_KEY_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Create a secret key from a hex string.
    pub fn from_hex(hex: &str) -> Result<Self, Ed25519Error> {
        let bytes = hex::decode(hex).map_err(|e| Ed25519Error::HexError(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Get the raw bytes of the secret key.
    pub fn as_bytes(&self) -> &[u8; ED25519_SECRET_KEY_SIZE] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Ed25519SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519SecretKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Ed25519 public key (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ed25519PublicKey([u8; ED25519_PUBLIC_KEY_SIZE]);

impl Ed25519PublicKey {
    /// Create a public key from raw bytes.
    pub fn from_bytes(bytes: [u8; ED25519_PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a public key from a slice.
    pub fn from_slice(slice: &[u8]) -> Result<Self, Ed25519Error> {
        if slice.len() != ED25519_PUBLIC_KEY_SIZE {
            return Err(Ed25519Error::InvalidPublicKeyLength(slice.len()));
        }
        let mut bytes = [0u8; ED25519_PUBLIC_KEY_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Create a public key from a hex string.
    pub fn from_hex(hex: &str) -> Result<Self, Ed25519Error> {
        let bytes = hex::decode(hex).map_err(|e| Ed25519Error::HexError(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Get the raw bytes of the public key.
    pub fn as_bytes(&self) -> &[u8; ED25519_PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Compute the key ID from this public key.
    ///
    /// The key ID is the SHA3-256 hash of the public key bytes, used
    /// wherever a short stable identifier for a signer is needed.
    pub fn key_id(&self) -> Hash {
        let mut hasher = Sha3_256::new();
        hasher.update(self.0);
        let result = hasher.finalize();
        Hash::new(result.into())
    }

    /// Verify a signature on a message.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), Ed25519Error> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| Ed25519Error::InvalidPublicKey)?;
        let dalek_sig = DalekSignature::from_bytes(&signature.0);
        verifying_key
            .verify(message, &dalek_sig)
            .map_err(|_| Ed25519Error::VerificationFailed)
    }
}

impl fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serializer for Ed25519PublicKey {
    fn write(&self, writer: &mut Writer) {
        writer.write_bytes(&self.0);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self(reader.read_bytes_32()?))
    }

    fn size(&self) -> usize {
        ED25519_PUBLIC_KEY_SIZE
    }
}

/// Ed25519 signature (64 bytes).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature([u8; ED25519_SIGNATURE_SIZE]);

impl Serialize for Ed25519Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Ed25519Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl Ed25519Signature {
    /// Create a signature from raw bytes.
    pub fn from_bytes(bytes: [u8; ED25519_SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a signature from a slice.
    pub fn from_slice(slice: &[u8]) -> Result<Self, Ed25519Error> {
        if slice.len() != ED25519_SIGNATURE_SIZE {
            return Err(Ed25519Error::InvalidSignatureLength(slice.len()));
        }
        let mut bytes = [0u8; ED25519_SIGNATURE_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Create a signature from a hex string.
    pub fn from_hex(hex: &str) -> Result<Self, Ed25519Error> {
        let bytes = hex::decode(hex).map_err(|e| Ed25519Error::HexError(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Get the raw bytes of the signature.
    pub fn as_bytes(&self) -> &[u8; ED25519_SIGNATURE_SIZE] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Signature({}...)", &self.to_hex()[..16])
    }
}

impl fmt::Display for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serializer for Ed25519Signature {
    fn write(&self, writer: &mut Writer) {
        writer.write_bytes(&self.0);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self(reader.read_bytes_64()?))
    }

    fn size(&self) -> usize {
        ED25519_SIGNATURE_SIZE
    }
}

/// Ed25519 key pair containing both secret and public keys.
///
/// The secret key is zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Ed25519KeyPair {
    #[zeroize(skip)]
    signing_key: SigningKey,
}

impl Ed25519KeyPair {
    /// Generate a new random key pair using a cryptographically secure RNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Create a key pair from a secret key.
    pub fn from_secret(secret: &Ed25519SecretKey) -> Self {
        let signing_key = SigningKey::from_bytes(secret.as_bytes());
        Self { signing_key }
    }

    /// Create a key pair from secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8; ED25519_SECRET_KEY_SIZE]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        Self { signing_key }
    }

    /// Get the secret key.
    pub fn secret_key(&self) -> Ed25519SecretKey {
        Ed25519SecretKey::from_bytes(self.signing_key.to_bytes())
    }

    /// Get the public key.
    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey::from_bytes(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message and return the signature.
    ///
    /// RFC 8032 signing: identical (key, message) inputs always produce
    /// byte-identical signatures.
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        let signature = self.signing_key.sign(message);
        Ed25519Signature::from_bytes(signature.to_bytes())
    }

    /// Compute the key ID (SHA3-256 hash of the public key).
    pub fn key_id(&self) -> Hash {
        self.public_key().key_id()
    }
}

impl fmt::Debug for Ed25519KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519KeyPair")
            .field("public_key", &self.public_key())
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}
