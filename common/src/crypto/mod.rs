mod hash;

pub mod ed25519;

pub use hash::*;

pub use ed25519::{
    Ed25519Error, Ed25519KeyPair, Ed25519PublicKey, Ed25519SecretKey, Ed25519Signature,
    ED25519_PUBLIC_KEY_SIZE, ED25519_SECRET_KEY_SIZE, ED25519_SIGNATURE_SIZE,
};

/// Key pair type used for proposer identities
pub type KeyPair = Ed25519KeyPair;

/// Public key type used in the system
pub type PublicKey = Ed25519PublicKey;

/// Signature type used for headers and shards
pub type Signature = Ed25519Signature;
