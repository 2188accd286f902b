// oasys-crypto/src/lib.rs

//! Cryptographic primitives for the Oasys consensus engine
//!
//! This crate provides:
//! - Keccak-256 hashing
//! - 20-byte addresses with Ethereum-style derivation
//! - Recoverable SECP256k1 signatures (seal signing and `ecrecover`)
//! - Key pair generation and management

pub mod hash;
pub mod keypair;
pub mod signature;

pub use hash::{keccak256, Hash};
pub use keypair::{Address, Keypair, PublicKey, SecretKey};
pub use signature::{recover, Signature};

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid recovery id")]
    InvalidRecoveryId,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid secret key")]
    InvalidSecretKey,

    #[error("Invalid hash")]
    InvalidHash,

    #[error("Invalid address")]
    InvalidAddress,

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}
