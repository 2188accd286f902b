// oasys-crypto/src/signature.rs

use crate::{Address, CryptoError, CryptoResult, Hash};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Length of a recoverable signature: 64 compact bytes plus one recovery byte
pub const SIGNATURE_SIZE: usize = 65;

/// Recoverable SECP256k1 signature (r || s || v)
#[derive(Clone, Copy)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    pub fn new(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> CryptoResult<Self> {
        if slice.len() != SIGNATURE_SIZE {
            return Err(CryptoError::InvalidSignature);
        }
        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_SIZE] {
        self.0
    }

    /// The r || s half
    pub fn compact(&self) -> &[u8] {
        &self.0[..64]
    }

    /// The recovery byte
    pub fn recovery_id(&self) -> u8 {
        self.0[64]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes =
            hex::decode(s).map_err(|e| CryptoError::DeserializationError(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", hex::encode(&self.0[..8]))
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.0[..] == other.0[..]
    }
}

impl Eq for Signature {}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Signature::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Recover the signing address from a digest and a recoverable signature
pub fn recover(digest: &Hash, signature: &Signature) -> CryptoResult<Address> {
    use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
    use secp256k1::{Message, Secp256k1};

    let recovery_id = RecoveryId::from_i32(signature.recovery_id() as i32)
        .map_err(|_| CryptoError::InvalidRecoveryId)?;
    let recoverable = RecoverableSignature::from_compact(signature.compact(), recovery_id)
        .map_err(|_| CryptoError::InvalidSignature)?;
    let msg = Message::from_digest_slice(digest.as_bytes())
        .map_err(|_| CryptoError::InvalidHash)?;

    let secp = Secp256k1::verification_only();
    let public_key = secp
        .recover_ecdsa(&msg, &recoverable)
        .map_err(|_| CryptoError::InvalidSignature)?;

    let pk = crate::PublicKey::from_slice(&public_key.serialize_uncompressed())?;
    Ok(pk.to_address())
}
