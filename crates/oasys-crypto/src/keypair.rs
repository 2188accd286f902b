// oasys-crypto/src/keypair.rs

use crate::{keccak256, CryptoError, CryptoResult, Signature};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Public key wrapper (65-byte uncompressed SEC1 encoding)
#[derive(Clone)]
pub struct PublicKey {
    bytes: [u8; 65],
}

impl PublicKey {
    pub fn from_slice(slice: &[u8]) -> CryptoResult<Self> {
        secp256k1::PublicKey::from_slice(slice)
            .map_err(|_| CryptoError::InvalidPublicKey)
            .map(|pk| Self {
                bytes: pk.serialize_uncompressed(),
            })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Derive an address from this public key: keccak256(pubkey[1..])[12..]
    pub fn to_address(&self) -> Address {
        let hash = keccak256(&self.bytes[1..]);
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash.as_bytes()[12..32]);
        Address::new(address)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}...)", hex::encode(&self.bytes[..8]))
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for PublicKey {}

/// Secret key wrapper (kept private)
pub struct SecretKey {
    bytes: [u8; 32],
}

impl SecretKey {
    pub fn from_slice(slice: &[u8]) -> CryptoResult<Self> {
        let key = secp256k1::SecretKey::from_slice(slice)
            .map_err(|_| CryptoError::InvalidSecretKey)?;
        Ok(Self {
            bytes: key.secret_bytes(),
        })
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes =
            hex::decode(s).map_err(|e| CryptoError::DeserializationError(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        // Zero out the key material on drop
        self.bytes.iter_mut().for_each(|b| *b = 0);
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}

/// SECP256k1 key pair for header sealing and transaction signing
pub struct Keypair {
    public_key: PublicKey,
    secret_key: SecretKey,
}

impl Keypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        use rand::rngs::OsRng;
        use secp256k1::Secp256k1;

        let secp = Secp256k1::new();
        let mut rng = OsRng;
        let (secret_key, public_key) = secp.generate_keypair(&mut rng);

        Self {
            public_key: PublicKey {
                bytes: public_key.serialize_uncompressed(),
            },
            secret_key: SecretKey {
                bytes: secret_key.secret_bytes(),
            },
        }
    }

    /// Create a keypair from an existing secret key
    pub fn from_secret(secret_key: SecretKey) -> CryptoResult<Self> {
        use secp256k1::Secp256k1;

        let secp = Secp256k1::new();
        let sk = secp256k1::SecretKey::from_slice(secret_key.as_bytes())
            .map_err(|_| CryptoError::InvalidSecretKey)?;
        let pk = secp256k1::PublicKey::from_secret_key(&secp, &sk);

        Ok(Self {
            public_key: PublicKey {
                bytes: pk.serialize_uncompressed(),
            },
            secret_key,
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn address(&self) -> Address {
        self.public_key.to_address()
    }

    /// Produce a recoverable signature over a 32-byte digest
    pub fn sign_hash(&self, digest: &crate::Hash) -> CryptoResult<Signature> {
        use secp256k1::{Message, Secp256k1};

        let secp = Secp256k1::signing_only();
        let secret_key = secp256k1::SecretKey::from_slice(self.secret_key.as_bytes())
            .map_err(|_| CryptoError::InvalidSecretKey)?;
        let msg = Message::from_digest_slice(digest.as_bytes())
            .map_err(|_| CryptoError::InvalidHash)?;

        let signature = secp.sign_ecdsa_recoverable(&msg, &secret_key);
        let (recovery_id, compact) = signature.serialize_compact();

        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(&compact);
        bytes[64] = recovery_id.to_i32() as u8;
        Ok(Signature::new(bytes))
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// 20-byte account identity derived from a public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Address([u8; 20]);

impl Address {
    /// Create address from bytes
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> CryptoResult<Self> {
        if slice.len() != 20 {
            return Err(CryptoError::InvalidAddress);
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
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

    pub fn zero() -> Self {
        Self([0u8; 20])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// Addresses key the snapshot validator map; serialize as hex strings so the
// JSON persistence format stays readable and map keys stay legal.
impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(D::Error::custom)
    }
}
