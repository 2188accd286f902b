// oasys-chain/src/header.rs

use crate::encode::{append_address, append_amount, append_bytes, append_hash};
use crate::receipt::Bloom;
use crate::types::{Amount, BlockNumber, Gas, Timestamp};
use oasys_crypto::{keccak256, Address, Hash, Signature};
use rlp::RlpStream;
use serde::{Deserialize, Serialize};

/// Fixed prefix of `extra`: signer vanity, zero padded
pub const EXTRA_VANITY: usize = 32;

/// Fixed suffix of `extra`: secp256k1 signature over the seal hash
pub const EXTRA_SEAL: usize = 65;

/// Keccak-256 of the RLP empty list; the only accepted uncle hash
pub fn empty_uncle_hash() -> Hash {
    keccak256(&rlp::EMPTY_LIST_RLP)
}

/// Block header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Hash of the parent block
    pub parent_hash: Hash,
    /// Hash of the uncle list (always the empty-list hash)
    pub uncle_hash: Hash,
    /// Block proposer; must match the recovered seal signer
    pub coinbase: Address,
    /// State root after execution
    pub root: Hash,
    /// Transactions trie root
    pub tx_hash: Hash,
    /// Receipts trie root
    pub receipt_hash: Hash,
    /// Aggregated log bloom
    pub bloom: Bloom,
    /// Schedule-derived difficulty
    pub difficulty: Amount,
    /// Block number/height
    pub number: BlockNumber,
    pub gas_limit: Gas,
    pub gas_used: Gas,
    /// Block timestamp
    pub time: Timestamp,
    /// vanity || validator commitment (epoch-start only) || seal
    pub extra: Vec<u8>,
    /// Reserved; must be zero
    pub mix_digest: Hash,
    /// Reserved; must be zero
    pub nonce: [u8; 8],
    /// EIP-1559 base fee; present from the London block on
    pub base_fee: Option<Amount>,
}

impl Header {
    /// Header hash: Keccak-256 of the full RLP encoding
    pub fn hash(&self) -> Hash {
        let mut s = RlpStream::new();
        self.rlp_append(&mut s, None);
        keccak256(&s.out())
    }

    /// RLP-encode the header. When `extra_override` is given it replaces the
    /// `extra` field (the seal hash encodes `extra` without its signature
    /// suffix).
    pub fn rlp_append(&self, s: &mut RlpStream, extra_override: Option<&[u8]>) {
        let extra = extra_override.unwrap_or(&self.extra);
        s.begin_list(if self.base_fee.is_some() { 16 } else { 15 });
        append_hash(s, &self.parent_hash);
        append_hash(s, &self.uncle_hash);
        append_address(s, &self.coinbase);
        append_hash(s, &self.root);
        append_hash(s, &self.tx_hash);
        append_hash(s, &self.receipt_hash);
        append_bytes(s, self.bloom.as_bytes());
        append_amount(s, &self.difficulty);
        s.append(&self.number);
        s.append(&self.gas_limit);
        s.append(&self.gas_used);
        s.append(&self.time);
        append_bytes(s, extra);
        append_hash(s, &self.mix_digest);
        append_bytes(s, &self.nonce);
        if let Some(base_fee) = &self.base_fee {
            append_amount(s, base_fee);
        }
    }

    /// The 32-byte vanity prefix of `extra`, if present
    pub fn extra_vanity(&self) -> Option<&[u8]> {
        self.extra.get(..EXTRA_VANITY)
    }

    /// The validator commitment between vanity and seal (empty off epoch
    /// boundaries)
    pub fn extra_validator_bytes(&self) -> &[u8] {
        if self.extra.len() <= EXTRA_VANITY + EXTRA_SEAL {
            &[]
        } else {
            &self.extra[EXTRA_VANITY..self.extra.len() - EXTRA_SEAL]
        }
    }

    /// The 65-byte seal suffix of `extra`
    pub fn extra_seal(&self) -> Option<Signature> {
        if self.extra.len() < EXTRA_SEAL {
            return None;
        }
        Signature::from_slice(&self.extra[self.extra.len() - EXTRA_SEAL..]).ok()
    }

    /// Overwrite the seal suffix in place
    pub fn set_extra_seal(&mut self, signature: &Signature) {
        let len = self.extra.len();
        assert!(len >= EXTRA_SEAL, "extra shorter than the seal suffix");
        self.extra[len - EXTRA_SEAL..].copy_from_slice(signature.as_bytes());
    }
}

impl Default for Header {
    fn default() -> Self {
        Self {
            parent_hash: Hash::zero(),
            uncle_hash: empty_uncle_hash(),
            coinbase: Address::zero(),
            root: Hash::zero(),
            tx_hash: Hash::zero(),
            receipt_hash: Hash::zero(),
            bloom: Bloom::default(),
            difficulty: Amount::zero(),
            number: 0,
            gas_limit: 0,
            gas_used: 0,
            time: 0,
            extra: Vec::new(),
            mix_digest: Hash::zero(),
            nonce: [0u8; 8],
            base_fee: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header {
            parent_hash: keccak256(b"parent"),
            coinbase: Address::new([7u8; 20]),
            difficulty: Amount::from_u64(2),
            number: 40,
            gas_limit: 30_000_000,
            gas_used: 21_000,
            time: 1_700_000_000,
            extra: vec![0u8; EXTRA_VANITY + EXTRA_SEAL],
            ..Default::default()
        }
    }

    #[test]
    fn test_hash_is_stable() {
        let header = sample_header();
        assert_eq!(header.hash(), header.clone().hash());
    }

    #[test]
    fn test_hash_covers_extra() {
        let header = sample_header();
        let mut sealed = header.clone();
        sealed.extra[EXTRA_VANITY] = 1;
        assert_ne!(header.hash(), sealed.hash());
    }

    #[test]
    fn test_base_fee_changes_encoding() {
        let header = sample_header();
        let mut london = header.clone();
        london.base_fee = Some(Amount::from_u64(7));
        assert_ne!(header.hash(), london.hash());
    }

    #[test]
    fn test_extra_split() {
        let mut header = sample_header();
        assert!(header.extra_validator_bytes().is_empty());
        assert!(header.extra_seal().is_some());

        header.extra = vec![0u8; EXTRA_VANITY];
        header.extra.extend_from_slice(&[1u8; 40]);
        header.extra.extend_from_slice(&[0u8; EXTRA_SEAL]);
        assert_eq!(header.extra_validator_bytes(), &[1u8; 40][..]);
    }

    #[test]
    fn test_set_extra_seal() {
        let mut header = sample_header();
        let sig = Signature::new([9u8; EXTRA_SEAL]);
        header.set_extra_seal(&sig);
        assert_eq!(header.extra_seal().unwrap(), sig);
    }

    #[test]
    fn test_empty_uncle_hash_constant() {
        assert_eq!(
            empty_uncle_hash().to_hex(),
            "0x1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347"
        );
    }
}
