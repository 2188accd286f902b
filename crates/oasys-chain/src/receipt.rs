// oasys-chain/src/receipt.rs

use crate::types::{BlockNumber, Gas};
use oasys_crypto::{keccak256, Address, Hash};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Size of the log bloom in bytes (2048 bits)
pub const BLOOM_SIZE: usize = 256;

/// 2048-bit log bloom: three 11-bit indices per input, taken from the first
/// six bytes of the input's Keccak-256
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Bloom([u8; BLOOM_SIZE]);

impl Bloom {
    pub fn new(bytes: [u8; BLOOM_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Fold an input into the filter
    pub fn accrue(&mut self, input: &[u8]) {
        let hash = keccak256(input);
        let hash = hash.as_bytes();
        for i in [0usize, 2, 4] {
            let bit = (((hash[i] as usize) << 8) | hash[i + 1] as usize) & 0x7ff;
            self.0[BLOOM_SIZE - 1 - bit / 8] |= 1 << (bit % 8);
        }
    }

    /// Membership test (false positives possible, false negatives not)
    pub fn contains_input(&self, input: &[u8]) -> bool {
        let hash = keccak256(input);
        let hash = hash.as_bytes();
        for i in [0usize, 2, 4] {
            let bit = (((hash[i] as usize) << 8) | hash[i + 1] as usize) & 0x7ff;
            if self.0[BLOOM_SIZE - 1 - bit / 8] & (1 << (bit % 8)) == 0 {
                return false;
            }
        }
        true
    }

    pub fn accrue_log(&mut self, log: &Log) {
        self.accrue(log.address.as_bytes());
        for topic in &log.topics {
            self.accrue(topic.as_bytes());
        }
    }

    pub fn from_logs(logs: &[Log]) -> Self {
        let mut bloom = Bloom::default();
        for log in logs {
            bloom.accrue_log(log);
        }
        bloom
    }

    /// Union of two blooms
    pub fn accrue_bloom(&mut self, other: &Bloom) {
        for (a, b) in self.0.iter_mut().zip(other.0.iter()) {
            *a |= *b;
        }
    }
}

impl Default for Bloom {
    fn default() -> Self {
        Self([0u8; BLOOM_SIZE])
    }
}

impl fmt::Debug for Bloom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            write!(f, "Bloom(empty)")
        } else {
            write!(f, "Bloom(0x{}...)", hex::encode(&self.0[..8]))
        }
    }
}

impl Serialize for Bloom {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

impl<'de> Deserialize<'de> for Bloom {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(D::Error::custom)?;
        if bytes.len() != BLOOM_SIZE {
            return Err(D::Error::custom("invalid bloom length"));
        }
        let mut out = [0u8; BLOOM_SIZE];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

/// Contract event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<Hash>,
    pub data: Vec<u8>,
}

/// Transaction receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: Hash,
    /// 1 for success, 0 for revert
    pub status: u64,
    pub gas_used: Gas,
    pub logs: Vec<Log>,
    pub bloom: Bloom,
    pub block_number: BlockNumber,
    pub transaction_index: usize,
    pub contract_address: Option<Address>,
}

impl Receipt {
    pub fn successful(
        tx_hash: Hash,
        gas_used: Gas,
        logs: Vec<Log>,
        block_number: BlockNumber,
        transaction_index: usize,
    ) -> Self {
        let bloom = Bloom::from_logs(&logs);
        Self {
            tx_hash,
            status: 1,
            gas_used,
            logs,
            bloom,
            block_number,
            transaction_index,
            contract_address: None,
        }
    }
}
