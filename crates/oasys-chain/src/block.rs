// oasys-chain/src/block.rs

use crate::header::Header;
use crate::transaction::Transaction;
use crate::types::BlockNumber;
use oasys_crypto::Hash;
use serde::{Deserialize, Serialize};

/// Complete block: header plus transaction body. Uncles do not exist under
/// this engine; the header carries the empty-list uncle hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: Header, transactions: Vec<Transaction>) -> Self {
        Self { header, transactions }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn number(&self) -> BlockNumber {
        self.header.number
    }

    /// Replace the header (used when the sealer injects the signature)
    pub fn with_header(mut self, header: Header) -> Self {
        self.header = header;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_hash_is_header_hash() {
        let block = Block::new(Header::default(), Vec::new());
        assert_eq!(block.hash(), block.header.hash());
        assert_eq!(block.number(), 0);
    }
}
