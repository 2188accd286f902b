// oasys-chain/src/headerchain.rs

use crate::config::ChainConfig;
use crate::header::Header;
use crate::traits::ChainHeaderReader;
use crate::types::BlockNumber;
use crate::{ChainError, ChainResult};
use oasys_crypto::Hash;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory header chain implementing the engine's read port.
///
/// Holds every imported header (all branches) plus a canonical index and
/// the current head. Embedding hosts with a durable chain database provide
/// their own `ChainHeaderReader`; this structure backs light hosts and the
/// test rigs.
pub struct HeaderChain {
    config: ChainConfig,
    inner: RwLock<HeaderChainInner>,
}

struct HeaderChainInner {
    /// All headers indexed by hash, forks included
    by_hash: HashMap<Hash, Header>,
    /// Canonical hash per height
    canonical: Vec<Hash>,
    /// Genesis block hash
    genesis: Hash,
    /// Current chain head
    head: Hash,
}

impl HeaderChain {
    /// Create a new chain rooted at a genesis header
    pub fn new(config: ChainConfig, genesis: Header) -> ChainResult<Self> {
        if genesis.number != 0 {
            return Err(ChainError::InvalidGenesis(
                "first header must be genesis".into(),
            ));
        }

        let hash = genesis.hash();
        Ok(Self {
            config,
            inner: RwLock::new(HeaderChainInner {
                by_hash: HashMap::from([(hash, genesis)]),
                canonical: vec![hash],
                genesis: hash,
                head: hash,
            }),
        })
    }

    pub fn genesis_hash(&self) -> Hash {
        self.inner.read().unwrap().genesis
    }

    /// Current canonical height
    pub fn height(&self) -> BlockNumber {
        self.current_header().number
    }

    /// Import a header on top of a known parent. The canonical index
    /// follows the highest inserted chain; a longer side branch reorganizes
    /// it.
    pub fn insert(&self, header: Header) -> ChainResult<Hash> {
        let hash = header.hash();
        let mut inner = self.inner.write().unwrap();

        let parent = inner
            .by_hash
            .get(&header.parent_hash)
            .ok_or_else(|| ChainError::InvalidHeader("unknown parent".into()))?;
        if parent.number + 1 != header.number {
            return Err(ChainError::InvalidHeader(format!(
                "non-contiguous number: parent {} child {}",
                parent.number, header.number
            )));
        }
        if header.time <= parent.time {
            return Err(ChainError::InvalidHeader(
                "timestamp not after parent".into(),
            ));
        }

        let head_number = inner.by_hash[&inner.head].number;
        inner.by_hash.insert(hash, header.clone());

        // Extending or outgrowing the canonical chain moves the head;
        // the canonical index is rewritten back to the fork point
        if header.number > head_number {
            let mut cursor = header;
            let mut cursor_hash = hash;
            while inner.canonical.len() as u64 <= cursor.number {
                inner.canonical.push(Hash::zero());
            }
            loop {
                let slot = cursor.number as usize;
                if inner.canonical[slot] == cursor_hash {
                    break;
                }
                inner.canonical[slot] = cursor_hash;
                if cursor.number == 0 {
                    break;
                }
                cursor_hash = cursor.parent_hash;
                cursor = inner.by_hash[&cursor_hash].clone();
            }
            inner.head = hash;
        }

        Ok(hash)
    }
}

impl ChainHeaderReader for HeaderChain {
    fn chain_config(&self) -> &ChainConfig {
        &self.config
    }

    fn get_header(&self, hash: &Hash, number: BlockNumber) -> Option<Header> {
        self.inner
            .read()
            .unwrap()
            .by_hash
            .get(hash)
            .filter(|h| h.number == number)
            .cloned()
    }

    fn get_header_by_number(&self, number: BlockNumber) -> Option<Header> {
        let inner = self.inner.read().unwrap();
        inner
            .canonical
            .get(number as usize)
            .and_then(|hash| inner.by_hash.get(hash))
            .cloned()
    }

    fn get_header_by_hash(&self, hash: &Hash) -> Option<Header> {
        self.inner.read().unwrap().by_hash.get(hash).cloned()
    }

    fn get_canonical_hash(&self, number: BlockNumber) -> Option<Hash> {
        self.inner
            .read()
            .unwrap()
            .canonical
            .get(number as usize)
            .copied()
    }

    fn current_header(&self) -> Header {
        let inner = self.inner.read().unwrap();
        inner.by_hash[&inner.head].clone()
    }
}
