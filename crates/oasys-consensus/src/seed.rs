// oasys-consensus/src/seed.rs

//! Previous-epoch seed resolution.
//!
//! The scheduler for epoch `e` is seeded with the hash of the last block of
//! epoch `e − 1`. That block may live in the canonical store, in a batch of
//! headers still being verified, or on a fork; the resolver walks the parent
//! chain through all three and caches the answer per branch.

use crate::environment::EnvironmentValue;
use crate::{EngineError, LAST_BLOCK_HASHES, UNCOMMITTED_HASHES};
use oasys_chain::header::Header;
use oasys_chain::traits::ChainHeaderReader;
use oasys_storage::LruCache;
use oasys_crypto::Hash;
use std::sync::Mutex;

/// Resolver for the hash of the previous epoch's last block
pub struct SeedResolver {
    /// child hash -> parent hash, fed by batch verification
    uncommitted: Mutex<LruCache<Hash, Hash>>,
    /// header parent hash -> resolved last-block hash, one entry per live
    /// fork tip
    last_hashes: Mutex<LruCache<Hash, Hash>>,
}

impl SeedResolver {
    pub fn new() -> Self {
        Self {
            uncommitted: Mutex::new(LruCache::new(UNCOMMITTED_HASHES)),
            last_hashes: Mutex::new(LruCache::new(LAST_BLOCK_HASHES)),
        }
    }

    /// Record a not-yet-committed parent link before batch verification
    pub fn register_uncommitted(&self, child: Hash, parent: Hash) {
        self.uncommitted.lock().unwrap().insert(child, parent);
    }

    /// Resolve the hash of block `epochStartBlock(header.number) − 1`.
    /// Returns `None` while no previous epoch exists; the caller falls back
    /// to seed zero.
    pub fn previous_epoch_last_hash(
        &self,
        chain: &dyn ChainHeaderReader,
        environment: &EnvironmentValue,
        header: &Header,
    ) -> Result<Option<Hash>, EngineError> {
        let epoch_start = environment.epoch_start_block(header.number);
        if epoch_start == 0 {
            return Ok(None);
        }
        let target = epoch_start - 1;

        if let Some(found) = self.last_hashes.lock().unwrap().get(&header.parent_hash) {
            return Ok(Some(*found));
        }

        let mut cursor_hash = header.parent_hash;
        let mut cursor_number = header.number - 1;
        while cursor_number > target {
            let parent = self
                .uncommitted
                .lock()
                .unwrap()
                .get(&cursor_hash)
                .copied()
                .or_else(|| {
                    chain
                        .get_header(&cursor_hash, cursor_number)
                        .map(|h| h.parent_hash)
                })
                .ok_or(EngineError::UnknownAncestor)?;
            cursor_hash = parent;
            cursor_number -= 1;
        }

        self.last_hashes
            .lock()
            .unwrap()
            .insert(header.parent_hash, cursor_hash);
        Ok(Some(cursor_hash))
    }
}

impl Default for SeedResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oasys_chain::config::ChainConfig;
    use oasys_crypto::keccak256;
    use std::collections::HashMap;
    use std::sync::RwLock;

    struct TestChain {
        config: ChainConfig,
        by_hash: RwLock<HashMap<Hash, Header>>,
        head: RwLock<Header>,
    }

    impl TestChain {
        fn build(length: u64) -> (Self, Vec<Header>) {
            let config = ChainConfig::local(1, 6, 10);
            let mut headers = Vec::new();
            let mut parent_hash = Hash::zero();
            for number in 0..length {
                let header = Header {
                    parent_hash,
                    number,
                    time: number * 6,
                    extra: vec![0u8; 97],
                    ..Default::default()
                };
                parent_hash = header.hash();
                headers.push(header);
            }
            let chain = Self {
                config,
                by_hash: RwLock::new(
                    headers.iter().map(|h| (h.hash(), h.clone())).collect(),
                ),
                head: RwLock::new(headers.last().unwrap().clone()),
            };
            (chain, headers)
        }

        fn forget(&self, header: &Header) {
            self.by_hash.write().unwrap().remove(&header.hash());
        }
    }

    impl ChainHeaderReader for TestChain {
        fn chain_config(&self) -> &ChainConfig {
            &self.config
        }

        fn get_header(&self, hash: &Hash, number: u64) -> Option<Header> {
            self.by_hash
                .read()
                .unwrap()
                .get(hash)
                .filter(|h| h.number == number)
                .cloned()
        }

        fn get_header_by_number(&self, number: u64) -> Option<Header> {
            self.by_hash
                .read()
                .unwrap()
                .values()
                .find(|h| h.number == number)
                .cloned()
        }

        fn get_header_by_hash(&self, hash: &Hash) -> Option<Header> {
            self.by_hash.read().unwrap().get(hash).cloned()
        }

        fn get_canonical_hash(&self, number: u64) -> Option<Hash> {
            self.get_header_by_number(number).map(|h| h.hash())
        }

        fn current_header(&self) -> Header {
            self.head.read().unwrap().clone()
        }
    }

    fn environment() -> EnvironmentValue {
        crate::environment::EnvironmentSchedule::new(&ChainConfig::local(1, 6, 10)).genesis()
    }

    #[test]
    fn test_first_epoch_has_no_seed() {
        let (chain, headers) = TestChain::build(8);
        let resolver = SeedResolver::new();
        let result = resolver
            .previous_epoch_last_hash(&chain, &environment(), &headers[7])
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_resolves_previous_epoch_last_block() {
        let (chain, headers) = TestChain::build(25);
        let resolver = SeedResolver::new();

        // Blocks 10..19 belong to the second epoch; their seed block is 9
        for header in &headers[10..20] {
            let found = resolver
                .previous_epoch_last_hash(&chain, &environment(), header)
                .unwrap()
                .unwrap();
            assert_eq!(found, headers[9].hash());
        }

        // Third epoch resolves block 19
        let found = resolver
            .previous_epoch_last_hash(&chain, &environment(), &headers[23])
            .unwrap()
            .unwrap();
        assert_eq!(found, headers[19].hash());
    }

    #[test]
    fn test_epoch_start_block_resolves_its_parent() {
        let (chain, headers) = TestChain::build(25);
        let resolver = SeedResolver::new();
        let found = resolver
            .previous_epoch_last_hash(&chain, &environment(), &headers[10])
            .unwrap()
            .unwrap();
        assert_eq!(found, headers[10].parent_hash);
    }

    #[test]
    fn test_branch_cache_short_circuits_missing_store() {
        let (chain, headers) = TestChain::build(25);
        let resolver = SeedResolver::new();

        let header = &headers[17];
        let first = resolver
            .previous_epoch_last_hash(&chain, &environment(), header)
            .unwrap()
            .unwrap();

        // Drop the walked range from the store; the branch cache answers
        for dropped in &headers[9..17] {
            chain.forget(dropped);
        }
        let second = resolver
            .previous_epoch_last_hash(&chain, &environment(), header)
            .unwrap()
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_uncommitted_cache_bridges_the_gap() {
        let (chain, headers) = TestChain::build(25);
        let resolver = SeedResolver::new();

        // Blocks 12..=14 are only known to the batch
        for header in &headers[12..=14] {
            chain.forget(header);
            resolver.register_uncommitted(header.hash(), header.parent_hash);
        }

        let found = resolver
            .previous_epoch_last_hash(&chain, &environment(), &headers[16])
            .unwrap()
            .unwrap();
        assert_eq!(found, headers[9].hash());
    }

    #[test]
    fn test_gap_is_unknown_ancestor() {
        let (chain, headers) = TestChain::build(25);
        let resolver = SeedResolver::new();

        chain.forget(&headers[13]);
        let result =
            resolver.previous_epoch_last_hash(&chain, &environment(), &headers[16]);
        assert!(matches!(result, Err(EngineError::UnknownAncestor)));
    }

    #[test]
    fn test_keccak_chain_hashes_are_distinct() {
        // Guard against the test fixture degenerating
        let (_, headers) = TestChain::build(4);
        let set: std::collections::HashSet<Hash> =
            headers.iter().map(|h| h.hash()).collect();
        assert_eq!(set.len(), 4);
        assert_ne!(headers[1].hash(), keccak256(b""));
    }
}
