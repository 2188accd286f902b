// oasys-consensus/src/snapshot.rs

//! Persisted validator-set state at block boundaries.
//!
//! A snapshot answers authorization queries for any `(number, hash)` in
//! O(1). Missing snapshots are rebuilt by walking headers back to the
//! nearest known state and replaying them forward; every 1024th block is
//! checkpointed to durable storage under `"oasys-" || hash`.

use crate::environment::{EnvironmentSchedule, EnvironmentValue};
use crate::validators::{NextValidators, ValidatorSource};
use crate::{EngineError, CHECKPOINT_INTERVAL, INMEMORY_SNAPSHOTS};
use oasys_chain::genesis::parse_genesis_validators;
use oasys_chain::header::Header;
use oasys_chain::traits::{BlockRef, ChainHeaderReader};
use oasys_chain::types::{Amount, BlockNumber};
use oasys_crypto::{Address, Hash};
use oasys_storage::{KeyValueStore, LruCache};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Durable key prefix for snapshot entries
pub const SNAPSHOT_KEY_PREFIX: &[u8] = b"oasys-";

/// Per-validator state inside a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    pub stake: Amount,
    /// 1-based insertion order at creation time, preserved across copies
    pub index: u64,
    /// 48-byte BLS voting key on the fast-finality variant
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub vote_key: Option<Vec<u8>>,
}

/// Validator-set state at a block boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub number: BlockNumber,
    pub hash: Hash,
    pub environment: EnvironmentValue,
    pub validators: BTreeMap<Address, ValidatorInfo>,
}

impl Snapshot {
    /// Snapshot of the genesis block. Genesis validators carry the
    /// threshold stake each so the first epoch schedules deterministically
    /// with equal weights.
    pub fn genesis(header: &Header, environment: EnvironmentValue) -> Result<Self, EngineError> {
        let listed = parse_genesis_validators(header)?;
        let mut validators = BTreeMap::new();
        for (i, operator) in listed.iter().enumerate() {
            validators.insert(
                *operator,
                ValidatorInfo {
                    stake: environment.validator_threshold.clone(),
                    index: i as u64 + 1,
                    vote_key: None,
                },
            );
        }
        Ok(Self {
            number: 0,
            hash: header.hash(),
            environment,
            validators,
        })
    }

    /// Fresh snapshot with a rotated validator set (epoch boundary)
    fn rotated(
        &self,
        number: BlockNumber,
        hash: Hash,
        environment: EnvironmentValue,
        next: &NextValidators,
    ) -> Self {
        let mut validators = BTreeMap::new();
        for i in 0..next.len() {
            validators.insert(
                next.operators[i],
                ValidatorInfo {
                    stake: next.stakes[i].clone(),
                    index: i as u64 + 1,
                    vote_key: next.vote_keys.get(i).cloned().flatten(),
                },
            );
        }
        Self {
            number,
            hash,
            environment,
            validators,
        }
    }

    pub fn contains(&self, operator: &Address) -> bool {
        self.validators.contains_key(operator)
    }

    /// `(operators, stakes)` in insertion-index order
    pub fn ordered(&self) -> (Vec<Address>, Vec<Amount>) {
        let mut entries: Vec<(&Address, &ValidatorInfo)> = self.validators.iter().collect();
        entries.sort_by_key(|(_, info)| info.index);
        let operators = entries.iter().map(|(address, _)| **address).collect();
        let stakes = entries.iter().map(|(_, info)| info.stake.clone()).collect();
        (operators, stakes)
    }

    fn key(hash: &Hash) -> Vec<u8> {
        let mut key = SNAPSHOT_KEY_PREFIX.to_vec();
        key.extend_from_slice(hash.as_bytes());
        key
    }

    pub fn load(kv: &dyn KeyValueStore, hash: &Hash) -> Result<Option<Self>, EngineError> {
        match kv.get(&Self::key(hash))? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| EngineError::SnapshotDecode(e.to_string())),
            None => Ok(None),
        }
    }

    pub fn store(&self, kv: &dyn KeyValueStore) -> Result<(), EngineError> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| EngineError::SnapshotDecode(e.to_string()))?;
        kv.put(&Self::key(&self.hash), &bytes)?;
        Ok(())
    }
}

/// Snapshot provider: memory LRU over the durable store, with replay
pub struct Snapshots {
    kv: Arc<dyn KeyValueStore>,
    recents: Mutex<LruCache<Hash, Snapshot>>,
    signatures: Arc<Mutex<LruCache<Hash, Address>>>,
}

impl Snapshots {
    pub fn new(kv: Arc<dyn KeyValueStore>, signatures: Arc<Mutex<LruCache<Hash, Address>>>) -> Self {
        Self {
            kv,
            recents: Mutex::new(LruCache::new(INMEMORY_SNAPSHOTS)),
            signatures,
        }
    }

    /// Snapshot at `(number, hash)`. `parents` supplies headers a batch has
    /// verified but the chain has not committed yet.
    pub fn snapshot(
        &self,
        chain: &dyn ChainHeaderReader,
        schedule: &EnvironmentSchedule,
        source: &dyn ValidatorSource,
        number: BlockNumber,
        hash: Hash,
        parents: &[Header],
    ) -> Result<Snapshot, EngineError> {
        let by_hash: HashMap<Hash, &Header> =
            parents.iter().map(|h| (h.hash(), h)).collect();

        let mut cursor_number = number;
        let mut cursor_hash = hash;
        let mut pending: Vec<Header> = Vec::new();

        let mut snapshot = loop {
            if let Some(found) = self.recents.lock().unwrap().get(&cursor_hash) {
                break found.clone();
            }
            if cursor_number % CHECKPOINT_INTERVAL == 0 {
                if let Some(found) = Snapshot::load(&*self.kv, &cursor_hash)? {
                    tracing::debug!(number = cursor_number, "loaded snapshot checkpoint");
                    break found;
                }
            }
            if cursor_number == 0 {
                let genesis = chain
                    .get_header(&cursor_hash, 0)
                    .ok_or(EngineError::UnknownAncestor)?;
                let snapshot = Snapshot::genesis(&genesis, schedule.genesis())?;
                snapshot.store(&*self.kv)?;
                tracing::info!("stored genesis voting snapshot");
                break snapshot;
            }

            let header = by_hash
                .get(&cursor_hash)
                .filter(|h| h.number == cursor_number)
                .map(|h| (*h).clone())
                .or_else(|| chain.get_header(&cursor_hash, cursor_number))
                .ok_or(EngineError::UnknownAncestor)?;
            cursor_hash = header.parent_hash;
            cursor_number -= 1;
            pending.push(header);
        };

        pending.reverse();
        for header in &pending {
            snapshot = self.apply(schedule, source, &snapshot, header)?;
        }

        self.recents
            .lock()
            .unwrap()
            .insert(snapshot.hash, snapshot.clone());
        Ok(snapshot)
    }

    /// Replay a single header on top of a snapshot. The source snapshot is
    /// never mutated; rotation produces fresh maps.
    fn apply(
        &self,
        schedule: &EnvironmentSchedule,
        source: &dyn ValidatorSource,
        current: &Snapshot,
        header: &Header,
    ) -> Result<Snapshot, EngineError> {
        let number = header.number;
        let hash = header.hash();
        if number != current.number + 1 {
            return Err(EngineError::UnknownAncestor);
        }

        let (environment, _) = schedule.value_at(number);
        let snapshot = if environment.is_epoch_start_block(number) {
            let epoch = environment.epoch(number);
            let next =
                source.next_validators(epoch, BlockRef::Hash(header.parent_hash))?;
            tracing::debug!(number, epoch, count = next.len(), "rotated validator set");
            current.rotated(number, hash, environment, &next)
        } else {
            let mut copied = current.clone();
            copied.number = number;
            copied.hash = hash;
            copied.environment = environment;
            copied
        };

        let signer = crate::engine::recover_header_signer(header, &self.signatures)?;
        if !snapshot.contains(&signer) {
            return Err(EngineError::UnauthorizedValidator);
        }

        if number % CHECKPOINT_INTERVAL == 0 {
            snapshot.store(&*self.kv)?;
            tracing::debug!(number, "checkpointed snapshot");
        }
        Ok(snapshot)
    }
}
