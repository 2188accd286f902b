// oasys-storage/src/kv.rs

use crate::{StorageError, StorageResult};
use rocksdb::{Options, DB};
use std::collections::HashMap;
use std::sync::RwLock;

/// The persistence port the engine owns: flat key-value bytes. Snapshot
/// entries are the only durable state the engine writes.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;
    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;
}

/// RocksDB configuration
#[derive(Debug, Clone)]
pub struct RocksKvConfig {
    pub path: String,
    pub create_if_missing: bool,
    pub max_open_files: i32,
    pub write_buffer_size: usize,
}

impl Default for RocksKvConfig {
    fn default() -> Self {
        Self {
            path: "./data".to_string(),
            create_if_missing: true,
            max_open_files: 1024,
            write_buffer_size: 64 * 1024 * 1024, // 64 MB
        }
    }
}

/// RocksDB-backed store
pub struct RocksKv {
    db: DB,
}

impl RocksKv {
    /// Open or create the database
    pub fn open(config: RocksKvConfig) -> StorageResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(config.create_if_missing);
        opts.set_max_open_files(config.max_open_files);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.increase_parallelism(num_cpus::get() as i32);

        let db = DB::open(&opts, &config.path)
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        tracing::info!("Database opened at {}", config.path);

        Ok(Self { db })
    }
}

impl KeyValueStore for RocksKv {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.db
            .get(key)
            .map_err(|e| StorageError::DatabaseError(e.to_string()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.db
            .put(key, value)
            .map_err(|e| StorageError::DatabaseError(e.to_string()))
    }
}

/// In-memory store for tests and ephemeral nodes
#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}
