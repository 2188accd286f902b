// oasys-storage/src/lib.rs

//! Persistent storage layer for the consensus engine
//!
//! This crate provides:
//! - The `KeyValueStore` port the snapshot engine persists through
//! - A RocksDB-backed implementation for nodes
//! - An in-memory implementation for tests
//! - The shared LRU cache used by the engine's hot paths

pub mod cache;
pub mod kv;

pub use cache::LruCache;
pub use kv::{KeyValueStore, MemoryKv, RocksKv, RocksKvConfig};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
