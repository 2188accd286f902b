// oasys-consensus/src/lib.rs

//! Oasys proof-of-stake consensus engine
//!
//! The engine decides, for every block, who is allowed to seal it, when they
//! are allowed to seal it, and how the chain rotates validator sets across
//! epochs:
//! - Stake-weighted deterministic scheduling of block proposers
//! - Epoch snapshots with durable checkpoints
//! - Bit-exact header validation and sealing rules
//! - Zero-priced system transactions driving the on-chain staking contracts

pub mod api;
pub mod beacon;
pub mod chooser;
pub mod deployer;
pub mod engine;
pub mod environment;
pub mod scheduler;
pub mod seed;
pub mod snapshot;
pub mod system_tx;
pub mod validators;

pub use api::OasysApi;
pub use chooser::WeightedChooser;
pub use engine::{seal_hash, AbortHandle, Oasys};
pub use environment::{EnvironmentSchedule, EnvironmentValue};
pub use scheduler::Scheduler;
pub use seed::SeedResolver;
pub use snapshot::{Snapshot, ValidatorInfo};
pub use validators::{CandidateManagerSource, NextValidators, ValidatorSource};

use oasys_chain::types::Amount;
use oasys_chain::ChainError;
use oasys_crypto::{Address, CryptoError};
use oasys_storage::StorageError;

/// Seconds one schedule rank adds on top of the previous rank's deadline
pub const BACKOFF_WIGGLE_TIME: u64 = 1;

/// Blocks between durable snapshot checkpoints
pub const CHECKPOINT_INTERVAL: u64 = 1024;

/// Recent snapshots held in memory
pub const INMEMORY_SNAPSHOTS: usize = 128;

/// Recovered seal signers held in memory
pub const INMEMORY_SIGNATURES: usize = 4096;

/// Capacity of the uncommitted-ancestor cache (at least one batch window)
pub const UNCOMMITTED_HASHES: usize = 8192;

/// Capacity of the per-branch previous-epoch hash cache
pub const LAST_BLOCK_HASHES: usize = 1000;

/// Schedulers held in memory, keyed by (seed, epoch start)
pub const INMEMORY_SCHEDULERS: usize = 128;

/// Legacy difficulty of an in-turn seal
pub fn diff_in_turn() -> Amount {
    Amount::from_u64(2)
}

/// Legacy difficulty of an out-of-turn seal
pub fn diff_no_turn() -> Amount {
    Amount::from_u64(1)
}

/// Total token supply, the numerator of the extended minimum difficulty
pub fn total_supply() -> Amount {
    Amount::from_tokens(10_000_000_000)
}

/// The environment parameter contract
pub fn environment_address() -> Address {
    let mut bytes = [0u8; 20];
    bytes[18] = 0x10;
    Address::new(bytes)
}

/// The stake manager contract
pub fn stake_manager_address() -> Address {
    let mut bytes = [0u8; 20];
    bytes[18] = 0x10;
    bytes[19] = 0x01;
    Address::new(bytes)
}

/// The candidate validator manager contract
pub fn candidate_manager_address() -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = 0x52;
    bytes[19] = 0x2e;
    Address::new(bytes)
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur during consensus operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown block")]
    UnknownBlock,

    #[error("extra-data 32 byte vanity prefix missing")]
    MissingVanity,

    #[error("extra-data 65 byte signature suffix missing")]
    MissingSignature,

    #[error("non-epoch block carries a validator list")]
    ExtraValidators,

    #[error("malformed validator list on epoch block")]
    InvalidCheckpointValidators,

    #[error("malformed validator hash on epoch block")]
    InvalidEpochHash,

    #[error("validator list of epoch block does not match the local set")]
    MismatchingEpochValidators,

    #[error("validator hash of epoch block does not match the local set")]
    MismatchingEpochHash,

    #[error("non-zero mix digest")]
    InvalidMixDigest,

    #[error("non-empty uncle hash")]
    InvalidUncleHash,

    #[error("missing difficulty")]
    InvalidDifficulty,

    #[error("difficulty does not match the schedule")]
    WrongDifficulty,

    #[error("block in the future")]
    FutureBlock,

    #[error("unknown ancestor")]
    UnknownAncestor,

    #[error("unauthorized validator")]
    UnauthorizedValidator,

    #[error("recovered signer does not match coinbase")]
    CoinbaseMismatch,

    #[error("system transaction does not match the expected call")]
    SystemTxMismatch,

    #[error("leftover system transaction after finalization")]
    ExtraSystemTx,

    #[error("sealing paused while waiting for transactions")]
    SealingPaused,

    #[error("gas limit above 2^63-1")]
    InvalidGasLimit,

    #[error("gas used above gas limit")]
    InvalidGasUsage,

    #[error("base fee does not match the fork schedule")]
    InvalidBaseFee,

    #[error("timestamp is ahead of the chain head")]
    TimestampInFuture,

    #[error("timestamp is earlier than genesis")]
    TimestampBeforeGenesis,

    #[error("no header at timestamp {0}")]
    NoHeaderAtTimestamp(u64),

    #[error("search cancelled")]
    Cancelled,

    #[error("abi error: {0}")]
    Abi(String),

    #[error("snapshot decode failed: {0}")]
    SnapshotDecode(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// Retryable errors signal the importer to revisit once more headers
    /// arrive; everything else invalidates the block.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::FutureBlock | EngineError::UnknownAncestor)
    }
}
