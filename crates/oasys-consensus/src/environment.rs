// oasys-consensus/src/environment.rs

//! Per-epoch protocol constants and their hand-coded transition table.
//!
//! An [`EnvironmentValue`] is immutable once installed; a successor becomes
//! current at its own `start_block`. The on-chain `updateValue` call is
//! scheduled at the midpoint of the epoch preceding the transition so every
//! node agrees on the switch and reorgs have time to settle.

use oasys_chain::config::ChainConfig;
use oasys_chain::types::{Amount, BlockNumber};
use serde::{Deserialize, Serialize};

/// Versioned tuple of protocol constants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentValue {
    /// First block this value applies to
    pub start_block: BlockNumber,
    /// First epoch this value applies to
    pub start_epoch: u64,
    /// Seconds between blocks
    pub block_period: u64,
    /// Blocks per epoch
    pub epoch_period: u64,
    /// Staking reward rate (percent)
    pub reward_rate: u64,
    /// Default commission rate (percent)
    pub commission_rate: u64,
    /// Minimum stake to run a validator
    pub validator_threshold: Amount,
    /// Missed-block count that jails a validator
    pub jail_threshold: u64,
    /// Epochs a jailed validator sits out
    pub jail_period: u64,
}

impl EnvironmentValue {
    /// The epoch the given block belongs to
    pub fn epoch(&self, number: BlockNumber) -> u64 {
        self.start_epoch + (number.saturating_sub(self.start_block)) / self.epoch_period
    }

    /// Whether the given block opens an epoch
    pub fn is_epoch_start_block(&self, number: BlockNumber) -> bool {
        (number.saturating_sub(self.start_block)) % self.epoch_period == 0
    }

    /// First block of the epoch the given block belongs to
    pub fn epoch_start_block(&self, number: BlockNumber) -> BlockNumber {
        number - (number.saturating_sub(self.start_block)) % self.epoch_period
    }

    /// Whether this value already applies at the given block
    pub fn started(&self, number: BlockNumber) -> bool {
        number >= self.start_block
    }

    /// Deep, independent copy
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Whether the given block is the one that must carry the on-chain
    /// `updateValue` call switching to `next`: the midpoint of the epoch
    /// preceding `next.start_epoch`.
    pub fn should_update(&self, next: &EnvironmentValue, number: BlockNumber) -> bool {
        self.epoch(number) + 1 == next.start_epoch
            && number - self.epoch_start_block(number) == self.epoch_period / 2
    }
}

fn genesis_value(config: &ChainConfig) -> EnvironmentValue {
    EnvironmentValue {
        start_block: 0,
        start_epoch: 1,
        block_period: config.oasys.period,
        epoch_period: config.oasys.epoch,
        reward_rate: 10,
        commission_rate: 10,
        validator_threshold: Amount::from_tokens(10_000_000),
        jail_threshold: 500,
        jail_period: 2,
    }
}

fn shortened_block_time_value(
    config: &ChainConfig,
    previous: &EnvironmentValue,
) -> Option<EnvironmentValue> {
    let start_epoch = config.oasys.shortened_block_time_start_epoch?;
    let mut value = previous.copy();
    value.start_epoch = start_epoch;
    value.start_block = previous.start_block
        + start_epoch.saturating_sub(previous.start_epoch) * previous.epoch_period;
    if config.is_mainnet() || config.is_testnet() {
        value.block_period = 6;
        value.epoch_period = 14400;
    }
    Some(value)
}

/// The ordered chain of environment values a configuration produces.
/// Built once per engine; lookups are pure.
#[derive(Debug, Clone)]
pub struct EnvironmentSchedule {
    values: Vec<EnvironmentValue>,
}

impl EnvironmentSchedule {
    pub fn new(config: &ChainConfig) -> Self {
        let mut values = vec![genesis_value(config)];
        if let Some(next) = shortened_block_time_value(config, &values[0]) {
            values.push(next);
        }
        Self { values }
    }

    /// `(current, next)` at the given block. `next` is a copy of `current`
    /// when no successor is pending.
    pub fn value_at(&self, number: BlockNumber) -> (EnvironmentValue, EnvironmentValue) {
        let mut current = &self.values[0];
        for value in &self.values[1..] {
            if value.started(number) {
                current = value;
            } else {
                return (current.copy(), value.copy());
            }
        }
        (current.copy(), current.copy())
    }

    /// The environment installed at genesis
    pub fn genesis(&self) -> EnvironmentValue {
        self.values[0].copy()
    }
}
