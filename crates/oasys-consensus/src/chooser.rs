// oasys-consensus/src/chooser.rs

//! Deterministic stake-weighted validator sampling.
//!
//! Every node building a schedule for the same `(validators, stakes, seed)`
//! must draw the identical sequence, so the generator is a fixed, well-known
//! algorithm seeded from the epoch seed and the candidate order is canonical.

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use oasys_chain::config::ChainConfig;
use oasys_chain::types::Amount;
use oasys_crypto::{Address, Hash};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// Stake-weighted sampler over a fixed validator set
pub struct WeightedChooser {
    validators: Vec<Address>,
    totals: Vec<u64>,
    max: u64,
    rng: Pcg64Mcg,
}

impl WeightedChooser {
    /// Canonical order: ascending stake, ties broken by address bytes.
    /// Stakes are normalized to whole tokens; fractional units carry no
    /// weight.
    pub fn new(validators: &[Address], stakes: &[Amount], seed: i64) -> Self {
        let mut pairs: Vec<(Address, Amount)> = validators
            .iter()
            .copied()
            .zip(stakes.iter().cloned())
            .collect();
        pairs.sort_by(|a, b| {
            a.1.cmp(&b.1)
                .then_with(|| a.0.as_bytes().cmp(b.0.as_bytes()))
        });

        let mut totals = Vec::with_capacity(pairs.len());
        let mut total = 0u64;
        for (_, stake) in &pairs {
            total = total.saturating_add(stake.whole_tokens());
            totals.push(total);
        }

        Self {
            validators: pairs.into_iter().map(|(address, _)| address).collect(),
            totals,
            max: total,
            rng: Pcg64Mcg::seed_from_u64(seed as u64),
        }
    }

    /// The validator set in canonical order
    pub fn validators(&self) -> &[Address] {
        &self.validators
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Draw the next validator. With every normalized stake at zero the
    /// draw degrades to a uniform pick from the process-global generator.
    pub fn random(&mut self) -> Address {
        debug_assert!(!self.validators.is_empty());
        if self.max == 0 {
            let i = rand::thread_rng().gen_range(0..self.validators.len());
            return self.validators[i];
        }
        let x = self.rng.gen_range(1..=self.max);
        let i = self.totals.partition_point(|&total| total < x);
        self.validators[i]
    }
}

/// Seed interpretation used before the shortened-block-time epochs: the low
/// eight bytes of the hash as a signed integer, high bits discarded.
pub fn seed_from_hash_legacy(hash: &Hash) -> i64 {
    let bytes: [u8; 8] = hash.as_bytes()[24..32].try_into().unwrap();
    i64::from_be_bytes(bytes)
}

/// Seed interpretation from the shortened-block-time epochs on: the hash
/// reduced modulo `i64::MAX`, never negative.
pub fn seed_from_hash_bounded(hash: &Hash) -> i64 {
    let value = BigUint::from_bytes_be(hash.as_bytes()) % BigUint::from(i64::MAX as u64);
    value.to_i64().unwrap_or(0)
}

/// The scheduler seed for an epoch: zero while no previous epoch exists,
/// otherwise the previous epoch's last block hash under the width rule the
/// fork schedule selects for this epoch.
pub fn scheduler_seed(hash: Option<&Hash>, epoch: u64, config: &ChainConfig) -> i64 {
    match hash {
        None => 0,
        Some(hash) if config.is_shortened_block_time_epoch(epoch) => seed_from_hash_bounded(hash),
        Some(hash) => seed_from_hash_legacy(hash),
    }
}
