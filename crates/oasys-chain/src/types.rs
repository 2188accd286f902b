// oasys-chain/src/types.rs

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// Block number/height
pub type BlockNumber = u64;

/// Transaction nonce
pub type Nonce = u64;

/// Gas limit/used
pub type Gas = u64;

/// Timestamp in Unix epoch seconds
pub type Timestamp = u64;

/// Token amount (arbitrary precision; stakes, balances, difficulty)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Amount(BigUint);

impl Amount {
    pub fn new(value: BigUint) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(BigUint::from(0u64))
    }

    pub fn from_u64(value: u64) -> Self {
        Self(BigUint::from(value))
    }

    /// 1 token = 10^18 base units
    pub fn from_tokens(tokens: u64) -> Self {
        Self(BigUint::from(tokens) * Self::token_unit())
    }

    /// The base-unit scale of one token (10^18)
    pub fn token_unit() -> BigUint {
        BigUint::from(10u64).pow(18)
    }

    pub fn inner(&self) -> &BigUint {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == BigUint::from(0u64)
    }

    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        Some(Amount(&self.0 + &other.0))
    }

    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        if self.0 < other.0 {
            None
        } else {
            Some(Amount(&self.0 - &other.0))
        }
    }

    /// Multiply by a small scalar
    pub fn scaled(&self, factor: u64) -> Amount {
        Amount(&self.0 * BigUint::from(factor))
    }

    /// Integer division, zero when the divisor is zero
    pub fn div_floor(&self, divisor: &Amount) -> Amount {
        if divisor.is_zero() {
            Amount::zero()
        } else {
            Amount(&self.0 / &divisor.0)
        }
    }

    /// Whole tokens contained in this amount (fractional units dropped)
    pub fn whole_tokens(&self) -> u64 {
        (&self.0 / Self::token_unit()).to_u64().unwrap_or(u64::MAX)
    }

    pub fn to_u64(&self) -> Option<u64> {
        self.0.to_u64()
    }

    /// Minimal big-endian byte encoding (empty for zero)
    pub fn to_be_bytes_trimmed(&self) -> Vec<u8> {
        if self.is_zero() {
            Vec::new()
        } else {
            self.0.to_bytes_be()
        }
    }

    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        Self(BigUint::from_bytes_be(bytes))
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, other: Amount) -> Amount {
        Amount(&self.0 + &other.0)
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, other: Amount) -> Amount {
        Amount(&self.0 - &other.0)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validator stake amount
pub type StakeAmount = Amount;
