// oasys-chain/src/genesis.rs

use crate::header::{Header, EXTRA_SEAL, EXTRA_VANITY};
use crate::{ChainError, ChainResult};
use oasys_crypto::Address;

/// Extract the initial validator list from a genesis header.
///
/// The genesis `extra` uses the pre-fork epoch layout: 32 bytes of vanity,
/// a concatenation of 20-byte validator addresses, 65 bytes of (zero) seal.
pub fn parse_genesis_validators(genesis: &Header) -> ChainResult<Vec<Address>> {
    if genesis.number != 0 {
        return Err(ChainError::InvalidGenesis("not a genesis header".into()));
    }
    if genesis.extra.len() < EXTRA_VANITY + EXTRA_SEAL {
        return Err(ChainError::InvalidGenesis("extra too short".into()));
    }

    let validator_bytes = genesis.extra_validator_bytes();
    if validator_bytes.is_empty() || validator_bytes.len() % 20 != 0 {
        return Err(ChainError::InvalidGenesis(format!(
            "validator section has invalid length {}",
            validator_bytes.len()
        )));
    }

    validator_bytes
        .chunks(20)
        .map(|chunk| Address::from_slice(chunk).map_err(ChainError::from))
        .collect()
}

/// Build a genesis `extra` field from a validator list (test networks)
pub fn genesis_extra(validators: &[Address]) -> Vec<u8> {
    let mut extra = vec![0u8; EXTRA_VANITY];
    for validator in validators {
        extra.extend_from_slice(validator.as_bytes());
    }
    extra.extend_from_slice(&[0u8; EXTRA_SEAL]);
    extra
}
