// oasys-consensus/src/validators.rs

//! Next-epoch validator sets and the epoch-block commitment over them.
//!
//! The candidate manager contract is paged through the read-only call port;
//! each page returns parallel arrays of owners, operators, stakes and
//! candidacy flags plus a continuation cursor.

use crate::{candidate_manager_address, stake_manager_address, EngineError};
use ethers_core::abi::{decode, encode, ParamType, Token};
use ethers_core::types::{H160, U256};
use oasys_chain::traits::{BlockRef, ContractCaller};
use oasys_chain::types::Amount;
use oasys_crypto::{keccak256, Address, Hash};
use std::sync::Arc;

/// Validators paged from the contract for the next epoch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NextValidators {
    pub owners: Vec<Address>,
    pub operators: Vec<Address>,
    pub stakes: Vec<Amount>,
    /// 48-byte BLS keys on the fast-finality variant; empty otherwise
    pub vote_keys: Vec<Option<Vec<u8>>>,
}

impl NextValidators {
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

/// Validator commitment bytes of an epoch-start block: the operator
/// addresses concatenated in ascending byte order
pub fn commitment_bytes(operators: &[Address]) -> Vec<u8> {
    let mut sorted: Vec<Address> = operators.to_vec();
    sorted.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
    let mut bytes = Vec::with_capacity(sorted.len() * 20);
    for operator in sorted {
        bytes.extend_from_slice(operator.as_bytes());
    }
    bytes
}

/// Post-fork commitment: Keccak-256 of [`commitment_bytes`]
pub fn commitment_hash(operators: &[Address]) -> Hash {
    keccak256(&commitment_bytes(operators))
}

/// Parse a pre-fork commitment back into addresses
pub fn parse_validator_bytes(bytes: &[u8]) -> Result<Vec<Address>, EngineError> {
    if bytes.is_empty() || bytes.len() % 20 != 0 {
        return Err(EngineError::InvalidCheckpointValidators);
    }
    bytes
        .chunks(20)
        .map(|chunk| {
            Address::from_slice(chunk).map_err(|_| EngineError::InvalidCheckpointValidators)
        })
        .collect()
}

/// On-chain staking state as the engine consumes it
pub trait ValidatorSource: Send + Sync {
    /// The `(owners, operators, stakes)` elected for the given epoch
    fn next_validators(&self, epoch: u64, block: BlockRef) -> Result<NextValidators, EngineError>;

    /// Accumulated staking rewards to mint at an epoch boundary
    fn total_rewards(&self, epochs: u64, block: BlockRef) -> Result<Amount, EngineError>;
}

/// Page size for the candidate manager view
const PAGE_SIZE: u64 = 100;

/// `ValidatorSource` backed by the candidate manager and stake manager
/// contracts through the read-only call port
pub struct CandidateManagerSource {
    caller: Arc<dyn ContractCaller>,
}

impl CandidateManagerSource {
    pub fn new(caller: Arc<dyn ContractCaller>) -> Self {
        Self { caller }
    }

    fn page(
        &self,
        epoch: u64,
        cursor: u64,
        block: BlockRef,
    ) -> Result<(NextValidators, u64), EngineError> {
        let input = encode_call(
            "getHighStakes(uint256,uint256,uint256)",
            &[
                Token::Uint(U256::from(epoch)),
                Token::Uint(U256::from(cursor)),
                Token::Uint(U256::from(PAGE_SIZE)),
            ],
        );
        let output = self
            .caller
            .call(candidate_manager_address(), input, block)?;

        let tokens = decode(
            &[
                ParamType::Array(Box::new(ParamType::Address)),
                ParamType::Array(Box::new(ParamType::Address)),
                ParamType::Array(Box::new(ParamType::Uint(256))),
                ParamType::Array(Box::new(ParamType::Bytes)),
                ParamType::Array(Box::new(ParamType::Bool)),
                ParamType::Uint(256),
            ],
            &output,
        )
        .map_err(|e| EngineError::Abi(e.to_string()))?;

        let mut iter = tokens.into_iter();
        let owners = token_addresses(iter.next())?;
        let operators = token_addresses(iter.next())?;
        let stakes = token_uints(iter.next())?;
        let vote_keys = token_bytes(iter.next())?;
        let candidates = token_bools(iter.next())?;
        let new_cursor = token_uint(iter.next())?;

        if owners.len() != operators.len()
            || owners.len() != stakes.len()
            || owners.len() != candidates.len()
        {
            return Err(EngineError::Abi("ragged validator page".into()));
        }

        let mut page = NextValidators::default();
        for (i, candidate) in candidates.iter().enumerate() {
            if !candidate {
                continue;
            }
            page.owners.push(owners[i]);
            page.operators.push(operators[i]);
            page.stakes.push(stakes[i].clone());
            page.vote_keys.push(
                vote_keys
                    .get(i)
                    .and_then(|k| if k.is_empty() { None } else { Some(k.clone()) }),
            );
        }
        Ok((page, new_cursor))
    }
}

impl ValidatorSource for CandidateManagerSource {
    fn next_validators(&self, epoch: u64, block: BlockRef) -> Result<NextValidators, EngineError> {
        let mut all = NextValidators::default();
        let mut cursor = 0u64;
        loop {
            let (page, new_cursor) = self.page(epoch, cursor, block)?;
            let advanced = new_cursor.saturating_sub(cursor);
            all.owners.extend(page.owners);
            all.operators.extend(page.operators);
            all.stakes.extend(page.stakes);
            all.vote_keys.extend(page.vote_keys);
            if advanced < PAGE_SIZE {
                break;
            }
            cursor = new_cursor;
        }
        tracing::debug!(epoch, count = all.len(), "fetched next validators");
        Ok(all)
    }

    fn total_rewards(&self, epochs: u64, block: BlockRef) -> Result<Amount, EngineError> {
        let input = encode_call(
            "getTotalRewards(uint256)",
            &[Token::Uint(U256::from(epochs))],
        );
        let output = self.caller.call(stake_manager_address(), input, block)?;
        let tokens = decode(&[ParamType::Uint(256)], &output)
            .map_err(|e| EngineError::Abi(e.to_string()))?;
        token_uint(tokens.into_iter().next()).map(uint_to_amount)
    }
}

pub(crate) fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut input = ethers_core::utils::id(signature).to_vec();
    input.extend(encode(tokens));
    input
}

pub(crate) fn uint_to_amount(value: U256) -> Amount {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    Amount::from_be_bytes(&bytes)
}

pub(crate) fn amount_to_uint(value: &Amount) -> U256 {
    U256::from_big_endian(&value.to_be_bytes_trimmed())
}

pub(crate) fn address_to_h160(address: &Address) -> H160 {
    H160::from_slice(address.as_bytes())
}

fn token_addresses(token: Option<Token>) -> Result<Vec<Address>, EngineError> {
    match token {
        Some(Token::Array(items)) => items
            .into_iter()
            .map(|item| {
                item.into_address()
                    .map(|a| Address::new(a.0))
                    .ok_or_else(|| EngineError::Abi("expected address".into()))
            })
            .collect(),
        _ => Err(EngineError::Abi("expected address array".into())),
    }
}

fn token_uints(token: Option<Token>) -> Result<Vec<Amount>, EngineError> {
    match token {
        Some(Token::Array(items)) => items
            .into_iter()
            .map(|item| {
                item.into_uint()
                    .map(uint_to_amount)
                    .ok_or_else(|| EngineError::Abi("expected uint".into()))
            })
            .collect(),
        _ => Err(EngineError::Abi("expected uint array".into())),
    }
}

fn token_bytes(token: Option<Token>) -> Result<Vec<Vec<u8>>, EngineError> {
    match token {
        Some(Token::Array(items)) => items
            .into_iter()
            .map(|item| {
                item.into_bytes()
                    .ok_or_else(|| EngineError::Abi("expected bytes".into()))
            })
            .collect(),
        _ => Err(EngineError::Abi("expected bytes array".into())),
    }
}

fn token_bools(token: Option<Token>) -> Result<Vec<bool>, EngineError> {
    match token {
        Some(Token::Array(items)) => items
            .into_iter()
            .map(|item| {
                item.into_bool()
                    .ok_or_else(|| EngineError::Abi("expected bool".into()))
            })
            .collect(),
        _ => Err(EngineError::Abi("expected bool array".into())),
    }
}

fn token_uint(token: Option<Token>) -> Result<U256, EngineError> {
    token
        .and_then(|t| t.into_uint())
        .ok_or_else(|| EngineError::Abi("expected uint".into()))
}
