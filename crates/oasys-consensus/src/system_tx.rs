// oasys-consensus/src/system_tx.rs

//! Zero-priced system transactions.
//!
//! The proposer drives the on-chain engine state with transactions signed by
//! the block's coinbase at gas price zero. While mining the engine signs and
//! inserts them; while verifying it reconstructs the expected call and
//! requires the received transaction to match, consuming a queue that must
//! be empty when finalization ends.

use crate::environment::EnvironmentValue;
use crate::validators::{address_to_h160, amount_to_uint, encode_call};
use crate::{environment_address, stake_manager_address, EngineError};
use ethers_core::abi::Token;
use ethers_core::types::U256;
use oasys_chain::config::ChainConfig;
use oasys_chain::header::Header;
use oasys_chain::receipt::Receipt;
use oasys_chain::traits::{Evm, StateDb, TxSigner};
use oasys_chain::transaction::Transaction;
use oasys_chain::types::{Amount, Gas};
use oasys_crypto::Address;
use std::collections::VecDeque;

/// Gas allowance of a single system call
pub const SYSTEM_TX_GAS: Gas = 9_000_000;

/// Shared mutable state of one finalization pass
pub struct SystemTxContext<'a> {
    pub config: &'a ChainConfig,
    pub header: &'a Header,
    pub state: &'a mut dyn StateDb,
    pub evm: &'a mut dyn Evm,
    pub txs: &'a mut Vec<Transaction>,
    pub receipts: &'a mut Vec<Receipt>,
    /// Proposer-signed transactions taken from the block body; `None` while
    /// mining
    pub received: Option<&'a mut VecDeque<Transaction>>,
    pub used_gas: &'a mut Gas,
    /// Local signer; `Some` while mining
    pub tx_signer: Option<&'a dyn TxSigner>,
    /// System transactions applied so far; also the insertion position
    pub applied: usize,
}

impl<'a> SystemTxContext<'a> {
    pub fn mining(&self) -> bool {
        self.tx_signer.is_some()
    }

    /// The queue invariant at the end of `finalize`: nothing left over
    pub fn finish(self) -> Result<(), EngineError> {
        match self.received {
            Some(received) if !received.is_empty() => Err(EngineError::ExtraSystemTx),
            _ => Ok(()),
        }
    }
}

/// Install the environment and stake manager state. Runs exactly at block 1.
pub fn initialize_system_contracts(
    ctx: &mut SystemTxContext<'_>,
    initial: &EnvironmentValue,
) -> Result<(), EngineError> {
    let environment_call = encode_call(
        "initialize(address,(uint256,uint256,uint256,uint256,uint256,uint256,uint256,uint256,uint256))",
        &[
            Token::Address(address_to_h160(&stake_manager_address())),
            environment_token(initial),
        ],
    );
    apply_transaction(ctx, environment_address(), environment_call)?;

    let stake_manager_call = encode_call(
        "initialize(address)",
        &[Token::Address(address_to_h160(&environment_address()))],
    );
    apply_transaction(ctx, stake_manager_address(), stake_manager_call)?;

    tracing::info!(block = ctx.header.number, "initialized system contracts");
    Ok(())
}

/// Publish the next environment value. Runs at the midpoint of the epoch
/// preceding its `start_epoch`.
pub fn update_environment_value(
    ctx: &mut SystemTxContext<'_>,
    next: &EnvironmentValue,
) -> Result<(), EngineError> {
    let call = encode_call(
        "updateValue((uint256,uint256,uint256,uint256,uint256,uint256,uint256,uint256,uint256))",
        &[environment_token(next)],
    );
    apply_transaction(ctx, environment_address(), call)?;
    tracing::info!(
        block = ctx.header.number,
        start_epoch = next.start_epoch,
        "scheduled environment update"
    );
    Ok(())
}

/// Report a missed turn: the expected validator failed to seal its slot.
/// `schedule` is the epoch's ordered proposer assignment; the contract
/// receives the number of slots the absentee held.
pub fn slash(
    ctx: &mut SystemTxContext<'_>,
    expected: Address,
    schedule: &[Address],
) -> Result<(), EngineError> {
    let blocks = schedule.iter().filter(|slot| **slot == expected).count() as u64;
    let call = encode_call(
        "slash(address,uint256)",
        &[
            Token::Address(address_to_h160(&expected)),
            Token::Uint(U256::from(blocks)),
        ],
    );
    apply_transaction(ctx, stake_manager_address(), call)?;
    tracing::debug!(
        block = ctx.header.number,
        validator = %expected,
        blocks,
        "slashed absent validator"
    );
    Ok(())
}

/// Run one system call: resolve the transaction (sign or match), execute it
/// against the EVM, account gas, advance the sender nonce and record the
/// receipt. System transactions occupy the front of the block in
/// construction order.
fn apply_transaction(
    ctx: &mut SystemTxContext<'_>,
    to: Address,
    input: Vec<u8>,
) -> Result<(), EngineError> {
    let coinbase = ctx.header.coinbase;
    let chain_id = ctx.config.chain_id;
    let nonce = ctx.state.get_nonce(&coinbase);
    let expected = Transaction::call(
        nonce,
        to,
        Amount::zero(),
        SYSTEM_TX_GAS,
        Amount::zero(),
        input,
    );

    let tx = if let Some(signer) = ctx.tx_signer {
        signer.sign_tx(coinbase, expected, chain_id)?
    } else {
        let received = ctx
            .received
            .as_mut()
            .ok_or(EngineError::SystemTxMismatch)?;
        let actual = received.pop_front().ok_or(EngineError::SystemTxMismatch)?;
        if actual.sig_hash(chain_id) != expected.sig_hash(chain_id) {
            return Err(EngineError::SystemTxMismatch);
        }
        actual
    };

    let tx_hash = tx.hash();
    let index = ctx.applied;
    ctx.state.prepare(tx_hash, index);
    let output = ctx.evm.call(coinbase, to, &tx.input, tx.gas, &tx.value)?;
    let gas_used = tx.gas.saturating_sub(output.gas_left);
    ctx.state.set_nonce(&coinbase, nonce + 1);
    ctx.state.finalise();

    let logs = ctx.state.get_logs(&tx_hash);
    let receipt = Receipt::successful(tx_hash, gas_used, logs, ctx.header.number, index);

    ctx.txs.insert(index, tx);
    ctx.receipts.insert(index, receipt);
    *ctx.used_gas += gas_used;
    ctx.applied += 1;
    Ok(())
}

fn environment_token(value: &EnvironmentValue) -> Token {
    Token::Tuple(vec![
        Token::Uint(U256::from(value.start_block)),
        Token::Uint(U256::from(value.start_epoch)),
        Token::Uint(U256::from(value.block_period)),
        Token::Uint(U256::from(value.epoch_period)),
        Token::Uint(U256::from(value.reward_rate)),
        Token::Uint(U256::from(value.commission_rate)),
        Token::Uint(amount_to_uint(&value.validator_threshold)),
        Token::Uint(U256::from(value.jail_threshold)),
        Token::Uint(U256::from(value.jail_period)),
    ])
}
