// oasys-chain/src/traits.rs

//! The engine's collaborator ports.
//!
//! The engine and the chain reference each other; both sides depend on these
//! small capability bundles and concrete implementations are injected at
//! construction time.

use crate::config::ChainConfig;
use crate::header::Header;
use crate::receipt::Log;
use crate::transaction::Transaction;
use crate::types::{Amount, BlockNumber, Gas};
use crate::ChainResult;
use oasys_crypto::{Address, Hash, Keypair, Signature};

/// Read access to the header chain
pub trait ChainHeaderReader: Send + Sync {
    fn chain_config(&self) -> &ChainConfig;

    /// Header by hash and number (the pair disambiguates forks)
    fn get_header(&self, hash: &Hash, number: BlockNumber) -> Option<Header>;

    /// Canonical header by number
    fn get_header_by_number(&self, number: BlockNumber) -> Option<Header>;

    /// Header by hash alone (any branch)
    fn get_header_by_hash(&self, hash: &Hash) -> Option<Header>;

    fn get_canonical_hash(&self, number: BlockNumber) -> Option<Hash>;

    /// The current chain head
    fn current_header(&self) -> Header;
}

/// Block reference for read-only contract calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    Number(BlockNumber),
    Hash(Hash),
    Latest,
}

/// Read-only contract calls against historical state
pub trait ContractCaller: Send + Sync {
    fn call(&self, to: Address, input: Vec<u8>, block: BlockRef) -> ChainResult<Vec<u8>>;
}

/// Output of an EVM message call
#[derive(Debug, Clone)]
pub struct EvmOutput {
    pub return_data: Vec<u8>,
    pub gas_left: Gas,
}

/// Message-call execution against the block's mutable state
pub trait Evm {
    fn call(
        &mut self,
        caller: Address,
        to: Address,
        input: &[u8],
        gas: Gas,
        value: &Amount,
    ) -> ChainResult<EvmOutput>;
}

/// Mutable account state of the block under construction/validation
pub trait StateDb {
    fn get_code(&self, address: &Address) -> Vec<u8>;
    fn set_code(&mut self, address: &Address, code: Vec<u8>);
    fn get_state(&self, address: &Address, slot: &Hash) -> Hash;
    fn set_state(&mut self, address: &Address, slot: Hash, value: Hash);
    fn get_nonce(&self, address: &Address) -> u64;
    fn set_nonce(&mut self, address: &Address, nonce: u64);
    fn add_balance(&mut self, address: &Address, amount: &Amount);

    /// Mark the transaction being executed (hash + index) for log accounting
    fn prepare(&mut self, tx_hash: Hash, index: usize);

    /// Flush pending journal entries
    fn finalise(&mut self);

    fn get_logs(&self, tx_hash: &Hash) -> Vec<Log>;

    /// State root over the current contents
    fn intermediate_root(&mut self) -> Hash;
}

/// Seal signing callback installed via `authorize`. The payload is the
/// 32-byte seal hash.
pub type SealSignFn =
    Box<dyn Fn(Address, &str, &[u8]) -> ChainResult<Signature> + Send + Sync>;

/// Mime type passed to [`SealSignFn`] for consensus seals
pub const MIMETYPE_SEAL: &str = "application/x-oasys-seal";

/// Transaction signing for locally constructed system transactions
pub trait TxSigner: Send + Sync {
    fn sign_tx(
        &self,
        account: Address,
        tx: Transaction,
        chain_id: u64,
    ) -> ChainResult<Transaction>;
}

/// In-process signer backed by a keypair; hosts with a keystore provide
/// their own implementations of the signing ports.
pub struct KeypairSigner {
    keypair: Keypair,
}

impl KeypairSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    /// Produce a [`SealSignFn`] bound to this keypair
    pub fn seal_fn(self: std::sync::Arc<Self>) -> SealSignFn {
        Box::new(move |account, _mimetype, payload| {
            if account != self.keypair.address() {
                return Err(crate::ChainError::SignerUnavailable(format!(
                    "no key for {account}"
                )));
            }
            let digest = Hash::from_slice(payload)
                .map_err(|_| crate::ChainError::SignerUnavailable("payload is not a digest".into()))?;
            Ok(self.keypair.sign_hash(&digest)?)
        })
    }
}

impl TxSigner for KeypairSigner {
    fn sign_tx(
        &self,
        account: Address,
        tx: Transaction,
        chain_id: u64,
    ) -> ChainResult<Transaction> {
        if account != self.keypair.address() {
            return Err(crate::ChainError::SignerUnavailable(format!(
                "no key for {account}"
            )));
        }
        tx.signed(&self.keypair, chain_id)
    }
}
