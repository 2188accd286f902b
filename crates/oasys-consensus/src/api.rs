// oasys-consensus/src/api.rs

//! Read-only inspection API behind the `oasys` RPC namespace.

use crate::engine::Oasys;
use crate::snapshot::Snapshot;
use crate::{EngineError, EngineResult};
use oasys_chain::header::Header;
use oasys_chain::traits::ChainHeaderReader;
use oasys_chain::types::BlockNumber;
use oasys_crypto::{Address, Hash};
use std::sync::Arc;

/// Engine inspection handle handed to the RPC host
pub struct OasysApi {
    engine: Arc<Oasys>,
    chain: Arc<dyn ChainHeaderReader>,
}

impl OasysApi {
    pub fn new(engine: Arc<Oasys>, chain: Arc<dyn ChainHeaderReader>) -> Self {
        Self { engine, chain }
    }

    fn header_at(&self, number: Option<BlockNumber>) -> EngineResult<Header> {
        match number {
            None => Ok(self.chain.current_header()),
            Some(number) => self
                .chain
                .get_header_by_number(number)
                .ok_or(EngineError::UnknownBlock),
        }
    }

    /// Snapshot at the given block number (head when `None`)
    pub fn get_snapshot(&self, number: Option<BlockNumber>) -> EngineResult<Snapshot> {
        let header = self.header_at(number)?;
        self.engine
            .snapshot(&*self.chain, header.number, header.hash(), &[])
    }

    /// Snapshot at the given block hash
    pub fn get_snapshot_at_hash(&self, hash: Hash) -> EngineResult<Snapshot> {
        let header = self
            .chain
            .get_header_by_hash(&hash)
            .ok_or(EngineError::UnknownBlock)?;
        self.engine
            .snapshot(&*self.chain, header.number, header.hash(), &[])
    }

    /// Authorized validators at the given block number (head when `None`)
    pub fn get_validators(&self, number: Option<BlockNumber>) -> EngineResult<Vec<Address>> {
        self.get_snapshot(number).map(|s| s.ordered().0)
    }

    /// Authorized validators at the given block hash
    pub fn get_validators_at_hash(&self, hash: Hash) -> EngineResult<Vec<Address>> {
        self.get_snapshot_at_hash(hash).map(|s| s.ordered().0)
    }
}

impl Oasys {
    /// The engine's RPC surface
    pub fn apis(self: &Arc<Self>, chain: Arc<dyn ChainHeaderReader>) -> OasysApi {
        OasysApi::new(self.clone(), chain)
    }
}
