// oasys-chain/src/config.rs

use crate::types::BlockNumber;
use serde::{Deserialize, Serialize};

/// Oasys mainnet chain id
pub const MAINNET_CHAIN_ID: u64 = 248;

/// Oasys testnet chain id
pub const TESTNET_CHAIN_ID: u64 = 9372;

/// Consensus parameters of the Oasys engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OasysConfig {
    /// Target seconds between blocks at genesis
    pub period: u64,
    /// Blocks per epoch at genesis
    pub epoch: u64,
    /// First epoch governed by the shortened-block-time rules. Toggles the
    /// extra-data commitment shape, the extended difficulty formula and the
    /// seed-width calculation for every epoch at or past it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortened_block_time_start_epoch: Option<u64>,
}

impl Default for OasysConfig {
    fn default() -> Self {
        Self {
            period: 15,
            epoch: 5760,
            shortened_block_time_start_epoch: None,
        }
    }
}

/// Chain-wide configuration: identity, fork schedule, consensus parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    /// EIP-1559 activation height
    #[serde(skip_serializing_if = "Option::is_none")]
    pub london_block: Option<BlockNumber>,
    pub oasys: OasysConfig,
}

impl ChainConfig {
    pub fn mainnet() -> Self {
        Self {
            chain_id: MAINNET_CHAIN_ID,
            london_block: Some(0),
            oasys: OasysConfig {
                period: 15,
                epoch: 5760,
                shortened_block_time_start_epoch: Some(419),
            },
        }
    }

    pub fn testnet() -> Self {
        Self {
            chain_id: TESTNET_CHAIN_ID,
            london_block: Some(0),
            oasys: OasysConfig {
                period: 15,
                epoch: 5760,
                shortened_block_time_start_epoch: Some(699),
            },
        }
    }

    /// A private-network configuration with explicit consensus parameters
    pub fn local(chain_id: u64, period: u64, epoch: u64) -> Self {
        Self {
            chain_id,
            london_block: None,
            oasys: OasysConfig {
                period,
                epoch,
                shortened_block_time_start_epoch: None,
            },
        }
    }

    pub fn is_mainnet(&self) -> bool {
        self.chain_id == MAINNET_CHAIN_ID
    }

    pub fn is_testnet(&self) -> bool {
        self.chain_id == TESTNET_CHAIN_ID
    }

    pub fn is_london(&self, number: BlockNumber) -> bool {
        self.london_block.map_or(false, |fork| number >= fork)
    }

    /// Whether the shortened-block-time rules govern the given epoch
    pub fn is_shortened_block_time_epoch(&self, epoch: u64) -> bool {
        self.oasys
            .shortened_block_time_start_epoch
            .map_or(false, |fork| epoch >= fork)
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::local(12345, 15, 5760)
    }
}
