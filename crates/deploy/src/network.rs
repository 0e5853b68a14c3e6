//! Network classification and confirmation policy.

use serde::{Deserialize, Serialize};

/// Chain id reported by hardhat and anvil development nodes.
pub const LOCAL_CHAIN_ID: &str = "31337";

/// Confirmations required on public networks before a deployment is final.
pub const LIVE_CONFIRMATIONS: u64 = 5;

/// Trust tier of a network.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NetworkTier {
    /// Development node that mines transactions as they arrive.
    Local,
    /// Public network with probabilistic finality.
    Live,
}

impl NetworkTier {
    /// Classify a chain id. Total: every string is a valid input.
    pub fn classify(chain_id: &str) -> Self {
        if chain_id == LOCAL_CHAIN_ID {
            Self::Local
        } else {
            Self::Live
        }
    }

    /// Number of blocks that must be mined on top of the deployment block.
    ///
    /// Local nodes auto-mine, so the receipt alone is final.
    pub const fn confirmations(self) -> u64 {
        match self {
            Self::Local => 0,
            Self::Live => LIVE_CONFIRMATIONS,
        }
    }

    pub const fn is_local(self) -> bool {
        matches!(self, Self::Local)
    }
}

/// Chain identity resolved once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainContext {
    pub chain_id: String,
    pub tier: NetworkTier,
}

impl ChainContext {
    pub fn new(chain_id: impl Into<String>) -> Self {
        let chain_id = chain_id.into();
        let tier = NetworkTier::classify(&chain_id);
        Self { chain_id, tier }
    }

    pub fn confirmations(&self) -> u64 {
        self.tier.confirmations()
    }

    /// The chain id as an EIP-155 integer, when it is numeric.
    pub fn numeric_id(&self) -> Option<u64> {
        self.chain_id.parse().ok()
    }
}
