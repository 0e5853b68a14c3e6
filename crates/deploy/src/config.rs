use std::{path::PathBuf, time::Duration};

use alloy_core::primitives::B256;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{chain::RpcSettings, signer::DeployerSource, verify::ExplorerConfig};

/// Default directory holding compiled artifacts (hardhat layout).
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";
/// Default directory holding the deployment ledger.
pub const DEFAULT_DEPLOYMENTS_DIR: &str = "deployments";

/// Everything a deployment run needs from the outside world.
///
/// Built once by the caller and handed to the orchestrator; no component reads the
/// environment on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Name of the target network, for logs and summaries.
    pub network: String,
    /// JSON-RPC endpoint of the target network. Required.
    pub rpc_url: Url,
    /// Source of the deployer account. Defaults to the node's first account.
    #[serde(default)]
    pub deployer: DeployerSource,
    pub artifacts_dir: PathBuf,
    pub deployments_dir: PathBuf,
    /// Block explorer used for verification on live networks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer: Option<ExplorerConfig>,
    pub confirmation_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
    /// Deploy even when the ledger holds a deployment of the same creation code.
    #[serde(default)]
    pub redeploy: bool,
    /// Hash of a deployment broadcast by an interrupted run, to be recorded instead of
    /// sending a new transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconcile_tx: Option<B256>,
}

impl RuntimeConfig {
    /// A configuration with default paths and timings.
    pub fn new(network: impl Into<String>, rpc_url: Url) -> Self {
        let rpc = RpcSettings::default();
        Self {
            network: network.into(),
            rpc_url,
            deployer: DeployerSource::default(),
            artifacts_dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            deployments_dir: PathBuf::from(DEFAULT_DEPLOYMENTS_DIR),
            explorer: None,
            confirmation_timeout_secs: rpc.confirmation_timeout.as_secs(),
            poll_interval_ms: rpc.poll_interval.as_millis() as u64,
            request_timeout_secs: rpc.request_timeout.as_secs(),
            redeploy: false,
            reconcile_tx: None,
        }
    }

    pub fn rpc_settings(&self) -> RpcSettings {
        RpcSettings {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            confirmation_timeout: Duration::from_secs(self.confirmation_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip_through_rpc_settings() {
        let config = RuntimeConfig::new("localhost", "http://127.0.0.1:8545".parse().unwrap());

        assert_eq!(config.rpc_settings(), RpcSettings::default());
        assert_eq!(config.deployer, DeployerSource::NodeAccount(0));
    }

    #[test]
    fn test_deserialize_minimal_config() {
        let config: RuntimeConfig = serde_json::from_value(serde_json::json!({
            "network": "goerli",
            "rpc_url": "https://goerli.example.org",
            "deployer": { "private_key": "0x01" },
            "artifacts_dir": "out",
            "deployments_dir": "deployments",
            "confirmation_timeout_secs": 60,
            "poll_interval_ms": 500,
            "request_timeout_secs": 5
        }))
        .unwrap();

        assert_eq!(config.deployer, DeployerSource::PrivateKey("0x01".to_string()));
        assert!(!config.redeploy);
        assert!(config.explorer.is_none());
        assert_eq!(config.rpc_settings().poll_interval, Duration::from_millis(500));
    }
}
