//! Project configuration: `Emplace.toml` layered with `EMPLACE_*` environment variables.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use emplace_deploy::{
    DEFAULT_ARTIFACTS_DIR, DEFAULT_DEPLOYMENTS_DIR, DeployerSource, ExplorerConfig, RuntimeConfig,
};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cli::{DEFAULT_CONFIG_FILE, DeployArgs, Secrets};

/// Networks available without any configuration.
const BUILTIN_NETWORKS: [&str; 2] = ["localhost", "hardhat"];
const BUILTIN_RPC_URL: &str = "http://127.0.0.1:8545";

/// Contents of `Emplace.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
    #[serde(default)]
    pub contracts: BTreeMap<String, ContractConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    pub artifacts: PathBuf,
    pub deployments: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            artifacts: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            deployments: PathBuf::from(DEFAULT_DEPLOYMENTS_DIR),
        }
    }
}

/// Overrides of the RPC timings; unset values keep the library defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    pub confirmation_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub request_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub url: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer: Option<ExplorerSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounts: Option<AccountsConfig>,
}

/// Block explorer of a network. The key may instead come from `ETHERSCAN_API_KEY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerSection {
    pub api_url: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Deployer account of a network when no key is given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,
    /// Derivation index with a mnemonic, `eth_accounts` position otherwise.
    #[serde(default)]
    pub index: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    #[serde(default)]
    pub args: Vec<String>,
}

impl ProjectConfig {
    /// Load the configuration file, then apply `EMPLACE_*` overrides.
    ///
    /// Nested keys are separated by `__`, e.g. `EMPLACE_NETWORKS__GOERLI__URL`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if explicit && !path.exists() {
            anyhow::bail!("Configuration file not found: {}", path.display());
        }

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("EMPLACE_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

        tracing::debug!(
            path = %path.display(),
            networks = config.networks.len(),
            contracts = config.contracts.len(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Look up a network, falling back to the built-in local ones.
    pub fn network(&self, name: &str) -> Result<NetworkConfig> {
        if let Some(network) = self.networks.get(name) {
            return Ok(network.clone());
        }

        if BUILTIN_NETWORKS.contains(&name) {
            return Ok(NetworkConfig {
                url: BUILTIN_RPC_URL.parse()?,
                explorer: None,
                accounts: None,
            });
        }

        let known = self
            .networks
            .keys()
            .map(String::as_str)
            .chain(BUILTIN_NETWORKS)
            .collect::<Vec<_>>()
            .join(", ");
        anyhow::bail!("Unknown network '{name}', known networks: {known}")
    }

    /// Constructor arguments of a contract: the command line wins over the file.
    pub fn constructor_args(&self, contract: &str, cli_args: Option<&[String]>) -> Vec<String> {
        match cli_args {
            Some(args) => args.to_vec(),
            None => self
                .contracts
                .get(contract)
                .map(|c| c.args.clone())
                .unwrap_or_default(),
        }
    }

    /// Assemble everything one deployment run needs.
    pub fn runtime(&self, args: &DeployArgs) -> Result<RuntimeConfig> {
        let network = self.network(&args.network)?;

        let mut config = RuntimeConfig::new(args.network.clone(), network.url.clone());
        config.deployer = deployer_source(&args.secrets, network.accounts.as_ref());
        config.explorer = explorer(&args.network, &args.secrets, network.explorer.as_ref());
        config.artifacts_dir = self.paths.artifacts.clone();
        config.deployments_dir = self.paths.deployments.clone();
        config.redeploy = args.redeploy;
        config.reconcile_tx = args.reconcile_tx;

        if let Some(secs) = self.timeouts.confirmation_secs {
            config.confirmation_timeout_secs = secs;
        }
        if let Some(ms) = self.timeouts.poll_interval_ms {
            config.poll_interval_ms = ms;
        }
        if let Some(secs) = self.timeouts.request_secs {
            config.request_timeout_secs = secs;
        }

        Ok(config)
    }
}

/// Private key, then mnemonic, then a node-managed account.
fn deployer_source(secrets: &Secrets, accounts: Option<&AccountsConfig>) -> DeployerSource {
    let index = accounts.map(|a| a.index).unwrap_or_default();

    if let Some(key) = &secrets.private_key {
        return DeployerSource::PrivateKey(key.clone());
    }

    let mnemonic = secrets
        .mnemonic
        .clone()
        .or_else(|| accounts.and_then(|a| a.mnemonic.clone()));

    match mnemonic {
        Some(phrase) => DeployerSource::Mnemonic { phrase, index },
        None => DeployerSource::NodeAccount(index as usize),
    }
}

fn explorer(
    network: &str,
    secrets: &Secrets,
    section: Option<&ExplorerSection>,
) -> Option<ExplorerConfig> {
    let section = section?;

    match section.api_key.clone().or_else(|| secrets.etherscan_api_key.clone()) {
        Some(api_key) => Some(ExplorerConfig {
            api_url: section.api_url.clone(),
            api_key,
        }),
        None => {
            tracing::warn!(
                network = %network,
                "Block explorer configured without an API key, verification disabled"
            );
            None
        }
    }
}
