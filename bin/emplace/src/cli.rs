use std::path::PathBuf;

use alloy_core::primitives::B256;
use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;

/// Default configuration file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "Emplace.toml";

#[derive(Parser)]
#[command(name = "emplace")]
#[command(
    author,
    version,
    about = "Deploy a compiled contract to an EVM chain, exactly once"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "EMPLACE_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the configuration file.
    ///
    /// A missing file is only an error when the path was given explicitly.
    #[arg(long, global = true, alias = "conf", env = "EMPLACE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy a contract unless the same deployment is already recorded.
    Deploy(DeployArgs),
}

#[derive(Debug, Clone, Args)]
pub struct DeployArgs {
    /// Name of the target network, as configured under `[networks.<name>]`.
    ///
    /// `localhost` and `hardhat` are always available and point at http://127.0.0.1:8545.
    #[arg(long, env = "EMPLACE_NETWORK")]
    pub network: String,

    /// Name of the contract to deploy.
    #[arg(long, alias = "tag")]
    pub tags: String,

    /// Constructor arguments, overriding `[contracts.<name>].args`.
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    pub args: Option<Vec<String>>,

    /// Deploy even if the recorded deployment matches the current artifact.
    #[arg(long, env = "EMPLACE_REDEPLOY", default_value_t = false)]
    pub redeploy: bool,

    /// Hash of a deployment transaction broadcast by an interrupted run.
    ///
    /// The transaction is awaited and recorded instead of sending a new one.
    #[arg(long)]
    pub reconcile_tx: Option<B256>,

    #[clap(flatten)]
    pub secrets: Secrets,
}

/// Credentials, usually provided through the environment.
#[derive(Clone, Default, Args)]
pub struct Secrets {
    /// Hex-encoded private key of the deployer account.
    #[arg(long, env = "DEPLOYER_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// BIP-39 mnemonic of the deployer account.
    #[arg(long, env = "DEPLOYER_MNEMONIC", hide_env_values = true)]
    pub mnemonic: Option<String>,

    /// API key of the block explorer used for source verification.
    #[arg(long, env = "ETHERSCAN_API_KEY", hide_env_values = true)]
    pub etherscan_api_key: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("private_key", &self.private_key.as_ref().map(|_| "***"))
            .field("mnemonic", &self.mnemonic.as_ref().map(|_| "***"))
            .field("etherscan_api_key", &self.etherscan_api_key.as_ref().map(|_| "***"))
            .finish()
    }
}
