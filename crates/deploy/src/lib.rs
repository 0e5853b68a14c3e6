//! emplace-deploy - Idempotent deployment of a compiled contract to an EVM chain.
//!
//! A run classifies the target network, consults the deployment ledger, submits the
//! creation transaction when the recorded deployment is missing or outdated, waits for a
//! tier-dependent number of confirmations and finally asks a block explorer to verify the
//! sources. Verification is best-effort and never fails a run.

mod artifact;
mod chain;
mod config;
mod error;
mod executor;
mod fingerprint;
mod guard;
mod ledger;
mod network;
mod orchestrator;
mod rpc;
mod signer;
mod verify;

pub use artifact::{Artifact, ArtifactSource, BuildInfo, FsArtifacts};
pub use chain::{ChainClient, RpcChainClient, RpcSettings, TransactionReceipt};
pub use config::{DEFAULT_ARTIFACTS_DIR, DEFAULT_DEPLOYMENTS_DIR, RuntimeConfig};
pub use error::{DeployError, VerificationError};
pub use executor::{DeploymentRequest, ExecutionState, Executor, PreparedDeployment};
pub use fingerprint::DeploymentFingerprint;
pub use guard::{GuardDecision, IdempotencyGuard};
pub use ledger::{DeploymentLedger, DeploymentRecord, FsLedger};
pub use network::{ChainContext, LIVE_CONFIRMATIONS, LOCAL_CHAIN_ID, NetworkTier};
pub use orchestrator::{DefaultOrchestrator, Orchestrator, RunOptions};
pub use signer::{
    DEPLOYER_ACCOUNT, DeployTransaction, DeployerIdentity, DeployerSource, SealedTransaction,
};
pub use verify::{
    EtherscanVerifier, ExplorerConfig, VerificationOutcome, VerificationRequest,
    VerificationTrigger, Verifier,
};
