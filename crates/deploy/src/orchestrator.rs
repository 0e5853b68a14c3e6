//! The deployment workflow: classify, guard, execute, verify.

use anyhow::{Context, Result};

use crate::{
    artifact::{ArtifactSource, FsArtifacts},
    chain::{ChainClient, RpcChainClient},
    config::RuntimeConfig,
    error::DeployError,
    executor::{DeploymentRequest, Executor, PreparedDeployment},
    guard::{GuardDecision, IdempotencyGuard},
    ledger::{DeploymentLedger, DeploymentRecord, FsLedger},
    network::ChainContext,
    signer::{DEPLOYER_ACCOUNT, DeployerIdentity, DeployerSource},
    verify::{EtherscanVerifier, VerificationRequest, VerificationTrigger, Verifier},
};

/// Per-run switches of the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub deployer: DeployerSource,
    pub redeploy: bool,
    pub reconcile_tx: Option<alloy_core::primitives::B256>,
}

/// Sequences one deployment run.
///
/// Only the fatal [`DeployError`] classes escape [`Orchestrator::run`] once the chain has been
/// contacted; verification problems are logged and dropped.
pub struct Orchestrator<C, A, L, V> {
    chain: C,
    artifacts: A,
    ledger: L,
    verifier: Option<V>,
    options: RunOptions,
}

/// The orchestrator wired to JSON-RPC, the filesystem and Etherscan.
pub type DefaultOrchestrator = Orchestrator<RpcChainClient, FsArtifacts, FsLedger, EtherscanVerifier>;

impl DefaultOrchestrator {
    pub fn from_config(config: &RuntimeConfig) -> Result<Self> {
        let chain = RpcChainClient::new(config.rpc_url.clone(), config.rpc_settings())
            .context("Failed to create RPC client")?;
        let verifier = config
            .explorer
            .clone()
            .map(EtherscanVerifier::new)
            .transpose()
            .context("Failed to create block explorer client")?;

        Ok(Self::new(
            chain,
            FsArtifacts::new(&config.artifacts_dir),
            FsLedger::new(&config.deployments_dir),
            verifier,
            RunOptions {
                deployer: config.deployer.clone(),
                redeploy: config.redeploy,
                reconcile_tx: config.reconcile_tx,
            },
        ))
    }
}

impl<C, A, L, V> Orchestrator<C, A, L, V>
where
    C: ChainClient,
    A: ArtifactSource,
    L: DeploymentLedger,
    V: Verifier,
{
    pub fn new(chain: C, artifacts: A, ledger: L, verifier: Option<V>, options: RunOptions) -> Self {
        Self {
            chain,
            artifacts,
            ledger,
            verifier,
            options,
        }
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Resolve the chain identity and its trust tier.
    pub async fn classify(&self) -> Result<ChainContext, DeployError> {
        let chain_id = self
            .chain
            .chain_id()
            .await
            .map_err(DeployError::chain_unreachable)?;
        let ctx = ChainContext::new(chain_id);

        tracing::info!(
            chain_id = %ctx.chain_id,
            tier = %ctx.tier,
            confirmations = ctx.confirmations(),
            "Network classified"
        );

        Ok(ctx)
    }

    /// Deploy `request` unless the ledger already holds the same deployment.
    pub async fn run(&self, request: DeploymentRequest) -> Result<DeploymentRecord> {
        let contract_name = request.contract_name.clone();

        if request.deployer != DEPLOYER_ACCOUNT {
            anyhow::bail!(
                "Unknown named account '{}', only '{}' is configured",
                request.deployer,
                DEPLOYER_ACCOUNT
            );
        }

        let artifact = self
            .artifacts
            .artifact(&contract_name)
            .context(format!("Failed to load artifact of {contract_name}"))?;
        let deployment = PreparedDeployment::new(request, artifact)
            .context(format!("Failed to prepare deployment of {contract_name}"))?;

        let ctx = self.classify().await?;

        let decision = IdempotencyGuard::new(&self.ledger, self.options.redeploy)
            .evaluate(&self.chain, &contract_name, &ctx.chain_id, &deployment.fingerprint)
            .await?;

        let previous = match decision {
            GuardDecision::Reuse(record) => {
                if let Some(tx_hash) = self.options.reconcile_tx {
                    tracing::warn!(
                        contract = %contract_name,
                        tx_hash = %tx_hash,
                        address = %record.address,
                        "Recorded deployment is current, ignoring the reconciliation hash"
                    );
                }
                return Ok(record);
            }
            GuardDecision::Deploy { previous } => previous,
        };

        if let Some(previous) = &previous {
            tracing::info!(
                contract = %contract_name,
                replaces = %previous.address,
                "Deploying new version"
            );
        }

        let identity = DeployerIdentity::resolve(&self.options.deployer, &self.chain).await?;
        let executor = Executor::new(&self.chain, &identity);

        let record = match self.options.reconcile_tx {
            Some(tx_hash) => {
                executor
                    .reconcile(tx_hash, &deployment, &ctx, &self.ledger)
                    .await?
            }
            None => executor.execute(&deployment, &ctx, &self.ledger).await?,
        };

        let verification = VerificationRequest {
            address: record.address,
            constructor_args: deployment.encoded_args.clone(),
            contract_name: deployment.artifact.contract_name.clone(),
            source_name: deployment.artifact.source_name.clone(),
            build_info: deployment.artifact.build_info.clone(),
        };
        // Logged by the trigger, never part of the result.
        let _ = VerificationTrigger::new(self.verifier.as_ref())
            .verify(&record, &ctx, &verification)
            .await;

        Ok(record)
    }
}
