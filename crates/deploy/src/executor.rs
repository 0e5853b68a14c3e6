//! Deployment executor: submits the creation transaction and waits for it to be final.
//!
//! A deployment moves strictly forward through
//! `Pending -> Submitted -> Confirming -> Finalized`, or ends in `Failed`. Only `Finalized`
//! writes to the ledger, so a failed deployment leaves the previous record untouched.

use alloy_core::primitives::{Address, B256, Bytes, U256};

use crate::{
    artifact::Artifact,
    chain::{ChainClient, TransactionReceipt},
    error::DeployError,
    fingerprint::DeploymentFingerprint,
    ledger::{DeploymentLedger, DeploymentRecord},
    network::ChainContext,
    signer::{DeployTransaction, DeployerIdentity},
};

/// What to deploy and from which account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    pub contract_name: String,
    /// Constructor arguments, coerced against the ABI at preparation time.
    pub constructor_args: Vec<String>,
    /// Name of the signing account.
    pub deployer: String,
}

/// A request joined with its artifact and the exact creation code it produces.
#[derive(Debug, Clone)]
pub struct PreparedDeployment {
    pub request: DeploymentRequest,
    pub artifact: Artifact,
    pub encoded_args: Bytes,
    pub init_code: Bytes,
    pub fingerprint: String,
}

impl PreparedDeployment {
    pub fn new(request: DeploymentRequest, artifact: Artifact) -> anyhow::Result<Self> {
        let encoded_args = artifact.encode_constructor_args(&request.constructor_args)?;
        let init_code = artifact.init_code(&encoded_args);
        let fingerprint =
            DeploymentFingerprint::new(artifact.bytecode.clone(), encoded_args.clone())
                .compute_hash();

        Ok(Self {
            request,
            artifact,
            encoded_args,
            init_code,
            fingerprint,
        })
    }
}

/// States of a single deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ExecutionState {
    Pending,
    Submitted,
    Confirming,
    Finalized,
    Failed,
}

/// Submits deployments from one identity to one chain.
pub struct Executor<'a, C> {
    chain: &'a C,
    identity: &'a DeployerIdentity,
}

impl<'a, C: ChainClient> Executor<'a, C> {
    pub fn new(chain: &'a C, identity: &'a DeployerIdentity) -> Self {
        Self { chain, identity }
    }

    /// Run a fresh deployment through the whole state machine.
    pub async fn execute<L: DeploymentLedger>(
        &self,
        deployment: &PreparedDeployment,
        ctx: &ChainContext,
        ledger: &L,
    ) -> Result<DeploymentRecord, DeployError> {
        let contract = deployment.request.contract_name.as_str();

        let result = async {
            log_state(ExecutionState::Pending, contract);
            let tx = self.build_transaction(deployment, ctx).await?;
            let from = tx.from;
            let nonce = tx.nonce;

            let sealed = self
                .identity
                .seal(tx)
                .map_err(DeployError::deployment_failed)?;
            let tx_hash = self
                .chain
                .broadcast(&sealed)
                .await
                .map_err(DeployError::deployment_failed)?;
            tracing::info!(
                state = %ExecutionState::Submitted,
                contract = %contract,
                tx_hash = %tx_hash,
                nonce,
                "Deployment transaction broadcast"
            );

            let receipt = self.confirm(tx_hash, contract, ctx).await?;
            let address = receipt
                .contract_address
                .unwrap_or_else(|| from.create(nonce));

            self.finalize(deployment, ctx, ledger, &receipt, address)
        }
        .await;

        log_failure(contract, &result);
        result
    }

    /// Resume a deployment whose transaction was broadcast by an interrupted run.
    ///
    /// Enters the state machine at `Confirming`, after checking that the transaction carries
    /// exactly this deployment's creation code.
    pub async fn reconcile<L: DeploymentLedger>(
        &self,
        tx_hash: B256,
        deployment: &PreparedDeployment,
        ctx: &ChainContext,
        ledger: &L,
    ) -> Result<DeploymentRecord, DeployError> {
        let contract = deployment.request.contract_name.as_str();

        let result = async {
            tracing::info!(contract = %contract, tx_hash = %tx_hash, "Reconciling previously broadcast deployment");

            let input = self
                .chain
                .transaction_input(tx_hash)
                .await
                .map_err(DeployError::chain_unreachable)?
                .ok_or_else(|| DeployError::DeploymentFailed {
                    reason: format!("transaction {tx_hash} is unknown to the node"),
                })?;

            if input != deployment.init_code {
                return Err(DeployError::DeploymentFailed {
                    reason: format!(
                        "transaction {tx_hash} does not carry the creation code of {contract}"
                    ),
                });
            }

            let receipt = self.confirm(tx_hash, contract, ctx).await?;
            let address = receipt.contract_address.ok_or_else(|| DeployError::DeploymentFailed {
                reason: format!("transaction {tx_hash} did not create a contract"),
            })?;

            self.finalize(deployment, ctx, ledger, &receipt, address)
        }
        .await;

        log_failure(contract, &result);
        result
    }

    /// Gather nonce, gas and funds for the creation transaction.
    async fn build_transaction(
        &self,
        deployment: &PreparedDeployment,
        ctx: &ChainContext,
    ) -> Result<DeployTransaction, DeployError> {
        let from = self.identity.address();

        let chain_id = ctx.numeric_id().ok_or_else(|| DeployError::DeploymentFailed {
            reason: format!("chain id {} is not numeric, cannot sign for it", ctx.chain_id),
        })?;

        let nonce = self
            .chain
            .nonce(from)
            .await
            .map_err(DeployError::chain_unreachable)?;
        let gas_price = self
            .chain
            .gas_price()
            .await
            .map_err(DeployError::chain_unreachable)?;
        // Estimation runs the constructor, so a failure here is a failed deployment.
        let gas_limit = self
            .chain
            .estimate_gas(from, &deployment.init_code)
            .await
            .map_err(|e| DeployError::DeploymentFailed {
                reason: format!("gas estimation failed: {e:#}"),
            })?;

        let balance = self
            .chain
            .balance(from)
            .await
            .map_err(DeployError::chain_unreachable)?;
        let required = U256::from(gas_limit) * U256::from(gas_price);

        if balance < required {
            return Err(DeployError::InsufficientFunds {
                deployer: from,
                balance,
                required,
            });
        }

        tracing::debug!(
            from = %from,
            nonce,
            gas_limit,
            gas_price,
            balance = %balance,
            "Deployment transaction built"
        );

        Ok(DeployTransaction {
            from,
            chain_id,
            nonce,
            gas_limit,
            gas_price,
            input: deployment.init_code.clone(),
        })
    }

    async fn confirm(
        &self,
        tx_hash: B256,
        contract: &str,
        ctx: &ChainContext,
    ) -> Result<TransactionReceipt, DeployError> {
        let depth = ctx.confirmations();
        tracing::info!(
            state = %ExecutionState::Confirming,
            contract = %contract,
            tx_hash = %tx_hash,
            confirmations = depth,
            tier = %ctx.tier,
            "Waiting for confirmations"
        );

        let receipt = self
            .chain
            .wait_confirmations(tx_hash, depth)
            .await
            .map_err(DeployError::deployment_failed)?;

        if !receipt.success {
            return Err(DeployError::DeploymentFailed {
                reason: format!(
                    "transaction {tx_hash} reverted in block {}",
                    receipt.block_number
                ),
            });
        }

        Ok(receipt)
    }

    fn finalize<L: DeploymentLedger>(
        &self,
        deployment: &PreparedDeployment,
        ctx: &ChainContext,
        ledger: &L,
        receipt: &TransactionReceipt,
        address: Address,
    ) -> Result<DeploymentRecord, DeployError> {
        let record = DeploymentRecord {
            contract_name: deployment.request.contract_name.clone(),
            address,
            abi: deployment.artifact.abi.clone(),
            transaction_hash: receipt.transaction_hash,
            chain_id: ctx.chain_id.clone(),
            args: deployment.request.constructor_args.clone(),
            fingerprint: deployment.fingerprint.clone(),
            block_number: Some(receipt.block_number),
            deployed_at: chrono::Utc::now().timestamp().max(0) as u64,
        };

        ledger.put(&record).map_err(|e| DeployError::DeploymentFailed {
            reason: format!(
                "contract confirmed at {address} (tx {}) but the ledger write failed: {e:#}",
                receipt.transaction_hash
            ),
        })?;

        tracing::info!(
            state = %ExecutionState::Finalized,
            contract = %record.contract_name,
            address = %record.address,
            tx_hash = %record.transaction_hash,
            block_number = receipt.block_number,
            "Deployment finalized"
        );

        Ok(record)
    }
}

fn log_state(state: ExecutionState, contract: &str) {
    tracing::info!(state = %state, contract = %contract, "Deployment state changed");
}

fn log_failure<T>(contract: &str, result: &Result<T, DeployError>) {
    if let Err(err) = result {
        tracing::error!(
            state = %ExecutionState::Failed,
            contract = %contract,
            error = %err,
            "Deployment failed"
        );
    }
}
