//! Error taxonomy of a deployment run.

use alloy_core::primitives::{Address, U256};
use derive_more::{Display, Error};

/// Errors that abort a deployment run.
///
/// These are the only failures the orchestrator lets reach the caller. They travel inside
/// `anyhow::Error` and can be recovered with `downcast_ref::<DeployError>()`.
#[derive(Debug, Display, Error)]
pub enum DeployError {
    /// The chain RPC endpoint could not be reached or answered with garbage.
    #[display("chain unreachable: {reason}")]
    ChainUnreachable { reason: String },

    /// The deployer cannot pay for the deployment transaction.
    #[display(
        "insufficient funds: deployer {deployer} has {balance} wei, deployment needs {required} wei"
    )]
    InsufficientFunds {
        deployer: Address,
        balance: U256,
        required: U256,
    },

    /// The transaction reverted, was rejected, or was not confirmed in time.
    #[display("deployment failed: {reason}")]
    DeploymentFailed { reason: String },
}

impl DeployError {
    pub fn chain_unreachable(err: impl std::fmt::Display) -> Self {
        Self::ChainUnreachable {
            reason: format!("{err:#}"),
        }
    }

    pub fn deployment_failed(err: impl std::fmt::Display) -> Self {
        Self::DeploymentFailed {
            reason: format!("{err:#}"),
        }
    }
}

/// Failure of the best-effort verification step. Never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("verification failed: {detail}")]
pub struct VerificationError {
    pub detail: String,
}

impl VerificationError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_error_survives_anyhow() {
        let err: anyhow::Error = DeployError::DeploymentFailed {
            reason: "reverted".to_string(),
        }
        .into();

        let err = err.context("Deployment of Counter aborted");

        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::DeploymentFailed { .. })
        ));
    }

    #[test]
    fn test_chain_unreachable_keeps_context_chain() {
        let inner = anyhow::anyhow!("connection refused").context("Failed to send eth_chainId request");
        let err = DeployError::chain_unreachable(inner);

        assert_eq!(
            err.to_string(),
            "chain unreachable: Failed to send eth_chainId request: connection refused"
        );
    }
}
