//! Best-effort source verification on a block explorer.
//!
//! Verification is a convenience for people reading the contract on an explorer. Whatever
//! happens here is reported as a [`VerificationOutcome`] and never fails a deployment.

use std::{future::Future, time::Duration};

use alloy_core::primitives::{Address, Bytes};
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    artifact::BuildInfo, error::VerificationError, ledger::DeploymentRecord, network::ChainContext,
};

/// Data an explorer needs to match a deployed contract with its sources.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationRequest {
    pub address: Address,
    /// ABI-encoded constructor arguments.
    pub constructor_args: Bytes,
    pub contract_name: String,
    pub source_name: Option<String>,
    pub build_info: Option<BuildInfo>,
}

/// Result of a verification attempt. Logged, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub succeeded: bool,
    pub error_detail: Option<String>,
}

impl VerificationOutcome {
    pub fn success() -> Self {
        Self {
            succeeded: true,
            error_detail: None,
        }
    }

    pub fn failure(err: VerificationError) -> Self {
        Self {
            succeeded: false,
            error_detail: Some(err.detail),
        }
    }
}

/// A block-explorer verification backend.
pub trait Verifier: Send + Sync {
    fn submit_verification(
        &self,
        request: &VerificationRequest,
    ) -> impl Future<Output = Result<(), VerificationError>> + Send;
}

/// Runs verification for live networks and swallows its failures.
pub struct VerificationTrigger<'a, V> {
    verifier: Option<&'a V>,
}

impl<'a, V: Verifier> VerificationTrigger<'a, V> {
    /// `None` means no explorer is configured for the network.
    pub fn new(verifier: Option<&'a V>) -> Self {
        Self { verifier }
    }

    /// Verify a deployment. Returns `None` on local networks, where nothing is attempted.
    pub async fn verify(
        &self,
        record: &DeploymentRecord,
        ctx: &ChainContext,
        request: &VerificationRequest,
    ) -> Option<VerificationOutcome> {
        if ctx.tier.is_local() {
            tracing::debug!(contract = %record.contract_name, "Local network, skipping verification");
            return None;
        }

        tracing::info!(
            contract = %record.contract_name,
            address = %record.address,
            "Submitting source verification"
        );

        let result = match self.verifier {
            Some(verifier) => verifier.submit_verification(request).await,
            None => Err(VerificationError::new(format!(
                "no block explorer configured for chain {}",
                ctx.chain_id
            ))),
        };

        let outcome = match result {
            Ok(()) => {
                tracing::info!(contract = %record.contract_name, address = %record.address, "Contract verified");
                VerificationOutcome::success()
            }
            Err(err) => {
                tracing::warn!(
                    contract = %record.contract_name,
                    address = %record.address,
                    error = %err,
                    "Verification failed, deployment is unaffected"
                );
                VerificationOutcome::failure(err)
            }
        };

        Some(outcome)
    }
}

/// Block explorer API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// Etherscan-compatible API endpoint, e.g. `https://api-goerli.etherscan.io/api`.
    pub api_url: Url,
    pub api_key: String,
}

/// Etherscan API envelope: `status` is `"1"` on success, `result` carries the payload or
/// the error message.
#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: String,
}

/// Why a status poll did not conclude.
#[derive(Debug)]
enum PollError {
    Pending,
    Failed(VerificationError),
}

/// Verifier speaking the Etherscan `verifysourcecode` API.
#[derive(Debug, Clone)]
pub struct EtherscanVerifier {
    client: reqwest::Client,
    config: ExplorerConfig,
    poll_delay: Duration,
    max_polls: usize,
}

impl EtherscanVerifier {
    pub fn new(config: ExplorerConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: crate::rpc::create_client(Duration::from_secs(30))?,
            config,
            poll_delay: Duration::from_secs(5),
            max_polls: 24,
        })
    }

    async fn post(&self, form: &[(&str, String)]) -> Result<EtherscanResponse, VerificationError> {
        let response = self
            .client
            .post(self.config.api_url.clone())
            .form(form)
            .send()
            .await
            .map_err(|e| VerificationError::new(format!("explorer request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VerificationError::new(format!("explorer answered HTTP {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| VerificationError::new(format!("unreadable explorer response: {e}")))
    }

    async fn check_status(&self, guid: &str) -> Result<(), PollError> {
        let response = self
            .post(&[
                ("apikey", self.config.api_key.clone()),
                ("module", "contract".to_string()),
                ("action", "checkverifystatus".to_string()),
                ("guid", guid.to_string()),
            ])
            .await
            .map_err(PollError::Failed)?;

        interpret_status(&response)
    }
}

/// Build the `verifysourcecode` form from a request.
fn submission_form(
    api_key: &str,
    request: &VerificationRequest,
) -> Result<Vec<(&'static str, String)>, VerificationError> {
    let build_info = request.build_info.as_ref().ok_or_else(|| {
        VerificationError::new(format!(
            "no build info for {}, cannot submit sources",
            request.contract_name
        ))
    })?;
    let source_name = request.source_name.as_deref().ok_or_else(|| {
        VerificationError::new(format!("no source name for {}", request.contract_name))
    })?;

    let source_code = serde_json::to_string(&build_info.input)
        .map_err(|e| VerificationError::new(format!("cannot serialize compiler input: {e}")))?;

    Ok(vec![
        ("apikey", api_key.to_string()),
        ("module", "contract".to_string()),
        ("action", "verifysourcecode".to_string()),
        ("contractaddress", request.address.to_checksum(None)),
        ("sourceCode", source_code),
        ("codeformat", "solidity-standard-json-input".to_string()),
        (
            "contractname",
            format!("{}:{}", source_name, request.contract_name),
        ),
        (
            "compilerversion",
            format!("v{}", build_info.solc_long_version),
        ),
        // The misspelling is part of the Etherscan API.
        (
            "constructorArguements",
            hex::encode(&request.constructor_args),
        ),
    ])
}

/// Interpret the answer to a submission: the guid to poll, or why it was refused.
fn interpret_submission(response: &EtherscanResponse) -> Result<String, VerificationError> {
    if response.status == "1" {
        return Ok(response.result.clone());
    }

    Err(rejection(response))
}

/// Interpret a status poll. "Already verified" is a rejection here too, as on submission.
fn interpret_status(response: &EtherscanResponse) -> Result<(), PollError> {
    let result = response.result.to_lowercase();

    if result.contains("pending") {
        Err(PollError::Pending)
    } else if is_already_verified(response) {
        Err(PollError::Failed(rejection(response)))
    } else if response.status == "1" {
        Ok(())
    } else {
        Err(PollError::Failed(rejection(response)))
    }
}

fn is_already_verified(response: &EtherscanResponse) -> bool {
    response.result.to_lowercase().contains("already verified")
}

fn rejection(response: &EtherscanResponse) -> VerificationError {
    if is_already_verified(response) {
        VerificationError::new("already verified")
    } else {
        VerificationError::new(format!("{} ({})", response.result, response.message))
    }
}

impl Verifier for EtherscanVerifier {
    async fn submit_verification(&self, request: &VerificationRequest) -> Result<(), VerificationError> {
        let form = submission_form(&self.config.api_key, request)?;
        let guid = interpret_submission(&self.post(&form).await?)?;

        tracing::debug!(guid = %guid, address = %request.address, "Verification submitted, polling status");

        let backoff = ConstantBuilder::default()
            .with_delay(self.poll_delay)
            .with_max_times(self.max_polls);

        (|| self.check_status(&guid))
            .retry(backoff)
            .when(|err| matches!(err, PollError::Pending))
            .notify(|_, delay| {
                tracing::trace!(guid = %guid, ?delay, "Verification pending");
            })
            .await
            .map_err(|err| match err {
                PollError::Pending => VerificationError::new(format!(
                    "still pending after {} status checks",
                    self.max_polls
                )),
                PollError::Failed(err) => err,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(status: &str, message: &str, result: &str) -> EtherscanResponse {
        EtherscanResponse {
            status: status.to_string(),
            message: message.to_string(),
            result: result.to_string(),
        }
    }

    fn request(build_info: Option<BuildInfo>) -> VerificationRequest {
        VerificationRequest {
            address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".parse().unwrap(),
            constructor_args: Bytes::from(vec![0u8, 1]),
            contract_name: "Khafundme".to_string(),
            source_name: Some("contracts/Khafundme.sol".to_string()),
            build_info,
        }
    }

    #[test]
    fn test_submission_form() {
        let build_info = BuildInfo {
            solc_long_version: "0.8.17+commit.8df45f5f".to_string(),
            input: json!({ "language": "Solidity", "sources": {} }),
        };

        let form = submission_form("KEY", &request(Some(build_info))).unwrap();
        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
                .unwrap()
        };

        assert_eq!(get("action"), "verifysourcecode");
        assert_eq!(get("contractaddress"), "0x5FbDB2315678afecb367f032d93F642f64180aa3");
        assert_eq!(get("contractname"), "contracts/Khafundme.sol:Khafundme");
        assert_eq!(get("compilerversion"), "v0.8.17+commit.8df45f5f");
        assert_eq!(get("constructorArguements"), "0001");
        assert!(get("sourceCode").contains("Solidity"));
    }

    #[test]
    fn test_submission_without_build_info_fails() {
        let err = submission_form("KEY", &request(None)).unwrap_err();
        assert!(err.detail.contains("no build info"));
    }

    #[test]
    fn test_interpret_submission() {
        assert_eq!(interpret_submission(&response("1", "OK", "guid-123")).unwrap(), "guid-123");

        let err = interpret_submission(&response(
            "0",
            "NOTOK",
            "Contract source code already verified",
        ))
        .unwrap_err();
        assert_eq!(err.detail, "already verified");

        let err = interpret_submission(&response("0", "NOTOK", "Invalid API Key")).unwrap_err();
        assert_eq!(err.detail, "Invalid API Key (NOTOK)");
    }

    #[test]
    fn test_interpret_status() {
        assert!(matches!(
            interpret_status(&response("0", "NOTOK", "Pending in queue")),
            Err(PollError::Pending)
        ));
        assert!(interpret_status(&response("1", "OK", "Pass - Verified")).is_ok());
        assert!(matches!(
            interpret_status(&response("0", "NOTOK", "Fail - Unable to verify")),
            Err(PollError::Failed(_))
        ));

        // Same rule as on submission, whatever the status field says.
        for status in ["0", "1"] {
            match interpret_status(&response(status, "OK", "Already Verified")) {
                Err(PollError::Failed(err)) => assert_eq!(err.detail, "already verified"),
                other => panic!("expected a rejection, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_outcome_from_error() {
        let outcome = VerificationOutcome::failure(VerificationError::new("already verified"));

        assert!(!outcome.succeeded);
        assert_eq!(outcome.error_detail.as_deref(), Some("already verified"));
        assert!(VerificationOutcome::success().succeeded);
    }
}
