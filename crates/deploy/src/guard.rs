//! Idempotency guard: decides between reusing a recorded deployment and deploying again.

use anyhow::{Context, Result};

use crate::{
    chain::ChainClient,
    error::DeployError,
    ledger::{DeploymentLedger, DeploymentRecord},
};

/// Outcome of consulting the ledger for a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// The recorded deployment already carries this exact creation code.
    Reuse(DeploymentRecord),
    /// A transaction is required. `previous` is the record it will replace, if any.
    Deploy { previous: Option<DeploymentRecord> },
}

impl GuardDecision {
    pub fn should_deploy(&self) -> bool {
        matches!(self, Self::Deploy { .. })
    }
}

/// Consults the ledger (and the chain, for stale records) before a deployment.
pub struct IdempotencyGuard<'a, L> {
    ledger: &'a L,
    force: bool,
}

impl<'a, L: DeploymentLedger> IdempotencyGuard<'a, L> {
    /// `force` turns every decision into a deploy.
    pub fn new(ledger: &'a L, force: bool) -> Self {
        Self { ledger, force }
    }

    /// Decide from the ledger alone.
    pub fn check(
        &self,
        contract_name: &str,
        chain_id: &str,
        fingerprint: &str,
    ) -> Result<GuardDecision> {
        let previous = self
            .ledger
            .get(contract_name, chain_id)
            .context(format!("Failed to read deployment record of {contract_name}"))?;

        let decision = match previous {
            None => {
                tracing::info!(contract = %contract_name, chain_id = %chain_id, "No previous deployment recorded");
                GuardDecision::Deploy { previous: None }
            }
            Some(record) if self.force => {
                tracing::info!(
                    contract = %contract_name,
                    address = %record.address,
                    "Redeploy forced, ignoring recorded deployment"
                );
                GuardDecision::Deploy {
                    previous: Some(record),
                }
            }
            Some(record) if record.fingerprint == fingerprint => GuardDecision::Reuse(record),
            Some(record) => {
                tracing::info!(
                    contract = %contract_name,
                    address = %record.address,
                    recorded = %record.fingerprint,
                    current = %fingerprint,
                    "Creation code changed since the recorded deployment"
                );
                GuardDecision::Deploy {
                    previous: Some(record),
                }
            }
        };

        Ok(decision)
    }

    /// Decide from the ledger, then make sure a reusable record still has code on chain.
    ///
    /// A development node that was restarted forgets every contract while the ledger keeps
    /// its records; such a record is stale and the contract gets deployed again.
    pub async fn evaluate<C: ChainClient>(
        &self,
        chain: &C,
        contract_name: &str,
        chain_id: &str,
        fingerprint: &str,
    ) -> Result<GuardDecision> {
        let decision = self.check(contract_name, chain_id, fingerprint)?;

        let GuardDecision::Reuse(record) = decision else {
            return Ok(decision);
        };

        let code = chain
            .code_at(record.address)
            .await
            .map_err(DeployError::chain_unreachable)?;

        if code.is_empty() {
            tracing::warn!(
                contract = %contract_name,
                address = %record.address,
                "Recorded deployment has no code on chain, treating the record as stale"
            );
            return Ok(GuardDecision::Deploy {
                previous: Some(record),
            });
        }

        tracing::info!(
            contract = %contract_name,
            address = %record.address,
            "Creation code unchanged, reusing recorded deployment"
        );

        Ok(GuardDecision::Reuse(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::FsLedger;
    use alloy_core::{
        json_abi::JsonAbi,
        primitives::{Address, B256},
    };
    use tempdir::TempDir;

    fn recorded(ledger: &FsLedger, fingerprint: &str) -> DeploymentRecord {
        let record = DeploymentRecord {
            contract_name: "Khafundme".to_string(),
            address: Address::repeat_byte(0x11),
            abi: JsonAbi::default(),
            transaction_hash: B256::repeat_byte(0xab),
            chain_id: "31337".to_string(),
            args: Vec::new(),
            fingerprint: fingerprint.to_string(),
            block_number: Some(1),
            deployed_at: 1737316800,
        };
        ledger.put(&record).unwrap();
        record
    }

    #[test]
    fn test_no_record_requires_deploy() {
        let dir = TempDir::new("emplace-guard").unwrap();
        let ledger = FsLedger::new(dir.path());

        let decision = IdempotencyGuard::new(&ledger, false)
            .check("Khafundme", "31337", "abc")
            .unwrap();

        assert_eq!(decision, GuardDecision::Deploy { previous: None });
    }

    #[test]
    fn test_same_fingerprint_is_reused() {
        let dir = TempDir::new("emplace-guard").unwrap();
        let ledger = FsLedger::new(dir.path());
        let record = recorded(&ledger, "abc");

        let decision = IdempotencyGuard::new(&ledger, false)
            .check("Khafundme", "31337", "abc")
            .unwrap();

        assert_eq!(decision, GuardDecision::Reuse(record));
        assert!(!decision.should_deploy());
    }

    #[test]
    fn test_changed_fingerprint_requires_deploy() {
        let dir = TempDir::new("emplace-guard").unwrap();
        let ledger = FsLedger::new(dir.path());
        let record = recorded(&ledger, "abc");

        let decision = IdempotencyGuard::new(&ledger, false)
            .check("Khafundme", "31337", "def")
            .unwrap();

        assert_eq!(decision, GuardDecision::Deploy { previous: Some(record) });
    }

    #[test]
    fn test_force_requires_deploy() {
        let dir = TempDir::new("emplace-guard").unwrap();
        let ledger = FsLedger::new(dir.path());
        recorded(&ledger, "abc");

        let decision = IdempotencyGuard::new(&ledger, true)
            .check("Khafundme", "31337", "abc")
            .unwrap();

        assert!(decision.should_deploy());
    }
}
