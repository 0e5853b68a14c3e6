//! Deployment ledger: the persisted record of what was deployed where.

use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
};

use alloy_core::{
    json_abi::JsonAbi,
    primitives::{Address, B256},
};
use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

/// The name of the lock file guarding writes to a chain directory.
const LOCK_FILENAME: &str = ".lock";

/// A finalized deployment of one contract on one chain.
///
/// There is at most one record per `(contract_name, chain_id)`; a later deployment
/// overwrites the previous record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub contract_name: String,
    pub address: Address,
    pub abi: JsonAbi,
    pub transaction_hash: B256,
    pub chain_id: String,
    /// Constructor arguments as given on deployment.
    #[serde(default)]
    pub args: Vec<String>,
    /// SHA-256 of the creation code, see [`crate::DeploymentFingerprint`].
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    /// Unix timestamp of the ledger write.
    pub deployed_at: u64,
}

/// Keyed store of deployment records.
pub trait DeploymentLedger {
    /// Look up the record for a contract on a chain.
    fn get(&self, contract_name: &str, chain_id: &str) -> Result<Option<DeploymentRecord>>;

    /// Insert or overwrite the record for `(record.contract_name, record.chain_id)`.
    fn put(&self, record: &DeploymentRecord) -> Result<()>;
}

/// Ledger stored as one JSON file per contract: `<root>/<chain_id>/<ContractName>.json`.
#[derive(Debug, Clone)]
pub struct FsLedger {
    root: PathBuf,
}

impl FsLedger {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn chain_dir(&self, chain_id: &str) -> PathBuf {
        self.root.join(chain_id)
    }

    fn record_path(&self, contract_name: &str, chain_id: &str) -> PathBuf {
        self.chain_dir(chain_id).join(format!("{contract_name}.json"))
    }
}

impl DeploymentLedger for FsLedger {
    fn get(&self, contract_name: &str, chain_id: &str) -> Result<Option<DeploymentRecord>> {
        let path = self.record_path(contract_name, chain_id);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .context(format!("Failed to read deployment record {}", path.display()))?;
        let record: DeploymentRecord = serde_json::from_str(&content)
            .context(format!("Failed to parse deployment record {}", path.display()))?;

        if record.chain_id != chain_id || record.contract_name != contract_name {
            tracing::warn!(
                path = %path.display(),
                stored_chain_id = %record.chain_id,
                stored_contract = %record.contract_name,
                "Deployment record does not match its location, ignoring it"
            );
            return Ok(None);
        }

        Ok(Some(record))
    }

    fn put(&self, record: &DeploymentRecord) -> Result<()> {
        let dir = self.chain_dir(&record.chain_id);
        std::fs::create_dir_all(&dir)
            .context(format!("Failed to create ledger directory {}", dir.display()))?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(LOCK_FILENAME))
            .context("Failed to open ledger lock file")?;
        lock.lock_exclusive()
            .context(format!("Failed to lock ledger directory {}", dir.display()))?;

        let path = self.record_path(&record.contract_name, &record.chain_id);
        let tmp_path = path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(record)
            .context("Failed to serialize deployment record")?;

        // Write aside and rename so readers never observe a half-written record.
        std::fs::write(&tmp_path, content)
            .context(format!("Failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &path)
            .context(format!("Failed to move deployment record into {}", path.display()))?;

        FileExt::unlock(&lock).context("Failed to unlock ledger directory")?;

        tracing::debug!(
            path = %path.display(),
            contract = %record.contract_name,
            address = %record.address,
            "Deployment record saved"
        );

        Ok(())
    }
}
