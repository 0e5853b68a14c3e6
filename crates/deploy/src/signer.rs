//! The deployer identity and how its transactions are signed.

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_core::primitives::{Address, Bytes, TxKind, U256};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSignerSync;
use alloy_signer_local::{MnemonicBuilder, PrivateKeySigner, coins_bip39::English};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{chain::ChainClient, error::DeployError};

/// Name under which the deployer account is known.
pub const DEPLOYER_ACCOUNT: &str = "deployer";

/// Where the deployer account comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployerSource {
    /// A hex-encoded secp256k1 private key.
    PrivateKey(String),
    /// A BIP-39 phrase and the derivation index (`m/44'/60'/0'/0/<index>`).
    Mnemonic { phrase: String, index: u32 },
    /// An account unlocked on the node, by its position in `eth_accounts`.
    NodeAccount(usize),
}

impl Default for DeployerSource {
    fn default() -> Self {
        Self::NodeAccount(0)
    }
}

/// A contract-creation transaction before signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTransaction {
    pub from: Address,
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub input: Bytes,
}

/// A deployment transaction ready to be handed to the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SealedTransaction {
    /// RLP-encoded signed transaction, for `eth_sendRawTransaction`.
    Raw(Bytes),
    /// Transaction the node signs itself, for `eth_sendTransaction`.
    Unlocked(DeployTransaction),
}

/// The named account deployments are sent from.
#[derive(Debug, Clone)]
pub enum DeployerIdentity {
    Local(PrivateKeySigner),
    Unlocked(Address),
}

impl DeployerIdentity {
    /// Resolve the deployer from its configured source.
    ///
    /// Node accounts need the chain to be reachable; key-based sources do not.
    pub async fn resolve<C: ChainClient>(source: &DeployerSource, chain: &C) -> Result<Self> {
        let identity = match source {
            DeployerSource::PrivateKey(key) => {
                let signer: PrivateKeySigner = key
                    .trim()
                    .parse()
                    .context("Failed to parse deployer private key")?;
                Self::Local(signer)
            }
            DeployerSource::Mnemonic { phrase, index } => {
                let signer = MnemonicBuilder::<English>::default()
                    .phrase(phrase.trim())
                    .index(*index)
                    .context("Invalid mnemonic derivation index")?
                    .build()
                    .context("Failed to derive deployer key from mnemonic")?;
                Self::Local(signer)
            }
            DeployerSource::NodeAccount(index) => {
                let accounts = chain
                    .accounts()
                    .await
                    .map_err(DeployError::chain_unreachable)?;
                let address = accounts.get(*index).copied().with_context(|| {
                    format!(
                        "Node exposes {} account(s), no account at index {}",
                        accounts.len(),
                        index
                    )
                })?;
                Self::Unlocked(address)
            }
        };

        tracing::info!(
            account = DEPLOYER_ACCOUNT,
            address = %identity.address(),
            kind = identity.kind(),
            "Deployer identity resolved"
        );

        Ok(identity)
    }

    pub fn address(&self) -> Address {
        match self {
            Self::Local(signer) => signer.address(),
            Self::Unlocked(address) => *address,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Local(_) => "local-key",
            Self::Unlocked(_) => "node-account",
        }
    }

    /// Sign the transaction locally, or pass it through for the node to sign.
    pub fn seal(&self, tx: DeployTransaction) -> Result<SealedTransaction> {
        let signer = match self {
            Self::Local(signer) => signer,
            Self::Unlocked(_) => return Ok(SealedTransaction::Unlocked(tx)),
        };

        let mut legacy = TxLegacy {
            chain_id: Some(tx.chain_id),
            nonce: tx.nonce,
            gas_price: tx.gas_price,
            gas_limit: tx.gas_limit,
            to: TxKind::Create,
            value: U256::ZERO,
            input: tx.input,
        };

        let signature = signer
            .sign_transaction_sync(&mut legacy)
            .context("Failed to sign deployment transaction")?;
        let envelope = TxEnvelope::Legacy(legacy.into_signed(signature));

        Ok(SealedTransaction::Raw(envelope.encoded_2718().into()))
    }
}
