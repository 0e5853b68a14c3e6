//! Chain access: the trait the deployment workflow consumes and its JSON-RPC implementation.

use std::{future::Future, time::Duration};

use alloy_core::primitives::{Address, B256, Bytes, U64, U128, U256};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::{rpc, signer::SealedTransaction};

/// Receipt of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    /// `false` when the transaction reverted.
    pub success: bool,
    pub contract_address: Option<Address>,
}

/// Everything the deployment workflow needs from a chain.
///
/// Implementations are expected to report transport failures as errors; classifying them is
/// up to the caller.
pub trait ChainClient: Send + Sync {
    /// The chain id, rendered in decimal.
    fn chain_id(&self) -> impl Future<Output = Result<String>> + Send;

    /// Accounts the node can sign for.
    fn accounts(&self) -> impl Future<Output = Result<Vec<Address>>> + Send;

    fn balance(&self, account: Address) -> impl Future<Output = Result<U256>> + Send;

    /// Next nonce for `account`, counting pending transactions.
    fn nonce(&self, account: Address) -> impl Future<Output = Result<u64>> + Send;

    fn gas_price(&self) -> impl Future<Output = Result<u128>> + Send;

    /// Gas needed to run `input` as contract creation code from `from`.
    fn estimate_gas(
        &self,
        from: Address,
        input: &Bytes,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Runtime code at `address`; empty when no contract lives there.
    fn code_at(&self, address: Address) -> impl Future<Output = Result<Bytes>> + Send;

    /// Input data of a known transaction, `None` when the node does not know the hash.
    fn transaction_input(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = Result<Option<Bytes>>> + Send;

    /// Hand a transaction to the node, returning its hash.
    fn broadcast(&self, tx: &SealedTransaction) -> impl Future<Output = Result<B256>> + Send;

    /// Block until `tx_hash` is mined and `depth` blocks were mined on top of it.
    ///
    /// Fails when the confirmation timeout elapses first.
    fn wait_confirmations(
        &self,
        tx_hash: B256,
        depth: u64,
    ) -> impl Future<Output = Result<TransactionReceipt>> + Send;
}

/// Receipt fields as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    block_number: Option<U64>,
    #[serde(default)]
    status: Option<U64>,
    #[serde(default)]
    contract_address: Option<Address>,
}

#[derive(Debug, Deserialize)]
struct RpcTransaction {
    input: Bytes,
}

/// Timing knobs of the JSON-RPC client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcSettings {
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub confirmation_timeout: Duration,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            request_timeout: rpc::DEFAULT_REQUEST_TIMEOUT,
            poll_interval: Duration::from_secs(2),
            confirmation_timeout: Duration::from_secs(600),
        }
    }
}

/// [`ChainClient`] over Ethereum JSON-RPC.
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    client: reqwest::Client,
    url: Url,
    settings: RpcSettings,
}

impl RpcChainClient {
    pub fn new(url: Url, settings: RpcSettings) -> Result<Self> {
        Ok(Self {
            client: rpc::create_client(settings.request_timeout)?,
            url,
            settings,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<T> {
        rpc::json_rpc_call(&self.client, &self.url, method, params).await
    }

    async fn block_number(&self) -> Result<u64> {
        let number: U64 = self.call("eth_blockNumber", vec![]).await?;
        Ok(number.to())
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<RpcReceipt>> {
        self.call("eth_getTransactionReceipt", vec![json!(tx_hash)])
            .await
    }

    /// Return the receipt once it is buried under `depth` blocks.
    async fn confirmed_receipt(
        &self,
        tx_hash: B256,
        depth: u64,
    ) -> Result<Option<TransactionReceipt>> {
        let Some(receipt) = self.receipt(tx_hash).await? else {
            return Ok(None);
        };
        // Pending receipts (some nodes return them) have no block yet.
        let Some(block_number) = receipt.block_number.map(|n| n.to::<u64>()) else {
            return Ok(None);
        };

        if depth > 0 {
            let head = self.block_number().await?;
            tracing::debug!(
                tx_hash = %tx_hash,
                block_number,
                head,
                required = depth,
                "Waiting for confirmations"
            );
            if !is_confirmed(head, block_number, depth) {
                return Ok(None);
            }
        }

        Ok(Some(TransactionReceipt {
            transaction_hash: receipt.transaction_hash,
            block_number,
            // Pre-byzantium receipts carry no status; treat them as successful.
            success: receipt.status.is_none_or(|status| status == U64::from(1)),
            contract_address: receipt.contract_address,
        }))
    }
}

/// Whether at least `depth` blocks were mined on top of `block`.
///
/// A head behind the receipt's block (lagging load-balanced node) counts as zero blocks.
fn is_confirmed(head: u64, block: u64, depth: u64) -> bool {
    head.saturating_sub(block) >= depth
}

impl ChainClient for RpcChainClient {
    async fn chain_id(&self) -> Result<String> {
        let chain_id: U64 = self.call("eth_chainId", vec![]).await?;
        Ok(chain_id.to::<u64>().to_string())
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        self.call("eth_accounts", vec![]).await
    }

    async fn balance(&self, account: Address) -> Result<U256> {
        self.call("eth_getBalance", vec![json!(account), json!("latest")])
            .await
    }

    async fn nonce(&self, account: Address) -> Result<u64> {
        let nonce: U64 = self
            .call("eth_getTransactionCount", vec![json!(account), json!("pending")])
            .await?;
        Ok(nonce.to())
    }

    async fn gas_price(&self) -> Result<u128> {
        let price: U128 = self.call("eth_gasPrice", vec![]).await?;
        Ok(price.to())
    }

    async fn estimate_gas(&self, from: Address, input: &Bytes) -> Result<u64> {
        let gas: U64 = self
            .call(
                "eth_estimateGas",
                vec![json!({ "from": from, "data": input })],
            )
            .await?;
        Ok(gas.to())
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        self.call("eth_getCode", vec![json!(address), json!("latest")])
            .await
    }

    async fn transaction_input(&self, tx_hash: B256) -> Result<Option<Bytes>> {
        let tx: Option<RpcTransaction> = self
            .call("eth_getTransactionByHash", vec![json!(tx_hash)])
            .await?;
        Ok(tx.map(|tx| tx.input))
    }

    async fn broadcast(&self, tx: &SealedTransaction) -> Result<B256> {
        match tx {
            SealedTransaction::Raw(raw) => {
                self.call("eth_sendRawTransaction", vec![json!(raw)])
                    .await
            }
            SealedTransaction::Unlocked(tx) => {
                self.call(
                    "eth_sendTransaction",
                    vec![json!({
                        "from": tx.from,
                        "data": tx.input,
                        "nonce": format!("0x{:x}", tx.nonce),
                        "gas": format!("0x{:x}", tx.gas_limit),
                        "gasPrice": format!("0x{:x}", tx.gas_price),
                    })],
                )
                .await
            }
        }
    }

    async fn wait_confirmations(&self, tx_hash: B256, depth: u64) -> Result<TransactionReceipt> {
        rpc::poll_until(
            &format!("{depth} confirmation(s) of {tx_hash}"),
            self.settings.confirmation_timeout,
            self.settings.poll_interval,
            || self.confirmed_receipt(tx_hash, depth),
        )
        .await
        .context("Transaction was not confirmed in time")
    }
}
