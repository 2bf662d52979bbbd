//! Funding-chain wallet RPC client.
//!
//! Talks JSON-over-HTTP to the local wallet node: asset transfers (order
//! submission is a transfer to the venue's address), spendable balance,
//! per-asset wallet accounts, and the pending-transaction counts that
//! drive settlement reconciliation. Also serves the wallet node's
//! funding-currency price feed.
//!
//! Every endpoint answers an envelope with a `success` flag; RPC-level
//! failures surface as errors, order rejections as `success: false`.

use anyhow::{Context, Result};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Wallet account holding the funding currency itself.
pub const FUNDING_WALLET_ID: u32 = 1;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// RPC response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    success: bool,
    #[serde(default)]
    price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    success: bool,
    #[serde(default)]
    wallet_balance: Option<WalletBalance>,
}

#[derive(Debug, Deserialize)]
struct WalletBalance {
    spendable_balance: f64,
}

#[derive(Debug, Deserialize)]
struct CreateWalletResponse {
    success: bool,
    #[serde(default)]
    wallet_id: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TransactionCountResponse {
    success: bool,
    #[serde(default)]
    count: Option<u64>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the wallet node RPC.
pub struct WalletClient {
    http: Client,
    rpc_url: String,
    api_key: Option<Secret<String>>,
}

impl WalletClient {
    pub fn new(rpc_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build wallet HTTP client")?;
        Ok(Self {
            http,
            rpc_url: rpc_url.into(),
            api_key: api_key.map(Secret::new),
        })
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}/{endpoint}", self.rpc_url.trim_end_matches('/'));
        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key.expose_secret());
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("Wallet RPC {endpoint} unreachable"))?
            .error_for_status()
            .with_context(|| format!("Wallet RPC {endpoint} returned an error status"))?;

        response
            .json::<T>()
            .await
            .with_context(|| format!("Wallet RPC {endpoint} returned malformed JSON"))
    }

    /// Funding-currency price in USD from the node's price feed.
    pub async fn funding_price(&self) -> Result<f64> {
        let resp: PriceResponse = self.call("get_price", json!({})).await?;
        match (resp.success, resp.price) {
            (true, Some(price)) if price > 0.0 => Ok(price),
            _ => anyhow::bail!("Wallet price feed returned no usable price"),
        }
    }

    /// Spendable balance of a wallet account, in whole funding units.
    pub async fn spendable_balance(&self, wallet_id: u32) -> Result<f64> {
        let resp: BalanceResponse = self
            .call("get_wallet_balance", json!({ "wallet_id": wallet_id }))
            .await?;
        match (resp.success, resp.wallet_balance) {
            (true, Some(balance)) => Ok(balance.spendable_balance),
            _ => anyhow::bail!("Wallet balance lookup failed for wallet {wallet_id}"),
        }
    }

    /// Transfer `amount` from `wallet_id` to `address`.
    ///
    /// Returns whether the node accepted the transaction; a clean
    /// rejection (insufficient funds, mempool full) is `Ok(false)` so
    /// the caller can leave its state untouched.
    pub async fn send_asset(
        &self,
        wallet_id: u32,
        address: &str,
        amount: f64,
        memos: Vec<String>,
    ) -> Result<bool> {
        let resp: RpcEnvelope = self
            .call(
                "send_transaction",
                json!({
                    "wallet_id": wallet_id,
                    "address": address,
                    "amount": amount,
                    "memos": memos,
                }),
            )
            .await?;

        if !resp.success {
            warn!(
                wallet_id,
                address,
                amount,
                error = resp.error.as_deref().unwrap_or("unspecified"),
                "Wallet rejected transaction"
            );
        }
        Ok(resp.success)
    }

    /// Create (or look up) the wallet account tracking an asset.
    /// The node deduplicates by asset id, so this is idempotent.
    pub async fn register_asset(&self, symbol: &str, asset_id: &str) -> Result<u32> {
        let resp: CreateWalletResponse = self
            .call(
                "create_wallet_for_asset",
                json!({ "asset_id": asset_id, "name": symbol }),
            )
            .await?;
        match (resp.success, resp.wallet_id) {
            (true, Some(id)) => {
                debug!(symbol, wallet_id = id, "Asset wallet registered");
                Ok(id)
            }
            _ => anyhow::bail!("Failed to register asset wallet for {symbol}"),
        }
    }

    /// Number of unconfirmed transactions on a wallet account. Zero
    /// means every submitted transfer has settled.
    pub async fn pending_transaction_count(&self, wallet_id: u32) -> Result<u64> {
        let resp: TransactionCountResponse = self
            .call(
                "get_transaction_count",
                json!({ "wallet_id": wallet_id, "confirmed": false }),
            )
            .await?;
        match (resp.success, resp.count) {
            (true, Some(count)) => Ok(count),
            _ => anyhow::bail!("Pending transaction count failed for wallet {wallet_id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
