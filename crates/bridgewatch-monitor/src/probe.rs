//! Chain liveness probes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::trace;

use crate::error::{MonitorError, Result};
use crate::types::ChainId;

/// Answers "is this ledger responsive?" by fetching its latest block height.
///
/// Any `Err` counts as a failed probe. The caller enforces the timeout.
#[async_trait]
pub trait ChainProbe: Send + Sync {
    async fn probe(&self) -> Result<u64>;
}

#[async_trait]
impl<T: ChainProbe + ?Sized> ChainProbe for Arc<T> {
    async fn probe(&self) -> Result<u64> {
        (**self).probe().await
    }
}

/// Probe backed by an Ethereum-style JSON-RPC endpoint (`eth_blockNumber`).
#[derive(Debug, Clone)]
pub struct RpcProbe {
    chain_id: ChainId,
    url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcProbe {
    pub fn new(chain_id: ChainId, url: impl Into<String>) -> Self {
        Self {
            chain_id,
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn failed(&self, message: impl Into<String>) -> MonitorError {
        MonitorError::ProbeFailed {
            chain_id: self.chain_id,
            message: message.into(),
        }
    }
}

#[async_trait]
impl ChainProbe for RpcProbe {
    async fn probe(&self) -> Result<u64> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "eth_blockNumber",
            "params": [],
            "id": 1,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.failed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.failed(format!("HTTP {}", status)));
        }

        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| self.failed(format!("invalid response: {}", e)))?;

        if let Some(err) = parsed.error {
            return Err(self.failed(format!("RPC error {}: {}", err.code, err.message)));
        }

        let raw = parsed
            .result
            .ok_or_else(|| self.failed("response has no result"))?;
        let height = parse_quantity(&raw)
            .ok_or_else(|| self.failed(format!("invalid block number '{}'", raw)))?;

        trace!(chain_id = self.chain_id, height, "Probe succeeded");
        Ok(height)
    }
}

/// Parse a JSON-RPC hex quantity such as `0x1b4`.
fn parse_quantity(raw: &str) -> Option<u64> {
    let digits = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X"))?;
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}
