//! Infrastructure configuration types (networks, alert delivery, status server).

use serde::{Deserialize, Serialize};

/// A ledger to probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Chain identifier.
    pub chain_id: u64,

    /// Human readable name used in logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// JSON-RPC endpoint.
    pub rpc_url: String,
}

impl NetworkConfig {
    /// Display label, falling back to the chain id.
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("chain-{}", self.chain_id))
    }
}

/// Alert delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Webhook receiving every alert as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// Lowest level forwarded to the webhook: `info`, `warning` or `critical`.
    #[serde(default = "default_min_level")]
    pub min_level: String,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            min_level: default_min_level(),
        }
    }
}

fn default_min_level() -> String {
    "warning".to_string()
}

/// Status HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:9464".to_string()
}
