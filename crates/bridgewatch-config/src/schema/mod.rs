//! Configuration schema definitions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::validator::ConfigValidator;

mod schema_infra;

pub use schema_infra::*;

/// Root monitor configuration.
///
/// Immutable once handed to the engine; build it with [`MonitorConfig::new`]
/// or load it through [`crate::ConfigLoader`] and call
/// [`MonitorConfig::validated`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub alert_thresholds: AlertThresholds,

    /// Seconds between two health-check ticks.
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Ledgers probed by the binary at startup.
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,

    #[serde(default)]
    pub alerts: AlertsConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            alert_thresholds: AlertThresholds::default(),
            health_check_interval_secs: default_health_check_interval(),
            health: HealthConfig::default(),
            tracking: TrackingConfig::default(),
            networks: Vec::new(),
            alerts: AlertsConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

fn default_health_check_interval() -> u64 {
    15
}

impl MonitorConfig {
    /// Build a validated config from thresholds and a health-check interval,
    /// leaving every tunable at its default.
    pub fn new(
        alert_thresholds: AlertThresholds,
        health_check_interval_secs: u64,
    ) -> Result<Self, ConfigError> {
        Self {
            alert_thresholds,
            health_check_interval_secs,
            ..Self::default()
        }
        .validated()
    }

    /// Run the validator and return the config unchanged if it has no errors.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let result = ConfigValidator::validate(&self);
        match result.errors.into_iter().next() {
            Some(err) => Err(ConfigError::InvalidValue {
                field: err.path,
                message: err.message,
            }),
            None => Ok(self),
        }
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    /// Per-probe timeout. Never longer than the health-check interval.
    pub fn probe_timeout(&self) -> Duration {
        let interval = self.health_check_interval();
        match self.health.probe_timeout_ms {
            Some(ms) => Duration::from_millis(ms).min(interval),
            None => interval,
        }
    }

    pub fn latency_scan_interval(&self) -> Duration {
        Duration::from_millis(self.tracking.latency_scan_interval_ms)
    }

    /// Minimum number of outcomes in the error window before the error rate
    /// may raise an alert.
    pub fn error_min_samples(&self) -> usize {
        self.tracking
            .error_min_samples
            .unwrap_or(self.tracking.error_window_size)
    }
}

/// Alert thresholds. Every value must be strictly positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// Maximum time from tracking to confirmation.
    #[serde(default = "default_transaction_delay")]
    pub transaction_delay_secs: u64,

    /// Maximum time from tracking to reaching the signature threshold.
    #[serde(default = "default_signature_delay")]
    pub signature_delay_secs: u64,

    /// Windowed failure percentage that raises a critical alert.
    #[serde(default = "default_error_rate")]
    pub error_rate_percent: f64,

    /// Confirmation depth at which a transaction is considered final.
    #[serde(default = "default_block_confirmations")]
    pub block_confirmations: u64,

    /// Pending age after which a latency warning fires.
    #[serde(default = "default_cross_chain_latency")]
    pub cross_chain_latency_secs: u64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            transaction_delay_secs: default_transaction_delay(),
            signature_delay_secs: default_signature_delay(),
            error_rate_percent: default_error_rate(),
            block_confirmations: default_block_confirmations(),
            cross_chain_latency_secs: default_cross_chain_latency(),
        }
    }
}

fn default_transaction_delay() -> u64 {
    300
}

fn default_signature_delay() -> u64 {
    180
}

fn default_error_rate() -> f64 {
    10.0
}

fn default_block_confirmations() -> u64 {
    12
}

fn default_cross_chain_latency() -> u64 {
    600
}

impl AlertThresholds {
    pub fn transaction_delay(&self) -> Duration {
        Duration::from_secs(self.transaction_delay_secs)
    }

    pub fn signature_delay(&self) -> Duration {
        Duration::from_secs(self.signature_delay_secs)
    }

    pub fn cross_chain_latency(&self) -> Duration {
        Duration::from_secs(self.cross_chain_latency_secs)
    }
}

/// Chain health tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Consecutive probe failures before a chain is marked unhealthy.
    #[serde(default = "default_unhealthy_after_failures")]
    pub unhealthy_after_failures: u32,

    /// Per-probe timeout in milliseconds. Defaults to the check interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_timeout_ms: Option<u64>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            unhealthy_after_failures: default_unhealthy_after_failures(),
            probe_timeout_ms: None,
        }
    }
}

fn default_unhealthy_after_failures() -> u32 {
    2
}

/// Transaction tracking tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_latency_scan_interval")]
    pub latency_scan_interval_ms: u64,

    /// Capacity of the rolling outcome window.
    #[serde(default = "default_error_window_size")]
    pub error_window_size: usize,

    /// Samples required before the error rate is evaluated.
    /// Defaults to the window size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_min_samples: Option<usize>,

    /// Terminal records retained for lookups and duplicate detection.
    #[serde(default = "default_completed_retention")]
    pub completed_retention: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            latency_scan_interval_ms: default_latency_scan_interval(),
            error_window_size: default_error_window_size(),
            error_min_samples: None,
            completed_retention: default_completed_retention(),
        }
    }
}

fn default_latency_scan_interval() -> u64 {
    100
}

fn default_error_window_size() -> usize {
    10
}

fn default_completed_retention() -> usize {
    10_000
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
