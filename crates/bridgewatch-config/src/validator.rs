//! Configuration validation.

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::schema::MonitorConfig;

/// Alert levels accepted by `alerts.min_level`.
pub const ALERT_LEVELS: [&str; 3] = ["info", "warning", "critical"];

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &MonitorConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_thresholds(config, &mut result);
        Self::validate_health(config, &mut result);
        Self::validate_tracking(config, &mut result);
        Self::validate_networks(config, &mut result);
        Self::validate_alerts(config, &mut result);
        Self::validate_server(config, &mut result);

        result
    }

    fn validate_thresholds(config: &MonitorConfig, result: &mut ValidationResult) {
        let thresholds = &config.alert_thresholds;

        let positive = [
            ("transaction_delay_secs", thresholds.transaction_delay_secs),
            ("signature_delay_secs", thresholds.signature_delay_secs),
            ("block_confirmations", thresholds.block_confirmations),
            ("cross_chain_latency_secs", thresholds.cross_chain_latency_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                result.add_error(ValidationError::new(
                    format!("alert_thresholds.{}", name),
                    format!("{} must be greater than 0", name),
                ));
            }
        }

        let rate = thresholds.error_rate_percent;
        if !rate.is_finite() || rate <= 0.0 || rate > 100.0 {
            result.add_error(ValidationError::new(
                "alert_thresholds.error_rate_percent",
                "error_rate_percent must be in (0, 100]",
            ));
        }
    }

    fn validate_health(config: &MonitorConfig, result: &mut ValidationResult) {
        if config.health_check_interval_secs == 0 {
            result.add_error(ValidationError::new(
                "health_check_interval_secs",
                "health_check_interval_secs must be greater than 0",
            ));
        }

        match config.health.unhealthy_after_failures {
            0 => result.add_error(ValidationError::new(
                "health.unhealthy_after_failures",
                "unhealthy_after_failures must be at least 1",
            )),
            1 => result.add_warning(ValidationWarning::new(
                "health.unhealthy_after_failures",
                "a single failed probe marks a chain unhealthy, expect flapping alerts",
            )),
            _ => {}
        }

        if let Some(timeout_ms) = config.health.probe_timeout_ms {
            if timeout_ms == 0 {
                result.add_error(ValidationError::new(
                    "health.probe_timeout_ms",
                    "probe_timeout_ms must be greater than 0",
                ));
            } else if timeout_ms > config.health_check_interval_secs.saturating_mul(1000) {
                result.add_warning(ValidationWarning::new(
                    "health.probe_timeout_ms",
                    "probe_timeout_ms exceeds the health check interval and will be clamped",
                ));
            }
        }
    }

    fn validate_tracking(config: &MonitorConfig, result: &mut ValidationResult) {
        let tracking = &config.tracking;

        if tracking.latency_scan_interval_ms == 0 {
            result.add_error(ValidationError::new(
                "tracking.latency_scan_interval_ms",
                "latency_scan_interval_ms must be greater than 0",
            ));
        } else if tracking.latency_scan_interval_ms
            > config.alert_thresholds.cross_chain_latency_secs.saturating_mul(1000)
        {
            result.add_warning(ValidationWarning::new(
                "tracking.latency_scan_interval_ms",
                "latency scans run less often than the latency threshold",
            ));
        }

        if tracking.error_window_size == 0 {
            result.add_error(ValidationError::new(
                "tracking.error_window_size",
                "error_window_size must be greater than 0",
            ));
        }

        if let Some(min) = tracking.error_min_samples {
            if min == 0 || min > tracking.error_window_size {
                result.add_error(ValidationError::new(
                    "tracking.error_min_samples",
                    "error_min_samples must be between 1 and error_window_size",
                ));
            }
        }

        if tracking.completed_retention == 0 {
            result.add_error(ValidationError::new(
                "tracking.completed_retention",
                "completed_retention must be greater than 0",
            ));
        }
    }

    fn validate_networks(config: &MonitorConfig, result: &mut ValidationResult) {
        let mut seen = HashSet::new();
        for (i, network) in config.networks.iter().enumerate() {
            if !seen.insert(network.chain_id) {
                result.add_error(ValidationError::new(
                    format!("networks[{}].chain_id", i),
                    format!("Duplicate chain id {}", network.chain_id),
                ));
            }

            if !is_http_url(&network.rpc_url) {
                result.add_error(ValidationError::new(
                    format!("networks[{}].rpc_url", i),
                    "rpc_url must start with http:// or https://",
                ));
            }
        }
    }

    fn validate_alerts(config: &MonitorConfig, result: &mut ValidationResult) {
        if !ALERT_LEVELS.contains(&config.alerts.min_level.to_lowercase().as_str()) {
            result.add_error(ValidationError::new(
                "alerts.min_level",
                format!(
                    "Unknown alert level '{}', valid values: {:?}",
                    config.alerts.min_level, ALERT_LEVELS
                ),
            ));
        }

        if let Some(ref url) = config.alerts.webhook_url {
            if !is_http_url(url) {
                result.add_error(ValidationError::new(
                    "alerts.webhook_url",
                    "webhook_url must start with http:// or https://",
                ));
            }
        }
    }

    fn validate_server(config: &MonitorConfig, result: &mut ValidationResult) {
        if config.server.enabled && config.server.listen.parse::<SocketAddr>().is_err() {
            result.add_error(ValidationError::new(
                "server.listen",
                format!("Invalid listen address '{}'", config.server.listen),
            ));
        }
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
