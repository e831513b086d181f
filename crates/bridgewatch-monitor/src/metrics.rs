//! Transaction outcome metrics and rolling error rate.

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;

use std::collections::VecDeque;
use std::fmt::Write as _;

use bridgewatch_config::MonitorConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::alert_bus::AlertBus;
use crate::alerts::Alert;

/// Metric type, as rendered in the Prometheus `# TYPE` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    /// Counter (monotonically increasing).
    Counter,
    /// Gauge (can go up and down).
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Append one metric family in Prometheus text format.
///
/// `samples` pairs a label set (already formatted, e.g. `chain_id="1"`, or
/// empty) with its value.
pub(crate) fn write_metric(
    out: &mut String,
    name: &str,
    metric_type: MetricType,
    help: &str,
    samples: &[(String, f64)],
) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} {}", name, metric_type.as_str());
    for (labels, value) in samples {
        if labels.is_empty() {
            let _ = writeln!(out, "{} {}", name, value);
        } else {
            let _ = writeln!(out, "{}{{{}}} {}", name, labels, value);
        }
    }
}

/// Point-in-time copy of the transaction counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_transactions: u64,
    pub successful_transactions: u64,
    pub failed_transactions: u64,
    pub pending_transactions: usize,
    pub error_rate_percent: f64,
    pub window_samples: usize,
    pub window_capacity: usize,
}

impl MetricsSnapshot {
    /// Render in Prometheus text format.
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        let scalar = |v: f64| vec![(String::new(), v)];

        write_metric(
            &mut out,
            "bridge_transactions_total",
            MetricType::Counter,
            "Cross-chain transactions that reached a terminal state",
            &scalar(self.total_transactions as f64),
        );
        write_metric(
            &mut out,
            "bridge_transactions_successful_total",
            MetricType::Counter,
            "Cross-chain transactions confirmed successfully",
            &scalar(self.successful_transactions as f64),
        );
        write_metric(
            &mut out,
            "bridge_transactions_failed_total",
            MetricType::Counter,
            "Cross-chain transactions that failed",
            &scalar(self.failed_transactions as f64),
        );
        write_metric(
            &mut out,
            "bridge_transactions_pending",
            MetricType::Gauge,
            "Cross-chain transactions awaiting an outcome",
            &scalar(self.pending_transactions as f64),
        );
        write_metric(
            &mut out,
            "bridge_error_rate_percent",
            MetricType::Gauge,
            "Failure percentage over the rolling outcome window",
            &scalar(self.error_rate_percent),
        );

        out
    }
}

/// Cumulative counters plus a fixed-capacity FIFO window of recent outcomes.
///
/// Raises one CRITICAL alert each time the windowed error rate crosses the
/// threshold from below. The alert re-arms once the rate drops back under
/// the threshold.
#[derive(Debug)]
pub struct MetricsAggregator {
    window: VecDeque<bool>,
    capacity: usize,
    min_samples: usize,
    threshold_percent: f64,
    total: u64,
    successful: u64,
    failed: u64,
    breached: bool,
}

impl MetricsAggregator {
    /// `capacity` and `min_samples` are clamped to at least 1, and
    /// `min_samples` to at most `capacity`.
    pub fn new(capacity: usize, min_samples: usize, threshold_percent: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            min_samples: min_samples.clamp(1, capacity),
            threshold_percent,
            total: 0,
            successful: 0,
            failed: 0,
            breached: false,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(
            config.tracking.error_window_size,
            config.error_min_samples(),
            config.alert_thresholds.error_rate_percent,
        )
    }

    /// Record one terminal outcome and return the updated windowed error rate.
    pub fn record_outcome(&mut self, success: bool, bus: &AlertBus) -> f64 {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(success);

        self.total += 1;
        if success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }

        let rate = self.error_rate();
        self.evaluate(rate, bus);
        rate
    }

    fn evaluate(&mut self, rate: f64, bus: &AlertBus) {
        if self.window.len() < self.min_samples {
            return;
        }

        let above = rate >= self.threshold_percent;
        match (self.breached, above) {
            (false, true) => {
                self.breached = true;
                bus.emit(Alert::critical(format!(
                    "High error rate detected: {:.1}% of the last {} transactions failed (threshold {}%)",
                    rate,
                    self.window.len(),
                    self.threshold_percent
                )));
            }
            (true, false) => {
                self.breached = false;
                info!(rate, "Error rate back under threshold");
            }
            _ => debug!(rate, breached = self.breached, "Error rate evaluated"),
        }
    }

    /// Failure percentage over the current window; 0 when empty.
    pub fn error_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let failures = self.window.iter().filter(|ok| !**ok).count();
        failures as f64 * 100.0 / self.window.len() as f64
    }

    /// Whether the error rate is currently above threshold.
    pub fn is_breached(&self) -> bool {
        self.breached
    }

    pub fn snapshot(&self, pending_transactions: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            total_transactions: self.total,
            successful_transactions: self.successful,
            failed_transactions: self.failed,
            pending_transactions,
            error_rate_percent: self.error_rate(),
            window_samples: self.window.len(),
            window_capacity: self.capacity,
        }
    }
}
