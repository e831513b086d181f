//! # Bridgewatch Monitor
//!
//! Monitoring core for a cross-chain bridge.
//!
//! ## Features
//!
//! - Transaction lifecycle tracking with latency and delay alerts
//! - Rolling error-rate window with breach alerts
//! - Periodic, concurrent chain health probes
//! - Ordered, failure-isolated alert fan-out
//! - Health check endpoint (/health) and Prometheus metrics (/metrics)

pub mod alert_bus;
pub mod alert_channels;
pub mod alerts;
pub mod endpoints;
pub mod error;
pub mod health;
pub mod metrics;
pub mod probe;
pub mod service;
pub mod task;
pub mod tracker;
pub mod types;

pub use alert_bus::{AlertBus, ListenerId};
pub use alert_channels::{WebhookFormat, WebhookListener};
pub use alerts::{Alert, AlertContext, AlertLevel, AlertListener, FnListener, LogListener};
pub use error::{MonitorError, Result};
pub use health::{ChainHealthMonitor, HealthStatus, NetworkStatus};
pub use metrics::{MetricsAggregator, MetricsSnapshot};
pub use probe::{ChainProbe, RpcProbe};
pub use service::MonitoringService;
pub use task::PeriodicTask;
pub use tracker::{TransactionRecord, TransactionStatus, TransactionTracker};
pub use types::{ChainId, TxId};
