//! Monitor errors.

use std::time::Duration;

use thiserror::Error;

use bridgewatch_config::ConfigError;

use crate::types::TxId;

/// Monitor error types.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Configuration rejected at construction.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    /// Transaction id is already tracked.
    #[error("Transaction {0} is already tracked")]
    DuplicateTransaction(TxId),

    /// Transaction id was never tracked (or has been evicted).
    #[error("Unknown transaction {0}")]
    UnknownTransaction(TxId),

    /// Transaction already reached a terminal state.
    #[error("Transaction {0} is already confirmed")]
    AlreadyConfirmed(TxId),

    /// A chain probe exceeded its time budget.
    #[error("Probe for chain {chain_id} timed out after {timeout:?}")]
    ProbeTimeout { chain_id: u64, timeout: Duration },

    /// A chain probe returned an error.
    #[error("Probe for chain {chain_id} failed: {message}")]
    ProbeFailed { chain_id: u64, message: String },

    /// An alert listener failed.
    #[error("Alert listener '{listener}' failed: {message}")]
    SubscriberFailure { listener: String, message: String },

    /// Alert delivery to an external sink failed.
    #[error("Alert delivery failed: {0}")]
    AlertDelivery(String),

    /// Monitoring loop already started.
    #[error("Monitoring is already running")]
    AlreadyRunning,

    /// A background task was requested outside a tokio runtime.
    #[error("No tokio runtime available to run '{0}'")]
    NoRuntime(&'static str),

    /// A periodic task was given a zero period.
    #[error("Periodic task '{0}' needs a non-zero period")]
    ZeroPeriod(&'static str),

    /// Unrecognised alert level name.
    #[error("Unknown alert level '{0}'")]
    UnknownAlertLevel(String),

    /// Malformed transaction id.
    #[error("Invalid transaction id: {0}")]
    InvalidTxId(String),
}

/// Result alias for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
