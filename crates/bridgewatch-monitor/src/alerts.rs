//! Alert types and listener trait definitions.

#[cfg(test)]
#[path = "alerts_tests.rs"]
mod tests;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{MonitorError, Result};
use crate::types::{ChainId, TxId};

/// Alert level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    /// Informational.
    Info,
    /// Degraded but operating.
    Warning,
    /// Immediate operator attention required.
    Critical,
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::Info => write!(f, "INFO"),
            AlertLevel::Warning => write!(f, "WARNING"),
            AlertLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl FromStr for AlertLevel {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(AlertLevel::Info),
            "warning" | "warn" => Ok(AlertLevel::Warning),
            "critical" => Ok(AlertLevel::Critical),
            _ => Err(MonitorError::UnknownAlertLevel(s.to_string())),
        }
    }
}

impl AlertLevel {
    /// Get emoji for level.
    pub fn emoji(&self) -> &'static str {
        match self {
            AlertLevel::Info => "\u{2139}\u{fe0f}",
            AlertLevel::Warning => "\u{26a0}\u{fe0f}",
            AlertLevel::Critical => "\u{1f6a8}",
        }
    }

    /// Get color for chat attachments.
    pub fn color(&self) -> &'static str {
        match self {
            AlertLevel::Info => "#36a64f",     // green
            AlertLevel::Warning => "#f0ad4e",  // yellow
            AlertLevel::Critical => "#800000", // dark red
        }
    }
}

/// Optional subject of an alert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<ChainId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<TxId>,
}

impl AlertContext {
    pub fn is_empty(&self) -> bool {
        self.chain_id.is_none() && self.tx_id.is_none()
    }
}

/// A monitoring alert. Never mutated once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "AlertContext::is_empty")]
    pub context: AlertContext,
}

impl Alert {
    /// Create a new alert stamped with the current time.
    pub fn new(level: AlertLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
            context: AlertContext::default(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Warning, message)
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Critical, message)
    }

    /// Attach the chain this alert is about.
    pub fn with_chain(mut self, chain_id: ChainId) -> Self {
        self.context.chain_id = Some(chain_id);
        self
    }

    /// Attach the transaction this alert is about.
    pub fn with_tx(mut self, tx_id: TxId) -> Self {
        self.context.tx_id = Some(tx_id);
        self
    }

    /// Format for text output.
    pub fn format_text(&self) -> String {
        let mut text = format!(
            "[{}] {} - {}",
            self.level,
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.message
        );

        if let Some(chain_id) = self.context.chain_id {
            text.push_str(&format!("\nChain: {}", chain_id));
        }
        if let Some(tx_id) = self.context.tx_id {
            text.push_str(&format!("\nTransaction: {}", tx_id));
        }

        text
    }

    /// Format for Markdown output.
    pub fn format_markdown(&self) -> String {
        let mut text = format!(
            "{} **{}** - {}\n\n{}",
            self.level.emoji(),
            self.level,
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.message
        );

        if let Some(chain_id) = self.context.chain_id {
            text.push_str(&format!("\n\n_Chain: {}_", chain_id));
        }
        if let Some(tx_id) = self.context.tx_id {
            text.push_str(&format!("\n\n_Transaction: `{}`_", tx_id));
        }

        text
    }
}

/// Receives every alert published on an [`crate::AlertBus`].
///
/// Called synchronously on the publishing thread, in emission order.
/// Implementations that do I/O should hand the alert off rather than block.
pub trait AlertListener: Send + Sync {
    /// Listener name used in logs.
    fn name(&self) -> &str;

    /// Handle an alert.
    fn on_alert(&self, alert: &Alert) -> Result<()>;
}

/// Closure adapter for [`AlertListener`].
pub struct FnListener<F> {
    name: String,
    f: F,
}

impl<F> FnListener<F>
where
    F: Fn(&Alert) + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> AlertListener for FnListener<F>
where
    F: Fn(&Alert) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_alert(&self, alert: &Alert) -> Result<()> {
        (self.f)(alert);
        Ok(())
    }
}

/// Log listener (writes to tracing).
pub struct LogListener;

impl AlertListener for LogListener {
    fn name(&self) -> &str {
        "log"
    }

    fn on_alert(&self, alert: &Alert) -> Result<()> {
        let chain_id = alert.context.chain_id;
        let tx_id = alert.context.tx_id.map(|id| id.to_string());
        match alert.level {
            AlertLevel::Info => info!(?chain_id, ?tx_id, "[ALERT] {}", alert.message),
            AlertLevel::Warning => warn!(?chain_id, ?tx_id, "[ALERT] {}", alert.message),
            AlertLevel::Critical => error!(?chain_id, ?tx_id, "[ALERT] {}", alert.message),
        }
        Ok(())
    }
}
