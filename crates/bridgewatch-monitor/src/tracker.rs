//! Cross-chain transaction lifecycle tracking.
//!
//! A record moves `Pending -> Confirmed` or `Pending -> Failed` exactly once.
//! Terminal records are kept (bounded by `completed_retention`) for lookups
//! and duplicate detection; the oldest is evicted first.

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use bridgewatch_config::{AlertThresholds, MonitorConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::alert_bus::AlertBus;
use crate::alerts::Alert;
use crate::error::{MonitorError, Result};
use crate::metrics::{MetricsAggregator, MetricsSnapshot};
use crate::types::{ChainId, TxId};

/// Lifecycle state of a tracked transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// One tracked cross-chain transaction.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub tx_id: TxId,
    pub source_chain_id: ChainId,
    pub target_chain_id: ChainId,
    pub status: TransactionStatus,
    /// Wall-clock tracking time, for display.
    pub started_at: DateTime<Utc>,
    /// Monotonic tracking time, for threshold checks.
    pub start: Instant,
    /// Set once the latency warning has fired.
    pub latency_alert_fired: bool,
    pub signatures: u32,
    pub signature_threshold: Option<u32>,
    pub signature_threshold_reached: bool,
    pub signature_alert_fired: bool,
    pub confirmations: u64,
    pub finalized: bool,
    /// Time from tracking to the terminal outcome.
    pub completed_after: Option<Duration>,
}

impl TransactionRecord {
    fn new(tx_id: TxId, source_chain_id: ChainId, target_chain_id: ChainId, now: Instant) -> Self {
        Self {
            tx_id,
            source_chain_id,
            target_chain_id,
            status: TransactionStatus::Pending,
            started_at: Utc::now(),
            start: now,
            latency_alert_fired: false,
            signatures: 0,
            signature_threshold: None,
            signature_threshold_reached: false,
            signature_alert_fired: false,
            confirmations: 0,
            finalized: false,
            completed_after: None,
        }
    }

    /// Time spent since tracking, as of `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start)
    }
}

/// Tracks pending and recently completed transactions and owns the outcome
/// metrics they feed.
#[derive(Debug)]
pub struct TransactionTracker {
    thresholds: AlertThresholds,
    pending: HashMap<TxId, TransactionRecord>,
    completed: HashMap<TxId, TransactionRecord>,
    completed_order: VecDeque<TxId>,
    retention: usize,
    metrics: MetricsAggregator,
}

impl TransactionTracker {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            thresholds: config.alert_thresholds.clone(),
            pending: HashMap::new(),
            completed: HashMap::new(),
            completed_order: VecDeque::new(),
            retention: config.tracking.completed_retention.max(1),
            metrics: MetricsAggregator::from_config(config),
        }
    }

    /// Start tracking a transaction.
    pub fn track(
        &mut self,
        tx_id: TxId,
        source_chain_id: ChainId,
        target_chain_id: ChainId,
        now: Instant,
    ) -> Result<()> {
        if self.pending.contains_key(&tx_id) || self.completed.contains_key(&tx_id) {
            return Err(MonitorError::DuplicateTransaction(tx_id));
        }

        debug!(tx_id = %tx_id, source_chain_id, target_chain_id, "Tracking transaction");
        self.pending.insert(
            tx_id,
            TransactionRecord::new(tx_id, source_chain_id, target_chain_id, now),
        );
        Ok(())
    }

    /// Move a pending transaction to its terminal state and record the
    /// outcome in the metrics window.
    pub fn confirm(
        &mut self,
        tx_id: TxId,
        success: bool,
        now: Instant,
        bus: &AlertBus,
    ) -> Result<TransactionRecord> {
        let mut record = self
            .pending
            .remove(&tx_id)
            .ok_or_else(|| self.not_pending(tx_id))?;

        let elapsed = record.age(now);
        record.completed_after = Some(elapsed);
        record.status = if success {
            TransactionStatus::Confirmed
        } else {
            TransactionStatus::Failed
        };

        if elapsed > self.thresholds.transaction_delay() {
            bus.emit(
                Alert::warning(format!(
                    "Transaction execution delayed: completed after {:.1}s (threshold {}s)",
                    elapsed.as_secs_f64(),
                    self.thresholds.transaction_delay_secs
                ))
                .with_tx(tx_id),
            );
        }

        if success {
            info!(tx_id = %tx_id, elapsed = ?elapsed, "Transaction confirmed");
            bus.emit(Alert::info("Cross-chain transaction executed successfully").with_tx(tx_id));
        } else {
            info!(tx_id = %tx_id, elapsed = ?elapsed, "Transaction failed");
            bus.emit(Alert::warning("Cross-chain transaction failed").with_tx(tx_id));
        }

        self.metrics.record_outcome(success, bus);
        self.retain(record.clone());
        Ok(record)
    }

    /// Record signature progress for a pending transaction.
    pub fn record_signature(
        &mut self,
        tx_id: TxId,
        signatures: u32,
        threshold: u32,
        now: Instant,
        bus: &AlertBus,
    ) -> Result<()> {
        let signature_delay = self.thresholds.signature_delay();
        let signature_delay_secs = self.thresholds.signature_delay_secs;
        let not_pending = self.not_pending(tx_id);
        let record = self.pending.get_mut(&tx_id).ok_or(not_pending)?;

        record.signatures = record.signatures.max(signatures);
        record.signature_threshold = Some(threshold);

        if record.signature_threshold_reached || record.signatures < threshold {
            return Ok(());
        }

        record.signature_threshold_reached = true;
        bus.emit(
            Alert::info(format!(
                "Transaction reached signature threshold ({}/{})",
                record.signatures, threshold
            ))
            .with_tx(tx_id),
        );

        let age = record.age(now);
        if age > signature_delay && !record.signature_alert_fired {
            record.signature_alert_fired = true;
            bus.emit(
                Alert::warning(format!(
                    "Signature collection delayed: threshold reached after {:.1}s (threshold {}s)",
                    age.as_secs_f64(),
                    signature_delay_secs
                ))
                .with_tx(tx_id),
            );
        }
        Ok(())
    }

    /// Record the confirmation depth of a pending or retained transaction.
    pub fn record_block_confirmations(
        &mut self,
        tx_id: TxId,
        confirmations: u64,
        bus: &AlertBus,
    ) -> Result<()> {
        let required = self.thresholds.block_confirmations;
        let record = match self.pending.get_mut(&tx_id) {
            Some(record) => record,
            None => self
                .completed
                .get_mut(&tx_id)
                .ok_or(MonitorError::UnknownTransaction(tx_id))?,
        };

        record.confirmations = record.confirmations.max(confirmations);
        if !record.finalized && record.confirmations >= required {
            record.finalized = true;
            bus.emit(
                Alert::info(format!(
                    "Transaction finalized after {} block confirmations",
                    record.confirmations
                ))
                .with_tx(tx_id),
            );
        }
        Ok(())
    }

    /// Raise latency and signature-delay warnings for stalled transactions.
    ///
    /// Each pending record produces at most one warning of each kind.
    /// Returns the number of latency warnings raised.
    pub fn scan_latency(&mut self, now: Instant, bus: &AlertBus) -> usize {
        let latency = self.thresholds.cross_chain_latency();
        let signature_delay = self.thresholds.signature_delay();

        let mut stalled: Vec<&mut TransactionRecord> = self.pending.values_mut().collect();
        stalled.sort_by_key(|r| r.start);

        let mut fired = 0;
        for record in stalled {
            let age = record.age(now);

            if !record.latency_alert_fired && age > latency {
                record.latency_alert_fired = true;
                fired += 1;
                bus.emit(
                    Alert::warning(format!(
                        "High latency for cross-chain transaction: pending for {:.1}s (threshold {}s)",
                        age.as_secs_f64(),
                        latency.as_secs()
                    ))
                    .with_tx(record.tx_id)
                    .with_chain(record.target_chain_id),
                );
            }

            let awaiting_signatures =
                record.signature_threshold.is_some() && !record.signature_threshold_reached;
            if awaiting_signatures && !record.signature_alert_fired && age > signature_delay {
                record.signature_alert_fired = true;
                bus.emit(
                    Alert::warning(format!(
                        "Signature collection delayed: {}/{} signatures after {:.1}s",
                        record.signatures,
                        record.signature_threshold.unwrap_or_default(),
                        age.as_secs_f64()
                    ))
                    .with_tx(record.tx_id),
                );
            }
        }

        if fired > 0 {
            debug!(fired, "Latency scan raised warnings");
        }
        fired
    }

    /// Look up a pending or retained record.
    pub fn get(&self, tx_id: &TxId) -> Option<&TransactionRecord> {
        self.pending.get(tx_id).or_else(|| self.completed.get(tx_id))
    }

    pub fn is_pending(&self, tx_id: &TxId) -> bool {
        self.pending.contains_key(tx_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn retained_count(&self) -> usize {
        self.completed.len()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.pending.len())
    }

    fn not_pending(&self, tx_id: TxId) -> MonitorError {
        if self.completed.contains_key(&tx_id) {
            MonitorError::AlreadyConfirmed(tx_id)
        } else {
            MonitorError::UnknownTransaction(tx_id)
        }
    }

    fn retain(&mut self, record: TransactionRecord) {
        if self.completed_order.len() == self.retention {
            if let Some(oldest) = self.completed_order.pop_front() {
                self.completed.remove(&oldest);
            }
        }
        self.completed_order.push_back(record.tx_id);
        self.completed.insert(record.tx_id, record);
    }
}
