//! Monitoring facade consumed by the bridge.
//!
//! Components emit alerts into the bus while holding their own locks; the
//! service flushes the bus only after those locks are released, so a
//! listener may call back into the service.

use std::sync::{Arc, Weak};

use bridgewatch_config::MonitorConfig;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::alert_bus::{AlertBus, ListenerId};
use crate::alerts::{Alert, AlertListener};
use crate::error::Result;
use crate::health::{ChainHealthMonitor, HealthStatus, NetworkStatus};
use crate::metrics::{MetricType, MetricsSnapshot, write_metric};
use crate::probe::ChainProbe;
use crate::task::PeriodicTask;
use crate::tracker::{TransactionRecord, TransactionTracker};
use crate::types::{ChainId, TxId};

/// Owned monitoring instance: transaction tracking, error-rate metrics,
/// chain health and alert fan-out behind one lifecycle.
pub struct MonitoringService {
    config: MonitorConfig,
    bus: Arc<AlertBus>,
    tracker: Arc<Mutex<TransactionTracker>>,
    health: Arc<ChainHealthMonitor>,
    latency: Mutex<LatencyScan>,
}

#[derive(Default)]
struct LatencyScan {
    task: Option<PeriodicTask>,
    /// Set by `stop_monitoring`; tracking does not restart the scan.
    halted: bool,
}

impl MonitoringService {
    /// Build a stopped service. Fails with
    /// [`crate::MonitorError::InvalidConfiguration`] if the config does not validate.
    pub fn new(config: MonitorConfig) -> Result<Self> {
        let config = config.validated()?;
        let bus = Arc::new(AlertBus::new());

        Ok(Self {
            tracker: Arc::new(Mutex::new(TransactionTracker::new(&config))),
            health: Arc::new(ChainHealthMonitor::new(&config, bus.clone())?),
            bus,
            config,
            latency: Mutex::new(LatencyScan::default()),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<AlertBus> {
        &self.bus
    }

    // ============================================================================
    // Networks
    // ============================================================================

    /// Register a chain for health checks.
    pub fn add_network<P>(&self, chain_id: ChainId, probe: P)
    where
        P: ChainProbe + 'static,
    {
        self.health.add_network(chain_id, Arc::new(probe));
    }

    pub fn network(&self, chain_id: ChainId) -> Option<NetworkStatus> {
        self.health.network(chain_id)
    }

    pub fn networks(&self) -> Vec<NetworkStatus> {
        self.health.networks()
    }

    // ============================================================================
    // Transactions
    // ============================================================================

    /// Start tracking a pending transaction.
    ///
    /// Inside a tokio runtime this also starts the latency scan, so stalled
    /// transactions are reported without [`MonitoringService::start_monitoring`].
    pub fn track_transaction(
        &self,
        tx_id: TxId,
        source_chain_id: ChainId,
        target_chain_id: ChainId,
    ) -> Result<()> {
        let mut tracker = self.tracker.lock();
        tracker.track(tx_id, source_chain_id, target_chain_id, Instant::now())?;

        if let Err(e) = self.ensure_latency_scan() {
            debug!("Latency scan not started: {}", e);
        }
        Ok(())
    }

    /// Record the terminal outcome of a tracked transaction.
    pub fn confirm_transaction(&self, tx_id: TxId, success: bool) -> Result<TransactionRecord> {
        let result = self
            .tracker
            .lock()
            .confirm(tx_id, success, Instant::now(), &self.bus);
        self.bus.flush();
        result
    }

    /// Record signature progress on a pending transaction.
    pub fn record_signature(&self, tx_id: TxId, signatures: u32, threshold: u32) -> Result<()> {
        let result = self.tracker.lock().record_signature(
            tx_id,
            signatures,
            threshold,
            Instant::now(),
            &self.bus,
        );
        self.bus.flush();
        result
    }

    /// Record the confirmation depth of a transaction.
    pub fn record_block_confirmations(&self, tx_id: TxId, confirmations: u64) -> Result<()> {
        let result = self
            .tracker
            .lock()
            .record_block_confirmations(tx_id, confirmations, &self.bus);
        self.bus.flush();
        result
    }

    pub fn transaction(&self, tx_id: &TxId) -> Option<TransactionRecord> {
        self.tracker.lock().get(tx_id).cloned()
    }

    // ============================================================================
    // Lifecycle
    // ============================================================================

    /// Start health checks and make sure the latency scan is running.
    ///
    /// Fails with [`crate::MonitorError::NoRuntime`] outside a tokio runtime and
    /// with [`crate::MonitorError::AlreadyRunning`] if already started.
    pub fn start_monitoring(&self) -> Result<()> {
        self.health.start()?;

        self.latency.lock().halted = false;
        if let Err(e) = self.ensure_latency_scan() {
            self.health.stop();
            return Err(e);
        }

        info!(
            networks = self.health.network_count(),
            "Monitoring started"
        );
        Ok(())
    }

    /// Stop health checks and the latency scan. Idempotent; does not wait for
    /// in-flight probes.
    ///
    /// Alerts already raised are delivered before this returns. The latency
    /// scan stays off until the next [`MonitoringService::start_monitoring`].
    pub fn stop_monitoring(&self) {
        self.health.stop();

        {
            let _tracker = self.tracker.lock();
            let mut latency = self.latency.lock();
            latency.halted = true;
            if let Some(task) = latency.task.take() {
                task.cancel();
                info!("Latency scan stopped");
            }
        }
        self.bus.drain();
    }

    pub fn is_monitoring(&self) -> bool {
        self.health.is_running()
    }

    /// Whether pending transactions are currently being scanned for latency.
    pub fn is_scanning_latency(&self) -> bool {
        self.latency
            .lock()
            .task
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }

    /// Spawn the latency scan unless it is running or halted by a stop.
    fn ensure_latency_scan(&self) -> Result<()> {
        let mut latency = self.latency.lock();
        if latency.halted || latency.task.as_ref().is_some_and(|t| !t.is_cancelled()) {
            return Ok(());
        }

        let tracker: Weak<Mutex<TransactionTracker>> = Arc::downgrade(&self.tracker);
        let bus = self.bus.clone();
        latency.task = Some(PeriodicTask::spawn(
            "latency-scan",
            self.config.latency_scan_interval(),
            move |token| {
                let tracker = tracker.clone();
                let bus = bus.clone();
                async move {
                    let Some(tracker) = tracker.upgrade() else {
                        return;
                    };
                    {
                        let mut tracker = tracker.lock();
                        if token.is_cancelled() {
                            return;
                        }
                        tracker.scan_latency(Instant::now(), &bus);
                    }
                    bus.flush();
                }
            },
        )?);
        debug!(interval = ?self.config.latency_scan_interval(), "Latency scan started");
        Ok(())
    }

    // ============================================================================
    // Snapshots
    // ============================================================================

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.tracker.lock().metrics()
    }

    pub fn health_status(&self) -> HealthStatus {
        self.health.status()
    }

    /// Transaction metrics plus per-chain health in Prometheus text format.
    pub fn export_metrics(&self) -> String {
        let mut out = self.get_metrics().to_prometheus();
        let networks = self.health.networks();

        let up: Vec<(String, f64)> = networks
            .iter()
            .map(|n| (chain_label(n.chain_id), if n.healthy { 1.0 } else { 0.0 }))
            .collect();
        write_metric(
            &mut out,
            "bridge_chain_up",
            MetricType::Gauge,
            "Whether the chain passed its recent health probes",
            &up,
        );

        let failures: Vec<(String, f64)> = networks
            .iter()
            .map(|n| (chain_label(n.chain_id), n.consecutive_failures as f64))
            .collect();
        write_metric(
            &mut out,
            "bridge_chain_consecutive_failures",
            MetricType::Gauge,
            "Failed health probes since the last success",
            &failures,
        );

        let heights: Vec<(String, f64)> = networks
            .iter()
            .filter_map(|n| n.latest_block.map(|h| (chain_label(n.chain_id), h as f64)))
            .collect();
        write_metric(
            &mut out,
            "bridge_chain_latest_block",
            MetricType::Gauge,
            "Latest block height reported by the chain probe",
            &heights,
        );

        write_metric(
            &mut out,
            "bridge_alerts_published_total",
            MetricType::Counter,
            "Alerts published on the alert bus",
            &[(String::new(), self.bus.published_count() as f64)],
        );
        write_metric(
            &mut out,
            "bridge_alert_delivery_failures_total",
            MetricType::Counter,
            "Alert listener invocations that failed",
            &[(String::new(), self.bus.delivery_failures() as f64)],
        );

        out
    }

    // ============================================================================
    // Alerts
    // ============================================================================

    pub fn subscribe(&self, listener: Arc<dyn AlertListener>) -> ListenerId {
        self.bus.subscribe(listener)
    }

    /// Subscribe a closure to every future alert.
    pub fn on_alert<F>(&self, name: impl Into<String>, f: F) -> ListenerId
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        self.bus.subscribe_fn(name, f)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn remove_all_listeners(&self) {
        self.bus.unsubscribe_all();
    }
}

impl Drop for MonitoringService {
    fn drop(&mut self) {
        self.health.stop();
    }
}

fn chain_label(chain_id: ChainId) -> String {
    format!("chain_id=\"{}\"", chain_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use async_trait::async_trait;
    use bridgewatch_config::{AlertThresholds, ConfigError};

    struct FixedProbe(u64);

    #[async_trait]
    impl ChainProbe for FixedProbe {
        async fn probe(&self) -> Result<u64> {
            Ok(self.0)
        }
    }

    fn service() -> MonitoringService {
        MonitoringService::new(MonitorConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_configuration() {
        let mut config = MonitorConfig::default();
        config.alert_thresholds.transaction_delay_secs = 0;
        let err = MonitoringService::new(config).err().unwrap();
        assert!(matches!(
            err,
            MonitorError::InvalidConfiguration(ConfigError::InvalidValue { ref field, .. })
                if field.contains("transaction_delay_secs")
        ));

        let mut config = MonitorConfig::default();
        config.health_check_interval_secs = 0;
        assert!(MonitoringService::new(config).is_err());
    }

    #[test]
    fn test_accepts_custom_thresholds() {
        let thresholds = AlertThresholds {
            cross_chain_latency_secs: 1,
            ..AlertThresholds::default()
        };
        let config = MonitorConfig::new(thresholds, 1).unwrap();
        let svc = MonitoringService::new(config).unwrap();
        assert_eq!(svc.config().alert_thresholds.cross_chain_latency_secs, 1);
        assert!(!svc.is_monitoring());
    }

    #[test]
    fn test_confirm_delivers_alert_after_unlock() {
        let svc = Arc::new(service());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let inner = svc.clone();
        svc.on_alert("reader", move |alert| {
            // Reads back into the service from inside the callback.
            let pending = inner.get_metrics().pending_transactions;
            sink.lock().push((alert.message.clone(), pending));
        });

        let tx = TxId::from_label("tx1");
        svc.track_transaction(tx, 1, 2).unwrap();
        svc.confirm_transaction(tx, true).unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, 0);
        // Break the listener's reference cycle.
        svc.remove_all_listeners();
    }

    #[test]
    fn test_export_metrics_includes_chains() {
        let svc = service();
        svc.add_network(1, FixedProbe(10));
        svc.add_network(2, FixedProbe(20));

        let tx = TxId::from_label("tx1");
        svc.track_transaction(tx, 1, 2).unwrap();

        let out = svc.export_metrics();
        assert!(out.contains("bridge_transactions_pending 1"));
        assert!(out.contains("bridge_chain_up{chain_id=\"1\"} 1"));
        assert!(out.contains("bridge_chain_up{chain_id=\"2\"} 1"));
        assert!(out.contains("# TYPE bridge_alerts_published_total counter"));
    }

    #[test]
    fn test_start_monitoring_outside_runtime_fails() {
        let svc = service();
        assert!(matches!(
            svc.start_monitoring(),
            Err(MonitorError::NoRuntime("health-check"))
        ));
        assert!(!svc.is_monitoring());

        svc.track_transaction(TxId::from_label("tx1"), 1, 2).unwrap();
        assert!(!svc.is_scanning_latency());
        assert_eq!(svc.get_metrics().pending_transactions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracking_starts_latency_scan() {
        let svc = service();
        assert!(!svc.is_scanning_latency());

        svc.track_transaction(TxId::from_label("tx1"), 1, 2).unwrap();
        assert!(svc.is_scanning_latency());
        assert!(!svc.is_monitoring());

        svc.stop_monitoring();
        assert!(!svc.is_scanning_latency());
        svc.track_transaction(TxId::from_label("tx2"), 1, 2).unwrap();
        assert!(!svc.is_scanning_latency());

        svc.start_monitoring().unwrap();
        assert!(svc.is_scanning_latency());
        svc.stop_monitoring();
    }

    #[test]
    fn test_transaction_snapshot() {
        let svc = service();
        let tx = TxId::from_label("tx1");
        assert!(svc.transaction(&tx).is_none());

        svc.track_transaction(tx, 1, 2).unwrap();
        let record = svc.transaction(&tx).unwrap();
        assert_eq!(record.source_chain_id, 1);
        assert_eq!(record.target_chain_id, 2);
    }
}
