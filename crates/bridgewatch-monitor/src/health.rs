//! Periodic chain health checks.
//!
//! Every tick probes all registered chains concurrently, each under its own
//! timeout, and applies the results once the whole batch has settled. A chain
//! turns unhealthy only after `unhealthy_after_failures` consecutive failed
//! probes, and every healthy/unhealthy transition raises exactly one alert.

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bridgewatch_config::MonitorConfig;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alert_bus::AlertBus;
use crate::alerts::Alert;
use crate::error::{MonitorError, Result};
use crate::probe::ChainProbe;
use crate::task::PeriodicTask;
use crate::types::ChainId;

/// Snapshot of one monitored chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub chain_id: ChainId,
    pub healthy: bool,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_probe_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl NetworkStatus {
    fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            healthy: true,
            consecutive_failures: 0,
            last_probe_time: None,
            latest_block: None,
            last_error: None,
        }
    }
}

struct NetworkEntry {
    status: NetworkStatus,
    probe: Arc<dyn ChainProbe>,
}

/// Read-only health map: chain id to healthy flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HealthStatus {
    pub chains: BTreeMap<ChainId, bool>,
}

impl HealthStatus {
    /// `None` if the chain is not registered.
    pub fn is_healthy(&self, chain_id: ChainId) -> Option<bool> {
        self.chains.get(&chain_id).copied()
    }

    /// True when every registered chain is healthy (or none are registered).
    pub fn all_healthy(&self) -> bool {
        self.chains.values().all(|healthy| *healthy)
    }

    pub fn unhealthy_chains(&self) -> Vec<ChainId> {
        self.chains
            .iter()
            .filter(|(_, healthy)| !**healthy)
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Owns the per-chain health map and the periodic probe loop.
pub struct ChainHealthMonitor {
    networks: RwLock<BTreeMap<ChainId, NetworkEntry>>,
    bus: Arc<AlertBus>,
    interval: Duration,
    probe_timeout: Duration,
    unhealthy_after: u32,
    task: Mutex<Option<PeriodicTask>>,
}

impl ChainHealthMonitor {
    /// Fails with [`MonitorError::InvalidConfiguration`] if the config does
    /// not validate.
    pub fn new(config: &MonitorConfig, bus: Arc<AlertBus>) -> Result<Self> {
        let config = config.clone().validated()?;
        Ok(Self {
            networks: RwLock::new(BTreeMap::new()),
            bus,
            interval: config.health_check_interval(),
            probe_timeout: config.probe_timeout(),
            unhealthy_after: config.health.unhealthy_after_failures.max(1),
            task: Mutex::new(None),
        })
    }

    /// Register a chain, optimistically healthy.
    ///
    /// Registering a known chain again swaps its probe and keeps its state.
    pub fn add_network(&self, chain_id: ChainId, probe: Arc<dyn ChainProbe>) {
        let mut networks = self.networks.write();
        match networks.get_mut(&chain_id) {
            Some(entry) => {
                debug!(chain_id, "Replacing probe for monitored chain");
                entry.probe = probe;
            }
            None => {
                info!(chain_id, "Monitoring chain");
                networks.insert(
                    chain_id,
                    NetworkEntry {
                        status: NetworkStatus::new(chain_id),
                        probe,
                    },
                );
            }
        }
    }

    /// Start the periodic loop. The first round of probes runs immediately.
    ///
    /// Fails with [`MonitorError::NoRuntime`] outside a tokio runtime.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_cancelled()) {
            return Err(MonitorError::AlreadyRunning);
        }

        let monitor: Weak<Self> = Arc::downgrade(self);
        *task = Some(PeriodicTask::spawn(
            "health-check",
            self.interval,
            move |token| {
                let monitor = monitor.clone();
                async move {
                    if let Some(monitor) = monitor.upgrade() {
                        monitor.run_checks(Some(&token)).await;
                    }
                }
            },
        )?);

        info!(
            interval = ?self.interval,
            probe_timeout = ?self.probe_timeout,
            "Health checks started"
        );
        Ok(())
    }

    /// Cancel the loop and abandon in-flight probes. Idempotent.
    ///
    /// Alerts raised by the last applied round are delivered before this
    /// returns.
    pub fn stop(&self) {
        {
            // Results being applied right now land before the cancel, never after.
            let _networks = self.networks.write();
            if let Some(task) = self.task.lock().take() {
                task.cancel();
                info!("Health checks stopped");
            }
        }
        self.bus.drain();
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }

    /// Probe every chain once and apply the results.
    pub async fn check_all(&self) {
        self.run_checks(None).await;
    }

    async fn run_checks(&self, token: Option<&CancellationToken>) {
        let probes: Vec<(ChainId, Arc<dyn ChainProbe>)> = self
            .networks
            .read()
            .iter()
            .map(|(id, entry)| (*id, entry.probe.clone()))
            .collect();
        if probes.is_empty() {
            return;
        }

        let timeout = self.probe_timeout;
        let results = join_all(probes.into_iter().map(|(chain_id, probe)| async move {
            let outcome = match tokio::time::timeout(timeout, probe.probe()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(MonitorError::ProbeTimeout { chain_id, timeout }),
            };
            (chain_id, outcome)
        }))
        .await;

        {
            let mut networks = self.networks.write();
            if token.is_some_and(|t| t.is_cancelled()) {
                debug!("Discarding probe results after stop");
                return;
            }
            for (chain_id, outcome) in results {
                if let Some(entry) = networks.get_mut(&chain_id) {
                    self.apply(&mut entry.status, outcome);
                }
            }
        }

        self.bus.flush();
    }

    fn apply(&self, status: &mut NetworkStatus, outcome: Result<u64>) {
        let chain_id = status.chain_id;
        status.last_probe_time = Some(Utc::now());

        match outcome {
            Ok(height) => {
                status.latest_block = Some(height);
                status.consecutive_failures = 0;
                status.last_error = None;
                if !status.healthy {
                    status.healthy = true;
                    info!(chain_id, height, "Chain recovered");
                    self.bus.emit(Alert::info("Chain recovered").with_chain(chain_id));
                }
            }
            Err(e) => {
                status.consecutive_failures = status.consecutive_failures.saturating_add(1);
                warn!(
                    chain_id,
                    failures = status.consecutive_failures,
                    "Health probe failed: {}",
                    e
                );
                status.last_error = Some(e.to_string());

                if status.healthy && status.consecutive_failures >= self.unhealthy_after {
                    status.healthy = false;
                    self.bus.emit(
                        Alert::critical(format!(
                            "Chain unresponsive after {} consecutive failed probes",
                            status.consecutive_failures
                        ))
                        .with_chain(chain_id),
                    );
                }
            }
        }
    }

    /// Current health map.
    pub fn status(&self) -> HealthStatus {
        HealthStatus {
            chains: self
                .networks
                .read()
                .iter()
                .map(|(id, entry)| (*id, entry.status.healthy))
                .collect(),
        }
    }

    pub fn network(&self, chain_id: ChainId) -> Option<NetworkStatus> {
        self.networks
            .read()
            .get(&chain_id)
            .map(|entry| entry.status.clone())
    }

    /// All chains, ordered by id.
    pub fn networks(&self) -> Vec<NetworkStatus> {
        self.networks
            .read()
            .values()
            .map(|entry| entry.status.clone())
            .collect()
    }

    pub fn network_count(&self) -> usize {
        self.networks.read().len()
    }
}
