//! Tests for chain health monitoring.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use bridgewatch_config::AlertThresholds;

use super::*;
use crate::alerts::AlertLevel;

struct MockProbe {
    up: AtomicBool,
    calls: AtomicU64,
    delay: Option<Duration>,
}

impl MockProbe {
    fn up() -> Arc<Self> {
        Arc::new(Self {
            up: AtomicBool::new(true),
            calls: AtomicU64::new(0),
            delay: None,
        })
    }

    fn down() -> Arc<Self> {
        let probe = Self::up();
        probe.set_up(false);
        probe
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            up: AtomicBool::new(true),
            calls: AtomicU64::new(0),
            delay: Some(delay),
        })
    }

    fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainProbe for MockProbe {
    async fn probe(&self) -> Result<u64> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.up.load(Ordering::SeqCst) {
            Ok(100 + n)
        } else {
            Err(MonitorError::ProbeFailed {
                chain_id: 0,
                message: "connection refused".to_string(),
            })
        }
    }
}

fn monitor(interval_secs: u64) -> (Arc<ChainHealthMonitor>, Arc<Mutex<Vec<Alert>>>) {
    let config = MonitorConfig::new(AlertThresholds::default(), interval_secs).unwrap();
    let bus = Arc::new(AlertBus::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe_fn("sink", move |a| sink.lock().push(a.clone()));
    (Arc::new(ChainHealthMonitor::new(&config, bus).unwrap()), seen)
}

fn count(seen: &Mutex<Vec<Alert>>, level: AlertLevel, text: &str) -> usize {
    seen.lock()
        .iter()
        .filter(|a| a.level == level && a.message.contains(text))
        .count()
}

#[test]
fn test_add_network_starts_healthy() {
    let (monitor, _) = monitor(1);
    monitor.add_network(1, MockProbe::up());
    monitor.add_network(2, MockProbe::down());

    let status = monitor.status();
    assert_eq!(status.is_healthy(1), Some(true));
    assert_eq!(status.is_healthy(2), Some(true));
    assert_eq!(status.is_healthy(3), None);
    assert!(status.all_healthy());

    let entry = monitor.network(1).unwrap();
    assert_eq!(entry.consecutive_failures, 0);
    assert!(entry.last_probe_time.is_none());
}

#[test]
fn test_health_status_serializes_as_map() {
    let mut status = HealthStatus::default();
    status.chains.insert(1, true);
    status.chains.insert(2, false);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json, serde_json::json!({ "1": true, "2": false }));
    assert_eq!(status.unhealthy_chains(), vec![2]);
}

#[tokio::test(start_paused = true)]
async fn test_successful_probe_after_one_interval() {
    let (monitor, seen) = monitor(1);
    let probe = MockProbe::up();
    monitor.add_network(1, probe.clone());
    monitor.start().unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(monitor.status().is_healthy(1), Some(true));
    let entry = monitor.network(1).unwrap();
    assert!(entry.last_probe_time.is_some());
    assert_eq!(entry.latest_block, Some(100 + probe.calls()));
    assert!(seen.lock().is_empty());
    monitor.stop();
}

#[tokio::test(start_paused = true)]
async fn test_failure_streak_raises_one_critical() {
    let (monitor, seen) = monitor(1);
    let probe = MockProbe::down();
    monitor.add_network(7, probe.clone());

    monitor.check_all().await;
    // One failure is below the streak.
    assert_eq!(monitor.status().is_healthy(7), Some(true));
    assert_eq!(monitor.network(7).unwrap().consecutive_failures, 1);

    monitor.check_all().await;
    assert_eq!(monitor.status().is_healthy(7), Some(false));

    for _ in 0..5 {
        monitor.check_all().await;
    }
    assert_eq!(count(&seen, AlertLevel::Critical, "Chain unresponsive"), 1);
    let critical = seen.lock()[0].clone();
    assert_eq!(critical.context.chain_id, Some(7));

    let entry = monitor.network(7).unwrap();
    assert_eq!(entry.consecutive_failures, 7);
    assert!(entry.last_error.unwrap().contains("connection refused"));
}

#[tokio::test(start_paused = true)]
async fn test_recovery_raises_info() {
    let (monitor, seen) = monitor(1);
    let probe = MockProbe::down();
    monitor.add_network(1, probe.clone());
    monitor.check_all().await;
    monitor.check_all().await;
    assert_eq!(monitor.status().is_healthy(1), Some(false));

    probe.set_up(true);
    monitor.check_all().await;
    monitor.check_all().await;

    assert_eq!(monitor.status().is_healthy(1), Some(true));
    assert_eq!(monitor.network(1).unwrap().consecutive_failures, 0);
    assert_eq!(count(&seen, AlertLevel::Info, "Chain recovered"), 1);

    let order: Vec<_> = seen.lock().iter().map(|a| a.level).collect();
    assert_eq!(order, vec![AlertLevel::Critical, AlertLevel::Info]);
}

#[tokio::test(start_paused = true)]
async fn test_intermittent_failure_does_not_flap() {
    let (monitor, seen) = monitor(1);
    let probe = MockProbe::up();
    monitor.add_network(1, probe.clone());

    for round in 0..6 {
        probe.set_up(round % 2 == 0);
        monitor.check_all().await;
    }
    assert_eq!(monitor.status().is_healthy(1), Some(true));
    assert!(seen.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_probe_times_out_without_blocking_others() {
    let (monitor, _) = monitor(1);
    let fast = MockProbe::up();
    let slow = MockProbe::slow(Duration::from_secs(30));
    monitor.add_network(1, fast.clone());
    monitor.add_network(2, slow.clone());

    let started = tokio::time::Instant::now();
    monitor.check_all().await;
    assert!(started.elapsed() < Duration::from_secs(2));

    let fast_entry = monitor.network(1).unwrap();
    assert_eq!(fast_entry.consecutive_failures, 0);
    assert!(fast_entry.latest_block.is_some());

    let slow_entry = monitor.network(2).unwrap();
    assert_eq!(slow_entry.consecutive_failures, 1);
    assert!(slow_entry.last_error.unwrap().contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_probes_and_alerts() {
    let (monitor, seen) = monitor(1);
    let probe = MockProbe::down();
    monitor.add_network(1, probe.clone());
    monitor.start().unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    monitor.stop();
    monitor.stop();
    assert!(!monitor.is_running());

    let calls = probe.calls();
    let before = monitor.network(1).unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(probe.calls(), calls);
    assert_eq!(monitor.network(1).unwrap(), before);
    assert!(seen.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_discards_in_flight_probe() {
    let (monitor, _) = monitor(10);
    monitor.add_network(1, MockProbe::slow(Duration::from_secs(5)));
    monitor.start().unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    monitor.stop();
    tokio::time::sleep(Duration::from_secs(20)).await;

    assert!(monitor.network(1).unwrap().last_probe_time.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_and_restart() {
    let (monitor, _) = monitor(1);
    monitor.start().unwrap();
    assert!(matches!(monitor.start(), Err(MonitorError::AlreadyRunning)));

    monitor.stop();
    monitor.start().unwrap();
    assert!(monitor.is_running());
    monitor.stop();
}

#[tokio::test(start_paused = true)]
async fn test_readding_network_keeps_state() {
    let (monitor, _) = monitor(1);
    monitor.add_network(1, MockProbe::down());
    monitor.check_all().await;
    monitor.check_all().await;
    assert_eq!(monitor.status().is_healthy(1), Some(false));

    let replacement = MockProbe::up();
    monitor.add_network(1, replacement.clone());
    assert_eq!(monitor.network_count(), 1);
    assert_eq!(monitor.status().is_healthy(1), Some(false));

    monitor.check_all().await;
    assert_eq!(replacement.calls(), 1);
    assert_eq!(monitor.status().is_healthy(1), Some(true));
}

#[test]
fn test_rejects_zero_interval() {
    let mut config = MonitorConfig::default();
    config.health_check_interval_secs = 0;
    let result = ChainHealthMonitor::new(&config, Arc::new(AlertBus::new()));
    assert!(matches!(result, Err(MonitorError::InvalidConfiguration(_))));
}

#[test]
fn test_start_outside_runtime_fails() {
    let (monitor, _) = monitor(1);
    monitor.add_network(1, MockProbe::up());
    assert!(matches!(
        monitor.start(),
        Err(MonitorError::NoRuntime("health-check"))
    ));
    assert!(!monitor.is_running());
    monitor.stop();
}
