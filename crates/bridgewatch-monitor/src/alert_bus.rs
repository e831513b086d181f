//! Alert bus dispatching alerts to subscribed listeners.
//!
//! Publishing is split in two steps. [`AlertBus::emit`] only enqueues and is
//! safe to call while holding component locks; [`AlertBus::flush`] delivers
//! the queue to listeners. Delivery is serialized: one caller at a time
//! drains the queue, so every listener observes alerts in emission order,
//! and a listener that publishes from inside its callback has its alert
//! delivered after the current one instead of deadlocking.
//! [`AlertBus::drain`] additionally waits out a delivery running on another
//! thread, so a stopping component can return only after everything it
//! emitted has reached the listeners.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error};

use crate::alerts::{Alert, AlertListener, FnListener};
use crate::error::MonitorError;

/// Handle returned by [`AlertBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Publish/subscribe alert bus.
pub struct AlertBus {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn AlertListener>)>>,
    queue: Mutex<VecDeque<Alert>>,
    delivering: Mutex<()>,
    deliverer: Mutex<Option<ThreadId>>,
    next_id: AtomicU64,
    published: AtomicU64,
    delivery_failures: AtomicU64,
}

impl AlertBus {
    /// Create a bus with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            queue: Mutex::new(VecDeque::new()),
            delivering: Mutex::new(()),
            deliverer: Mutex::new(None),
            next_id: AtomicU64::new(1),
            published: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
        }
    }

    /// Register a listener for every future alert.
    pub fn subscribe(&self, listener: Arc<dyn AlertListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(listener = listener.name(), "Alert listener subscribed");
        self.listeners.write().push((id, listener));
        id
    }

    /// Register a closure as a listener.
    pub fn subscribe_fn<F>(&self, name: impl Into<String>, f: F) -> ListenerId
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(FnListener::new(name, f)))
    }

    /// Remove one listener. Returns whether it was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Remove every listener.
    pub fn unsubscribe_all(&self) {
        self.listeners.write().clear();
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Names of registered listeners, in subscription order.
    pub fn listener_names(&self) -> Vec<String> {
        self.listeners
            .read()
            .iter()
            .map(|(_, l)| l.name().to_string())
            .collect()
    }

    /// Total alerts accepted by the bus.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Total listener invocations that failed or panicked.
    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures.load(Ordering::Relaxed)
    }

    /// Enqueue and deliver an alert.
    pub fn publish(&self, alert: Alert) {
        self.emit(alert);
        self.flush();
    }

    /// Enqueue an alert without delivering it.
    pub fn emit(&self, alert: Alert) {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.queue.lock().push_back(alert);
    }

    /// Deliver every queued alert.
    ///
    /// Returns immediately if another caller is already delivering; that
    /// caller picks up whatever was queued.
    pub fn flush(&self) {
        loop {
            let Some(guard) = self.delivering.try_lock() else {
                return;
            };
            *self.deliverer.lock() = Some(thread::current().id());

            loop {
                let next = self.queue.lock().pop_front();
                match next {
                    Some(alert) => self.deliver(&alert),
                    None => break,
                }
            }

            *self.deliverer.lock() = None;
            drop(guard);

            // An alert enqueued between the last pop and the unlock would
            // otherwise wait for the next flush.
            if self.queue.lock().is_empty() {
                return;
            }
        }
    }

    /// Deliver every queued alert, blocking until a delivery running on
    /// another thread has finished.
    ///
    /// Called from inside a listener it behaves like [`AlertBus::flush`].
    pub fn drain(&self) {
        loop {
            self.flush();
            if *self.deliverer.lock() == Some(thread::current().id()) {
                return;
            }

            let _guard = self.delivering.lock();
            if self.queue.lock().is_empty() {
                return;
            }
        }
    }

    fn deliver(&self, alert: &Alert) {
        let listeners: Vec<Arc<dyn AlertListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();

        for listener in listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_alert(alert)));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };

            self.delivery_failures.fetch_add(1, Ordering::Relaxed);
            let err = MonitorError::SubscriberFailure {
                listener: listener.name().to_string(),
                message: failure,
            };
            error!(level = %alert.level, "{}", err);
        }
    }
}

impl Default for AlertBus {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertLevel;
    use crate::error::Result;

    fn collector(bus: &AlertBus, name: &str) -> Arc<Mutex<Vec<Alert>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe_fn(name, move |alert| sink.lock().push(alert.clone()));
        seen
    }

    struct FailingListener;

    impl AlertListener for FailingListener {
        fn name(&self) -> &str {
            "failing"
        }

        fn on_alert(&self, _alert: &Alert) -> Result<()> {
            Err(MonitorError::AlertDelivery("sink offline".to_string()))
        }
    }

    struct PanickingListener;

    impl AlertListener for PanickingListener {
        fn name(&self) -> &str {
            "panicking"
        }

        fn on_alert(&self, _alert: &Alert) -> Result<()> {
            panic!("listener bug");
        }
    }

    #[test]
    fn test_every_subscriber_receives_in_order() {
        let bus = AlertBus::new();
        let first = collector(&bus, "first");
        let second = collector(&bus, "second");

        bus.publish(Alert::info("one"));
        bus.publish(Alert::warning("two"));
        bus.publish(Alert::critical("three"));

        for seen in [first, second] {
            let messages: Vec<_> = seen.lock().iter().map(|a| a.message.clone()).collect();
            assert_eq!(messages, vec!["one", "two", "three"]);
        }
        assert_eq!(bus.published_count(), 3);
    }

    #[test]
    fn test_failing_listeners_are_isolated() {
        let bus = AlertBus::new();
        bus.subscribe(Arc::new(FailingListener));
        bus.subscribe(Arc::new(PanickingListener));
        let seen = collector(&bus, "healthy");

        bus.publish(Alert::critical("Chain unresponsive"));
        bus.publish(Alert::info("Chain recovered"));

        assert_eq!(seen.lock().len(), 2);
        assert_eq!(bus.delivery_failures(), 4);
    }

    #[test]
    fn test_emit_defers_until_flush() {
        let bus = AlertBus::new();
        let seen = collector(&bus, "sink");

        bus.emit(Alert::info("queued"));
        assert!(seen.lock().is_empty());

        bus.flush();
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_reentrant_publish_is_delivered_after_current() {
        let bus = Arc::new(AlertBus::new());
        let seen = collector(&bus, "sink");

        let inner = bus.clone();
        bus.subscribe_fn("echo", move |alert| {
            if alert.level == AlertLevel::Critical {
                inner.publish(Alert::info(format!("ack: {}", alert.message)));
            }
        });

        bus.publish(Alert::critical("High error rate detected"));

        let messages: Vec<_> = seen.lock().iter().map(|a| a.message.clone()).collect();
        assert_eq!(
            messages,
            vec!["High error rate detected", "ack: High error rate detected"]
        );
    }

    #[test]
    fn test_drain_waits_for_delivery_on_another_thread() {
        let bus = Arc::new(AlertBus::new());
        let seen = collector(&bus, "sink");

        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        bus.subscribe_fn("gate", move |alert| {
            if alert.message == "slow" {
                let _ = entered_tx.send(());
                let _ = release_rx.lock().recv();
            }
        });

        let worker = {
            let bus = bus.clone();
            std::thread::spawn(move || bus.publish(Alert::info("slow")))
        };
        entered_rx.recv().unwrap();

        bus.emit(Alert::info("queued behind"));
        bus.flush();
        assert_eq!(seen.lock().len(), 1);

        release_tx.send(()).unwrap();
        bus.drain();

        let messages: Vec<_> = seen.lock().iter().map(|a| a.message.clone()).collect();
        assert_eq!(messages, vec!["slow", "queued behind"]);
        worker.join().unwrap();
    }

    #[test]
    fn test_drain_from_listener_does_not_block() {
        let bus = Arc::new(AlertBus::new());
        let seen = collector(&bus, "sink");

        let inner = bus.clone();
        bus.subscribe_fn("stopper", move |alert| {
            if alert.level == AlertLevel::Critical {
                inner.emit(Alert::info("stopping"));
                inner.drain();
            }
        });

        bus.publish(Alert::critical("Chain unresponsive"));
        bus.drain();

        let messages: Vec<_> = seen.lock().iter().map(|a| a.message.clone()).collect();
        assert_eq!(messages, vec!["Chain unresponsive", "stopping"]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = AlertBus::new();
        let seen = Arc::new(Mutex::new(0usize));
        let counter = seen.clone();
        let id = bus.subscribe_fn("counter", move |_| *counter.lock() += 1);
        let _other = collector(&bus, "other");
        assert_eq!(bus.listener_names(), vec!["counter", "other"]);

        bus.publish(Alert::info("a"));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(Alert::info("b"));
        assert_eq!(*seen.lock(), 1);

        bus.unsubscribe_all();
        assert_eq!(bus.listener_count(), 0);
        bus.publish(Alert::info("c"));
    }
}
