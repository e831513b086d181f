//! Cancellable periodic background tasks.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{MonitorError, Result};

/// A named loop that runs `tick` every `period` until cancelled.
///
/// The first tick runs immediately. A tick that overruns its period delays
/// the next one rather than bursting to catch up. Ticks never overlap.
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn the loop on the current tokio runtime.
    ///
    /// `tick` receives the task's cancellation token so it can drop work
    /// that completes after [`PeriodicTask::cancel`]. Fails with
    /// [`MonitorError::NoRuntime`] outside a runtime and with
    /// [`MonitorError::ZeroPeriod`] for a zero period.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Result<Self>
    where
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if period.is_zero() {
            return Err(MonitorError::ZeroPeriod(name));
        }
        let runtime = Handle::try_current().map_err(|_| MonitorError::NoRuntime(name))?;

        let token = CancellationToken::new();
        let child = token.clone();

        let handle = runtime.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(task = name, period = ?period, "Periodic task started");

            loop {
                tokio::select! {
                    biased;
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                trace!(task = name, "Tick");
                tokio::select! {
                    biased;
                    _ = child.cancelled() => break,
                    _ = tick(child.clone()) => {}
                }
            }

            debug!(task = name, "Periodic task stopped");
        });

        Ok(Self {
            name,
            token,
            handle,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop the loop and abandon any in-flight tick. Does not wait.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
