//! Heartbeat Monitor
//!
//! Periodic liveness sweep tied to the lifetime of the monitor handle.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::session_registry::SessionRegistry;

/// Owns the sweep task. Dropping the monitor cancels it.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    task: JoinHandle<()>,
}

impl HeartbeatMonitor {
    /// Sweep every `every`, evicting connections silent for longer than `timeout`.
    pub fn spawn(registry: Arc<SessionRegistry>, every: Duration, timeout: Duration) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // Skip first immediate tick

            loop {
                ticker.tick().await;
                let report = registry.sweep(timeout);
                if !report.evicted.is_empty() {
                    tracing::info!(
                        evicted = report.evicted.len(),
                        pinged = report.pinged,
                        "Heartbeat sweep evicted connections"
                    );
                }
            }
        });

        tracing::debug!(
            interval_ms = every.as_millis() as u64,
            timeout_ms = timeout.as_millis() as u64,
            "Heartbeat monitor started"
        );
        Self { task }
    }

    /// Stop sweeping.
    pub fn shutdown(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}
