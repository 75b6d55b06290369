use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::registry::{Outbound, Registry, SendOutcome, Visit};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub reaped: usize,
}

/// One liveness tick.
///
/// Connections that did not acknowledge the previous probe are terminated and
/// removed; everyone else is marked unacknowledged and probed again.
pub fn sweep(registry: &Registry) -> SweepReport {
    let mut probed = 0;
    let reaped = registry.for_each(|conn| {
        if !conn.is_alive() {
            debug!(conn_id = conn.id(), "terminating unresponsive connection");
            conn.terminate();
            return Visit::Remove;
        }

        conn.set_alive(false);
        let outcome = conn.send(Outbound::Ping);
        if outcome != SendOutcome::Queued {
            // Not acknowledged either way; next tick reaps it.
            debug!(conn_id = conn.id(), ?outcome, "ping not queued");
        }
        probed += 1;
        Visit::Keep
    });

    SweepReport { probed, reaped }
}

/// Periodic sweep over the registry.
pub struct LivenessMonitor {
    registry: Arc<Registry>,
    period: Duration,
}

impl LivenessMonitor {
    pub fn new(registry: Arc<Registry>, period: Duration) -> Self {
        Self { registry, period }
    }

    /// Start sweeping. The first sweep runs one full period from now.
    ///
    /// The task stops when `shutdown` is cancelled or the returned handle is
    /// stopped or dropped.
    pub fn spawn(self, shutdown: CancellationToken) -> MonitorHandle {
        let token = shutdown.child_token();
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            let mut tick = tokio::time::interval_at(Instant::now() + self.period, self.period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = tick.tick() => {
                        let report = sweep(&self.registry);
                        if report.reaped > 0 {
                            info!(reaped = report.reaped, probed = report.probed, "liveness sweep");
                        } else {
                            debug!(probed = report.probed, "liveness sweep");
                        }
                    }
                }
            }
            debug!("liveness monitor stopped");
        });

        MonitorHandle {
            token,
            task: Some(task),
        }
    }
}

pub struct MonitorHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            self.token.cancel();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop and wait for the sweep task to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::channel_connection;

    #[test]
    fn first_sweep_probes_and_clears_alive() {
        let registry = Registry::new();
        let (conn, mut rx) = channel_connection(&registry, 4);

        let report = sweep(&registry);

        assert_eq!(report, SweepReport { probed: 1, reaped: 0 });
        assert!(!conn.is_alive());
        assert!(registry.contains(conn.id()));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Ping);
    }

    #[test]
    fn two_missed_probes_terminate() {
        let registry = Registry::new();
        let (conn, _rx) = channel_connection(&registry, 4);

        sweep(&registry);
        let report = sweep(&registry);

        assert_eq!(report, SweepReport { probed: 0, reaped: 1 });
        assert!(!registry.contains(conn.id()));
        assert!(conn.termination().is_cancelled());
    }

    #[test]
    fn acknowledged_connection_survives_every_sweep() {
        let registry = Registry::new();
        let (conn, mut rx) = channel_connection(&registry, 4);

        for _ in 0..10 {
            sweep(&registry);
            assert_eq!(rx.try_recv().unwrap(), Outbound::Ping);
            registry.mark_alive(conn.id());
        }

        assert!(registry.contains(conn.id()));
        assert!(!conn.termination().is_cancelled());
    }

    #[test]
    fn full_queue_does_not_reap_early() {
        let registry = Registry::new();
        let (conn, _rx) = channel_connection(&registry, 1);
        assert_eq!(conn.send(Outbound::Ping), SendOutcome::Queued);

        let report = sweep(&registry);
        assert_eq!(report.reaped, 0);
        assert!(registry.contains(conn.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_reaps_after_two_periods() {
        let registry = Arc::new(Registry::new());
        let (silent, _silent_rx) = channel_connection(&registry, 8);
        let (chatty, _chatty_rx) = channel_connection(&registry, 8);
        let period = Duration::from_secs(30);

        let handle = LivenessMonitor::new(registry.clone(), period).spawn(CancellationToken::new());

        tokio::time::sleep(period / 2).await;
        assert!(silent.is_alive(), "no sweep before the first full period");

        tokio::time::sleep(period).await;
        assert!(!silent.is_alive());
        assert!(registry.contains(silent.id()));
        registry.mark_alive(chatty.id());

        tokio::time::sleep(period).await;
        assert!(!registry.contains(silent.id()));
        assert!(silent.termination().is_cancelled());
        assert!(registry.contains(chatty.id()));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn parent_shutdown_stops_monitor() {
        let registry = Arc::new(Registry::new());
        let shutdown = CancellationToken::new();
        let handle = LivenessMonitor::new(registry, Duration::from_secs(1)).spawn(shutdown.clone());

        shutdown.cancel();
        assert!(handle.is_stopped());
        handle.shutdown().await;
    }
}
