//! Periodic health checks.

use super::supervisor::{ConnectionSupervisor, MonitorTask, Shared};
use crate::domain::models::ConnectionState;
use crate::infrastructure::transport::Transport;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

impl<T: Transport> ConnectionSupervisor<T> {
    /// Probe the current connection.
    ///
    /// `false` without touching the transport unless connected. A failed
    /// query counts as unhealthy and is never returned as an error.
    pub async fn health_check(&self) -> bool {
        let handle = {
            let inner = self.shared.inner.lock();
            if inner.state != ConnectionState::Connected {
                return false;
            }
            match &inner.handle {
                Some(handle) => Arc::clone(handle),
                None => return false,
            }
        };

        match self.shared.transport.is_connected(&handle).await {
            Ok(Some(alive)) => alive,
            Ok(None) => self.shared.config.assume_healthy_without_liveness,
            Err(e) => {
                warn!(parent: &self.shared.span, "Health check failed: {}", e);
                false
            }
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.shared.monitor.lock().is_some()
    }

    /// Start the health-check loop. Warns and does nothing if already running.
    pub fn start_monitoring(&self) {
        if !self.ensure_monitoring() {
            warn!(parent: &self.shared.span, "Monitoring already started");
        }
    }

    /// Start the loop if it is not running; returns whether it was started
    pub(super) fn ensure_monitoring(&self) -> bool {
        let mut slot = self.shared.monitor.lock();
        if slot.is_some() {
            return false;
        }

        let cancel = CancellationToken::new();
        let interval = self.shared.config.health_check_interval;
        let task = tokio::spawn(
            monitor_loop(Arc::downgrade(&self.shared), cancel.clone(), interval)
                .instrument(self.shared.span.clone()),
        );
        *slot = Some(MonitorTask { cancel, task });
        info!(parent: &self.shared.span, ?interval, "Connection monitoring started");
        true
    }

    /// Stop the loop and wait for it to finish
    pub async fn stop_monitoring(&self) {
        let monitor = self.shared.monitor.lock().take();
        if let Some(MonitorTask { cancel, task }) = monitor {
            cancel.cancel();
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(parent: &self.shared.span, "Monitoring loop panicked: {}", e);
                }
            }
            info!(parent: &self.shared.span, "Connection monitoring stopped");
        }
    }

    /// React to a failed health check
    fn handle_connection_lost(&self) {
        {
            let mut inner = self.shared.inner.lock();
            // a manual disconnect or connect got here first
            if inner.state != ConnectionState::Connected {
                return;
            }
            warn!("Connection lost - health check failed");
            inner.clear_connection();
        }

        if self.shared.config.auto_reconnect_enabled {
            self.spawn_reconnect();
        }
    }
}

async fn monitor_loop<T: Transport>(
    shared: Weak<Shared<T>>,
    cancel: CancellationToken,
    interval: Duration,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(shared) = shared.upgrade() else {
            break;
        };
        let supervisor = ConnectionSupervisor { shared };
        if supervisor.state() != ConnectionState::Connected {
            continue;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            healthy = supervisor.health_check() => {
                if healthy {
                    debug!("Health check passed");
                } else {
                    supervisor.handle_connection_lost();
                }
            }
        }
    }
    debug!("Monitoring loop exited");
}
