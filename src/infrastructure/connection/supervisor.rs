//! Connection Supervisor
//!
//! Single source of truth for the panel connection. Owns the transport
//! handle, the lifecycle state and the statistics, and emits
//! [`SupervisorEvent`]s to subscribers in the exact order transitions occur.

use crate::domain::backoff::Backoff;
use crate::domain::models::{ConnectionState, ConnectionStats, SupervisorEvent};
use crate::domain::settings::ConnectionSettings;
use crate::error::Result;
use crate::infrastructure::scheduler::ConnectionGate;
use crate::infrastructure::transport::Transport;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument, Span};

/// Tuning for monitoring and reconnection
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorConfig {
    pub health_check_interval: Duration,
    pub auto_reconnect_enabled: bool,
    pub backoff: Backoff,
    /// Start the health-check loop after every successful connect
    pub monitor_on_connect: bool,
    /// Health verdict when the transport cannot report liveness
    pub assume_healthy_without_liveness: bool,
    pub scan_timeout: Duration,
    /// A scanned device is kept when its name contains one of these
    pub scan_name_filters: Vec<String>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from(&ConnectionSettings::default())
    }
}

impl From<&ConnectionSettings> for SupervisorConfig {
    fn from(settings: &ConnectionSettings) -> Self {
        Self {
            health_check_interval: settings.health_check_interval(),
            auto_reconnect_enabled: settings.auto_reconnect_enabled,
            backoff: Backoff::from(settings),
            monitor_on_connect: settings.monitor_on_connect,
            assume_healthy_without_liveness: settings.assume_healthy_without_liveness,
            scan_timeout: settings.scan_timeout(),
            scan_name_filters: settings.scan_name_filters.clone(),
        }
    }
}

/// An in-flight reconnection sequence
pub(super) struct ReconnectSequence {
    pub(super) id: u64,
    pub(super) cancel: CancellationToken,
}

/// The running health-check loop
pub(super) struct MonitorTask {
    pub(super) cancel: CancellationToken,
    pub(super) task: JoinHandle<()>,
}

pub(super) struct Inner<H> {
    pub(super) state: ConnectionState,
    pub(super) handle: Option<Arc<H>>,
    pub(super) device_address: Option<String>,
    pub(super) connection_count: u32,
    pub(super) reconnection_count: u32,
    pub(super) last_connected: Option<DateTime<Utc>>,
    pub(super) last_disconnected: Option<DateTime<Utc>>,
    pub(super) connected_at: Option<Instant>,
    pub(super) reconnect: Option<ReconnectSequence>,
    pub(super) next_sequence_id: u64,
    listeners: Vec<mpsc::UnboundedSender<SupervisorEvent>>,
}

impl<H> Default for Inner<H> {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            handle: None,
            device_address: None,
            connection_count: 0,
            reconnection_count: 0,
            last_connected: None,
            last_disconnected: None,
            connected_at: None,
            reconnect: None,
            next_sequence_id: 0,
            listeners: Vec::new(),
        }
    }
}

impl<H> Inner<H> {
    pub(super) fn emit(&mut self, event: SupervisorEvent) {
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Change state and notify. Same-state transitions are dropped.
    pub(super) fn transition(&mut self, to: ConnectionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        info!("Connection state: {} -> {}", from, to);
        self.emit(SupervisorEvent::StateChanged { from, to });
    }

    /// Record a new live connection
    pub(super) fn set_connection(&mut self, handle: Arc<H>, address: &str) -> Option<Arc<H>> {
        let previous = self.handle.replace(handle);
        self.device_address = Some(address.to_string());
        self.connection_count += 1;
        self.last_connected = Some(Utc::now());
        self.connected_at = Some(Instant::now());
        self.transition(ConnectionState::Connected);
        info!(address, "Connection established");
        previous
    }

    /// Drop the handle and move to `Disconnected`
    pub(super) fn clear_connection(&mut self) -> Option<Arc<H>> {
        let handle = self.handle.take();
        if handle.is_some() {
            self.last_disconnected = Some(Utc::now());
        }
        self.connected_at = None;
        self.transition(ConnectionState::Disconnected);
        handle
    }
}

pub(super) struct Shared<T: Transport> {
    pub(super) transport: T,
    pub(super) config: SupervisorConfig,
    pub(super) span: Span,
    pub(super) inner: Mutex<Inner<T::Handle>>,
    pub(super) monitor: Mutex<Option<MonitorTask>>,
}

impl<T: Transport> Drop for Shared<T> {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.get_mut().take() {
            monitor.cancel.cancel();
        }
        if let Some(sequence) = self.inner.get_mut().reconnect.take() {
            sequence.cancel.cancel();
        }
    }
}

/// Tracks the panel connection, polls its health and reconnects with
/// exponential backoff.
///
/// Cheap to clone; clones share one connection.
pub struct ConnectionSupervisor<T: Transport> {
    pub(super) shared: Arc<Shared<T>>,
}

impl<T: Transport> Clone for ConnectionSupervisor<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Transport> ConnectionSupervisor<T> {
    pub fn new(transport: T, config: SupervisorConfig) -> Self {
        Self::with_span(transport, config, tracing::info_span!("supervisor"))
    }

    /// Create a supervisor whose log records, including those of its
    /// background tasks, are emitted inside `span`
    pub fn with_span(transport: T, config: SupervisorConfig, span: Span) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                config,
                span,
                inner: Mutex::new(Inner::default()),
                monitor: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Address of the last device a connect was attempted to
    pub fn device_address(&self) -> Option<String> {
        self.shared.inner.lock().device_address.clone()
    }

    /// Receive every future [`SupervisorEvent`], in transition order
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SupervisorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.inner.lock().listeners.push(tx);
        rx
    }

    pub fn stats(&self) -> ConnectionStats {
        let monitoring = self.is_monitoring();
        let inner = self.shared.inner.lock();
        let uptime = match inner.state {
            ConnectionState::Connected => inner.connected_at.map(|at| at.elapsed()),
            _ => None,
        };

        ConnectionStats {
            state: inner.state,
            device_address: inner.device_address.clone(),
            connection_count: inner.connection_count,
            reconnection_count: inner.reconnection_count,
            last_connected: inner.last_connected,
            last_disconnected: inner.last_disconnected,
            uptime,
            monitoring,
        }
    }

    /// Connect to `address`, replacing any current connection.
    ///
    /// Cancels a running reconnection sequence and stops monitoring first.
    /// On failure the state becomes `Failed` before the error is returned.
    pub async fn connect(&self, address: &str) -> Result<()> {
        let span = self.shared.span.clone();
        async move {
            self.cancel_reconnect();
            self.stop_monitoring().await;
            // a health check failing while the monitor stopped may have started one
            self.cancel_reconnect();

            let existing = {
                let mut inner = self.shared.inner.lock();
                if inner.handle.is_some() {
                    inner.clear_connection()
                } else {
                    None
                }
            };
            if let Some(handle) = existing {
                if let Err(e) = self.shared.transport.disconnect(&handle).await {
                    warn!("Closing previous connection failed: {}", e);
                }
            }

            {
                let mut inner = self.shared.inner.lock();
                inner.device_address = Some(address.to_string());
                inner.transition(ConnectionState::Connecting);
            }

            info!("Connecting to {}...", address);
            match self.shared.transport.connect(address).await {
                Ok(handle) => {
                    let previous = self
                        .shared
                        .inner
                        .lock()
                        .set_connection(Arc::new(handle), address);
                    if let Some(previous) = previous {
                        if let Err(e) = self.shared.transport.disconnect(&previous).await {
                            warn!("Closing superseded connection failed: {}", e);
                        }
                    }
                    if self.shared.config.monitor_on_connect {
                        self.ensure_monitoring();
                    }
                    Ok(())
                }
                Err(e) => {
                    error!("Connection to {} failed: {}", address, e);
                    self.shared
                        .inner
                        .lock()
                        .transition(ConnectionState::Failed);
                    Err(e.into())
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Tear down the connection.
    ///
    /// Returns `Ok` without side effects when there is nothing to tear
    /// down. Monitoring is stopped before the transport handle is closed.
    pub async fn disconnect(&self) -> Result<()> {
        let span = self.shared.span.clone();
        async move {
            let active = {
                let inner = self.shared.inner.lock();
                inner.handle.is_some() || inner.reconnect.is_some()
            };
            if !active {
                return Ok(());
            }

            info!(address = ?self.device_address(), "Disconnecting");
            self.cancel_reconnect();
            self.stop_monitoring().await;
            // a health check failing while the monitor stopped may have started one
            self.cancel_reconnect();

            let handle = self.shared.inner.lock().clear_connection();
            if let Some(handle) = handle {
                self.shared.transport.disconnect(&handle).await.map_err(|e| {
                    error!("Disconnection failed: {}", e);
                    e
                })?;
            }
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Cancel the in-flight reconnection sequence, if any
    pub(super) fn cancel_reconnect(&self) -> bool {
        let sequence = self.shared.inner.lock().reconnect.take();
        match sequence {
            Some(sequence) => {
                info!("Cancelling reconnection sequence {}", sequence.id);
                sequence.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

impl<T: Transport> ConnectionGate for ConnectionSupervisor<T> {
    fn is_connected(&self) -> bool {
        ConnectionSupervisor::is_connected(self)
    }
}
