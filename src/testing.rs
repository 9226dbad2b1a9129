//! In-memory collaborators for unit tests

use crate::domain::models::DiscoveredDevice;
use crate::error::TransportError;
use crate::infrastructure::scheduler::ConnectionGate;
use crate::infrastructure::sink::{ExecutionOutcome, ExecutionSink, ResolvedItem};
use crate::infrastructure::transport::Transport;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Everything currently queued on `rx`
pub fn drain<E>(rx: &mut mpsc::UnboundedReceiver<E>) -> Vec<E> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[derive(Debug, PartialEq)]
pub struct FakeHandle {
    pub id: usize,
    pub address: String,
}

/// Scripted transport. Unscripted connects succeed and unscripted liveness
/// queries report alive.
#[derive(Default)]
pub struct FakeTransport {
    devices: Mutex<Vec<DiscoveredDevice>>,
    scan_error: Mutex<Option<TransportError>>,
    scan_delay: Mutex<Option<Duration>>,
    disconnect_error: Mutex<Option<TransportError>>,
    connect_results: Mutex<VecDeque<Result<(), TransportError>>>,
    liveness: Mutex<VecDeque<Result<Option<bool>, TransportError>>>,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    liveness_calls: AtomicUsize,
}

impl FakeTransport {
    pub fn set_devices(&self, devices: Vec<DiscoveredDevice>) {
        *self.devices.lock() = devices;
    }

    pub fn fail_scan(&self, error: TransportError) {
        *self.scan_error.lock() = Some(error);
    }

    /// Make scans take `delay` regardless of their timeout
    pub fn set_scan_delay(&self, delay: Duration) {
        *self.scan_delay.lock() = Some(delay);
    }

    pub fn fail_disconnect(&self, error: TransportError) {
        *self.disconnect_error.lock() = Some(error);
    }

    pub fn script_connect(&self, results: impl IntoIterator<Item = Result<(), TransportError>>) {
        self.connect_results.lock().extend(results);
    }

    pub fn script_liveness(
        &self,
        results: impl IntoIterator<Item = Result<Option<bool>, TransportError>>,
    ) {
        self.liveness.lock().extend(results);
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn liveness_calls(&self) -> usize {
        self.liveness_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    type Handle = FakeHandle;

    async fn scan(&self, _timeout: Duration) -> Result<Vec<DiscoveredDevice>, TransportError> {
        let delay = *self.scan_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.scan_error.lock().clone() {
            return Err(error);
        }
        Ok(self.devices.lock().clone())
    }

    async fn connect(&self, address: &str) -> Result<FakeHandle, TransportError> {
        let id = self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.connect_results.lock().pop_front();
        scripted.unwrap_or(Ok(()))?;
        Ok(FakeHandle {
            id,
            address: address.to_string(),
        })
    }

    async fn disconnect(&self, _handle: &FakeHandle) -> Result<(), TransportError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        match self.disconnect_error.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn is_connected(&self, _handle: &FakeHandle) -> Result<Option<bool>, TransportError> {
        self.liveness_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.liveness.lock().pop_front();
        scripted.unwrap_or(Ok(Some(true)))
    }
}

/// Sink that records every execution with the (virtual) time it began
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<(Instant, String)>>,
    outcomes: Mutex<HashMap<String, ExecutionOutcome>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_outcome(&self, preset: &str, outcome: ExecutionOutcome) {
        self.outcomes.lock().insert(preset.to_string(), outcome);
    }

    /// Make executions of `preset` take `delay` before returning
    pub fn set_delay(&self, preset: &str, delay: Duration) {
        self.delays.lock().insert(preset.to_string(), delay);
    }

    pub fn names(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(_, name)| name.clone()).collect()
    }

    pub fn calls_since(&self, start: Instant) -> Vec<(Duration, String)> {
        self.calls
            .lock()
            .iter()
            .map(|(at, name)| (at.duration_since(start), name.clone()))
            .collect()
    }
}

#[async_trait]
impl ExecutionSink for RecordingSink {
    async fn execute(&self, item: ResolvedItem) -> ExecutionOutcome {
        let name = item.preset.name;
        self.calls.lock().push((Instant::now(), name.clone()));

        let delay = self.delays.lock().get(&name).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self.outcomes.lock().get(&name).cloned();
        outcome.unwrap_or_else(ExecutionOutcome::success)
    }
}

pub struct FixedGate(pub bool);

impl ConnectionGate for FixedGate {
    fn is_connected(&self) -> bool {
        self.0
    }
}
