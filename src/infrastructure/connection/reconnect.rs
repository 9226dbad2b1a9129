//! Bounded auto-reconnection with exponential backoff.

use super::supervisor::{ConnectionSupervisor, ReconnectSequence};
use crate::domain::models::{ConnectionState, SupervisorEvent};
use crate::infrastructure::transport::Transport;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// What a caller needs to run one claimed sequence
struct Claim {
    id: u64,
    cancel: CancellationToken,
    address: String,
}

impl<T: Transport> ConnectionSupervisor<T> {
    pub fn is_reconnecting(&self) -> bool {
        self.shared.inner.lock().reconnect.is_some()
    }

    /// Run a reconnection sequence to completion.
    ///
    /// No-op while another sequence is running, while connected, or when no
    /// device address is remembered. Failures end in the `Failed` state and
    /// are never returned to the caller.
    pub async fn auto_reconnect(&self) {
        if let Some(claim) = self.claim_reconnect() {
            self.run_reconnect(claim)
                .instrument(self.shared.span.clone())
                .await;
        }
    }

    /// Start a reconnection sequence in the background
    pub(super) fn spawn_reconnect(&self) {
        if let Some(claim) = self.claim_reconnect() {
            let this = self.clone();
            tokio::spawn(
                async move { this.run_reconnect(claim).await }.instrument(self.shared.span.clone()),
            );
        }
    }

    fn claim_reconnect(&self) -> Option<Claim> {
        let _enter = self.shared.span.enter();
        let mut inner = self.shared.inner.lock();

        if inner.reconnect.is_some() {
            warn!("Reconnection already in progress");
            return None;
        }
        if matches!(
            inner.state,
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            debug!("Skipping reconnection while {}", inner.state);
            return None;
        }
        let Some(address) = inner.device_address.clone() else {
            warn!("Cannot reconnect: no device address stored");
            return None;
        };

        inner.next_sequence_id += 1;
        let id = inner.next_sequence_id;
        let cancel = CancellationToken::new();
        inner.reconnect = Some(ReconnectSequence {
            id,
            cancel: cancel.clone(),
        });
        inner.transition(ConnectionState::Reconnecting);

        Some(Claim {
            id,
            cancel,
            address,
        })
    }

    async fn run_reconnect(&self, claim: Claim) {
        let Claim {
            id,
            cancel,
            address,
        } = claim;
        let backoff = self.shared.config.backoff;

        for (attempt, delay) in (1..).zip(backoff.delays()) {
            {
                let mut inner = self.shared.inner.lock();
                if !is_current(&inner.reconnect, id) {
                    return;
                }
                inner.emit(SupervisorEvent::ReconnectAttempt {
                    attempt,
                    max_attempts: backoff.max_attempts,
                    delay,
                });
            }
            info!(
                "Reconnection attempt {}/{} in {:?}",
                attempt, backoff.max_attempts, delay
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                result = self.shared.transport.connect(&address) => result,
            };

            match result {
                Ok(handle) => {
                    self.finish_success(id, handle, &address, attempt).await;
                    return;
                }
                Err(e) => error!("Reconnection attempt {} failed: {}", attempt, e),
            }
        }

        let mut inner = self.shared.inner.lock();
        if is_current(&inner.reconnect, id) {
            inner.reconnect = None;
            error!(
                "Reconnection failed after {} attempts",
                backoff.max_attempts
            );
            inner.transition(ConnectionState::Failed);
        }
    }

    async fn finish_success(&self, id: u64, handle: T::Handle, address: &str, attempt: u32) {
        let handle = Arc::new(handle);
        let accepted = {
            let mut inner = self.shared.inner.lock();
            if is_current(&inner.reconnect, id) {
                inner.reconnect = None;
                let previous = inner.set_connection(Arc::clone(&handle), address);
                inner.reconnection_count += 1;
                Ok(previous)
            } else {
                Err(handle)
            }
        };

        let stale = match accepted {
            Ok(previous) => previous,
            Err(handle) => {
                // superseded by a manual connect or disconnect while connecting
                debug!("Discarding connection from cancelled reconnection");
                if let Err(e) = self.shared.transport.disconnect(&handle).await {
                    warn!("Closing discarded connection failed: {}", e);
                }
                return;
            }
        };
        if let Some(previous) = stale {
            if let Err(e) = self.shared.transport.disconnect(&previous).await {
                warn!("Closing superseded connection failed: {}", e);
            }
        }

        info!("Reconnection successful on attempt {}", attempt);
        if self.shared.config.monitor_on_connect {
            self.ensure_monitoring();
        }
    }
}

fn is_current(sequence: &Option<ReconnectSequence>, id: u64) -> bool {
    sequence.as_ref().is_some_and(|s| s.id == id)
}
