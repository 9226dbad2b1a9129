//! Device discovery through the transport, filtered by name.

use super::supervisor::ConnectionSupervisor;
use crate::domain::models::DiscoveredDevice;
use crate::error::{Result, TransportError};
use crate::infrastructure::transport::Transport;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info, Instrument};

/// Extra time a transport gets past the scan timeout before the scan is abandoned
const SCAN_GRACE: Duration = Duration::from_secs(2);

/// Keep devices whose name contains one of `filters`.
///
/// Keys are `"<name> (<address>)"`, values the address. Unnamed devices
/// never match.
pub fn filter_devices(devices: &[DiscoveredDevice], filters: &[String]) -> BTreeMap<String, String> {
    devices
        .iter()
        .filter_map(|device| {
            let name = device.name.as_deref()?;
            filters
                .iter()
                .any(|filter| name.contains(filter.as_str()))
                .then(|| (format!("{} ({})", name, device.address), device.address.clone()))
        })
        .collect()
}

impl<T: Transport> ConnectionSupervisor<T> {
    /// Scan for matching panels.
    ///
    /// Finding nothing is an empty mapping, not an error. A transport that
    /// overruns `timeout` by more than a short grace fails with
    /// [`TransportError::Scan`].
    pub async fn scan(&self, timeout: Duration) -> Result<BTreeMap<String, String>> {
        let span = self.shared.span.clone();
        async move {
            info!("Scanning for devices ({:?})...", timeout);
            let limit = timeout.saturating_add(SCAN_GRACE);
            let devices = tokio::time::timeout(limit, self.shared.transport.scan(timeout))
                .await
                .unwrap_or_else(|_| Err(TransportError::Scan(format!("no response within {:?}", limit))))
                .map_err(|e| {
                    error!("Device scan failed: {}", e);
                    e
                })?;

            let found = filter_devices(&devices, &self.shared.config.scan_name_filters);
            info!("Found {} matching of {} devices", found.len(), devices.len());
            Ok(found)
        }
        .instrument(span)
        .await
    }

    /// Scan using the configured timeout
    pub async fn scan_default(&self) -> Result<BTreeMap<String, String>> {
        self.scan(self.shared.config.scan_timeout).await
    }
}
