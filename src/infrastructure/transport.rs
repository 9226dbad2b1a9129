//! Bluetooth transport boundary.
//!
//! The supervisor never talks to a Bluetooth stack directly; it drives
//! whatever implements [`Transport`] and owns the handle it returns.

use crate::domain::models::DiscoveredDevice;
use crate::error::TransportError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// One physical connection to a panel
    type Handle: Send + Sync + 'static;

    /// Discover nearby devices for at most `timeout`
    async fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, TransportError>;

    async fn connect(&self, address: &str) -> Result<Self::Handle, TransportError>;

    async fn disconnect(&self, handle: &Self::Handle) -> Result<(), TransportError>;

    /// Query whether `handle` is still alive.
    ///
    /// Returns `Ok(None)` when the transport has no way to tell.
    async fn is_connected(&self, _handle: &Self::Handle) -> Result<Option<bool>, TransportError> {
        Ok(None)
    }
}

#[async_trait]
impl<T: Transport> Transport for Arc<T> {
    type Handle = T::Handle;

    async fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, TransportError> {
        (**self).scan(timeout).await
    }

    async fn connect(&self, address: &str) -> Result<Self::Handle, TransportError> {
        (**self).connect(address).await
    }

    async fn disconnect(&self, handle: &Self::Handle) -> Result<(), TransportError> {
        (**self).disconnect(handle).await
    }

    async fn is_connected(&self, handle: &Self::Handle) -> Result<Option<bool>, TransportError> {
        (**self).is_connected(handle).await
    }
}
