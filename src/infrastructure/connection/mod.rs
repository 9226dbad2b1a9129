//! Connection Module
//!
//! Supervises the link to the LED panel.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  ConnectionSupervisor                     │
//! │   (state, stats, handle ownership, event subscribers)     │
//! └─────────────────────┬────────────────────────────────────┘
//!                       │
//!         ┌─────────────┼──────────────┐
//!         │             │              │
//!         ▼             ▼              ▼
//! ┌────────────┐ ┌─────────────┐ ┌────────────┐
//! │  Scanner   │ │   Monitor   │ │ Reconnect  │
//! │            │ │             │ │            │
//! │ - discovery│ │ - periodic  │ │ - backoff  │
//! │ - name     │ │   health    │ │ - bounded  │
//! │   filters  │ │   checks    │ │   retries  │
//! └────────────┘ └─────────────┘ └────────────┘
//!                       │
//!                       ▼
//!               ┌───────────────┐
//!               │   Transport   │
//!               └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`supervisor`] - State machine, connect/disconnect and statistics
//! - [`monitor`] - Health checks and the monitoring loop
//! - [`reconnect`] - Exponential-backoff auto-reconnection
//! - [`scanner`] - Device discovery and name filtering

pub mod monitor;
pub mod reconnect;
pub mod scanner;
pub mod supervisor;

pub use scanner::filter_devices;
pub use supervisor::{ConnectionSupervisor, SupervisorConfig};
