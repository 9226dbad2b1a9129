//! Async machinery around the domain: collaborator boundaries, the
//! connection supervisor, the playlist scheduler and logging bootstrap

pub mod connection;
pub mod logging;
pub mod scheduler;
pub mod sink;
pub mod transport;
