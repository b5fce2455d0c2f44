//! Messaging cluster control plane
//!
//! Publishes, revokes and looks up account claims over the cluster's
//! system-account request/reply API.

pub mod client;
pub mod messages;

pub use client::{ClusterConfig, ClusterControl, ConnectionState, NatsClusterClient};
