//! Routing layer seam.
//!
//! The orchestrator builds a [`RoutingConfig`] for the slot it wants
//! live, validates it, and applies it through the
//! [`ProxyController`] trait. The real controller drives nginx; the
//! live file is snapshotted before every apply so a failed deployment
//! can restore the exact pre-switch bytes.

pub mod nginx;
pub mod routing;

pub use nginx::{NginxController, ProxyController, ProxyError, RoutingSnapshot};
pub use routing::{RoutingConfig, RoutingSpec};
