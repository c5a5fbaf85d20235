//! Network helpers for talking to a local host.
//!
//! - `port` - Port availability and ephemeral port selection
//! - `health` - Readiness polling
//! - `client` - HTTP client bound to the host's base address

mod client;
mod health;
mod port;

pub use client::HostClient;
pub use health::{wait_until_healthy, HealthProbe, ReqwestProbe};
pub use port::{find_available_port, is_port_available};
