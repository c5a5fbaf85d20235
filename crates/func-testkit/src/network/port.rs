//! Local TCP port probing.
//!
//! A port counts as available only when it can be bound on both the loopback
//! and the wildcard address, which is how the host itself will try to bind it.
//! Listeners are released immediately, so a later bind can still lose a race.

use crate::error::{FuncTestError, Result};
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use tracing::debug;

/// True if `port` can currently be bound on localhost.
pub fn is_port_available(port: u16) -> bool {
    let loopback = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let any = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

    match TcpListener::bind(loopback) {
        Ok(listener) => drop(listener),
        Err(e) => {
            debug!("Port {} unavailable on loopback: {}", port, e);
            return false;
        }
    }
    match TcpListener::bind(any) {
        Ok(listener) => {
            drop(listener);
            true
        }
        Err(e) => {
            debug!("Port {} unavailable on all interfaces: {}", port, e);
            false
        }
    }
}

/// Ask the OS for a free ephemeral port.
pub fn find_available_port() -> Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).map_err(|e| FuncTestError::Io {
        message: format!("Failed to reserve an ephemeral port: {}", e),
        path: None,
        source: Some(e),
    })?;
    Ok(listener.local_addr()?.port())
}
