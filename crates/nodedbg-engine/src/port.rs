//! Debug port selection for self-launched engines.

use std::net::{Ipv4Addr, TcpListener};

/// Default engine debug port.
pub use nodedbg_config::DEFAULT_DEBUG_PORT;

/// The engine rejects debug ports at or below this value.
pub const MIN_DEBUG_PORT_EXCLUSIVE: u16 = 1024;

/// Whether the engine accepts `port` as a debug port.
pub fn is_valid_debug_port(port: u16) -> bool {
    port > MIN_DEBUG_PORT_EXCLUSIVE
}

/// Ask the OS for a free loopback port the engine will accept.
///
/// Binds and immediately releases a listener on port 0, retrying until the
/// assigned port is in range.
pub fn randomize_port() -> std::io::Result<u16> {
    loop {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        let port = listener.local_addr()?.port();
        drop(listener);
        if is_valid_debug_port(port) {
            tracing::debug!("picked debug port {}", port);
            return Ok(port);
        }
    }
}
