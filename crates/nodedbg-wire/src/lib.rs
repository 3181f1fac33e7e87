//! nodedbg-wire — the engine's remote debugging protocol.
//!
//! This crate frames messages on the debug socket, numbers and correlates
//! requests, dispatches events, and caches value descriptors by handle for
//! the duration of one pause.

pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod refs;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

// Re-export key types for convenience.
pub use dispatcher::{PendingRequests, ResponseCallback};
pub use error::WireError;
pub use protocol::*;
pub use refs::RefCache;
pub use session::{to_arguments, Session, SessionEvent};
pub use transport::{Headers, Transport, TransportEvent};
