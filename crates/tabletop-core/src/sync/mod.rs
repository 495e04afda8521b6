//! Persistent connection to the board server.
//!
//! [`SyncConnection`] owns the connection state machine. The actual I/O is
//! behind the [`Transport`] trait: [`WsTransport`] talks websocket from a
//! background thread, [`MemoryTransport`] is an in-process stand-in for
//! tests. Either way, results come back only when the owner calls `poll`,
//! so everything observable happens on the owner's thread.

mod connection;
mod discovery;
mod memory;
#[cfg(not(target_arch = "wasm32"))]
mod native;
pub mod protocol;

pub use connection::{ConnectionEvent, ConnectionState, SyncConnection};
#[cfg(not(target_arch = "wasm32"))]
pub use discovery::HttpDiscovery;
pub use discovery::{
    EndpointDiscovery, StaticEndpoint, parse_discovery_response, validate_ws_url,
};
pub use memory::{MemoryTransport, MemoryTransportHandle};
#[cfg(not(target_arch = "wasm32"))]
pub use native::WsTransport;
pub use protocol::{ClientMessage, Inbound, ServerMessage};

/// Transport used when none is named.
#[cfg(not(target_arch = "wasm32"))]
pub type PlatformTransport = WsTransport;
/// No socket support on wasm yet; the engine runs offline.
#[cfg(target_arch = "wasm32")]
pub type PlatformTransport = MemoryTransport;

use std::sync::Arc;

use crate::error::{SyncError, SyncResult};

/// Low-level events reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Discovery succeeded and the connection is open.
    Opened { url: String },
    /// A text frame arrived.
    Frame(String),
    /// The peer closed the connection cleanly.
    Closed,
    /// Discovery, open, or an established connection failed.
    Failed(SyncError),
}

/// A message pipe to the server.
pub trait Transport {
    /// Discover the endpoint and open a connection to it. Outcome is
    /// reported through [`Transport::poll`], never returned.
    fn open(&mut self, discovery: Arc<dyn EndpointDiscovery>);

    /// Send a text frame on an open connection.
    fn send(&mut self, frame: String) -> SyncResult<()>;

    /// Drain pending events (non-blocking).
    fn poll(&mut self) -> Vec<TransportEvent>;

    /// Close the connection. No further events are reported.
    fn close(&mut self);
}
