//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (socket lifecycle, accept)
//!     → tls.rs (optional TLS handshake)
//!     → connection.rs (stream abstraction, connection IDs)
//!     → Hand off to dispatch strategy
//!
//! Listener States:
//!     Open → Bound → Listening → Closed
//! ```
//!
//! # Design Decisions
//! - Bind and activate are separate steps so callers can defer either
//! - TLS is optional and handled transparently at accept time
//! - Handshake failures are per-connection, never fatal to the listener

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{Connection, ConnectionId};
pub use listener::{Listener, ListenerError};
pub use tls::{TlsContext, TlsError};
