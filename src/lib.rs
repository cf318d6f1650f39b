//! TLS-terminating TCP server with pluggable connection dispatch.
//!
//! A synchronous TCP server that optionally terminates TLS on accept and
//! hands each connection to an injected dispatch strategy: inline on the
//! accept thread, one thread per connection, one process per connection
//! (unix only), or a bounded worker pool.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────┐
//!                  │                   SERVER                     │
//!                  │                                              │
//!   Client ────────┼─▶ ┌──────────┐      ┌──────────────────┐     │
//!   Connection     │   │   net    │─────▶│     server       │     │
//!                  │   │ listener │      │   accept loop    │     │
//!                  │   │  + TLS   │      └────────┬─────────┘     │
//!                  │   └──────────┘               │               │
//!                  │                              ▼               │
//!                  │                     ┌──────────────────┐     │
//!                  │                     │    dispatch      │     │
//!                  │                     │  sequential      │     │
//!                  │                     │  threaded        │     │
//!                  │                     │  forking (unix)  │     │
//!                  │                     │  pool            │     │
//!                  │                     └────────┬─────────┘     │
//!                  │                              ▼               │
//!                  │                     ┌──────────────────┐     │
//!                  │                     │     Handler      │     │
//!                  │                     │ (user-supplied)  │     │
//!                  │                     └──────────────────┘     │
//!                  │                                              │
//!                  │  ┌────────────────────────────────────────┐  │
//!                  │  │        Cross-Cutting Concerns          │  │
//!                  │  │  ┌────────┐        ┌───────────────┐   │  │
//!                  │  │  │ config │        │ observability │   │  │
//!                  │  │  └────────┘        └───────────────┘   │  │
//!                  │  └────────────────────────────────────────┘  │
//!                  └──────────────────────────────────────────────┘
//! ```
//!
//! The server owns the listening socket exclusively. A TLS context, if
//! supplied at construction, wraps the socket before activation; without one
//! the server runs plaintext and logs a single warning. The handler is
//! shared, not owned, and runs wherever the dispatch strategy places it.

// Core subsystems
pub mod config;
pub mod dispatch;
pub mod net;
pub mod server;

// Cross-cutting concerns
pub mod observability;

pub use config::ServerConfig;
pub use dispatch::Dispatcher;
pub use net::tls::TlsContext;
pub use server::{Handler, Server, ServerBuilder, ServerError};
