//! Connection dispatch strategies.
//!
//! # Data Flow
//! ```text
//! Accepted connection
//!     → Dispatcher::dispatch (strategy chosen at server construction)
//!         sequential.rs → run inline on the accept thread
//!         threaded.rs   → dedicated OS thread per connection
//!         forking.rs    → dedicated OS process per connection (unix)
//!         pool.rs       → bounded worker pool, FIFO queue
//! ```
//!
//! # Design Decisions
//! - Strategy is an injected capability chosen at server construction
//! - Each dispatcher owns its workers and bookkeeping per instance;
//!   nothing is shared process-wide between servers
//! - Handler failures are logged, never propagated: task-level failures
//!   are the handler's responsibility

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::{DispatchConfig, DispatchStrategy};
use crate::net::connection::Connection;
use crate::server::Handler;

pub mod pool;
pub mod sequential;
pub mod threaded;

#[cfg(unix)]
pub mod forking;

#[cfg(unix)]
pub use forking::Forking;
pub use pool::Pool;
pub use sequential::Sequential;
pub use threaded::Threaded;

/// Policy governing how an accepted connection is handed off for handling.
pub trait Dispatcher: Send + Sync {
    /// Strategy name for logging.
    fn name(&self) -> &'static str;

    /// Hand one accepted connection to the handler. Must not block the
    /// accept loop on handler execution, except for the sequential strategy.
    fn dispatch(&self, conn: Connection, peer: SocketAddr, handler: Arc<dyn Handler>);

    /// Tear the strategy down, blocking until in-flight and queued work has
    /// drained. Idempotent.
    fn shutdown(&self);
}

/// Build a dispatcher from configuration.
pub fn from_config(config: &DispatchConfig) -> Arc<dyn Dispatcher> {
    match config.strategy {
        DispatchStrategy::Sequential => Arc::new(Sequential),
        DispatchStrategy::Threaded => Arc::new(Threaded::new()),
        DispatchStrategy::Forking => {
            #[cfg(unix)]
            {
                Arc::new(Forking::new())
            }
            #[cfg(not(unix))]
            {
                tracing::warn!("forking dispatch is unix-only, falling back to threaded");
                Arc::new(Threaded::new())
            }
        }
        DispatchStrategy::Pool => Arc::new(Pool::new(config.pool_workers)),
    }
}

/// Run the handler, logging a failure instead of propagating it.
pub(crate) fn run_handler(conn: Connection, peer: SocketAddr, handler: &dyn Handler) {
    let id = conn.id();
    if let Err(error) = handler.handle(conn, peer) {
        tracing::warn!(
            connection_id = %id,
            peer = %peer,
            error = %error,
            "Handler failed"
        );
    }
}
