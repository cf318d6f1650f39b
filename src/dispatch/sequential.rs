//! Inline dispatch on the accept thread.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::dispatch::{run_handler, Dispatcher};
use crate::net::connection::Connection;
use crate::server::Handler;

/// Handles one connection at a time on the accept thread. The accept loop
/// blocks for the duration of each handler invocation.
#[derive(Debug, Default)]
pub struct Sequential;

impl Dispatcher for Sequential {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn dispatch(&self, conn: Connection, peer: SocketAddr, handler: Arc<dyn Handler>) {
        run_handler(conn, peer, handler.as_ref());
    }

    fn shutdown(&self) {
        // nothing in flight beyond the accept thread itself
    }
}
