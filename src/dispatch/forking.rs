//! Process-per-connection dispatch (unix only).
//!
//! Each accepted connection is handled in a forked child process. The parent
//! keeps only the child's pid and its own copy of the stream, which it closes
//! immediately. Exited children are reaped opportunistically on every
//! dispatch and fully on shutdown.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};

use crate::dispatch::Dispatcher;
use crate::net::connection::Connection;
use crate::server::Handler;

/// Forks one OS process per accepted connection.
#[derive(Debug, Default)]
pub struct Forking {
    children: Mutex<Vec<Pid>>,
}

impl Forking {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of child processes not yet reaped.
    pub fn active_children(&self) -> usize {
        self.reap(false);
        self.children.lock().unwrap().len()
    }

    /// Collect exited children. With `blocking` set, waits for every
    /// remaining child to exit.
    fn reap(&self, blocking: bool) {
        let flag = if blocking {
            None
        } else {
            Some(WaitPidFlag::WNOHANG)
        };

        let mut children = self.children.lock().unwrap();
        children.retain(|&pid| match waitpid(pid, flag) {
            Ok(WaitStatus::StillAlive) => true,
            Ok(status) => {
                tracing::trace!(child = %pid, status = ?status, "Child exited");
                false
            }
            // already reaped elsewhere or not our child anymore
            Err(_) => false,
        });
    }
}

impl Dispatcher for Forking {
    fn name(&self) -> &'static str {
        "forking"
    }

    fn dispatch(&self, conn: Connection, peer: SocketAddr, handler: Arc<dyn Handler>) {
        self.reap(false);

        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                // The child must never unwind back into the accept loop.
                let code = match std::panic::catch_unwind(AssertUnwindSafe(|| {
                    handler.handle(conn, peer)
                })) {
                    Ok(Ok(())) => 0,
                    Ok(Err(_)) => 1,
                    Err(_) => 2,
                };
                unsafe { nix::libc::_exit(code) }
            }
            Ok(ForkResult::Parent { child }) => {
                tracing::debug!(peer = %peer, child = %child, "Connection forked");
                // close the parent's copy of the stream
                drop(conn);
                self.children.lock().unwrap().push(child);
            }
            Err(errno) => {
                tracing::error!(
                    peer = %peer,
                    error = %errno,
                    "fork failed, dropping connection"
                );
            }
        }
    }

    fn shutdown(&self) {
        self.reap(true);
    }
}
