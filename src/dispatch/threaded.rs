//! Thread-per-connection dispatch.
//!
//! Concurrency is unbounded, limited only by what the OS will allow.
//! Threads are detached; an in-flight count lets shutdown wait for
//! stragglers instead of joining handles.

use std::net::SocketAddr;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crate::dispatch::{run_handler, Dispatcher};
use crate::net::connection::Connection;
use crate::server::Handler;

#[derive(Debug, Default)]
struct InFlight {
    count: Mutex<usize>,
    drained: Condvar,
}

impl InFlight {
    fn increment(&self) {
        *self.count.lock().unwrap() += 1;
    }

    fn decrement(&self) {
        let mut count = self.count.lock().unwrap();
        *count -= 1;
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    fn wait_for_drain(&self) {
        let mut count = self.count.lock().unwrap();
        while *count > 0 {
            count = self.drained.wait(count).unwrap();
        }
    }
}

/// Decrements the in-flight count when the handler thread ends, panicking
/// handlers included.
struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Spawns one dedicated OS thread per accepted connection.
#[derive(Debug, Default)]
pub struct Threaded {
    in_flight: Arc<InFlight>,
}

impl Threaded {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connection threads currently running.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.count.lock().unwrap()
    }
}

impl Dispatcher for Threaded {
    fn name(&self) -> &'static str {
        "threaded"
    }

    fn dispatch(&self, conn: Connection, peer: SocketAddr, handler: Arc<dyn Handler>) {
        let id = conn.id();
        self.in_flight.increment();
        let guard = InFlightGuard(Arc::clone(&self.in_flight));

        let spawned = thread::Builder::new()
            .name(format!("{}", id))
            .spawn(move || {
                let _guard = guard;
                run_handler(conn, peer, handler.as_ref());
            });

        if let Err(error) = spawned {
            // the closure (and with it the connection and guard) was dropped
            tracing::error!(
                connection_id = %id,
                peer = %peer,
                error = %error,
                "Failed to spawn connection thread, dropping connection"
            );
        }
    }

    fn shutdown(&self) {
        self.in_flight.wait_for_drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn in_flight_counts_drain() {
        let in_flight = Arc::new(InFlight::default());

        for _ in 0..4 {
            in_flight.increment();
            let guard = InFlightGuard(Arc::clone(&in_flight));
            thread::spawn(move || {
                let _guard = guard;
                thread::sleep(Duration::from_millis(20));
            });
        }

        in_flight.wait_for_drain();
        assert_eq!(*in_flight.count.lock().unwrap(), 0);
    }

    #[test]
    fn guard_decrements_on_panic() {
        let in_flight = Arc::new(InFlight::default());
        in_flight.increment();
        let guard = InFlightGuard(Arc::clone(&in_flight));

        let handle = thread::spawn(move || {
            let _guard = guard;
            panic!("handler blew up");
        });
        assert!(handle.join().is_err());

        in_flight.wait_for_drain();
    }

    #[test]
    fn shutdown_with_nothing_in_flight_returns() {
        let threaded = Threaded::new();
        assert_eq!(threaded.in_flight(), 0);
        threaded.shutdown();
    }
}
