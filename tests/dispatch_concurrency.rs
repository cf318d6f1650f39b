//! Dispatch strategy tests: thread-per-connection concurrency, pool
//! queueing, drain-on-close and bounded bookkeeping.

mod common;

use std::collections::HashSet;
use std::io::Read;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use common::{spawn_serving, wait_for, EchoHandler};
use tlserve::dispatch::{Dispatcher, Pool, Threaded};
use tlserve::net::Connection;
use tlserve::server::Handler;
use tlserve::Server;

fn any_addr() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

/// Blocks every connection on a shared barrier, so the test only completes
/// if all handlers run concurrently.
struct BarrierHandler {
    barrier: Arc<Barrier>,
}

impl Handler for BarrierHandler {
    fn handle(&self, mut conn: Connection, _peer: SocketAddr) -> std::io::Result<()> {
        self.barrier.wait();
        use std::io::Write;
        conn.write_all(b"ok")
    }
}

#[test]
fn threaded_runs_handlers_concurrently() {
    const CLIENTS: usize = 4;

    let barrier = Arc::new(Barrier::new(CLIENTS));
    let server = Arc::new(
        Server::builder(
            any_addr(),
            BarrierHandler {
                barrier: Arc::clone(&barrier),
            },
        )
        .dispatcher(Arc::new(Threaded::new()))
        .build()
        .unwrap(),
    );
    let addr = server.local_addr().unwrap();

    let handle = spawn_serving(Arc::clone(&server));

    // all clients get their response only if CLIENTS handlers reach the
    // barrier at the same time
    let clients: Vec<_> = (0..CLIENTS)
        .map(|_| {
            thread::spawn(move || {
                let mut stream = TcpStream::connect(addr).unwrap();
                let mut buf = [0u8; 2];
                stream.read_exact(&mut buf).unwrap();
                assert_eq!(&buf, b"ok");
            })
        })
        .collect();
    for client in clients {
        client.join().unwrap();
    }

    server.server_close();
    handle.join().unwrap();
}

/// Records which worker threads ran it and counts completions.
struct PoolProbe {
    completed: Arc<AtomicUsize>,
    workers: Arc<Mutex<HashSet<String>>>,
    delay: Duration,
}

impl Handler for PoolProbe {
    fn handle(&self, mut conn: Connection, _peer: SocketAddr) -> std::io::Result<()> {
        if let Some(name) = thread::current().name() {
            self.workers.lock().unwrap().insert(name.to_string());
        }
        thread::sleep(self.delay);
        use std::io::Write;
        conn.write_all(b"d")?;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn pool_queues_excess_and_close_drains_everything() {
    const WORKERS: usize = 2;
    const CLIENTS: usize = 6;

    let completed = Arc::new(AtomicUsize::new(0));
    let workers = Arc::new(Mutex::new(HashSet::new()));
    let pool = Arc::new(Pool::new(WORKERS));

    let server = Arc::new(
        Server::builder(
            any_addr(),
            PoolProbe {
                completed: Arc::clone(&completed),
                workers: Arc::clone(&workers),
                delay: Duration::from_millis(50),
            },
        )
        .dispatcher(Arc::clone(&pool) as Arc<dyn Dispatcher>)
        .build()
        .unwrap(),
    );
    let addr = server.local_addr().unwrap();

    let handle = spawn_serving(Arc::clone(&server));

    let _clients: Vec<_> = (0..CLIENTS)
        .map(|_| TcpStream::connect(addr).unwrap())
        .collect();

    // wait until the accept loop has submitted every connection; with two
    // workers most of them sit in the queue at this point
    let submitted = {
        let pool = Arc::clone(&pool);
        let completed = Arc::clone(&completed);
        move || pool.outstanding() + completed.load(Ordering::SeqCst) >= CLIENTS
    };
    assert!(wait_for(submitted, Duration::from_secs(5)));

    // close must block until queued handlers have finished too
    server.server_close();
    assert_eq!(completed.load(Ordering::SeqCst), CLIENTS);
    assert_eq!(pool.outstanding(), 0);

    // no more worker threads than configured ever ran a handler
    assert!(workers.lock().unwrap().len() <= WORKERS);

    handle.join().unwrap();
}

#[test]
fn pool_bookkeeping_stays_bounded_over_many_connections() {
    let completed = Arc::new(AtomicUsize::new(0));
    let workers = Arc::new(Mutex::new(HashSet::new()));
    let pool = Arc::new(Pool::new(2));

    let server = Arc::new(
        Server::builder(
            any_addr(),
            PoolProbe {
                completed: Arc::clone(&completed),
                workers: Arc::clone(&workers),
                delay: Duration::ZERO,
            },
        )
        .dispatcher(Arc::clone(&pool) as Arc<dyn Dispatcher>)
        .build()
        .unwrap(),
    );
    let addr = server.local_addr().unwrap();

    let handle = spawn_serving(Arc::clone(&server));

    const ROUNDS: usize = 40;
    for _ in 0..ROUNDS {
        let mut stream = TcpStream::connect(addr).unwrap();
        let mut buf = [0u8; 1];
        stream.read_exact(&mut buf).unwrap();
    }

    // completed work is reaped, not accumulated
    let drained = {
        let pool = Arc::clone(&pool);
        move || pool.outstanding() == 0
    };
    assert!(wait_for(drained, Duration::from_secs(5)));
    assert_eq!(completed.load(Ordering::SeqCst), ROUNDS);

    server.server_close();
    handle.join().unwrap();
}

#[test]
fn sequential_default_still_serves_one_at_a_time() {
    let server = Arc::new(Server::builder(any_addr(), EchoHandler).build().unwrap());
    assert_eq!(server.dispatcher().name(), "sequential");
    let addr = server.local_addr().unwrap();

    let handle = spawn_serving(Arc::clone(&server));

    for payload in [b"one".as_slice(), b"two", b"three"] {
        let mut stream = TcpStream::connect(addr).unwrap();
        assert_eq!(common::round_trip(&mut stream, payload), payload);
    }

    server.server_close();
    handle.join().unwrap();
}
