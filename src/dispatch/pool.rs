//! Bounded worker-pool dispatch.
//!
//! # Responsibilities
//! - Fixed-size worker set pulling jobs from a FIFO queue
//! - Non-blocking submission: the accept loop never waits on handlers
//! - Shutdown drains the queue and joins every worker
//!
//! # Design Decisions
//! - Pool and bookkeeping are per-instance state, created at construction
//!   and torn down at shutdown; two pool servers in one process do not share
//!   workers
//! - Completed work is reaped immediately via a drop guard, so outstanding
//!   bookkeeping stays bounded on long-running servers

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crate::dispatch::{run_handler, Dispatcher};
use crate::net::connection::Connection;
use crate::server::Handler;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Default)]
struct Outstanding {
    count: Mutex<usize>,
    drained: Condvar,
}

impl Outstanding {
    fn submit(&self) {
        *self.count.lock().unwrap() += 1;
    }

    fn complete(&self) {
        let mut count = self.count.lock().unwrap();
        *count -= 1;
        if *count == 0 {
            self.drained.notify_all();
        }
    }
}

/// Marks a submitted job complete when it finishes or is discarded.
struct CompletionGuard(Arc<Outstanding>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.0.complete();
    }
}

/// A bounded worker pool handling connections from a FIFO queue.
///
/// Submission order is preserved; completion order is not.
pub struct Pool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    outstanding: Arc<Outstanding>,
    size: usize,
}

impl Pool {
    /// Create a pool with `workers` threads; 0 means one per CPU.
    pub fn new(workers: usize) -> Self {
        let size = if workers == 0 {
            num_cpus::get()
        } else {
            workers
        };

        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut handles = Vec::with_capacity(size);
        for i in 0..size {
            let receiver = Arc::clone(&receiver);
            let handle = thread::Builder::new()
                .name(format!("pool-worker-{}", i))
                .spawn(move || worker_loop(receiver))
                .expect("failed to spawn pool worker");
            handles.push(handle);
        }

        tracing::debug!(workers = size, "Worker pool started");

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            outstanding: Arc::new(Outstanding::default()),
            size,
        }
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs submitted but not yet completed, queued jobs included.
    pub fn outstanding(&self) -> usize {
        *self.outstanding.count.lock().unwrap()
    }

    fn submit(&self, job: Job) {
        let sender = self.sender.lock().unwrap();
        match sender.as_ref() {
            Some(tx) => {
                if tx.send(job).is_err() {
                    tracing::error!("worker pool queue is gone, dropping job");
                }
            }
            None => {
                tracing::warn!("dispatch after pool shutdown, dropping job");
            }
        }
    }
}

impl Dispatcher for Pool {
    fn name(&self) -> &'static str {
        "pool"
    }

    fn dispatch(&self, conn: Connection, peer: SocketAddr, handler: Arc<dyn Handler>) {
        self.outstanding.submit();
        let guard = CompletionGuard(Arc::clone(&self.outstanding));

        self.submit(Box::new(move || {
            let _guard = guard;
            run_handler(conn, peer, handler.as_ref());
        }));
    }

    fn shutdown(&self) {
        // closing the queue lets workers drain remaining jobs and exit
        drop(self.sender.lock().unwrap().take());

        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        for handle in workers {
            let _ = handle.join();
        }
    }
}

fn worker_loop(receiver: Arc<Mutex<mpsc::Receiver<Job>>>) {
    loop {
        let job = {
            let rx = receiver.lock().unwrap();
            rx.recv()
        };
        match job {
            Ok(job) => {
                if std::panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    tracing::error!("worker caught handler panic");
                }
            }
            Err(_) => break,
        }
    }
}
