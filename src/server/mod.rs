//! Generic TCP server with optional TLS termination.
//!
//! # Responsibilities
//! - Own the listening socket exclusively
//! - Wrap the socket in TLS at construction when a context is supplied
//! - Run the blocking accept loop, handing connections to the dispatcher
//! - Coordinate shutdown and close, draining the dispatcher
//!
//! # Construction semantics
//! The builder constructs the socket with binding deferred. A supplied TLS
//! context wraps the socket before activation; without one the server logs a
//! warning and runs plaintext. With `bind_and_activate` (the default), bind
//! and activate run immediately; if either fails the socket is closed before
//! the error propagates, so no partial-listening state survives.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::config::ServerConfig;
use crate::dispatch::{self, Dispatcher, Sequential};
use crate::net::connection::Connection;
use crate::net::listener::{Listener, ListenerError};
use crate::net::tls::{TlsContext, TlsError};

/// Pause after a failed accept so a persistent error (e.g. fd exhaustion)
/// does not spin the loop.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Error type for server construction and operation.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("invalid bind address {0:?}")]
    InvalidAddress(String),

    #[error("server is closed")]
    Closed,
}

/// Connection handler, shared by the server and every dispatched worker.
///
/// Implementations must be thread-safe: depending on the dispatch strategy
/// the same handler value runs concurrently on many threads, or is copied
/// into forked child processes.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, conn: Connection, peer: SocketAddr) -> io::Result<()>;
}

impl<F> Handler for F
where
    F: Fn(Connection, SocketAddr) -> io::Result<()> + Send + Sync + 'static,
{
    fn handle(&self, conn: Connection, peer: SocketAddr) -> io::Result<()> {
        self(conn, peer)
    }
}

/// Builder for [`Server`].
pub struct ServerBuilder {
    addr: SocketAddr,
    handler: Arc<dyn Handler>,
    tls: Option<TlsContext>,
    dispatcher: Arc<dyn Dispatcher>,
    bind_and_activate: bool,
    backlog: u32,
}

impl ServerBuilder {
    fn new(addr: SocketAddr, handler: Arc<dyn Handler>) -> Self {
        Self {
            addr,
            handler,
            tls: None,
            dispatcher: Arc::new(Sequential),
            bind_and_activate: true,
            backlog: 128,
        }
    }

    /// Terminate TLS on accepted connections using this context.
    pub fn tls(mut self, ctx: TlsContext) -> Self {
        self.tls = Some(ctx);
        self
    }

    /// Dispatch strategy for accepted connections. Defaults to sequential.
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Whether to bind and activate during `build`. Defaults to true.
    /// When disabled, call [`Server::bind`] and [`Server::activate`] later.
    pub fn bind_and_activate(mut self, yes: bool) -> Self {
        self.bind_and_activate = yes;
        self
    }

    /// Listen backlog passed to the OS.
    pub fn backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn build(self) -> Result<Server, ServerError> {
        if self.tls.is_none() {
            tracing::warn!(
                addr = %self.addr,
                "No TLS context provided, server will run without TLS"
            );
        }

        let mut listener = Listener::open(self.addr, self.tls, self.backlog)?;

        if self.bind_and_activate {
            if let Err(error) = listener.bind().and_then(|()| listener.activate()) {
                listener.close();
                return Err(error.into());
            }
        }

        Ok(Server {
            listener: Mutex::new(Some(listener)),
            handler: self.handler,
            dispatcher: self.dispatcher,
            shutdown: AtomicBool::new(false),
        })
    }
}

/// A TCP server that optionally terminates TLS and hands each accepted
/// connection to its dispatch strategy.
pub struct Server {
    listener: Mutex<Option<Listener>>,
    handler: Arc<dyn Handler>,
    dispatcher: Arc<dyn Dispatcher>,
    shutdown: AtomicBool,
}

impl Server {
    /// Start building a server for `addr` with the given handler.
    pub fn builder<H: Handler>(addr: SocketAddr, handler: H) -> ServerBuilder {
        ServerBuilder::new(addr, Arc::new(handler))
    }

    /// Build a server from a validated configuration file.
    pub fn from_config<H: Handler>(
        config: &ServerConfig,
        handler: H,
    ) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|_| ServerError::InvalidAddress(config.bind_address.clone()))?;

        let mut builder = Self::builder(addr, handler)
            .dispatcher(dispatch::from_config(&config.dispatch))
            .backlog(config.backlog);

        if let Some(tls) = &config.tls {
            builder = builder.tls(TlsContext::from_config(tls)?);
        }

        builder.build()
    }

    /// Bind the socket. Only needed when built with
    /// `bind_and_activate(false)`.
    pub fn bind(&self) -> Result<(), ServerError> {
        let mut guard = self.listener.lock().unwrap();
        let listener = guard.as_mut().ok_or(ServerError::Closed)?;
        listener.bind().map_err(Into::into)
    }

    /// Start listening. Only needed when built with
    /// `bind_and_activate(false)`.
    pub fn activate(&self) -> Result<(), ServerError> {
        let mut guard = self.listener.lock().unwrap();
        let listener = guard.as_mut().ok_or(ServerError::Closed)?;
        listener.activate().map_err(Into::into)
    }

    /// The actual listening address, once bound and activated.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|l| l.local_addr())
    }

    /// Whether accepted connections are TLS-terminated.
    pub fn is_tls(&self) -> bool {
        self.listener
            .lock()
            .unwrap()
            .as_ref()
            .map(|l| l.is_tls())
            .unwrap_or(false)
    }

    /// The active dispatch strategy.
    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    /// Accept connections until [`Server::shutdown`] or
    /// [`Server::server_close`] is called from another thread.
    ///
    /// Accept and handshake failures are logged and do not stop the loop.
    pub fn serve_forever(&self) -> Result<(), ServerError> {
        let acceptor = {
            let guard = self.listener.lock().unwrap();
            let listener = guard.as_ref().ok_or(ServerError::Closed)?;
            listener.acceptor()?
        };

        tracing::info!(
            address = ?self.local_addr(),
            dispatcher = self.dispatcher.name(),
            tls = self.is_tls(),
            "Serving"
        );

        loop {
            if self.shutdown_requested() {
                break;
            }

            match acceptor.accept() {
                Ok((conn, peer)) => {
                    if self.shutdown_requested() {
                        break;
                    }
                    tracing::debug!(
                        connection_id = %conn.id(),
                        peer = %peer,
                        "Connection accepted"
                    );
                    self.dispatcher.dispatch(conn, peer, Arc::clone(&self.handler));
                }
                Err(ListenerError::Handshake { peer, source }) => {
                    if self.shutdown_requested() {
                        break;
                    }
                    tracing::warn!(peer = %peer, error = %source, "TLS handshake failed");
                }
                Err(error) => {
                    if self.shutdown_requested() {
                        break;
                    }
                    tracing::warn!(error = %error, "Failed to accept connection");
                    thread::sleep(ACCEPT_RETRY_DELAY);
                }
            }
        }

        // leave the flag clear so a later serve round starts fresh
        self.shutdown.store(false, Ordering::SeqCst);
        tracing::info!("Accept loop stopped");
        Ok(())
    }

    /// Request the accept loop to stop. Does not close the socket; the
    /// server can serve again afterwards.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake_accept();
    }

    /// Close the listening socket, then shut the dispatcher down, blocking
    /// until all dispatched work has completed, queued work included.
    pub fn server_close(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake_accept();

        if let Some(mut listener) = self.listener.lock().unwrap().take() {
            listener.close();
        }

        self.dispatcher.shutdown();
        tracing::info!("Server closed");
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Unblock a thread parked in accept by making a throwaway connection to
    /// our own listening socket.
    fn wake_accept(&self) {
        if let Some(addr) = self.local_addr() {
            let ip = match addr.ip() {
                ip if !ip.is_unspecified() => ip,
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
            };
            let target = SocketAddr::new(ip, addr.port());
            let _ = TcpStream::connect_timeout(&target, Duration::from_millis(200));
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr())
            .field("tls", &self.is_tls())
            .field("dispatcher", &self.dispatcher.name())
            .finish()
    }
}
