//! Listening socket lifecycle and accept path.
//!
//! # Responsibilities
//! - Create the listening socket with bind/activate as separate steps
//! - Wrap accepted streams in TLS when a context is attached
//! - Surface per-connection handshake failures without killing the listener
//!
//! The socket is TLS-wrapped before activation if and only if a TLS context
//! was supplied at construction: attaching the context up front is what
//! makes every accepted stream TLS-terminated.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;

use crate::net::connection::Connection;
use crate::net::tls::TlsContext;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to create the socket.
    #[error("failed to create socket for {addr}: {source}")]
    Socket { addr: SocketAddr, source: io::Error },

    /// Failed to bind to address.
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    /// Failed to start listening.
    #[error("failed to activate listener on {addr}: {source}")]
    Activate { addr: SocketAddr, source: io::Error },

    /// Failed to accept a connection.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    /// TLS handshake with a client failed. Per-connection, never fatal.
    #[error("TLS handshake failed with {peer}: {source}")]
    Handshake { peer: SocketAddr, source: io::Error },

    /// TLS session could not be created.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Operation not valid in the listener's current state.
    #[error("listener is {0}, operation not valid")]
    InvalidState(&'static str),
}

enum State {
    /// Socket created, not yet bound.
    Open(Socket),
    /// Socket bound to its address, not yet listening.
    Bound(Socket),
    /// Socket listening for connections.
    Listening(TcpListener),
    /// Socket closed and released.
    Closed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Open(_) => "open",
            State::Bound(_) => "bound",
            State::Listening(_) => "listening",
            State::Closed => "closed",
        }
    }
}

/// A listening socket with an optional TLS context attached.
///
/// Owned exclusively by its server; mutated only during bind, activate and
/// close.
pub struct Listener {
    addr: SocketAddr,
    backlog: u32,
    tls: Option<TlsContext>,
    state: State,
}

impl Listener {
    /// Create the socket without binding it.
    pub fn open(
        addr: SocketAddr,
        tls: Option<TlsContext>,
        backlog: u32,
    ) -> Result<Self, ListenerError> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|source| ListenerError::Socket { addr, source })?;

        // allow fast rebinds after close, as long as a real port is requested
        #[cfg(unix)]
        if addr.port() != 0 {
            socket
                .set_reuse_address(true)
                .map_err(|source| ListenerError::Socket { addr, source })?;
        }

        Ok(Self {
            addr,
            backlog,
            tls,
            state: State::Open(socket),
        })
    }

    /// Bind the socket to its address.
    pub fn bind(&mut self) -> Result<(), ListenerError> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Open(socket) => {
                if let Err(source) = socket.bind(&self.addr.into()) {
                    // state stays Closed, the socket is dropped here
                    return Err(ListenerError::Bind {
                        addr: self.addr,
                        source,
                    });
                }
                self.state = State::Bound(socket);
                Ok(())
            }
            other => {
                let name = other.name();
                self.state = other;
                Err(ListenerError::InvalidState(name))
            }
        }
    }

    /// Start listening. The socket must be bound.
    pub fn activate(&mut self) -> Result<(), ListenerError> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Bound(socket) => {
                if let Err(source) = socket.listen(self.backlog as i32) {
                    return Err(ListenerError::Activate {
                        addr: self.addr,
                        source,
                    });
                }
                self.state = State::Listening(TcpListener::from(socket));
                Ok(())
            }
            other => {
                let name = other.name();
                self.state = other;
                Err(ListenerError::InvalidState(name))
            }
        }
    }

    /// The actual bound address, once listening. Resolves port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.state {
            State::Listening(listener) => listener.local_addr().ok(),
            _ => None,
        }
    }

    /// Whether accepted connections will be TLS-terminated.
    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Get an accept handle sharing this listener's socket.
    ///
    /// The handle duplicates the socket handle so the accept loop can run
    /// while the owning server retains the original for closing.
    pub fn acceptor(&self) -> Result<Acceptor, ListenerError> {
        match &self.state {
            State::Listening(listener) => Ok(Acceptor {
                listener: listener.try_clone().map_err(ListenerError::Accept)?,
                tls: self.tls.clone(),
            }),
            other => Err(ListenerError::InvalidState(other.name())),
        }
    }

    /// Close the socket, releasing its handle. Idempotent.
    pub fn close(&mut self) {
        self.state = State::Closed;
    }
}

/// Blocking accept handle over a listening socket.
pub struct Acceptor {
    listener: TcpListener,
    tls: Option<TlsContext>,
}

impl Acceptor {
    /// Accept one connection, performing the TLS handshake when a context is
    /// attached.
    pub fn accept(&self) -> Result<(Connection, SocketAddr), ListenerError> {
        let (stream, peer) = self.listener.accept().map_err(ListenerError::Accept)?;

        match &self.tls {
            None => Ok((Connection::plain(stream, peer), peer)),
            Some(ctx) => {
                let conn = handshake(ctx, stream, peer)?;
                Ok((conn, peer))
            }
        }
    }
}

/// Drive the server-side handshake to completion on the accept thread,
/// matching handshake-on-accept semantics of a TLS-wrapped listening socket.
fn handshake(
    ctx: &TlsContext,
    mut stream: TcpStream,
    peer: SocketAddr,
) -> Result<Connection, ListenerError> {
    let mut session = rustls::ServerConnection::new(ctx.server_config())?;

    while session.is_handshaking() {
        session
            .complete_io(&mut stream)
            .map_err(|source| ListenerError::Handshake { peer, source })?;
    }

    tracing::trace!(peer = %peer, "TLS handshake complete");
    Ok(Connection::tls(
        rustls::StreamOwned::new(session, stream),
        peer,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn any_addr() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn bind_then_activate() {
        let mut listener = Listener::open(any_addr(), None, 16).unwrap();
        assert!(listener.local_addr().is_none());

        listener.bind().unwrap();
        listener.activate().unwrap();

        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn activate_before_bind_rejected() {
        let mut listener = Listener::open(any_addr(), None, 16).unwrap();
        assert!(matches!(
            listener.activate(),
            Err(ListenerError::InvalidState("open"))
        ));
    }

    #[test]
    fn accept_requires_listening() {
        let listener = Listener::open(any_addr(), None, 16).unwrap();
        assert!(listener.acceptor().is_err());
    }

    #[test]
    fn close_is_idempotent() {
        let mut listener = Listener::open(any_addr(), None, 16).unwrap();
        listener.bind().unwrap();
        listener.activate().unwrap();
        listener.close();
        listener.close();
        assert!(listener.local_addr().is_none());
    }
}
