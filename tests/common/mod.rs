//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConnection, RootCertStore, StreamOwned};

use tlserve::net::Connection;
use tlserve::server::Handler;
use tlserve::{Server, TlsContext};

/// Self-signed certificate material for one test server.
pub struct TestTls {
    pub cert_file: tempfile::NamedTempFile,
    pub key_file: tempfile::NamedTempFile,
    pub cert_der: CertificateDer<'static>,
}

/// Generate a self-signed certificate for `localhost` and write it to
/// temp PEM files.
pub fn generate_tls() -> TestTls {
    let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();

    let mut cert_file = tempfile::NamedTempFile::new().unwrap();
    cert_file
        .write_all(generated.cert.pem().as_bytes())
        .unwrap();
    let mut key_file = tempfile::NamedTempFile::new().unwrap();
    key_file
        .write_all(generated.key_pair.serialize_pem().as_bytes())
        .unwrap();

    TestTls {
        cert_file,
        key_file,
        cert_der: generated.cert.der().clone(),
    }
}

impl TestTls {
    /// Server-side context from the PEM files.
    pub fn server_context(&self) -> TlsContext {
        TlsContext::from_pem_files(self.cert_file.path(), self.key_file.path()).unwrap()
    }

    /// Client config trusting exactly this certificate.
    pub fn client_config(&self) -> Arc<rustls::ClientConfig> {
        let mut roots = RootCertStore::empty();
        roots.add(self.cert_der.clone()).unwrap();
        Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth(),
        )
    }
}

/// Connect as a TLS client and complete the handshake eagerly.
pub fn connect_tls(
    addr: SocketAddr,
    config: Arc<rustls::ClientConfig>,
) -> StreamOwned<ClientConnection, TcpStream> {
    let name = ServerName::try_from("localhost").unwrap();
    let mut session = ClientConnection::new(config, name).unwrap();
    let mut tcp = TcpStream::connect(addr).unwrap();
    while session.is_handshaking() {
        session.complete_io(&mut tcp).unwrap();
    }
    StreamOwned::new(session, tcp)
}

/// Run the server's accept loop on a background thread.
pub fn spawn_serving(server: Arc<Server>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        server.serve_forever().unwrap();
    })
}

/// Poll `condition` until it holds or the deadline passes.
pub fn wait_for(condition: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Handler that echoes everything it reads back to the peer.
pub struct EchoHandler;

impl Handler for EchoHandler {
    fn handle(&self, mut conn: Connection, _peer: SocketAddr) -> std::io::Result<()> {
        let mut buf = [0u8; 1024];
        loop {
            let n = match conn.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(e),
            };
            conn.write_all(&buf[..n])?;
            conn.flush()?;
        }
    }
}

/// Send `payload` and read back the same number of bytes.
pub fn round_trip<S: Read + Write>(stream: &mut S, payload: &[u8]) -> Vec<u8> {
    stream.write_all(payload).unwrap();
    stream.flush().unwrap();
    let mut echoed = vec![0u8; payload.len()];
    stream.read_exact(&mut echoed).unwrap();
    echoed
}
