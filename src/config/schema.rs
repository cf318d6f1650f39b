//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:4433").
    pub bind_address: String,

    /// Optional TLS configuration. Without it the server runs plaintext.
    pub tls: Option<TlsConfig>,

    /// Connection dispatch settings.
    pub dispatch: DispatchConfig,

    /// Listen backlog passed to the OS.
    pub backlog: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:4433".to_string(),
            tls: None,
            dispatch: DispatchConfig::default(),
            backlog: 128,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Connection dispatch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Dispatch strategy for accepted connections.
    pub strategy: DispatchStrategy,

    /// Worker count for the pool strategy (0 = number of CPUs).
    pub pool_workers: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            strategy: DispatchStrategy::Sequential,
            pool_workers: 0,
        }
    }
}

/// How accepted connections are handed off for handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStrategy {
    /// Handle connections inline on the accept thread.
    #[default]
    Sequential,
    /// One OS thread per connection.
    Threaded,
    /// One OS process per connection (unix only).
    Forking,
    /// Bounded worker pool.
    Pool,
}

impl std::fmt::Display for DispatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DispatchStrategy::Sequential => "sequential",
            DispatchStrategy::Threaded => "threaded",
            DispatchStrategy::Forking => "forking",
            DispatchStrategy::Pool => "pool",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for DispatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(DispatchStrategy::Sequential),
            "threaded" => Ok(DispatchStrategy::Threaded),
            "forking" => Ok(DispatchStrategy::Forking),
            "pool" => Ok(DispatchStrategy::Pool),
            other => Err(format!(
                "unknown dispatch strategy {:?}, expected one of: sequential, threaded, forking, pool",
                other
            )),
        }
    }
}
