//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the bind address parses to a socket address
//! - Check TLS paths are non-empty when a TLS section is present
//! - Reject dispatch strategies the host cannot run
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ServerConfig;

#[cfg(not(unix))]
use crate::config::schema::DispatchStrategy;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    InvalidBindAddress(String),
    EmptyTlsPath(&'static str),
    UnsupportedStrategy(&'static str),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidBindAddress(addr) => {
                write!(f, "bind_address {:?} is not a valid socket address", addr)
            }
            ValidationError::EmptyTlsPath(field) => {
                write!(f, "tls.{} must not be empty", field)
            }
            ValidationError::UnsupportedStrategy(reason) => {
                write!(f, "dispatch strategy not supported: {}", reason)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.bind_address.clone(),
        ));
    }

    if let Some(tls) = &config.tls {
        if tls.cert_path.is_empty() {
            errors.push(ValidationError::EmptyTlsPath("cert_path"));
        }
        if tls.key_path.is_empty() {
            errors.push(ValidationError::EmptyTlsPath("key_path"));
        }
    }

    #[cfg(not(unix))]
    if config.dispatch.strategy == DispatchStrategy::Forking {
        errors.push(ValidationError::UnsupportedStrategy(
            "forking requires a unix host",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
