//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging via the tracing crate; every subsystem logs with
//!   field syntax (connection IDs, peer addresses, error chains)
//! - Log level configurable via environment (`RUST_LOG`) with a sane default
//! - No metrics endpoint; embedders bring their own exporters

pub mod logging;

pub use logging::init_logging;
