//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the logging subsystem for binaries and embedders
//! - Respect `RUST_LOG` when set, fall back to a default filter otherwise

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
///
/// `default_filter` is used when `RUST_LOG` is not set, e.g.
/// `"tlserve=debug"`. Calling this twice panics, as the global subscriber
/// can only be installed once; libraries embedding this crate should install
/// their own subscriber instead.
pub fn init_logging(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
