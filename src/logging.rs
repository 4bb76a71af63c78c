//! # Structured Logging
//!
//! One-shot tracing initialization for the simulator binary. Filtering is
//! controlled by `GOVSIM_LOG` (standard `EnvFilter` syntax, default `info`).

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging. Safe to call more than once; only the
/// first call installs a subscriber.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_env("GOVSIM_LOG")
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_filter(filter),
        );

        // A global subscriber may already be set by a test harness.
        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }
    });
}
