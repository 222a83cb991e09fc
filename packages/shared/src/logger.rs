//! Logging setup utilities for Roomcast binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with the specified default log level.
///
/// The filter covers the server library crate, this crate, and the binary
/// itself. It can be overridden with the `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "roomcast-server")
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn")
///
/// # Examples
///
/// ```no_run
/// use roomcast_shared::logger::setup_logger;
///
/// setup_logger("roomcast-server", "info");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(binary_name, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn default_filter(binary_name: &str, default_log_level: &str) -> String {
    format!(
        "roomcast_server={level},{shared}={level},{binary}={level},tower_http={level}",
        level = default_log_level,
        shared = env!("CARGO_PKG_NAME").replace('-', "_"),
        binary = binary_name.replace('-', "_"),
    )
}
