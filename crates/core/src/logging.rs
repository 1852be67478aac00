//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "info,starlight=debug,gpu_allocator=warn";

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_filter` when present. Calling this twice is
/// harmless; the second call is ignored.
///
/// # Example
/// ```
/// starlight_core::init_logging(starlight_core::DEFAULT_LOG_FILTER);
/// tracing::info!("Renderer initialized");
/// ```
pub fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();

    if result.is_err() {
        tracing::debug!("Logging already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging(DEFAULT_LOG_FILTER);
        init_logging("warn");
    }
}
