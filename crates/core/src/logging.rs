//! Tracing subscriber setup.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: Once = Once::new();

/// Install a stderr `fmt` subscriber, once per process.
///
/// `RUST_LOG` wins when set; otherwise `info` is used.
pub fn init_tracing() {
    init_tracing_with_default("info");
}

/// Like [`init_tracing`] with `debug` as the fallback level.
pub fn init_verbose_tracing() {
    init_tracing_with_default("debug");
}

fn init_tracing_with_default(default_directive: &str) {
    TRACING_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
