//! Subscriber setup for binaries and tests embedding the crate.
//!
//! The library itself only emits `tracing` events.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT_ONCE: Once = Once::new();

/// Install a formatted subscriber filtered by `RUST_LOG`, falling back to
/// `deckforge=info`. Only the first call in a process has any effect.
pub fn init() {
    INIT_ONCE.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("deckforge=info"));
        if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
            tracing::debug!("a global subscriber was already installed");
        }
    });
}

/// Like [`init`] but writes through the test harness so output is captured
/// per test.
pub fn init_for_tests() {
    INIT_ONCE.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("deckforge=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
