//! Miscellaneous test code for Thunderbolt.

use std::sync::Once;

use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod prelude;
pub mod vectors;

static INIT: Once = Once::new();

/// Initialize a test: install a tracing subscriber and an error report
/// handler exactly once per process.
///
/// Call this at the top of every test. Repeated calls are no-ops, so
/// tests can run in any order in one binary.
pub fn init() {
    INIT.call_once(|| {
        let filter_layer = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt::layer().with_test_writer())
            .with(ErrorLayer::default())
            .init();

        // Installing twice returns an error we don't care about.
        let _ = color_eyre::install();
    });
}
