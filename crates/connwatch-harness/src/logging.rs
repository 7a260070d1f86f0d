//! Tracing setup for tests that use the harness

use std::sync::Once;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "connwatch=debug,connwatch_connection=info,connwatch_harness=debug";

/// Initialize logging for tests if not already initialized
///
/// `RUST_LOG` wins over the default filter. Output goes through the test
/// writer so it is only shown for failing tests.
pub fn init_test_logging() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
