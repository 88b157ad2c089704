//! Shared helpers for `tickdag` tests: tracing setup, timeouts, plan
//! builders and a recording world.

pub mod builders;
pub mod world;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tickdag::logging::LOG_ENV;
use tracing_subscriber::{EnvFilter, fmt};

pub use builders::{PlanBuilder, SetConfigBuilder, SystemConfigBuilder};
pub use world::{TestWorld, record, record_exclusive};

/// Upper bound for any async test driven through [`with_timeout`].
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

static INIT: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// The filter comes from `TICKDAG_LOG`, then `RUST_LOG`, else `info`.
/// Output is captured per test and only shown for failures (or with
/// `--nocapture`).
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"));

        // Another harness may already own the global subscriber.
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Await `f`, failing the test if it takes longer than [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("test did not finish within {TEST_TIMEOUT:?}"),
    }
}
