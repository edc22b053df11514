//! Logging in tests is important for troubleshooting, but works very differently then in
//! production.
use once_cell::sync::Lazy;

/// Initialize `tracing` for a test run, once per process.
///
/// Log events are written through the test writer so `cargo test` captures them per test, and
/// the filter honors `RUST_LOG` with a reasonable default that keeps the AWS and hyper crates
/// from drowning out the interesting events.
pub fn init() {
    static INIT: Lazy<()> = Lazy::new(|| {
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new("h2=warn,hyper=info,rustls=info,aws=info,debug"))
            .unwrap();

        // `try_init` rather than `init`: another test binary in the same process may have won
        // the race, which is fine
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(true)
            .try_init();
    });

    Lazy::force(&INIT);
}
