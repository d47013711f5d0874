//! Logger setup. Filtering follows `RUST_LOG`, defaulting to `info`.

use env_logger::Env;

pub const DEFAULT_FILTER: &str = "info";

pub fn init() {
    env_logger::Builder::from_env(Env::default().default_filter_or(DEFAULT_FILTER))
        .format_timestamp_millis()
        .init();
}

/// Routes log output through the test harness. Safe to call from every test.
pub fn init_for_tests() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}
