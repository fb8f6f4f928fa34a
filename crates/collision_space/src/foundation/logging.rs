//! Logging setup
//!
//! The crate logs through the `log` facade; binaries and tests pick the
//! backend. `RUST_LOG=collision_space=debug` shows cache rebuilds,
//! `=trace` also shows every resynchronization.

pub use log::{debug, error, info, trace, warn};

/// Install `env_logger` as the global logger
pub fn init() {
    env_logger::init();
}

/// Install a test-friendly logger; safe to call from every test
pub fn init_for_tests() {
    let _ = env_logger::builder().is_test(true).try_init();
}
