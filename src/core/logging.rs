//! Logging initialization and utilities

/// Initialize the logging system
///
/// Uses env_logger with default filter level of `info`.
/// Override with RUST_LOG environment variable. Calling it again after a
/// logger is installed is a no-op.
///
/// # Example
/// ```
/// ringfield::core::logging::init();
/// ringfield::core::logging::init();
/// log::info!("Ring engine started");
/// ```
pub fn init() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).try_init();
}
