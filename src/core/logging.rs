//! Logging setup.
//!
//! The storage layer and the simulators log through the `log` facade:
//! map construction at debug level, per-tick flood-fill progress at
//! trace. Hosts that embed the crate usually install their own logger;
//! this helper wires up `env_logger` for binaries and tests that have
//! none.

/// Route `log` output to stderr via env_logger.
///
/// Defaults to the `info` level; set RUST_LOG to see the simulators'
/// per-tick output (e.g. `RUST_LOG=voxflow=trace`).
///
/// # Example
/// ```
/// voxflow::core::logging::init();
/// log::info!("terrain map ready, starting light ticks");
/// ```
pub fn init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
