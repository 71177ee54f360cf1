//! Process entry point: bootstrap, guest execution thread, and shutdown.

mod errors;
mod execution;
mod launch;
mod shutdown;

pub use errors::LaunchError;
pub use launch::run_monitor;
#[cfg(test)]
pub(crate) use launch::{LaunchPlan, run_monitor_with};
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
