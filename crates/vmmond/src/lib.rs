//! Control monitor for a single hosted guest.
//!
//! The monitor listens on a local stream socket for one-shot JSON commands.
//! Each connection carries one request; the reply is a three-digit status
//! code written just before the monitor closes the connection. The request
//! format and status codes are described in the [`dispatch`] module.
//!
//! A single reactor thread multiplexes the listening socket and every open
//! client connection, so handlers run one at a time and never race each
//! other. `start app` loads the requested image into guest memory and then
//! releases the guest execution thread through a typed channel; the other
//! commands are reserved extension points that answer `501`.
//!
//! The [`Monitor`] type owns that reactor. Its `init` and `destroy`
//! transitions are idempotent, and dropping a running monitor stops it.

mod bootstrap;
pub mod dispatch;
pub mod guest;
mod health;
mod lifecycle;
mod process;
pub mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, Bootstrapped, ConfigLoader, StaticConfigLoader, SystemConfigLoader,
    bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use lifecycle::{Monitor, MonitorError};
pub use process::{LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_monitor};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{ListenerError, MAX_REQUEST_BYTES, SessionState};

#[cfg(test)]
mod tests;
