//! Shared configuration for the hypervisor monitor.
//!
//! The monitor binary reads its settings from command-line flags first, then
//! from `VMMON_*` environment variables, and finally falls back to the
//! defaults in [`defaults`]. The resolved [`Config`] is consumed by the
//! telemetry layer, the monitor lifecycle, and the guest memory allocator of
//! the host process.

mod defaults;
mod logging;
mod socket;

use std::ffi::OsString;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_GUEST_MEMORY_MIB, DEFAULT_LOG_FILTER, DEFAULT_MONITOR_SOCKET, default_log_filter,
    default_log_format, default_monitor_socket,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{MonitorSocket, SocketParseError, SocketPreparationError};

/// Environment variable overriding the monitor socket.
pub const MONITOR_SOCKET_ENV: &str = "VMMON_MONITOR_SOCKET";
/// Environment variable overriding the log filter.
pub const LOG_FILTER_ENV: &str = "VMMON_LOG_FILTER";
/// Environment variable overriding the log format.
pub const LOG_FORMAT_ENV: &str = "VMMON_LOG_FORMAT";
/// Environment variable overriding the guest memory size.
pub const GUEST_MEMORY_ENV: &str = "VMMON_GUEST_MEMORY_MIB";

/// Resolved monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Socket the monitor listens on.
    pub monitor_socket: MonitorSocket,
    /// `tracing` filter expression.
    pub log_filter: String,
    /// Output format of the log subscriber.
    pub log_format: LogFormat,
    /// Size of the guest physical memory region in MiB.
    pub guest_memory_mib: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            monitor_socket: default_monitor_socket(),
            log_filter: default_log_filter().to_owned(),
            log_format: default_log_format(),
            guest_memory_mib: DEFAULT_GUEST_MEMORY_MIB,
        }
    }
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Arguments`] when a flag or environment value
    /// fails to parse, or when `--help`/`--version` was requested.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_iter(std::env::args_os())
    }

    /// Loads configuration from an explicit argument list.
    ///
    /// The first element is treated as the binary name, as with
    /// [`std::env::args_os`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Arguments`] when parsing fails, and
    /// [`ConfigError::EmptyGuestMemory`] when the guest memory size is zero.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = MonitorArgs::try_parse_from(args).map_err(ConfigError::Arguments)?;
        if cli.guest_memory_mib == 0 {
            return Err(ConfigError::EmptyGuestMemory);
        }
        Ok(Self {
            monitor_socket: cli.monitor_socket,
            log_filter: cli.log_filter,
            log_format: cli.log_format,
            guest_memory_mib: cli.guest_memory_mib,
        })
    }

    /// Socket the monitor listens on.
    #[must_use]
    pub fn monitor_socket(&self) -> &MonitorSocket {
        &self.monitor_socket
    }

    /// `tracing` filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Guest memory size in bytes.
    #[must_use]
    pub fn guest_memory_bytes(&self) -> usize {
        usize::try_from(self.guest_memory_mib)
            .unwrap_or(usize::MAX)
            .saturating_mul(1024 * 1024)
    }
}

/// Command-line surface of the monitor host.
#[derive(Debug, Parser)]
#[command(name = "vmmond", about = "Control-plane monitor for a lightweight hypervisor")]
struct MonitorArgs {
    /// Unix socket for monitor clients (`unix:///path` or an absolute path).
    #[arg(long, env = MONITOR_SOCKET_ENV, default_value_t = default_monitor_socket())]
    monitor_socket: MonitorSocket,
    /// Log filter expression, for example `info` or `vmmond=debug`.
    #[arg(long, env = LOG_FILTER_ENV, default_value = DEFAULT_LOG_FILTER)]
    log_filter: String,
    /// Log output format (`json` or `compact`).
    #[arg(long, env = LOG_FORMAT_ENV, default_value_t = default_log_format())]
    log_format: LogFormat,
    /// Guest physical memory size in MiB.
    #[arg(long, env = GUEST_MEMORY_ENV, default_value_t = DEFAULT_GUEST_MEMORY_MIB)]
    guest_memory_mib: u32,
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Command-line or environment values failed to parse.
    #[error(transparent)]
    Arguments(#[from] clap::Error),
    /// The guest memory region would be empty.
    #[error("guest memory size must be at least 1 MiB")]
    EmptyGuestMemory,
}
