use crate::logging::LogFormat;
use crate::socket::MonitorSocket;

/// Well-known socket path monitor clients connect to.
pub const DEFAULT_MONITOR_SOCKET: &str = "/tmp/vmmon.sock";

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default guest memory size in MiB.
pub const DEFAULT_GUEST_MEMORY_MIB: u32 = 64;

/// Default log filter expression.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default monitor socket.
#[must_use]
pub fn default_monitor_socket() -> MonitorSocket {
    MonitorSocket::unix(DEFAULT_MONITOR_SOCKET)
}
