//! Structured health reporting for monitor lifecycle events.

use std::sync::Arc;

use vmmon_config::{Config, MonitorSocket};

use crate::bootstrap::BootstrapError;
use crate::lifecycle::MonitorError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked before the monitor binds its socket.
    fn monitor_starting(&self, socket: &MonitorSocket);

    /// Invoked once the reactor thread is serving the socket.
    fn monitor_ready(&self, socket: &MonitorSocket);

    /// Invoked when starting or stopping the monitor fails.
    fn monitor_failed(&self, error: &MonitorError);

    /// Invoked before the reactor thread is asked to exit.
    fn monitor_stopping(&self, socket: &MonitorSocket);

    /// Invoked after the reactor thread exited and the socket was removed.
    fn monitor_stopped(&self, socket: &MonitorSocket);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn monitor_starting(&self, socket: &MonitorSocket) {
        (**self).monitor_starting(socket);
    }

    fn monitor_ready(&self, socket: &MonitorSocket) {
        (**self).monitor_ready(socket);
    }

    fn monitor_failed(&self, error: &MonitorError) {
        (**self).monitor_failed(error);
    }

    fn monitor_stopping(&self, socket: &MonitorSocket) {
        (**self).monitor_stopping(socket);
    }

    fn monitor_stopped(&self, socket: &MonitorSocket) {
        (**self).monitor_stopped(socket);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting monitor bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            socket = %config.monitor_socket(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            guest_memory_bytes = config.guest_memory_bytes(),
            "monitor bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "monitor bootstrap failed"
        );
    }

    fn monitor_starting(&self, socket: &MonitorSocket) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "monitor_starting",
            socket = %socket,
            "starting monitor"
        );
    }

    fn monitor_ready(&self, socket: &MonitorSocket) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "monitor_ready",
            socket = %socket,
            "monitor ready"
        );
    }

    fn monitor_failed(&self, error: &MonitorError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "monitor_failed",
            error = %error,
            "monitor failed"
        );
    }

    fn monitor_stopping(&self, socket: &MonitorSocket) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "monitor_stopping",
            socket = %socket,
            "stopping monitor"
        );
    }

    fn monitor_stopped(&self, socket: &MonitorSocket) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "monitor_stopped",
            socket = %socket,
            "monitor stopped"
        );
    }
}
