//! Test double for [`HealthReporter`] that records structured events for assertions.

use std::sync::Mutex;

use vmmon_config::{Config, MonitorSocket};

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;
use crate::lifecycle::MonitorError;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    /// Bootstrap failed with an error description.
    BootstrapFailed(String),
    MonitorStarting,
    MonitorReady,
    /// Starting or stopping failed with an error description.
    MonitorFailed(String),
    MonitorStopping,
    MonitorStopped,
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn monitor_starting(&self, _socket: &MonitorSocket) {
        self.record(HealthEvent::MonitorStarting);
    }

    fn monitor_ready(&self, _socket: &MonitorSocket) {
        self.record(HealthEvent::MonitorReady);
    }

    fn monitor_failed(&self, error: &MonitorError) {
        self.record(HealthEvent::MonitorFailed(error.to_string()));
    }

    fn monitor_stopping(&self, _socket: &MonitorSocket) {
        self.record(HealthEvent::MonitorStopping);
    }

    fn monitor_stopped(&self, _socket: &MonitorSocket) {
        self.record(HealthEvent::MonitorStopped);
    }
}
