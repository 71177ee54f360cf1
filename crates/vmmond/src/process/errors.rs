//! Error surface for running the monitor process.

use std::io;

use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::lifecycle::MonitorError;

use super::shutdown::ShutdownError;

/// Errors that end the monitor process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Loading configuration or installing telemetry failed.
    #[error("monitor bootstrap failed: {source}")]
    Bootstrap {
        #[source]
        source: BootstrapError,
    },
    /// The guest execution thread could not be started.
    #[error("failed to spawn guest execution thread: {source}")]
    ExecutionSpawn {
        #[source]
        source: io::Error,
    },
    /// The guest execution thread panicked.
    #[error("guest execution thread panicked")]
    ExecutionPanic,
    /// Starting or stopping the monitor failed.
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    /// Waiting for shutdown failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        #[source]
        source: ShutdownError,
    },
}

impl From<BootstrapError> for LaunchError {
    fn from(source: BootstrapError) -> Self {
        Self::Bootstrap { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}
