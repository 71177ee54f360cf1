//! Start and stop of the monitor socket service.
//!
//! [`Monitor`] owns the reactor thread for one socket. Both transitions are
//! idempotent: `init` on a running monitor and `destroy` on a stopped one do
//! nothing.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use vmmon_config::{MonitorSocket, SocketPreparationError};

use crate::dispatch::CommandRegistry;
use crate::health::HealthReporter;
use crate::transport::{ListenerError, MonitorListener, Reactor, ReactorHandle, remove_socket_file};

const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

/// Errors raised while starting or stopping the monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The socket directory could not be prepared.
    #[error("failed to prepare monitor socket: {source}")]
    Socket {
        #[source]
        source: SocketPreparationError,
    },
    /// Binding the socket or starting the reactor failed.
    #[error("failed to start monitor: {source}")]
    Start {
        #[source]
        source: ListenerError,
    },
    /// The reactor thread panicked or stopped serving on its own.
    #[error("failed to stop monitor: {source}")]
    Stop {
        #[source]
        source: ListenerError,
    },
}

/// Control socket service for one guest.
pub struct Monitor {
    socket: MonitorSocket,
    registry: Arc<CommandRegistry>,
    reporter: Arc<dyn HealthReporter>,
    reactor: Option<ReactorHandle>,
}

impl Monitor {
    /// Builds a monitor that has not yet bound its socket.
    #[must_use]
    pub fn new(
        socket: MonitorSocket,
        registry: CommandRegistry,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            socket,
            registry: Arc::new(registry),
            reporter,
            reactor: None,
        }
    }

    /// Socket this monitor serves.
    #[must_use]
    pub fn socket(&self) -> &MonitorSocket {
        &self.socket
    }

    /// Returns true while the reactor thread is serving the socket.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.reactor.is_some()
    }

    /// Binds the socket and starts serving it.
    ///
    /// Returns once the reactor thread is running. Calling `init` on a running
    /// monitor does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError`] when the socket directory cannot be prepared,
    /// the socket cannot be bound, or the reactor thread cannot be started.
    pub fn init(&mut self) -> Result<(), MonitorError> {
        if self.reactor.is_some() {
            debug!(
                target: LIFECYCLE_TARGET,
                socket = %self.socket,
                "monitor already initialised"
            );
            return Ok(());
        }

        self.reporter.monitor_starting(&self.socket);
        match self.start() {
            Ok(handle) => {
                self.reactor = Some(handle);
                self.reporter.monitor_ready(&self.socket);
                Ok(())
            }
            Err(error) => {
                self.reporter.monitor_failed(&error);
                Err(error)
            }
        }
    }

    fn start(&self) -> Result<ReactorHandle, MonitorError> {
        self.socket
            .prepare_filesystem()
            .map_err(|source| MonitorError::Socket { source })?;
        let listener =
            MonitorListener::bind(&self.socket).map_err(|source| MonitorError::Start { source })?;
        Reactor::spawn(listener, Arc::clone(&self.registry))
            .map_err(|source| MonitorError::Start { source })
    }

    /// Stops serving the socket and removes it.
    ///
    /// Calling `destroy` on a monitor that is not running does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Stop`] when the reactor thread panicked or had
    /// already stopped serving because polling failed.
    pub fn destroy(&mut self) -> Result<(), MonitorError> {
        let Some(handle) = self.reactor.take() else {
            return Ok(());
        };

        self.reporter.monitor_stopping(&self.socket);
        handle.shutdown();
        let joined = handle.join();
        remove_socket_file(&self.socket);
        match joined {
            Ok(()) => {
                self.reporter.monitor_stopped(&self.socket);
                Ok(())
            }
            Err(source) => {
                let error = MonitorError::Stop { source };
                self.reporter.monitor_failed(&error);
                Err(error)
            }
        }
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("socket", &self.socket)
            .field("registry", &self.registry)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Err(error) = self.destroy() {
            warn!(
                target: LIFECYCLE_TARGET,
                %error,
                "monitor did not stop cleanly"
            );
        }
    }
}
