//! Handlers for the monitor's commands.
//!
//! Handlers run synchronously on the reactor thread, so each one must finish
//! quickly: mapping an image into guest memory and posting the execution
//! signal are the heaviest operations allowed here. A handler that needs slow
//! I/O (a real checkpoint or migration) has to hand the work to a dedicated
//! worker instead of blocking the loop.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use crate::guest::{ExecutionSignal, GuestMemoryHandle, KernelLoader};

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::request::Command;
use super::response::StatusCode;

/// Argument naming the guest image for `start app`.
pub const PATH_FIELD: &str = "path";

/// Executes one named monitor command.
pub trait CommandHandler: Send + Sync {
    /// Runs the command and returns the status reported to the client.
    ///
    /// Argument errors are returned rather than logged so that every
    /// protocol error is reported by the dispatcher in one place.
    fn handle(&self, command: &Command) -> Result<StatusCode, DispatchError>;
}

/// Guest-side collaborators lent to the handlers by the host process.
#[derive(Clone)]
pub struct GuestServices {
    /// Guest physical memory the image is loaded into.
    pub memory: GuestMemoryHandle,
    /// Loader writing images into guest memory.
    pub loader: Arc<dyn KernelLoader>,
    /// Releases the VM execution thread.
    pub signal: ExecutionSignal,
}

/// Loads a guest image and releases the execution thread.
pub struct StartAppHandler {
    services: GuestServices,
}

impl StartAppHandler {
    /// Creates the handler around the host's guest services.
    #[must_use]
    pub fn new(services: GuestServices) -> Self {
        Self { services }
    }
}

impl CommandHandler for StartAppHandler {
    fn handle(&self, command: &Command) -> Result<StatusCode, DispatchError> {
        info!(
            target: DISPATCH_TARGET,
            event = "start_app",
            "handling an application start"
        );

        let path = command.string_argument(PATH_FIELD)?;

        if let Err(error) = self
            .services
            .loader
            .load_kernel(&self.services.memory, Path::new(path))
        {
            error!(target: DISPATCH_TARGET, %error, image = path, "guest image load failed");
            return Ok(StatusCode::InternalError);
        }

        // The guest may only start once the image is fully in memory.
        if let Err(error) = self.services.signal.post(path) {
            error!(target: DISPATCH_TARGET, %error, image = path, "failed to release guest");
            return Ok(StatusCode::InternalError);
        }

        info!(target: DISPATCH_TARGET, image = path, "guest released for execution");
        Ok(StatusCode::Ok)
    }
}

/// Extension point for commands whose protocol is not implemented yet.
///
/// Checkpoint, restore, and migration must eventually pause the execution
/// engine, serialise guest memory and register state, and resume it; until
/// then they acknowledge the request with `501`.
#[derive(Debug, Clone, Copy)]
pub struct UnimplementedHandler {
    operation: &'static str,
}

impl UnimplementedHandler {
    /// Creates a handler for the named operation.
    #[must_use]
    pub const fn new(operation: &'static str) -> Self {
        Self { operation }
    }
}

impl CommandHandler for UnimplementedHandler {
    fn handle(&self, command: &Command) -> Result<StatusCode, DispatchError> {
        info!(
            target: DISPATCH_TARGET,
            event = self.operation,
            command = command.name(),
            "operation not yet implemented"
        );
        Ok(StatusCode::NotImplemented)
    }
}
