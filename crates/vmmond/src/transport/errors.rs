//! Error types for the monitor socket and its reactor thread.

use std::io;

use nix::errno::Errno;
use thiserror::Error;

/// Errors surfaced while binding the monitor socket or running its reactor.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Binding the socket failed.
    #[error("failed to bind monitor socket at {path}: {source}")]
    Bind {
        path: String,
        #[source]
        source: io::Error,
    },
    /// Another process still serves the socket.
    #[error("monitor socket {path} is already in use")]
    InUse { path: String },
    /// Something other than a socket occupies the path.
    #[error("monitor socket path {path} is not a socket")]
    NotSocket { path: String },
    /// Inspecting an existing socket file failed.
    #[error("failed to read metadata for monitor socket {path}: {source}")]
    Metadata {
        path: String,
        #[source]
        source: io::Error,
    },
    /// Probing an existing socket failed unexpectedly.
    #[error("failed to probe existing monitor socket {path}: {source}")]
    Probe {
        path: String,
        #[source]
        source: io::Error,
    },
    /// Removing a stale socket file failed.
    #[error("failed to remove stale monitor socket {path}: {source}")]
    Cleanup {
        path: String,
        #[source]
        source: io::Error,
    },
    /// Opening the socket to every local user failed.
    #[error("failed to set permissions on monitor socket {path}: {source}")]
    Permissions {
        path: String,
        #[source]
        source: io::Error,
    },
    /// Switching a socket to non-blocking mode failed.
    #[error("failed to enable non-blocking socket: {source}")]
    NonBlocking {
        #[source]
        source: io::Error,
    },
    /// Creating the reactor wake-up channel failed.
    #[error("failed to create reactor waker: {source}")]
    Waker {
        #[source]
        source: io::Error,
    },
    /// The operating system refused to create the reactor thread.
    #[error("failed to spawn reactor thread: {source}")]
    Spawn {
        #[source]
        source: io::Error,
    },
    /// Waiting for socket readiness failed; the reactor stopped serving.
    #[error("monitor reactor poll failed: {source}")]
    Poll {
        #[source]
        source: Errno,
    },
    /// The reactor thread ended before reporting that it was running.
    #[error("reactor thread exited during startup")]
    StartupAborted,
    /// The reactor thread panicked.
    #[error("reactor thread panicked")]
    ThreadPanic,
}
