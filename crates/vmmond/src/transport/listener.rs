//! Binding of the monitor's Unix socket.

use std::fs::{self, Permissions};
use std::io;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;

use tracing::{debug, warn};

use vmmon_config::MonitorSocket;

use super::{LISTENER_TARGET, ListenerError};

/// Any local principal may connect; the host is trusted.
const SOCKET_MODE: u32 = 0o777;

/// Bound, non-blocking monitor socket.
#[derive(Debug)]
pub(crate) struct MonitorListener {
    pub(super) socket: MonitorSocket,
    pub(super) listener: UnixListener,
}

impl MonitorListener {
    /// Binds the socket, replacing a stale socket file left by a previous run.
    pub(crate) fn bind(socket: &MonitorSocket) -> Result<Self, ListenerError> {
        let path = socket.path().as_std_path();
        remove_stale_socket(path)?;

        let listener = UnixListener::bind(path).map_err(|source| ListenerError::Bind {
            path: path.display().to_string(),
            source,
        })?;
        let bound = Self {
            socket: socket.clone(),
            listener,
        };

        if let Err(source) = fs::set_permissions(path, Permissions::from_mode(SOCKET_MODE)) {
            remove_socket_file(socket);
            return Err(ListenerError::Permissions {
                path: path.display().to_string(),
                source,
            });
        }
        if let Err(source) = bound.listener.set_nonblocking(true) {
            remove_socket_file(socket);
            return Err(ListenerError::NonBlocking { source });
        }

        debug!(target: LISTENER_TARGET, socket = %socket, "monitor socket bound");
        Ok(bound)
    }
}

fn remove_stale_socket(path: &Path) -> Result<(), ListenerError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(ListenerError::Metadata {
                path: path.display().to_string(),
                source,
            });
        }
    };
    if !metadata.file_type().is_socket() {
        return Err(ListenerError::NotSocket {
            path: path.display().to_string(),
        });
    }

    match UnixStream::connect(path) {
        Ok(_stream) => Err(ListenerError::InUse {
            path: path.display().to_string(),
        }),
        Err(error)
            if error.kind() == io::ErrorKind::ConnectionRefused
                || error.kind() == io::ErrorKind::NotFound =>
        {
            debug!(
                target: LISTENER_TARGET,
                path = %path.display(),
                "removing stale monitor socket"
            );
            fs::remove_file(path).map_err(|source| ListenerError::Cleanup {
                path: path.display().to_string(),
                source,
            })
        }
        Err(source) => Err(ListenerError::Probe {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Removes the socket file, tolerating its absence.
pub(crate) fn remove_socket_file(socket: &MonitorSocket) {
    if let Err(error) = fs::remove_file(socket.path().as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: LISTENER_TARGET,
            error = %error,
            socket = %socket,
            "failed to remove monitor socket file"
        );
    }
}
