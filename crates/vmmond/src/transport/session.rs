//! Per-connection request handling.
//!
//! A session owns one accepted client stream. When the reactor reports the
//! stream readable the session drains every byte available at that moment
//! and treats them as the whole request: they are dispatched once and the
//! status code is written back before the connection is closed. A client
//! that connects and never writes is dropped after [`IDLE_TIMEOUT`].

use std::fmt;
use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::LISTENER_TARGET;
use crate::dispatch::{CommandRegistry, DispatchError, StatusCode, dispatch_request};

/// Largest request body accepted from one client.
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;

const READ_CHUNK: usize = 4096;
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

/// How long an accepted client may stay silent before it is dropped.
pub(crate) const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted but not yet read from.
    Accepted,
    /// Request bytes are being accumulated.
    Reading,
    /// The request is being executed.
    Dispatching,
    /// The status code is being written.
    Responding,
    /// The response was delivered and the connection closed.
    Closed,
    /// The connection ended without a delivered response.
    Failed,
}

impl SessionState {
    /// Returns true once the session no longer needs the reactor.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Accepted => "accepted",
            Self::Reading => "reading",
            Self::Dispatching => "dispatching",
            Self::Responding => "responding",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

enum Drain {
    Pending,
    Complete,
    TooLarge,
}

/// One accepted client connection.
pub(crate) struct Session {
    id: u64,
    stream: UnixStream,
    buffer: Vec<u8>,
    state: SessionState,
    accepted_at: Instant,
}

impl Session {
    /// Wraps a freshly accepted, non-blocking stream.
    pub(crate) fn new(id: u64, stream: UnixStream) -> Self {
        debug!(target: LISTENER_TARGET, session = id, "accepted monitor client");
        Self {
            id,
            stream,
            buffer: Vec::new(),
            state: SessionState::Accepted,
            accepted_at: Instant::now(),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Advances the session after the reactor reported the stream readable.
    pub(crate) fn on_readable(&mut self, registry: &CommandRegistry) {
        if self.is_terminal() {
            return;
        }
        if self.state == SessionState::Accepted {
            self.transition(SessionState::Reading);
        }

        match self.drain() {
            Ok(Drain::Pending) if self.buffer.is_empty() => {}
            Ok(Drain::Complete) if self.buffer.is_empty() => {
                debug!(
                    target: LISTENER_TARGET,
                    session = self.id,
                    "client closed without sending a request"
                );
                self.close(SessionState::Failed);
            }
            Ok(Drain::Pending | Drain::Complete) => {
                self.transition(SessionState::Dispatching);
                let status = dispatch_request(&self.buffer, registry);
                self.respond(status);
            }
            Ok(Drain::TooLarge) => {
                let error = DispatchError::request_too_large(self.buffer.len(), MAX_REQUEST_BYTES);
                warn!(
                    target: LISTENER_TARGET,
                    session = self.id,
                    %error,
                    "rejecting oversized request"
                );
                self.transition(SessionState::Dispatching);
                self.respond(error.status());
            }
            Err(error) => {
                warn!(
                    target: LISTENER_TARGET,
                    session = self.id,
                    %error,
                    "failed to read monitor request"
                );
                self.close(SessionState::Failed);
            }
        }
    }

    /// Fails the session if it has stayed silent past [`IDLE_TIMEOUT`].
    pub(crate) fn expire_if_idle(&mut self, now: Instant) {
        if self.is_terminal() {
            return;
        }
        if now.saturating_duration_since(self.accepted_at) >= IDLE_TIMEOUT {
            debug!(
                target: LISTENER_TARGET,
                session = self.id,
                "dropping idle monitor client"
            );
            self.close(SessionState::Failed);
        }
    }

    fn drain(&mut self) -> io::Result<Drain> {
        let mut chunk = [0_u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(Drain::Complete),
                Ok(read) => {
                    self.buffer.extend_from_slice(&chunk[..read]);
                    if self.buffer.len() > MAX_REQUEST_BYTES {
                        return Ok(Drain::TooLarge);
                    }
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(Drain::Pending);
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(error),
            }
        }
    }

    fn respond(&mut self, status: StatusCode) {
        self.transition(SessionState::Responding);
        match self.write_status(status) {
            Ok(()) => self.close(SessionState::Closed),
            Err(error) => {
                warn!(
                    target: LISTENER_TARGET,
                    session = self.id,
                    %status,
                    %error,
                    "failed to deliver monitor response"
                );
                self.close(SessionState::Failed);
            }
        }
    }

    fn write_status(&mut self, status: StatusCode) -> io::Result<()> {
        self.stream.set_nonblocking(false)?;
        self.stream.set_write_timeout(Some(RESPONSE_TIMEOUT))?;
        status.write_to(&mut self.stream)?;
        self.stream.flush()
    }

    fn close(&mut self, state: SessionState) {
        if let Err(error) = self.stream.shutdown(Shutdown::Both)
            && error.kind() != io::ErrorKind::NotConnected
        {
            debug!(
                target: LISTENER_TARGET,
                session = self.id,
                %error,
                "monitor client shutdown failed"
            );
        }
        self.transition(state);
    }

    fn transition(&mut self, next: SessionState) {
        debug!(
            target: LISTENER_TARGET,
            session = self.id,
            from = %self.state,
            to = %next,
            "session state changed"
        );
        self.state = next;
    }
}

impl AsFd for Session {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.stream.as_fd()
    }
}
