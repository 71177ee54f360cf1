//! Single-threaded readiness loop serving the monitor socket.

use std::collections::HashSet;
use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tracing::{debug, error, info, warn};

use vmmon_config::MonitorSocket;

use super::listener::{MonitorListener, remove_socket_file};
use super::session::Session;
use super::{LISTENER_TARGET, ListenerError};
use crate::dispatch::CommandRegistry;

/// Upper bound on one poll wait so a missed wake-up still observes shutdown.
const POLL_INTERVAL_MS: u16 = 250;
const REACTOR_THREAD_NAME: &str = "vmmon-reactor";
/// How long the listener is left out of the poll set after `accept` fails.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(500);

/// Entry point for running the readiness loop on a dedicated thread.
pub(crate) struct Reactor {
    listener: MonitorListener,
    registry: Arc<CommandRegistry>,
    shutdown: Arc<AtomicBool>,
    waker: UnixStream,
    sessions: Vec<Session>,
    next_session: u64,
    accept_errors: HashSet<io::ErrorKind>,
    backoff: AcceptBackoff,
}

impl Reactor {
    /// Moves the listener onto a new reactor thread.
    ///
    /// Returns once the thread has entered its loop; from then on every
    /// connection to the socket is served.
    pub(crate) fn spawn(
        listener: MonitorListener,
        registry: Arc<CommandRegistry>,
    ) -> Result<ReactorHandle, ListenerError> {
        let socket = listener.socket.clone();
        let (waker, wake_sender) = match waker_pair() {
            Ok(pair) => pair,
            Err(error) => {
                drop(listener);
                remove_socket_file(&socket);
                return Err(error);
            }
        };
        let shutdown = Arc::new(AtomicBool::new(false));
        let reactor = Self {
            listener,
            registry,
            shutdown: Arc::clone(&shutdown),
            waker,
            sessions: Vec::new(),
            next_session: 0,
            accept_errors: HashSet::new(),
            backoff: AcceptBackoff::default(),
        };

        let (ready_tx, ready_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(REACTOR_THREAD_NAME.to_owned())
            .spawn(move || {
                // The receiver only disappears if `spawn` already gave up.
                let _ = ready_tx.send(());
                reactor.run()
            })
            .map_err(|source| {
                remove_socket_file(&socket);
                ListenerError::Spawn { source }
            })?;

        if ready_rx.recv().is_err() {
            let _ = thread.join();
            remove_socket_file(&socket);
            return Err(ListenerError::StartupAborted);
        }

        Ok(ReactorHandle {
            socket,
            shutdown,
            wake_sender,
            thread: Some(thread),
        })
    }

    /// Serves until shutdown is requested or polling fails, then releases
    /// the socket either way.
    fn run(mut self) -> Result<(), ListenerError> {
        info!(
            target: LISTENER_TARGET,
            socket = %self.listener.socket,
            "monitor reactor running"
        );
        let outcome = self.serve();
        if let Err(failure) = &outcome {
            error!(
                target: LISTENER_TARGET,
                error = %failure,
                "monitor reactor stopped serving"
            );
        }
        self.finish();
        outcome
    }

    fn serve(&mut self) -> Result<(), ListenerError> {
        while !self.shutdown.load(Ordering::SeqCst) {
            let accepting = self.backoff.accepting(Instant::now());
            let ready = match self.wait_for_events(accepting) {
                Ok(ready) => ready,
                Err(Errno::EINTR) => continue,
                Err(source) => return Err(ListenerError::Poll { source }),
            };
            let [listener_ready, waker_ready, sessions_ready @ ..] = ready.as_slice() else {
                continue;
            };
            if *waker_ready {
                self.drain_waker();
            }
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            self.drive_sessions(sessions_ready);
            if accepting && *listener_ready {
                self.accept_pending();
            }
        }
        Ok(())
    }

    /// Blocks until any watched descriptor is readable or the interval lapses.
    ///
    /// The listener stays in the set while paused so the slot layout is
    /// fixed, but with no requested events.
    fn wait_for_events(&self, accepting: bool) -> Result<Vec<bool>, Errno> {
        let interest = PollFlags::POLLIN;
        let listener_interest = if accepting {
            interest
        } else {
            PollFlags::empty()
        };
        let mut fds = Vec::with_capacity(self.sessions.len() + 2);
        fds.push(PollFd::new(self.listener.listener.as_fd(), listener_interest));
        fds.push(PollFd::new(self.waker.as_fd(), interest));
        fds.extend(
            self.sessions
                .iter()
                .map(|session| PollFd::new(session.as_fd(), interest)),
        );

        poll(&mut fds, PollTimeout::from(POLL_INTERVAL_MS))?;

        let readable = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
        Ok(fds
            .iter()
            .map(|fd| fd.revents().is_some_and(|events| events.intersects(readable)))
            .collect())
    }

    fn drive_sessions(&mut self, ready: &[bool]) {
        for (session, _) in self
            .sessions
            .iter_mut()
            .zip(ready.iter())
            .filter(|(_, ready)| **ready)
        {
            session.on_readable(&self.registry);
        }
        let now = Instant::now();
        for session in &mut self.sessions {
            session.expire_if_idle(now);
        }
        self.sessions.retain(|session| !session.is_terminal());
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.listener.accept() {
                Ok((stream, _)) => self.admit(stream),
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => break,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => {
                    if self.accept_errors.insert(error.kind()) {
                        warn!(
                            target: LISTENER_TARGET,
                            %error,
                            backoff_ms = ACCEPT_BACKOFF.as_millis(),
                            "failed to accept monitor client; pausing accepts"
                        );
                    }
                    self.backoff.pause(Instant::now());
                    break;
                }
            }
        }
    }

    fn admit(&mut self, stream: UnixStream) {
        self.next_session += 1;
        if let Err(error) = stream.set_nonblocking(true) {
            warn!(
                target: LISTENER_TARGET,
                session = self.next_session,
                %error,
                "dropping monitor client that cannot be made non-blocking"
            );
            return;
        }
        self.sessions.push(Session::new(self.next_session, stream));
    }

    fn drain_waker(&mut self) {
        let mut buffer = [0_u8; 64];
        while matches!(self.waker.read(&mut buffer), Ok(read) if read > 0) {}
    }

    fn finish(self) {
        let Self {
            listener, sessions, ..
        } = self;
        for session in &sessions {
            debug!(
                target: LISTENER_TARGET,
                state = %session.state(),
                "dropping unfinished monitor session"
            );
        }
        drop(sessions);
        let socket = listener.socket.clone();
        drop(listener);
        remove_socket_file(&socket);
        info!(target: LISTENER_TARGET, socket = %socket, "monitor reactor stopped");
    }
}

/// Keeps the listener out of the poll set for a while after `accept` fails,
/// so a descriptor limit does not turn the loop into a busy spin.
#[derive(Debug, Default)]
struct AcceptBackoff {
    resume_at: Option<Instant>,
}

impl AcceptBackoff {
    fn pause(&mut self, now: Instant) {
        self.resume_at = Some(now + ACCEPT_BACKOFF);
    }

    fn accepting(&mut self, now: Instant) -> bool {
        match self.resume_at {
            Some(resume_at) if now < resume_at => false,
            _ => {
                self.resume_at = None;
                true
            }
        }
    }
}

fn waker_pair() -> Result<(UnixStream, UnixStream), ListenerError> {
    let (receiver, sender) = UnixStream::pair().map_err(|source| ListenerError::Waker { source })?;
    receiver
        .set_nonblocking(true)
        .map_err(|source| ListenerError::NonBlocking { source })?;
    sender
        .set_nonblocking(true)
        .map_err(|source| ListenerError::NonBlocking { source })?;
    Ok((receiver, sender))
}

/// Handle used to stop the reactor thread.
#[derive(Debug)]
pub(crate) struct ReactorHandle {
    socket: MonitorSocket,
    shutdown: Arc<AtomicBool>,
    wake_sender: UnixStream,
    thread: Option<JoinHandle<Result<(), ListenerError>>>,
}

impl ReactorHandle {
    /// Socket served by the reactor.
    pub(crate) fn socket(&self) -> &MonitorSocket {
        &self.socket
    }

    /// Requests shutdown and wakes the reactor if it is waiting.
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // A full pipe already guarantees a pending wake-up.
        let _ = (&self.wake_sender).write(&[1]);
    }

    /// Waits for the reactor thread to exit and returns the reason it
    /// stopped serving, if it was not a requested shutdown.
    pub(crate) fn join(mut self) -> Result<(), ListenerError> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| ListenerError::ThreadPanic)?,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
impl ReactorHandle {
    /// Handle for a reactor thread that has already stopped with `outcome`.
    pub(crate) fn stopped(socket: MonitorSocket, outcome: Result<(), ListenerError>) -> Self {
        let (_, wake_sender) = UnixStream::pair().expect("waker pair");
        Self {
            socket,
            shutdown: Arc::new(AtomicBool::new(true)),
            wake_sender,
            thread: Some(thread::spawn(move || outcome)),
        }
    }
}

impl Drop for ReactorHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
        }
    }
}
