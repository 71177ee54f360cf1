//! Socket transport for monitor clients.
//!
//! The transport binds the monitor's Unix socket and serves it from a single
//! reactor thread. Every accepted connection becomes a [`session::Session`]
//! that lives on that thread until it has answered its one request.

mod errors;
mod listener;
mod reactor;
mod session;

pub use self::errors::ListenerError;
pub(crate) use self::listener::{MonitorListener, remove_socket_file};
pub(crate) use self::reactor::{Reactor, ReactorHandle};
pub use self::session::{MAX_REQUEST_BYTES, SessionState};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
