//! Command dispatch for monitor requests.
//!
//! This module turns the bytes drained from a client connection into exactly
//! one [`StatusCode`]: the request is decoded into a [`Command`], the command
//! name is resolved against the [`CommandRegistry`], and the resolved handler
//! runs to completion.
//!
//! ## Protocol
//!
//! Clients write one JSON object naming the command under `task`:
//!
//! ```json
//! {"task":"start app","path":"/tmp/app.elf"}
//! ```
//!
//! The monitor answers with three ASCII digits and closes the connection:
//!
//! | Status | Meaning |
//! |--------|---------|
//! | `200`  | command completed |
//! | `400`  | malformed request or missing argument |
//! | `500`  | the host failed to carry out the command |
//! | `501`  | unknown or unimplemented command |

mod errors;
mod handlers;
mod registry;
mod request;
mod response;

use tracing::{debug, warn};

pub use self::errors::DispatchError;
pub use self::handlers::{
    CommandHandler, GuestServices, PATH_FIELD, StartAppHandler, UnimplementedHandler,
};
pub use self::registry::{
    CREATE_CHECKPOINT, CommandRegistry, LOAD_CHECKPOINT, MIGRATE, RegistryBuilder, START_APP,
};
pub use self::request::{Command, TASK_FIELD};
pub use self::response::{STATUS_WIDTH, StatusCode};

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Decodes, resolves, and executes one request.
///
/// Failures never escape: they are logged and folded into the status that is
/// reported to the client.
#[must_use]
pub fn dispatch_request(bytes: &[u8], registry: &CommandRegistry) -> StatusCode {
    match dispatch(bytes, registry) {
        Ok(status) => status,
        Err(error) => {
            match &error {
                DispatchError::UnknownCommand { name } => {
                    warn!(target: DISPATCH_TARGET, command = %name, %error, "command not implemented");
                }
                _ => warn!(target: DISPATCH_TARGET, %error, "rejected malformed request"),
            }
            error.status()
        }
    }
}

fn dispatch(bytes: &[u8], registry: &CommandRegistry) -> Result<StatusCode, DispatchError> {
    let command = Command::decode(bytes)?;
    let handler = registry.resolve(command.name())?;
    debug!(
        target: DISPATCH_TARGET,
        command = command.name(),
        arguments = command.arguments().len(),
        "dispatching command"
    );
    let status = handler.handle(&command)?;
    debug!(
        target: DISPATCH_TARGET,
        command = command.name(),
        %status,
        "command finished"
    );
    Ok(status)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rstest::{fixture, rstest};

    use super::*;
    use crate::guest::{ExecutionGate, HeapGuestMemory, MockKernelLoader, execution_channel};
    use crate::tests::support::CapturedLogs;

    struct Fixture {
        registry: CommandRegistry,
        gate: ExecutionGate,
        loaded: Arc<Mutex<Vec<String>>>,
    }

    #[fixture]
    fn fixture() -> Fixture {
        let (signal, gate) = execution_channel();
        let loaded = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&loaded);
        let mut loader = MockKernelLoader::new();
        loader.expect_load_kernel().returning(move |_, path| {
            record
                .lock()
                .expect("loader log")
                .push(path.display().to_string());
            Ok(())
        });
        let registry = CommandRegistry::standard(GuestServices {
            memory: HeapGuestMemory::shared(64),
            loader: Arc::new(loader),
            signal,
        });
        Fixture {
            registry,
            gate,
            loaded,
        }
    }

    #[rstest]
    fn start_app_loads_requested_image(fixture: Fixture) {
        let status = dispatch_request(
            br#"{"task":"start app","path":"/tmp/app.elf"}"#,
            &fixture.registry,
        );
        assert_eq!(status.encode(), *b"200");
        assert_eq!(
            *fixture.loaded.lock().expect("loader log"),
            vec!["/tmp/app.elf".to_owned()]
        );
        assert!(fixture.gate.try_wait().is_some());
        assert!(fixture.gate.try_wait().is_none());
    }

    #[rstest]
    #[case::empty_object(b"{}".as_slice())]
    #[case::path_only(br#"{"path":"/tmp/app.elf"}"#.as_slice())]
    #[case::garbage(b"\x00\x01".as_slice())]
    #[case::start_without_path(br#"{"task":"start app"}"#.as_slice())]
    fn protocol_errors_answer_400(fixture: Fixture, #[case] request: &[u8]) {
        assert_eq!(dispatch_request(request, &fixture.registry), StatusCode::BadRequest);
        assert!(fixture.loaded.lock().expect("loader log").is_empty());
        assert!(fixture.gate.try_wait().is_none());
    }

    #[rstest]
    #[case(br#"{"task":"create checkpoint"}"#.as_slice())]
    #[case(br#"{"task":"load checkpoint"}"#.as_slice())]
    #[case(br#"{"task":"migrate"}"#.as_slice())]
    #[case(br#"{"task":"migrate","path":"/tmp/app.elf"}"#.as_slice())]
    fn extension_points_answer_501_without_state_change(
        fixture: Fixture,
        #[case] request: &[u8],
    ) {
        assert_eq!(dispatch_request(request, &fixture.registry), StatusCode::NotImplemented);
        assert!(fixture.loaded.lock().expect("loader log").is_empty());
        assert!(fixture.gate.try_wait().is_none());
    }

    #[rstest]
    fn unknown_command_is_named_in_diagnostics(fixture: Fixture) {
        let logs = CapturedLogs::new();
        let status = logs.capture(|| dispatch_request(br#"{"task":"bogus"}"#, &fixture.registry));

        assert_eq!(status, StatusCode::NotImplemented);
        assert!(logs.contents().contains("bogus"), "logs: {}", logs.contents());
    }

    #[rstest]
    #[case::undecodable(br#"{"task":"#.as_slice(), "malformed request: ")]
    #[case::missing_task(b"{}".as_slice(), "missing the 'task' field")]
    #[case::missing_path(br#"{"task":"start app"}"#.as_slice(), "missing the 'path' field")]
    #[case::mistyped_path(br#"{"task":"start app","path":1}"#.as_slice(), "field 'path' must be")]
    fn protocol_errors_share_one_diagnostic(
        fixture: Fixture,
        #[case] request: &[u8],
        #[case] detail: &str,
    ) {
        let logs = CapturedLogs::new();
        let status = logs.capture(|| dispatch_request(request, &fixture.registry));

        assert_eq!(status, StatusCode::BadRequest);
        let contents = logs.contents();
        assert_eq!(
            contents.matches("rejected malformed request").count(),
            1,
            "logs: {contents}"
        );
        assert!(contents.contains(detail), "logs: {contents}");
    }

    #[rstest]
    fn prefix_of_a_command_is_not_dispatched(fixture: Fixture) {
        let status = dispatch_request(br#"{"task":"start","path":"/tmp/app.elf"}"#, &fixture.registry);
        assert_eq!(status, StatusCode::NotImplemented);
        assert!(fixture.loaded.lock().expect("loader log").is_empty());
    }
}
