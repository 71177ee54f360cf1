//! Stand-in for the guest CPU: waits for start requests and reports them.

use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use crate::guest::{ExecutionGate, GuestMemoryHandle, SignalError, StartGuest};

use super::{LaunchError, PROCESS_TARGET};

const EXECUTION_THREAD_NAME: &str = "vmmon-guest";
const BOOT_SECTOR_BYTES: usize = 16;

/// Thread that is released once per successful `start app`.
pub(super) struct ExecutionThread {
    thread: JoinHandle<usize>,
}

impl ExecutionThread {
    pub(super) fn spawn(
        gate: ExecutionGate,
        memory: GuestMemoryHandle,
    ) -> Result<Self, LaunchError> {
        let thread = thread::Builder::new()
            .name(EXECUTION_THREAD_NAME.to_owned())
            .spawn(move || run(&gate, &memory))
            .map_err(|source| LaunchError::ExecutionSpawn { source })?;
        Ok(Self { thread })
    }

    /// Waits for the thread to observe that no more requests can arrive.
    ///
    /// Returns how many times the guest was released.
    pub(super) fn join(self) -> Result<usize, LaunchError> {
        self.thread.join().map_err(|_| LaunchError::ExecutionPanic)
    }
}

fn run(gate: &ExecutionGate, memory: &GuestMemoryHandle) -> usize {
    let mut released = 0;
    loop {
        match gate.wait() {
            Ok(StartGuest { image }) => {
                released += 1;
                let prefix = memory
                    .read_at(0, BOOT_SECTOR_BYTES.min(memory.size()))
                    .unwrap_or_default();
                info!(
                    target: PROCESS_TARGET,
                    image = %image.display(),
                    memory_bytes = memory.size(),
                    prefix = ?prefix,
                    released,
                    "guest released for execution"
                );
            }
            Err(SignalError::Disconnected) => break,
            Err(error) => {
                warn!(target: PROCESS_TARGET, %error, "guest execution gate failed");
                break;
            }
        }
    }
    released
}
