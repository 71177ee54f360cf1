//! A running monitor on a temporary socket, plus a recording image loader.

use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vmmon_config::MonitorSocket;

use crate::dispatch::{CommandRegistry, GuestServices};
use crate::guest::{
    ExecutionGate, GuestMemoryHandle, HeapGuestMemory, KernelLoader, LoadError, StartGuest,
    execution_channel,
};
use crate::lifecycle::Monitor;

use super::{RecordingHealthReporter, TestConfigLoader};

const GUEST_MEMORY_BYTES: usize = 64;

/// Marker the recording loader writes at the start of guest memory.
pub const LOADED_MARKER: &[u8] = b"loaded";

/// Image loader that records every request and can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingKernelLoader {
    loads: Arc<Mutex<Vec<PathBuf>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingKernelLoader {
    /// Makes every following load fail.
    pub fn fail_loads(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Paths requested so far.
    #[must_use]
    pub fn loads(&self) -> Vec<PathBuf> {
        self.loads.lock().expect("loader mutex poisoned").clone()
    }
}

impl KernelLoader for RecordingKernelLoader {
    fn load_kernel(&self, memory: &GuestMemoryHandle, path: &Path) -> Result<(), LoadError> {
        self.loads
            .lock()
            .expect("loader mutex poisoned")
            .push(path.to_path_buf());
        if self.failing.load(Ordering::SeqCst) {
            return Err(LoadError::Read {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such image"),
            });
        }
        memory.write_at(0, LOADED_MARKER)?;
        Ok(())
    }
}

/// Monitor wired to recording collaborators.
pub struct TestMonitor {
    pub monitor: Monitor,
    pub loader: RecordingKernelLoader,
    pub reporter: Arc<RecordingHealthReporter>,
    pub memory: GuestMemoryHandle,
    pub gate: ExecutionGate,
    _config: TestConfigLoader,
}

impl TestMonitor {
    /// Builds an uninitialised monitor.
    #[must_use]
    pub fn new() -> Self {
        let config = TestConfigLoader::new();
        let loader = RecordingKernelLoader::default();
        let reporter = Arc::new(RecordingHealthReporter::default());
        let memory = HeapGuestMemory::shared(GUEST_MEMORY_BYTES);
        let (signal, gate) = execution_channel();
        let registry = CommandRegistry::standard(GuestServices {
            memory: Arc::clone(&memory),
            loader: Arc::new(loader.clone()),
            signal,
        });
        let monitor = Monitor::new(config.socket(), registry, reporter.clone());
        Self {
            monitor,
            loader,
            reporter,
            memory,
            gate,
            _config: config,
        }
    }

    /// Socket served by the monitor.
    #[must_use]
    pub fn socket(&self) -> &MonitorSocket {
        self.monitor.socket()
    }

    /// Sends one request and returns everything the monitor wrote back.
    pub fn request(&self, body: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut stream = UnixStream::connect(self.socket().path())?;
        stream.write_all(body)?;
        stream.shutdown(Shutdown::Write)?;
        let mut response = Vec::new();
        stream.read_to_end(&mut response)?;
        Ok(response)
    }

    /// Sends one request without half-closing and returns the answer.
    ///
    /// The monitor closes the connection after answering, which ends the read.
    pub fn request_keeping_write_open(&self, body: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut stream = UnixStream::connect(self.socket().path())?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        stream.write_all(body)?;
        let mut response = Vec::new();
        stream.read_to_end(&mut response)?;
        Ok(response)
    }

    /// Drains every release posted to the execution thread so far.
    pub fn releases(&self) -> Vec<StartGuest> {
        std::iter::from_fn(|| self.gate.try_wait()).collect()
    }

    /// Returns true when guest memory still holds only zeroes.
    #[must_use]
    pub fn memory_untouched(&self) -> bool {
        self.memory
            .read_at(0, self.memory.size())
            .map(|bytes| bytes.iter().all(|byte| *byte == 0))
            .unwrap_or(false)
    }
}

impl Default for TestMonitor {
    fn default() -> Self {
        Self::new()
    }
}
