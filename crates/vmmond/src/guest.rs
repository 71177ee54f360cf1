//! Seams towards the guest-side collaborators of the monitor.
//!
//! The monitor never owns the guest. It borrows three capabilities from the
//! host process: a handle to guest physical memory, an image loader that
//! writes a guest image into that memory, and a signal that releases the VM
//! execution thread. Each capability is a small trait or channel so the
//! command handlers can be exercised without a real hypervisor.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;

/// Shared handle to the guest physical memory region.
pub type GuestMemoryHandle = Arc<dyn GuestMemory>;

/// Addressable guest physical memory.
pub trait GuestMemory: Send + Sync {
    /// Size of the region in bytes.
    fn size(&self) -> usize;

    /// Copies `bytes` into the region starting at `offset`.
    fn write_at(&self, offset: usize, bytes: &[u8]) -> Result<(), GuestMemoryError>;

    /// Copies `len` bytes out of the region starting at `offset`.
    fn read_at(&self, offset: usize, len: usize) -> Result<Vec<u8>, GuestMemoryError>;
}

/// Errors raised by guest memory accessors.
#[derive(Debug, Error)]
pub enum GuestMemoryError {
    /// The requested range does not fit in the region.
    #[error("range {offset:#x}+{len:#x} exceeds guest memory of {size:#x} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },
    /// The backing lock was poisoned by a panicking writer.
    #[error("guest memory lock poisoned")]
    Poisoned,
}

/// Heap-backed guest memory.
pub struct HeapGuestMemory {
    bytes: Mutex<Vec<u8>>,
    size: usize,
}

impl HeapGuestMemory {
    /// Allocates a zeroed region of `size` bytes.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            bytes: Mutex::new(vec![0; size]),
            size,
        }
    }

    /// Allocates a region and wraps it in a shared handle.
    #[must_use]
    pub fn shared(size: usize) -> GuestMemoryHandle {
        Arc::new(Self::new(size))
    }

    fn range(&self, offset: usize, len: usize) -> Result<std::ops::Range<usize>, GuestMemoryError> {
        offset
            .checked_add(len)
            .filter(|end| *end <= self.size)
            .map(|end| offset..end)
            .ok_or(GuestMemoryError::OutOfBounds {
                offset,
                len,
                size: self.size,
            })
    }
}

impl fmt::Debug for HeapGuestMemory {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HeapGuestMemory")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl GuestMemory for HeapGuestMemory {
    fn size(&self) -> usize {
        self.size
    }

    fn write_at(&self, offset: usize, bytes: &[u8]) -> Result<(), GuestMemoryError> {
        let range = self.range(offset, bytes.len())?;
        let mut region = self.bytes.lock().map_err(|_| GuestMemoryError::Poisoned)?;
        region
            .get_mut(range)
            .ok_or(GuestMemoryError::OutOfBounds {
                offset,
                len: bytes.len(),
                size: self.size,
            })?
            .copy_from_slice(bytes);
        Ok(())
    }

    fn read_at(&self, offset: usize, len: usize) -> Result<Vec<u8>, GuestMemoryError> {
        let range = self.range(offset, len)?;
        let region = self.bytes.lock().map_err(|_| GuestMemoryError::Poisoned)?;
        region
            .get(range)
            .map(<[u8]>::to_vec)
            .ok_or(GuestMemoryError::OutOfBounds {
                offset,
                len,
                size: self.size,
            })
    }
}

/// Loads a guest image into guest memory.
#[cfg_attr(test, mockall::automock)]
pub trait KernelLoader: Send + Sync {
    /// Loads the image at `path` into `memory`.
    fn load_kernel(&self, memory: &GuestMemoryHandle, path: &Path) -> Result<(), LoadError>;
}

/// Errors raised while loading a guest image.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The image file could not be read.
    #[error("failed to read guest image '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The image does not fit into guest memory.
    #[error("guest image '{path}' is {image_size} bytes but guest memory holds {memory_size}")]
    TooLarge {
        path: PathBuf,
        image_size: usize,
        memory_size: usize,
    },
    /// Writing into guest memory failed.
    #[error("failed to copy guest image into memory: {0}")]
    Memory(#[from] GuestMemoryError),
}

/// Loader that copies a flat binary image to guest physical address zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawImageLoader;

impl KernelLoader for RawImageLoader {
    fn load_kernel(&self, memory: &GuestMemoryHandle, path: &Path) -> Result<(), LoadError> {
        let image = fs::read(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if image.len() > memory.size() {
            return Err(LoadError::TooLarge {
                path: path.to_path_buf(),
                image_size: image.len(),
                memory_size: memory.size(),
            });
        }
        memory.write_at(0, &image)?;
        Ok(())
    }
}

/// Message releasing the VM execution thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartGuest {
    /// Image that was loaded before the release.
    pub image: PathBuf,
}

/// Producer half of the execution handoff, held by the monitor.
///
/// Every post is delivered exactly once to the [`ExecutionGate`]; a post
/// cannot be withdrawn.
#[derive(Debug, Clone)]
pub struct ExecutionSignal {
    sender: Sender<StartGuest>,
}

/// Consumer half of the execution handoff, held by the VM execution thread.
#[derive(Debug)]
pub struct ExecutionGate {
    receiver: Receiver<StartGuest>,
}

/// Errors raised by the execution handoff.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignalError {
    /// The other half of the channel was dropped.
    #[error("execution thread is gone")]
    Disconnected,
    /// No release arrived within the allotted time.
    #[error("timed out waiting for guest start")]
    TimedOut,
}

/// Creates a connected signal/gate pair.
#[must_use]
pub fn execution_channel() -> (ExecutionSignal, ExecutionGate) {
    let (sender, receiver) = mpsc::channel();
    (ExecutionSignal { sender }, ExecutionGate { receiver })
}

impl ExecutionSignal {
    /// Releases the execution thread to run the given image.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Disconnected`] when the gate has been dropped.
    pub fn post(&self, image: impl Into<PathBuf>) -> Result<(), SignalError> {
        self.sender
            .send(StartGuest {
                image: image.into(),
            })
            .map_err(|_| SignalError::Disconnected)
    }
}

impl ExecutionGate {
    /// Blocks until the monitor releases the guest.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Disconnected`] once every signal is dropped.
    pub fn wait(&self) -> Result<StartGuest, SignalError> {
        self.receiver.recv().map_err(|_| SignalError::Disconnected)
    }

    /// Blocks for at most `timeout` waiting for a release.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::TimedOut`] or [`SignalError::Disconnected`].
    pub fn wait_timeout(&self, timeout: Duration) -> Result<StartGuest, SignalError> {
        self.receiver
            .recv_timeout(timeout)
            .map_err(|error| match error {
                RecvTimeoutError::Timeout => SignalError::TimedOut,
                RecvTimeoutError::Disconnected => SignalError::Disconnected,
            })
    }

    /// Returns a pending release without blocking.
    #[must_use]
    pub fn try_wait(&self) -> Option<StartGuest> {
        match self.receiver.try_recv() {
            Ok(start) => Some(start),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rstest::rstest;

    use super::*;

    #[test]
    fn heap_memory_round_trips_writes() {
        let memory = HeapGuestMemory::new(16);
        memory.write_at(4, b"abcd").expect("write");
        assert_eq!(memory.read_at(4, 4).expect("read"), b"abcd");
        assert_eq!(memory.read_at(0, 4).expect("read"), vec![0; 4]);
    }

    #[rstest]
    #[case::past_end(14, 4)]
    #[case::overflow(usize::MAX, 2)]
    fn heap_memory_rejects_out_of_bounds_writes(#[case] offset: usize, #[case] len: usize) {
        let memory = HeapGuestMemory::new(16);
        let error = memory
            .write_at(offset, &vec![1; len])
            .expect_err("write should fail");
        assert!(matches!(error, GuestMemoryError::OutOfBounds { .. }));
    }

    #[test]
    fn raw_loader_copies_image_to_address_zero() {
        let mut image = tempfile::NamedTempFile::new().expect("temp image");
        image.write_all(b"\x7fELF-guest").expect("write image");
        let memory = HeapGuestMemory::shared(64);

        RawImageLoader
            .load_kernel(&memory, image.path())
            .expect("load image");

        assert_eq!(memory.read_at(0, 10).expect("read"), b"\x7fELF-guest");
    }

    #[test]
    fn raw_loader_rejects_oversized_image() {
        let mut image = tempfile::NamedTempFile::new().expect("temp image");
        image.write_all(&[0xAA; 32]).expect("write image");
        let memory = HeapGuestMemory::shared(16);

        let error = RawImageLoader
            .load_kernel(&memory, image.path())
            .expect_err("oversized image");
        assert!(matches!(error, LoadError::TooLarge { image_size: 32, .. }));
        assert_eq!(memory.read_at(0, 16).expect("read"), vec![0; 16]);
    }

    #[test]
    fn raw_loader_reports_missing_file() {
        let memory = HeapGuestMemory::shared(16);
        let error = RawImageLoader
            .load_kernel(&memory, Path::new("/nonexistent/vmmon/guest.bin"))
            .expect_err("missing image");
        assert!(matches!(error, LoadError::Read { .. }));
    }

    #[test]
    fn signal_delivers_each_post_once() {
        let (signal, gate) = execution_channel();
        signal.post("/tmp/app.elf").expect("post");

        let start = gate
            .wait_timeout(Duration::from_secs(1))
            .expect("release should arrive");
        assert_eq!(start.image, PathBuf::from("/tmp/app.elf"));
        assert!(gate.try_wait().is_none());
    }

    #[test]
    fn post_fails_once_gate_is_dropped() {
        let (signal, gate) = execution_channel();
        drop(gate);
        assert_eq!(signal.post("/tmp/app.elf"), Err(SignalError::Disconnected));
    }

    #[test]
    fn gate_times_out_without_post() {
        let (_signal, gate) = execution_channel();
        assert_eq!(
            gate.wait_timeout(Duration::from_millis(10)),
            Err(SignalError::TimedOut)
        );
    }
}
