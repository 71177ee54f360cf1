//! Test configuration loaders for scenarios covering success and failure paths.

use std::ffi::OsString;
use std::sync::Arc;

use camino::Utf8PathBuf;
use tempfile::TempDir;

use vmmon_config::{Config, ConfigError, LogFormat, MonitorSocket};

use crate::bootstrap::ConfigLoader;

/// Loader that provisions a Unix socket path under a temporary directory.
#[derive(Clone)]
pub struct TestConfigLoader {
    socket_dir: Arc<TempDir>,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temporary directory for socket");
        Self {
            socket_dir: Arc::new(dir),
        }
    }

    /// Socket the loaded configuration points at.
    #[must_use]
    pub fn socket(&self) -> MonitorSocket {
        let path = self.socket_dir.path().join("run").join("vmmon.sock");
        let path = Utf8PathBuf::from_path_buf(path)
            .expect("temporary socket path was not valid UTF-8");
        MonitorSocket::unix(path)
    }
}

impl Default for TestConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Ok(Config {
            monitor_socket: self.socket(),
            log_format: LogFormat::Compact,
            guest_memory_mib: 1,
            ..Config::default()
        })
    }
}

/// Loader that intentionally fails by passing an unsupported socket scheme.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        let args = vec![
            OsString::from("vmmond"),
            OsString::from("--monitor-socket"),
            OsString::from("tcp://127.0.0.1:9000"),
        ];
        Config::load_from_iter(args)
    }
}
