//! Test harness utilities shared by the monitor suites.

mod config_loader;
mod logs;
mod monitor;
mod reporter;

pub use config_loader::{FailingConfigLoader, TestConfigLoader};
pub use logs::CapturedLogs;
pub use monitor::TestMonitor;
pub use reporter::{HealthEvent, RecordingHealthReporter};
