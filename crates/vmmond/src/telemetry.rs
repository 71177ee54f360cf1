//! Structured telemetry initialisation for the monitor.
//!
//! The subscriber is process-global, so only the first configuration that
//! reaches [`initialise`] takes effect. Every caller gets back a
//! [`TelemetryHandle`] describing the settings that are actually active,
//! which may differ from the ones it asked for.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, debug, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use vmmon_config::{Config, LogFormat};

const TELEMETRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::telemetry");

static ACTIVE_TELEMETRY: OnceCell<TelemetryHandle> = OnceCell::new();

/// Settings of the installed subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
    filter: String,
}

impl TelemetryHandle {
    fn requested_by(config: &Config) -> Self {
        Self {
            format: config.log_format(),
            filter: config.log_filter().to_owned(),
        }
    }

    /// Output format of the installed subscriber.
    #[must_use]
    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// Filter directives of the installed subscriber.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Returns true when `config` asks for exactly these settings.
    #[must_use]
    pub fn matches(&self, config: &Config) -> bool {
        self.format == config.log_format() && self.filter == config.log_filter()
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Configures the global tracing subscriber when invoked for the first time.
///
/// Later calls leave the subscriber alone and return the settings installed
/// by the first call.
///
/// # Examples
///
/// ```rust
/// use vmmon_config::Config;
/// use vmmond::telemetry;
///
/// # fn main() -> Result<(), vmmond::TelemetryError> {
/// let config = Config::default();
/// let first = telemetry::initialise(&config)?;
/// let second = telemetry::initialise(&config)?;
/// assert_eq!(first, second);
/// # Ok(())
/// # }
/// ```
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    let active = ACTIVE_TELEMETRY.get_or_try_init(|| install_subscriber(config))?;
    if !active.matches(config) {
        debug!(
            target: TELEMETRY_TARGET,
            active_format = %active.format,
            active_filter = %active.filter,
            requested_format = %config.log_format(),
            requested_filter = config.log_filter(),
            "telemetry already installed; keeping the active settings"
        );
    }
    Ok(active.clone())
}

fn install_subscriber(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    // Thread names tell reactor, guest and main-thread events apart.
    let builder = |filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_timer(fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder(filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;
    Ok(TelemetryHandle::requested_by(config))
}
