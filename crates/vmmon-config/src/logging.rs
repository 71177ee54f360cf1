use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Output formats supported by the monitor's log subscriber.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Single-line human-readable output for interactive hosts.
    Compact,
}

/// Error returned when a [`LogFormat`] name is not recognised.
pub type LogFormatParseError = strum::ParseError;
