//! Error types for request decoding and command dispatch.
//!
//! Every variant maps onto exactly one wire status through
//! [`DispatchError::status`], so the session layer never has to interpret
//! failures itself.

use thiserror::Error;

use super::response::StatusCode;

/// Errors surfaced while decoding or dispatching a request.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Request bytes are not a JSON object.
    #[error("malformed request: {message}")]
    MalformedRequest {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// A required top-level field is absent.
    #[error("request is missing the '{field}' field")]
    MissingField { field: String },

    /// A field is present but carries the wrong kind of value.
    #[error("field '{field}' must be {expected}")]
    InvalidField {
        field: String,
        expected: &'static str,
    },

    /// The drained request exceeds the size limit.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    RequestTooLarge { size: usize, max_size: usize },

    /// No handler is registered under the requested name.
    #[error("command '{name}' not implemented")]
    UnknownCommand { name: String },
}

impl DispatchError {
    /// Returns the status reported to the client for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedRequest { .. }
            | Self::MissingField { .. }
            | Self::InvalidField { .. }
            | Self::RequestTooLarge { .. } => StatusCode::BadRequest,
            Self::UnknownCommand { .. } => StatusCode::NotImplemented,
        }
    }

    /// Creates a malformed request error from a JSON parse failure.
    #[must_use]
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedRequest {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed request error with a custom message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates an invalid field error.
    pub fn invalid_field(field: impl Into<String>, expected: &'static str) -> Self {
        Self::InvalidField {
            field: field.into(),
            expected,
        }
    }

    /// Creates a request too large error.
    #[must_use]
    pub fn request_too_large(size: usize, max_size: usize) -> Self {
        Self::RequestTooLarge { size, max_size }
    }

    /// Creates an unknown command error.
    pub fn unknown_command(name: impl Into<String>) -> Self {
        Self::UnknownCommand { name: name.into() }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::malformed(DispatchError::malformed("not json"), StatusCode::BadRequest)]
    #[case::missing(DispatchError::missing_field("task"), StatusCode::BadRequest)]
    #[case::invalid(DispatchError::invalid_field("path", "a string"), StatusCode::BadRequest)]
    #[case::too_large(DispatchError::request_too_large(70_000, 65_536), StatusCode::BadRequest)]
    #[case::unknown(DispatchError::unknown_command("bogus"), StatusCode::NotImplemented)]
    fn maps_errors_to_statuses(#[case] error: DispatchError, #[case] expected: StatusCode) {
        assert_eq!(error.status(), expected);
    }

    #[test]
    fn unknown_command_names_the_command() {
        let error = DispatchError::unknown_command("bogus");
        assert_eq!(error.to_string(), "command 'bogus' not implemented");
    }
}
