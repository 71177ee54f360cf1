//! Request decoding for monitor commands.
//!
//! A request is a single JSON object. The command name lives under the
//! [`TASK_FIELD`] key; every other top-level field is an argument for the
//! command:
//!
//! ```json
//! {"task":"start app","path":"/tmp/app.elf"}
//! ```
//!
//! Field names are matched exactly, including case and length.

use serde_json::{Map, Value};

use super::errors::DispatchError;

/// Key of the command-name field.
pub const TASK_FIELD: &str = "task";

/// A decoded monitor command.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: String,
    arguments: Map<String, Value>,
}

impl Command {
    /// Builds a command from its parts.
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Decodes request bytes into a command.
    ///
    /// Surrounding ASCII whitespace (such as a trailing newline from an
    /// interactive client) is ignored.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::MalformedRequest`] when the bytes are empty, not
    ///   JSON, or not a JSON object.
    /// - [`DispatchError::MissingField`] when the object has no `task` field.
    /// - [`DispatchError::InvalidField`] when `task` is not a string.
    pub fn decode(bytes: &[u8]) -> Result<Self, DispatchError> {
        let trimmed = bytes.trim_ascii();
        if trimmed.is_empty() {
            return Err(DispatchError::malformed("empty request"));
        }

        let document: Value =
            serde_json::from_slice(trimmed).map_err(DispatchError::from_json_error)?;
        let Value::Object(mut fields) = document else {
            return Err(DispatchError::malformed("request must be a JSON object"));
        };

        let name = match fields.remove(TASK_FIELD) {
            Some(Value::String(name)) => name,
            Some(_) => return Err(DispatchError::invalid_field(TASK_FIELD, "a string")),
            None => return Err(DispatchError::missing_field(TASK_FIELD)),
        };

        Ok(Self::new(name, fields))
    }

    /// Command name as sent by the client.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arguments carried next to the command name.
    #[must_use]
    pub fn arguments(&self) -> &Map<String, Value> {
        &self.arguments
    }

    /// Looks up a required string argument.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::MissingField`] when the argument is absent and
    /// [`DispatchError::InvalidField`] when it is not a string.
    pub fn string_argument(&self, field: &str) -> Result<&str, DispatchError> {
        match self.arguments.get(field) {
            Some(Value::String(value)) => Ok(value),
            Some(_) => Err(DispatchError::invalid_field(field, "a string")),
            None => Err(DispatchError::missing_field(field)),
        }
    }
}
