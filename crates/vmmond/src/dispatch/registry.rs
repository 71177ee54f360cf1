//! Ordered mapping from command names to handlers.
//!
//! The registry is assembled once while the host process starts and is then
//! shared read-only with the reactor thread. Lookup is a linear scan in
//! registration order; the first entry whose name equals the requested name
//! (case- and length-sensitive) wins.

use std::fmt;

use tracing::warn;

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::handlers::{CommandHandler, GuestServices, StartAppHandler, UnimplementedHandler};

/// Loads a guest image and starts the guest.
pub const START_APP: &str = "start app";
/// Snapshots the running guest.
pub const CREATE_CHECKPOINT: &str = "create checkpoint";
/// Restores the guest from a snapshot.
pub const LOAD_CHECKPOINT: &str = "load checkpoint";
/// Transfers the guest to a peer monitor.
pub const MIGRATE: &str = "migrate";

struct RegistryEntry {
    name: String,
    handler: Box<dyn CommandHandler>,
}

/// Immutable command table consulted by every session.
pub struct CommandRegistry {
    entries: Vec<RegistryEntry>,
}

impl CommandRegistry {
    /// Starts an empty registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Builds the monitor's standard command table.
    #[must_use]
    pub fn standard(services: GuestServices) -> Self {
        Self::builder()
            .register(START_APP, StartAppHandler::new(services))
            .register(CREATE_CHECKPOINT, UnimplementedHandler::new("checkpoint"))
            .register(LOAD_CHECKPOINT, UnimplementedHandler::new("restore"))
            .register(MIGRATE, UnimplementedHandler::new("migration"))
            .build()
    }

    /// Resolves a command name to its handler.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownCommand`] when no entry matches.
    pub fn resolve(&self, name: &str) -> Result<&dyn CommandHandler, DispatchError> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.handler.as_ref())
            .ok_or_else(|| DispatchError::unknown_command(name))
    }

    /// Registered names in lookup order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    /// Number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no commands are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_list().entries(self.names()).finish()
    }
}

/// Collects registry entries before the table is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<RegistryEntry>,
}

impl RegistryBuilder {
    /// Appends a handler under `name`.
    ///
    /// A name registered twice keeps its first handler; the later entry is
    /// unreachable and reported at `warn`.
    #[must_use]
    pub fn register(mut self, name: impl Into<String>, handler: impl CommandHandler + 'static) -> Self {
        let name = name.into();
        if self.entries.iter().any(|entry| entry.name == name) {
            warn!(
                target: DISPATCH_TARGET,
                command = %name,
                "duplicate command registration is shadowed"
            );
        }
        self.entries.push(RegistryEntry {
            name,
            handler: Box::new(handler),
        });
        self
    }

    /// Freezes the table.
    #[must_use]
    pub fn build(self) -> CommandRegistry {
        CommandRegistry {
            entries: self.entries,
        }
    }
}
