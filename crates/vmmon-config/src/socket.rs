use std::fmt;
use std::fs::DirBuilder;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Filesystem-addressed stream socket served by the monitor.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct MonitorSocket {
    path: Utf8PathBuf,
}

impl MonitorSocket {
    /// Builds a socket description for the given path.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the socket file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        self.path.as_ref()
    }

    /// Ensures the socket's parent directory exists.
    ///
    /// Newly created directories are restricted to the current user; an
    /// existing directory (such as `/tmp`) is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error when the path has no parent or the directory cannot
    /// be created.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(parent) = self.path.parent() else {
            return Err(SocketPreparationError::MissingParent {
                path: self.path.clone(),
            });
        };
        if parent.as_str().is_empty() {
            return Err(SocketPreparationError::MissingParent {
                path: self.path.clone(),
            });
        }

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        if let Err(source) = builder.create(parent.as_std_path())
            && source.kind() != std::io::ErrorKind::AlreadyExists
        {
            return Err(SocketPreparationError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            });
        }

        Ok(())
    }
}

impl fmt::Display for MonitorSocket {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "unix://{}", self.path)
    }
}

impl FromStr for MonitorSocket {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.starts_with('/') {
            return Ok(Self::unix(input));
        }

        let url = Url::parse(input)?;
        match url.scheme() {
            "unix" => {
                let path = url.path();
                if path.is_empty() || path == "/" {
                    return Err(SocketParseError::MissingUnixPath(input.to_owned()));
                }
                Ok(Self::unix(path))
            }
            other => Err(SocketParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

/// Errors encountered while parsing a [`MonitorSocket`] from text.
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// Scheme was not `unix`.
    #[error("unsupported socket scheme '{0}', the monitor only serves unix sockets")]
    UnsupportedScheme(String),
    /// Unix socket path was absent.
    #[error("missing Unix socket path in '{0}'")]
    MissingUnixPath(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// Errors raised when preparing socket directories.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// The socket path has no parent directory.
    #[error("socket path '{path}' has no parent directory")]
    MissingParent { path: Utf8PathBuf },
    /// Failed to create the socket directory.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}
