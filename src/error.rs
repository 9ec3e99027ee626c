//! Engine error taxonomy.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the sandbox engine. An expired session is reported the
/// same way as an absent one; command failures and timeouts are not errors at
/// all, they come back inside an `ExecutionResult`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("command rejected: `{0}` is not an allowed executable")]
    CommandRejected(String),

    #[error("path escapes workspace: {0}")]
    PathEscapesWorkspace(String),

    #[error("backend provisioning failed: {0}")]
    Provisioning(String),

    #[error("process not found: {0}")]
    ProcessNotFound(u32),

    #[error("failed to spawn process: {0}")]
    Spawn(String),

    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}
