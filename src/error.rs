#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use std::io;
use std::path::PathBuf;

/// Failures surfaced by the actuator engine.
///
/// Configuration errors abort the run before anything starts. File errors are
/// local to the file actuator: they are logged where they happen and the other
/// actuators keep running.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to create {}: {source}", path.display())]
    FileCreate { path: PathBuf, source: io::Error },

    #[error("failed to write {}: {source}", path.display())]
    FileWrite { path: PathBuf, source: io::Error },

    #[error("failed to sync {}: {source}", path.display())]
    FileSync { path: PathBuf, source: io::Error },

    #[error("failed to remove {}: {source}", path.display())]
    FileRemove { path: PathBuf, source: io::Error },

    #[error("failed to launch cleanup helper: {0}")]
    Helper(io::Error),

    #[error("controller already started")]
    AlreadyStarted,

    #[error("no actuator could be started")]
    NothingToRun,
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Process exit status: 2 for a rejected configuration, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.is_configuration() {
            2
        } else {
            1
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
