//! Error types for the rotation engine.
//!
//! The taxonomy separates construction-time configuration problems (fatal)
//! from startup access failures (fatal) and runtime rotation failures
//! (reported via [`RotatorEvent::Error`](crate::events::RotatorEvent) and
//! survived). Per-archive deletion failures during retention are not errors
//! at all; they are logged and retried on the next rotation.

use std::path::PathBuf;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the rotator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unrecognized behavior/frequency, malformed size or duration, or an
    /// otherwise inconsistent configuration. Raised synchronously at
    /// construction and fatal to it.
    #[error("invalid configuration: {reason}")]
    Validation {
        /// Human-readable description of the offending option.
        reason: String,
    },

    /// The live file or the archive directory could not be accessed during
    /// startup checks. Directory absence is auto-remediated (created
    /// recursively) before this is raised.
    #[error("cannot access {path}")]
    Access {
        /// The path that failed the check.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The live file vanished or lost permissions between scheduling and
    /// execution. The rotation cycle is skipped; the next trigger proceeds
    /// normally.
    #[error("rotation skipped: {path} is not accessible")]
    Rotation {
        /// The path involved in the failed step.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The rotation state document could not be written.
    #[error("failed to persist rotation state to {path}")]
    State {
        /// Location of the state document.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The filesystem watch on the live file could not be established or
    /// re-established.
    #[error("file watch failed on {path}")]
    Watch {
        /// The watched path.
        path: PathBuf,
        /// Underlying notify error.
        #[source]
        source: notify::Error,
    },
}

impl Error {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }
}
